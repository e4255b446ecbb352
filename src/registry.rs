//! The set of configuration files kept in sync between server and workers.
//!
//! Both sides must agree on the identifier strings. An identifier known to
//! only one side is ignored by the other. Identifiers are resolved under a
//! filesystem root; they are never absolute and never climb out of it.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use log::debug;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::error::RegistryError;
use crate::fingerprint::{fingerprint, Fingerprint};

/// Custom rule files shipped with every deployment.
pub const DEFAULT_MANAGED_FILES: &[&str] = &[
    "thirdparty/custom/honeypot.txt",
    "thirdparty/custom/iplocation-custom.txt",
    "thirdparty/custom/iplocation-custom-B.txt",
    "thirdparty/custom/iplocation-custom-C.txt",
    "thirdparty/custom/services-custom.txt",
    "thirdparty/icp/icp.cache",
];

/// Ordered, immutable list of managed file identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedFileSet {
    ids: Arc<[String]>,
}

impl ManagedFileSet {
    pub fn new<I, S>(ids: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for id in ids {
            let id = id.into();
            validate_id(&id)?;
            if !out.contains(&id) {
                out.push(id);
            }
        }
        Ok(Self { ids: out.into() })
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.iter().any(|known| known == id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Fingerprint every managed file under `root`, missing files as empty.
    pub async fn fingerprint_all(&self, root: &Path) -> BTreeMap<String, Fingerprint> {
        let mut out = BTreeMap::new();
        for id in self.iter() {
            let content = read_or_empty(&resolve(root, id)).await;
            out.insert(id.to_string(), fingerprint(&content));
        }
        out
    }
}

impl Default for ManagedFileSet {
    fn default() -> Self {
        Self {
            ids: DEFAULT_MANAGED_FILES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn validate_id(id: &str) -> Result<(), RegistryError> {
    let path = Path::new(id);
    let ok = !id.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if ok {
        Ok(())
    } else {
        Err(RegistryError::InvalidId(id.to_string()))
    }
}

/// Path of a managed file under `root`.
pub fn resolve(root: &Path, id: &str) -> PathBuf {
    root.join(id)
}

/// Read a file, treating any failure as empty content.
pub async fn read_or_empty(path: &Path) -> Vec<u8> {
    match fs::read(path).await {
        Ok(content) => content,
        Err(e) => {
            debug!("Treating {} as empty: {}", path.display(), e);
            Vec::new()
        }
    }
}

/// Replace `path` with `content`, creating parent directories as needed.
///
/// The bytes land in a temporary file next to the target which is then
/// renamed over it, so readers never observe a half-written file. An
/// existing target keeps its permissions; a new one gets the default mode.
pub async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), RegistryError> {
    let io_err = |source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    };
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).await.map_err(io_err)?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp_path = dir.join(format!(".{}.{:016x}.tmp", name, rand::random::<u64>()));

    if let Err(e) = write_then_rename(&tmp_path, path, content).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(io_err(e));
    }
    Ok(())
}

async fn write_then_rename(tmp_path: &Path, path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(tmp_path).await?;
    file.write_all(content).await?;
    if let Ok(meta) = fs::metadata(path).await {
        file.set_permissions(meta.permissions()).await?;
    }
    file.sync_all().await?;
    drop(file);
    fs::rename(tmp_path, path).await
}
