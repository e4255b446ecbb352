//! Opportunistic payload encryption.
//!
//! Heartbeat bodies are encrypted only when the deployment runs in release
//! mode and a shared secret of at least [`KEY_LEN`] bytes is configured.
//! Otherwise payloads cross the wire in clear text. The choice is made once
//! at startup by [`select_codec`]; callers only see [`PayloadCodec`].
//!
//! Cipher format: `iv(16) || AES-128-CBC(PKCS#7, plaintext)`. The key is the
//! first 16 bytes of the secret.

use std::sync::Arc;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use log::{info, warn};

use crate::config::RunMode;
use crate::error::CodecError;

/// Cipher key length in bytes.
pub const KEY_LEN: usize = 16;
const IV_LEN: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Transforms payload bytes on their way to and from the wire.
pub trait PayloadCodec: Send + Sync {
    fn secure(&self, payload: &[u8]) -> Vec<u8>;

    fn unsecure(&self, wire: &[u8]) -> Result<Vec<u8>, CodecError>;

    /// Whether payloads are actually encrypted.
    fn is_encrypting(&self) -> bool;
}

/// Pass-through codec used in debug mode or when no usable key is set.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainCodec;

impl PayloadCodec for PlainCodec {
    fn secure(&self, payload: &[u8]) -> Vec<u8> {
        payload.to_vec()
    }

    fn unsecure(&self, wire: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(wire.to_vec())
    }

    fn is_encrypting(&self) -> bool {
        false
    }
}

/// AES-128-CBC codec keyed from the shared secret.
#[derive(Clone)]
pub struct CipherCodec {
    key: [u8; KEY_LEN],
}

impl CipherCodec {
    /// Build a codec from a secret. Returns `None` if the secret is shorter
    /// than [`KEY_LEN`] bytes.
    pub fn from_secret(secret: &str) -> Option<Self> {
        let bytes = secret.as_bytes();
        if bytes.len() < KEY_LEN {
            return None;
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&bytes[..KEY_LEN]);
        Some(Self { key })
    }
}

impl std::fmt::Debug for CipherCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherCodec").finish_non_exhaustive()
    }
}

impl PayloadCodec for CipherCodec {
    fn secure(&self, payload: &[u8]) -> Vec<u8> {
        let mut iv = [0u8; IV_LEN];
        rand::RngCore::fill_bytes(&mut rand::thread_rng(), &mut iv);

        let ciphertext = Aes128CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(payload);

        let mut out = Vec::with_capacity(IV_LEN + ciphertext.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&ciphertext);
        out
    }

    fn unsecure(&self, wire: &[u8]) -> Result<Vec<u8>, CodecError> {
        // At least the IV plus one padded block.
        if wire.len() < IV_LEN * 2 {
            return Err(CodecError::Truncated(wire.len()));
        }
        let (iv, ciphertext) = wire.split_at(IV_LEN);
        Aes128CbcDec::new_from_slices(&self.key, iv)
            .map_err(|_| CodecError::InvalidKey)?
            .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
            .map_err(|_| CodecError::Decrypt)
    }

    fn is_encrypting(&self) -> bool {
        true
    }
}

/// Pick the codec for this deployment.
pub fn select_codec(mode: RunMode, secret: Option<&str>) -> Arc<dyn PayloadCodec> {
    if mode != RunMode::Release {
        info!("Debug mode: heartbeat payloads are not encrypted");
        return Arc::new(PlainCodec);
    }
    match secret.and_then(CipherCodec::from_secret) {
        Some(codec) => {
            info!("Heartbeat payload encryption enabled");
            Arc::new(codec)
        }
        None => {
            warn!(
                "No encryption key of at least {} bytes configured; heartbeats travel in clear text",
                KEY_LEN
            );
            Arc::new(PlainCodec)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef-extra-ignored";

    #[test]
    fn cipher_round_trip() {
        let codec = CipherCodec::from_secret(SECRET).unwrap();
        for payload in [
            &b""[..],
            &b"x"[..],
            &b"exactly sixteen!"[..],
            &br#"{"status":"success","msg":""}"#[..],
        ] {
            let wire = codec.secure(payload);
            assert_ne!(&wire[IV_LEN..], payload);
            assert_eq!(codec.unsecure(&wire).unwrap(), payload);
        }
    }

    #[test]
    fn cipher_uses_fresh_iv() {
        let codec = CipherCodec::from_secret(SECRET).unwrap();
        assert_ne!(codec.secure(b"same"), codec.secure(b"same"));
    }

    #[test]
    fn key_is_truncated_to_sixteen_bytes() {
        let a = CipherCodec::from_secret("0123456789abcdefAAAA").unwrap();
        let b = CipherCodec::from_secret("0123456789abcdefBBBB").unwrap();
        assert_eq!(b.unsecure(&a.secure(b"shared")).unwrap(), b"shared");
    }

    #[test]
    fn wrong_key_or_garbage_fails() {
        let codec = CipherCodec::from_secret(SECRET).unwrap();
        assert!(matches!(codec.unsecure(b"short"), Err(CodecError::Truncated(5))));
        assert!(codec.unsecure(&[7u8; 33]).is_err());
    }

    #[test]
    fn short_secret_is_rejected() {
        assert!(CipherCodec::from_secret("fifteen-bytes!!").is_none());
        assert!(CipherCodec::from_secret("sixteen-bytes!!!").is_some());
    }

    #[test]
    fn selection_follows_mode_and_key() {
        assert!(select_codec(RunMode::Release, Some(SECRET)).is_encrypting());
        assert!(!select_codec(RunMode::Release, Some("short")).is_encrypting());
        assert!(!select_codec(RunMode::Release, None).is_encrypting());
        assert!(!select_codec(RunMode::Debug, Some(SECRET)).is_encrypting());
    }

    #[test]
    fn plain_round_trip() {
        let codec = select_codec(RunMode::Debug, Some(SECRET));
        let wire = codec.secure(b"{\"a\":1}");
        assert_eq!(wire, b"{\"a\":1}");
        assert_eq!(codec.unsecure(&wire).unwrap(), b"{\"a\":1}");
    }
}
