//! Worker heartbeat and managed-file synchronization.
//!
//! Workers periodically post their status together with a fingerprint of
//! every managed configuration file. The server answers with the full
//! content of each file whose fingerprint differs from its own copy, and the
//! worker writes those files locally. Payloads are optionally encrypted.

pub mod codec;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod registry;
pub mod server;
pub mod transport;
pub mod types;
pub mod worker;

pub use codec::{select_codec, CipherCodec, PayloadCodec, PlainCodec};
pub use config::{Config, Role, RunMode};
pub use error::{CodecError, HeartbeatError, RegistryError};
pub use fingerprint::{fingerprint, Fingerprint};
pub use registry::ManagedFileSet;
pub use types::{HeartbeatRequest, HeartbeatResponse, Outcome, UpdateMap, WorkerStatus};
