//! # mhook-sync
//!
//! Artifact resolution and transfer engine for the MUFL layout.
//!
//! - [`store`]: the object-store collaborator and its backends
//! - [`fingerprint`]: freshness checks that avoid redundant transfers
//! - [`transfer`]: one object, downloaded atomically or uploaded streaming
//! - [`tree`]: directory / key-prefix fan-out over single transfers
//! - [`publish`]: HEAD marker and `latest` alias promotion
//! - [`wait`]: block until a key exists, bounded by a timeout
//!
//! [`Mhook`] ties these together behind `download / upload / publish_latest
//! / head / wait`.

pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod progress;
pub mod publish;
pub mod store;
pub mod transfer;
pub mod tree;
pub mod wait;

pub use engine::Mhook;
pub use error::SyncError;
pub use fingerprint::{Fingerprint, FingerprintAlgorithm};
pub use progress::{NoProgress, ProgressCallback, TransferProgress};
pub use store::{DirStore, MemoryStore, ObjectStore, RetryingStore, S3Store, StoreError};
pub use transfer::{Direction, TransferJob, TransferOutcome};
pub use tree::{TreeOptions, TreeReport};
pub use wait::CancelFlag;
