//! Offline cache: versioned buckets filled at install time and kept fresh
//! with stale-while-revalidate interception.
//!
//! A [`Registration`] owns the workers for one scope. Each [`CacheWorker`]
//! serves one bucket named `{prefix}-{version}`; activating a new version
//! deletes every other bucket.

mod error;
mod network;
mod registration;
mod request;
mod storage;
mod worker;

pub use error::{FetchError, StorageError};
pub use network::{DirNetwork, HttpNetwork, Network};
pub use registration::{ClientId, ControlMessage, Registration};
pub use request::{AssetKind, Origin, Request, RequestKey, Response, Scope, normalize_url};
pub use storage::CacheStorage;
pub use worker::{CacheSettings, CacheWorker, Fetched, Revalidation, Source, WorkerState};
