//! One versioned cache worker: install, activate, stale-while-revalidate.

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};

use super::error::{FetchError, StorageError};
use super::network::Network;
use super::request::{Request, RequestKey, Response, Scope};
use super::storage::CacheStorage;

/// Everything that identifies one deployed version of the cache.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Scope URL; manifest paths and same-origin checks are relative to it.
    pub scope: String,
    pub prefix: String,
    pub version: String,
    /// Static assets that must be present once installed.
    pub manifest: Vec<String>,
    /// Ask to take over right after install instead of waiting for a
    /// `SKIP_WAITING` message.
    pub skip_waiting_on_install: bool,
}

impl CacheSettings {
    pub fn bucket_name(&self) -> String {
        format!("{}-{}", self.prefix, self.version)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Waiting,
    Active,
    /// Replaced by a newer active worker.
    Superseded,
    /// Install failed; this worker never serves anything.
    Redundant,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Installing => "installing",
            WorkerState::Waiting => "waiting",
            WorkerState::Active => "active",
            WorkerState::Superseded => "superseded",
            WorkerState::Redundant => "redundant",
        };
        f.write_str(s)
    }
}

/// Where an intercepted response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Cache,
    Network,
    /// Not intercepted (cross-origin or non-GET).
    Passthrough,
}

/// Background network refresh of a cache hit.
///
/// Dropping it detaches the refresh; [`Revalidation::wait`] blocks until the
/// write-back (if any) has happened.
#[derive(Debug, Default)]
pub struct Revalidation(Option<JoinHandle<()>>);

impl Revalidation {
    pub fn is_pending(&self) -> bool {
        self.0.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn wait(self) {
        if let Some(handle) = self.0
            && handle.join().is_err()
        {
            warn!("revalidation thread panicked");
        }
    }
}

#[derive(Debug)]
pub struct Fetched {
    pub response: Response,
    pub source: Source,
    pub revalidation: Revalidation,
}

pub struct CacheWorker {
    settings: CacheSettings,
    scope: Scope,
    bucket: String,
    state: WorkerState,
    skip_waiting: bool,
    storage: CacheStorage,
    network: Arc<dyn Network>,
}

impl CacheWorker {
    pub fn new(
        settings: CacheSettings,
        storage: CacheStorage,
        network: Arc<dyn Network>,
    ) -> Result<Self, FetchError> {
        let scope = Scope::parse(&settings.scope)?;
        let bucket = settings.bucket_name();
        Ok(Self {
            settings,
            scope,
            bucket,
            state: WorkerState::Installing,
            skip_waiting: false,
            storage,
            network,
        })
    }

    /// A worker for a version whose bucket is already installed, e.g. from a
    /// previous process run against a persistent store.
    pub fn resume(
        settings: CacheSettings,
        storage: CacheStorage,
        network: Arc<dyn Network>,
    ) -> Result<Option<Self>, FetchError> {
        let mut worker = Self::new(settings, storage, network)?;
        if !worker.storage.has(&worker.bucket) {
            return Ok(None);
        }
        worker.state = WorkerState::Waiting;
        Ok(Some(worker))
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    pub fn wants_skip_waiting(&self) -> bool {
        self.skip_waiting
    }

    pub fn skip_waiting(&mut self) {
        self.skip_waiting = true;
    }

    /// Fetch every manifest asset and store them all, or nothing.
    pub fn install(&mut self) -> Result<(), FetchError> {
        if self.state != WorkerState::Installing {
            debug!("install: {} already {}", self.bucket, self.state);
            return Ok(());
        }
        info!(
            "install: {} ({} assets)",
            self.bucket,
            self.settings.manifest.len()
        );
        let stored = self
            .fetch_manifest()
            .and_then(|entries| {
                self.storage
                    .put_all(&self.bucket, entries)
                    .map_err(FetchError::from)
            });
        match stored {
            Ok(()) => {
                self.state = WorkerState::Waiting;
                if self.settings.skip_waiting_on_install {
                    self.skip_waiting = true;
                }
                info!("install: {} ready", self.bucket);
                Ok(())
            }
            Err(e) => {
                warn!("install: {} failed: {e}", self.bucket);
                self.state = WorkerState::Redundant;
                Err(e)
            }
        }
    }

    fn fetch_manifest(&self) -> Result<Vec<(RequestKey, Response)>, FetchError> {
        let requests: Vec<Request> = self
            .settings
            .manifest
            .iter()
            .map(|path| Request::get(self.scope.resolve(path)))
            .collect();

        // Fetch in parallel; results keep manifest order.
        let results: Vec<Result<Response, FetchError>> = thread::scope(|s| {
            let handles: Vec<_> = requests
                .iter()
                .map(|req| s.spawn(move || self.network.fetch(req)))
                .collect();
            handles
                .into_iter()
                .zip(&requests)
                .map(|(h, req)| {
                    h.join().unwrap_or_else(|_| {
                        Err(FetchError::Network {
                            url: req.url.clone(),
                            reason: "fetch thread panicked".into(),
                        })
                    })
                })
                .collect()
        });

        let mut entries = Vec::with_capacity(requests.len());
        for (req, result) in requests.iter().zip(results) {
            let response = result?;
            if !response.is_ok() {
                return Err(FetchError::BadStatus {
                    url: req.url.clone(),
                    status: response.status,
                });
            }
            entries.push((req.key()?, response));
        }
        Ok(entries)
    }

    /// Take over: delete every other bucket. Returns the deleted names.
    pub fn activate(&mut self) -> Result<Vec<String>, StorageError> {
        let mut deleted = Vec::new();
        for name in self.storage.keys() {
            if name != self.bucket {
                info!("activate: deleting stale bucket {name}");
                self.storage.delete(&name)?;
                deleted.push(name);
            }
        }
        self.state = WorkerState::Active;
        info!("activate: {} active", self.bucket);
        Ok(deleted)
    }

    pub(super) fn supersede(&mut self) {
        debug!("worker {}: superseded", self.bucket);
        self.state = WorkerState::Superseded;
    }

    pub(super) fn discard(&mut self) {
        debug!("worker {}: discarded", self.bucket);
        self.state = WorkerState::Redundant;
    }

    /// Intercept a request: serve the cached copy at once if there is one,
    /// and refresh it from the network either way.
    pub fn fetch(&self, request: &Request) -> Result<Fetched, FetchError> {
        if !request.is_get() || !self.scope.is_same_origin(&request.url) {
            let response = self.network.fetch(request)?;
            return Ok(Fetched {
                response,
                source: Source::Passthrough,
                revalidation: Revalidation::default(),
            });
        }

        let key = request.key()?;
        // A cleared cache is recreated on the next intercepted request.
        self.storage.open(&self.bucket)?;

        // Start the network request before looking at the cache.
        let (tx, rx) = mpsc::channel();
        let handle = {
            let network = Arc::clone(&self.network);
            let storage = self.storage.clone();
            let bucket = self.bucket.clone();
            let request = request.clone();
            let key = key.clone();
            thread::spawn(move || {
                let result = network.fetch(&request);
                match &result {
                    Ok(resp) if resp.is_ok() && request.asset_kind().is_persisted() => {
                        match storage.put(&bucket, key, resp.clone()) {
                            Ok(true) => debug!("revalidate: stored {} in {bucket}", request.url),
                            Ok(false) => {}
                            Err(e) => warn!("revalidate: failed to store {}: {e}", request.url),
                        }
                    }
                    Ok(resp) => debug!(
                        "revalidate: {} → {} (not stored)",
                        request.url, resp.status
                    ),
                    Err(e) => debug!("revalidate: {e}"),
                }
                let _ = tx.send(result);
            })
        };

        if let Some(cached) = self.storage.match_request(&self.bucket, &key) {
            debug!("fetch: {key} served from {}", self.bucket);
            return Ok(Fetched {
                response: cached,
                source: Source::Cache,
                revalidation: Revalidation(Some(handle)),
            });
        }

        let result = rx.recv().unwrap_or_else(|_| {
            Err(FetchError::Network {
                url: request.url.clone(),
                reason: "network thread exited without a result".into(),
            })
        });
        let _ = handle.join();
        let response = result?;
        debug!("fetch: {key} served from network ({})", response.status);
        Ok(Fetched {
            response,
            source: Source::Network,
            revalidation: Revalidation::default(),
        })
    }
}
