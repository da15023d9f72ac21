//! Scope-level owner of the active and waiting workers and their clients.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use log::{debug, info};
use serde::Deserialize;

use super::error::{FetchError, StorageError};
use super::network::Network;
use super::request::Request;
use super::storage::CacheStorage;
use super::worker::{CacheSettings, CacheWorker, Fetched, Revalidation, Source, WorkerState};

/// Messages a page can post to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    SkipWaiting,
    ClearCache,
}

impl ControlMessage {
    /// Parse `{"type": "..."}`. Unknown or malformed messages yield `None`.
    pub fn parse(json: &str) -> Option<Self> {
        match serde_json::from_str(json) {
            Ok(msg) => Some(msg),
            Err(e) => {
                debug!("control message ignored ({e}): {json}");
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

pub struct Registration {
    storage: CacheStorage,
    network: Arc<dyn Network>,
    active: Option<CacheWorker>,
    waiting: Option<CacheWorker>,
    /// Open clients and whether the active worker controls them.
    clients: BTreeMap<ClientId, bool>,
    next_client: u64,
}

impl Registration {
    pub fn new(storage: CacheStorage, network: Arc<dyn Network>) -> Self {
        Self {
            storage,
            network,
            active: None,
            waiting: None,
            clients: BTreeMap::new(),
            next_client: 0,
        }
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn active(&self) -> Option<&CacheWorker> {
        self.active.as_ref()
    }

    pub fn waiting(&self) -> Option<&CacheWorker> {
        self.waiting.as_ref()
    }

    /// Install a worker for `settings`. Returns the state it ended in.
    ///
    /// A failed install leaves the current active worker in control.
    pub fn register(&mut self, settings: CacheSettings) -> Result<WorkerState, FetchError> {
        let bucket = settings.bucket_name();
        if let Some(active) = &self.active
            && active.bucket() == bucket
        {
            debug!("register: {bucket} already active");
            return Ok(WorkerState::Active);
        }

        let mut worker = CacheWorker::new(settings, self.storage.clone(), Arc::clone(&self.network))?;
        worker.install()?;

        if let Some(mut old) = self.waiting.take() {
            info!("register: {} replaces waiting {}", bucket, old.bucket());
            old.discard();
        }
        let promote = worker.wants_skip_waiting() || self.active.is_none();
        self.waiting = Some(worker);
        if promote {
            self.promote()?;
            return Ok(WorkerState::Active);
        }
        Ok(WorkerState::Waiting)
    }

    /// Pick up a bucket installed by an earlier run without refetching.
    /// Returns false if no bucket for this version exists.
    pub fn restore(&mut self, settings: CacheSettings) -> Result<bool, FetchError> {
        let Some(worker) =
            CacheWorker::resume(settings, self.storage.clone(), Arc::clone(&self.network))?
        else {
            return Ok(false);
        };
        info!("restore: resuming {}", worker.bucket());
        self.waiting = Some(worker);
        self.promote()?;
        Ok(true)
    }

    /// Activate the waiting worker, superseding the current one and
    /// claiming every open client. Returns false if nothing was waiting.
    pub fn promote(&mut self) -> Result<bool, StorageError> {
        let Some(mut worker) = self.waiting.take() else {
            return Ok(false);
        };
        worker.activate()?;
        if let Some(mut old) = self.active.replace(worker) {
            old.supersede();
        }
        for controlled in self.clients.values_mut() {
            *controlled = true;
        }
        debug!("promote: claimed {} client(s)", self.clients.len());
        Ok(true)
    }

    pub fn handle_message(&mut self, message: ControlMessage) -> Result<(), StorageError> {
        match message {
            ControlMessage::SkipWaiting => {
                if let Some(w) = self.waiting.as_mut() {
                    w.skip_waiting();
                    self.promote()?;
                } else {
                    debug!("SKIP_WAITING: no waiting worker");
                }
            }
            ControlMessage::ClearCache => {
                for name in self.storage.keys() {
                    self.storage.delete(&name)?;
                }
                info!("CLEAR_CACHE: all buckets deleted");
            }
        }
        Ok(())
    }

    /// Parse and handle a JSON control message; unknown types are ignored.
    pub fn post_message(&mut self, json: &str) -> Result<(), StorageError> {
        match ControlMessage::parse(json) {
            Some(msg) => self.handle_message(msg),
            None => Ok(()),
        }
    }

    /// A client opened while a worker is active is controlled immediately;
    /// otherwise it waits to be claimed.
    pub fn open_client(&mut self) -> ClientId {
        let id = ClientId(self.next_client);
        self.next_client += 1;
        self.clients.insert(id, self.active.is_some());
        id
    }

    pub fn close_client(&mut self, id: ClientId) {
        self.clients.remove(&id);
    }

    pub fn is_controlled(&self, id: ClientId) -> bool {
        self.clients.get(&id).copied().unwrap_or(false)
    }

    /// Route a client's request through the active worker if it controls the
    /// client, straight to the network otherwise.
    pub fn fetch(&self, client: ClientId, request: &Request) -> Result<Fetched, FetchError> {
        if self.is_controlled(client)
            && let Some(active) = &self.active
        {
            return active.fetch(request);
        }
        debug!("{client} uncontrolled, passing {} through", request.url);
        Ok(Fetched {
            response: self.network.fetch(request)?,
            source: Source::Passthrough,
            revalidation: Revalidation::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::request::Response;

    struct EchoNetwork;

    impl Network for EchoNetwork {
        fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
            Ok(Response::ok(request.url.clone()))
        }
    }

    struct DownNetwork;

    impl Network for DownNetwork {
        fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
            Err(FetchError::Network {
                url: request.url.clone(),
                reason: "down".into(),
            })
        }
    }

    fn settings(version: &str, skip: bool) -> CacheSettings {
        CacheSettings {
            scope: "https://album.invalid/".into(),
            prefix: "cache".into(),
            version: version.into(),
            manifest: vec!["/a.js".into()],
            skip_waiting_on_install: skip,
        }
    }

    fn registration() -> Registration {
        Registration::new(CacheStorage::in_memory(), Arc::new(EchoNetwork))
    }

    #[test]
    fn test_control_message_parse() {
        assert_eq!(
            ControlMessage::parse(r#"{"type":"SKIP_WAITING"}"#),
            Some(ControlMessage::SkipWaiting)
        );
        assert_eq!(
            ControlMessage::parse(r#"{"type": "CLEAR_CACHE", "extra": 1}"#),
            Some(ControlMessage::ClearCache)
        );
        assert_eq!(ControlMessage::parse(r#"{"type":"RELOAD"}"#), None);
        assert_eq!(ControlMessage::parse("not json"), None);
    }

    #[test]
    fn test_first_worker_activates_even_without_skip() {
        let mut reg = registration();
        assert_eq!(reg.register(settings("v1", false)).unwrap(), WorkerState::Active);
        assert_eq!(reg.active().unwrap().bucket(), "cache-v1");
    }

    #[test]
    fn test_second_worker_waits_until_skip_waiting() {
        let mut reg = registration();
        reg.register(settings("v1", false)).unwrap();
        assert_eq!(reg.register(settings("v2", false)).unwrap(), WorkerState::Waiting);
        assert_eq!(reg.active().unwrap().bucket(), "cache-v1");
        assert_eq!(reg.storage().keys().len(), 2);

        reg.post_message(r#"{"type":"SKIP_WAITING"}"#).unwrap();
        assert_eq!(reg.active().unwrap().bucket(), "cache-v2");
        assert!(reg.waiting().is_none());
        assert_eq!(reg.storage().keys(), vec!["cache-v2".to_string()]);
    }

    #[test]
    fn test_register_same_version_is_noop() {
        let mut reg = registration();
        reg.register(settings("v1", true)).unwrap();
        assert_eq!(reg.register(settings("v1", true)).unwrap(), WorkerState::Active);
        assert!(reg.waiting().is_none());
    }

    #[test]
    fn test_failed_install_keeps_active() {
        let storage = CacheStorage::in_memory();
        let mut reg = Registration::new(storage.clone(), Arc::new(EchoNetwork));
        reg.register(settings("v1", true)).unwrap();

        let mut broken = Registration::new(storage.clone(), Arc::new(DownNetwork));
        assert!(broken.register(settings("v2", true)).is_err());
        assert!(broken.active().is_none());
        assert!(!storage.has("cache-v2"));
        assert!(storage.has("cache-v1"));
    }

    #[test]
    fn test_clients_claimed_on_activate() {
        let mut reg = registration();
        let early = reg.open_client();
        assert!(!reg.is_controlled(early));
        let f = reg.fetch(early, &Request::get("https://album.invalid/p.png")).unwrap();
        assert_eq!(f.source, Source::Passthrough);

        reg.register(settings("v1", true)).unwrap();
        assert!(reg.is_controlled(early));
        let late = reg.open_client();
        assert!(reg.is_controlled(late));
        let f = reg.fetch(late, &Request::get("https://album.invalid/a.js")).unwrap();
        assert_eq!(f.source, Source::Cache);
        f.revalidation.wait();
    }

    #[test]
    fn test_clear_cache_then_fetch_recreates_bucket() {
        let mut reg = registration();
        reg.register(settings("v1", true)).unwrap();
        let client = reg.open_client();
        reg.handle_message(ControlMessage::ClearCache).unwrap();
        assert!(reg.storage().keys().is_empty());

        let f = reg.fetch(client, &Request::get("https://album.invalid/p.png")).unwrap();
        assert_eq!(f.source, Source::Network);
        assert_eq!(reg.storage().entry_keys("cache-v1").len(), 1);
    }

    #[test]
    fn test_restore_existing_bucket() {
        let storage = CacheStorage::in_memory();
        let mut reg = Registration::new(storage.clone(), Arc::new(EchoNetwork));
        assert!(!reg.restore(settings("v1", true)).unwrap());
        storage.open("cache-v1").unwrap();
        assert!(reg.restore(settings("v1", true)).unwrap());
        assert_eq!(reg.active().unwrap().state(), WorkerState::Active);
    }
}
