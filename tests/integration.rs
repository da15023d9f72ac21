use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use folio::album::Album;
use folio::cache::{
    CacheSettings, CacheStorage, FetchError, Network, Registration, Request, Response, Source,
    WorkerState,
};
use folio::nav::{
    Controller, EffectKind, ImageLoader, InputEvent, Key, Point, PresentationMode, Settings,
    SlideState, UiRenderer,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Serves fixed bodies; unknown URLs fail like a dropped connection.
#[derive(Default)]
struct FixtureNetwork {
    bodies: HashMap<String, String>,
}

impl FixtureNetwork {
    fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            bodies: entries
                .iter()
                .map(|(u, b)| (u.to_string(), b.to_string()))
                .collect(),
        }
    }
}

impl Network for FixtureNetwork {
    fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.bodies
            .get(&request.url)
            .map(|b| Response::ok(b.clone()))
            .ok_or_else(|| FetchError::Network {
                url: request.url.clone(),
                reason: "connection refused".into(),
            })
    }
}

/// Blocks every fetch until released, to prove cache hits never wait on it.
#[derive(Default)]
struct GatedNetwork {
    open: Mutex<bool>,
    cv: Condvar,
}

impl GatedNetwork {
    fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.cv.notify_all();
    }
}

impl Network for GatedNetwork {
    fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cv.wait(open).unwrap();
        }
        Ok(Response::ok(format!("fresh {}", request.url)))
    }
}

#[derive(Default)]
struct Screen {
    page: usize,
    progress: f64,
    zoom: f64,
    effects: Vec<EffectKind>,
}

struct SharedScreen(Rc<RefCell<Screen>>);

impl UiRenderer for SharedScreen {
    fn set_page_indicator(&mut self, page: usize) {
        self.0.borrow_mut().page = page;
    }
    fn set_progress(&mut self, fraction: f64) {
        self.0.borrow_mut().progress = fraction;
    }
    fn scroll_to_slide(&mut self, _index: usize, _animated: bool) {}
    fn apply_zoom_style(&mut self, level: f64) {
        self.0.borrow_mut().zoom = level;
    }
    fn set_mode(&mut self, _mode: PresentationMode) {}
    fn show_floating_effect(&mut self, kind: EffectKind, _count: usize) {
        self.0.borrow_mut().effects.push(kind);
    }
}

struct NullLoader;

impl ImageLoader for NullLoader {
    fn begin_load(&mut self, _index: usize, _uri: &str) {}
}

const SCOPE: &str = "https://album.invalid/";

fn settings(version: &str) -> CacheSettings {
    CacheSettings {
        scope: SCOPE.into(),
        prefix: "cache".into(),
        version: version.into(),
        manifest: vec!["/a.js".into(), "/b.css".into()],
        skip_waiting_on_install: true,
    }
}

fn manifest_network() -> Arc<dyn Network> {
    Arc::new(FixtureNetwork::new(&[
        ("https://album.invalid/a.js", "console.log(1)"),
        ("https://album.invalid/b.css", "body{}"),
    ]))
}

type TestController = Controller<SharedScreen>;

fn controller(count: usize) -> (TestController, Rc<RefCell<Screen>>) {
    let screen = Rc::new(RefCell::new(Screen::default()));
    let slides = (0..count)
        .map(|i| SlideState::new(format!("{SCOPE}img/{i}.png")))
        .collect();
    let mut c = Controller::new(
        slides,
        SharedScreen(Rc::clone(&screen)),
        Box::new(NullLoader),
        Settings::default(),
    );
    c.start();
    (c, screen)
}

// ---------------------------------------------------------------------------
// Offline cache
// ---------------------------------------------------------------------------

#[test]
fn test_version_bump_replaces_bucket() {
    let storage = CacheStorage::in_memory();
    let mut reg = Registration::new(storage.clone(), manifest_network());

    assert_eq!(reg.register(settings("v1")).unwrap(), WorkerState::Active);
    assert_eq!(storage.keys(), vec!["cache-v1".to_string()]);
    assert_eq!(storage.entry_keys("cache-v1").len(), 2);

    assert_eq!(reg.register(settings("v2")).unwrap(), WorkerState::Active);
    assert_eq!(storage.keys(), vec!["cache-v2".to_string()]);
    let urls: Vec<String> = storage
        .entry_keys("cache-v2")
        .into_iter()
        .map(|k| k.url)
        .collect();
    assert_eq!(
        urls,
        vec![
            "https://album.invalid/a.js".to_string(),
            "https://album.invalid/b.css".to_string()
        ]
    );
}

#[test]
fn test_cache_hit_does_not_wait_for_network() {
    let storage = CacheStorage::in_memory();
    let key = Request::get("https://album.invalid/img/1.png").key().unwrap();
    storage
        .put_all("cache-v1", vec![(key.clone(), Response::ok("cached"))])
        .unwrap();

    let gate = Arc::new(GatedNetwork::default());
    let mut reg = Registration::new(storage.clone(), Arc::clone(&gate) as Arc<dyn Network>);
    assert!(reg.restore(settings("v1")).unwrap());
    let client = reg.open_client();

    let fetched = reg
        .fetch(client, &Request::get("https://album.invalid/img/1.png"))
        .unwrap();
    assert_eq!(fetched.source, Source::Cache);
    assert_eq!(fetched.response.body, b"cached");
    assert!(fetched.revalidation.is_pending());

    gate.release();
    fetched.revalidation.wait();
    assert_eq!(
        storage.match_request("cache-v1", &key).unwrap().body,
        b"fresh https://album.invalid/img/1.png"
    );
}

#[test]
fn test_empty_bucket_and_offline_is_an_error() {
    let storage = CacheStorage::in_memory();
    storage.open("cache-v1").unwrap();
    let mut reg = Registration::new(storage, Arc::new(FixtureNetwork::default()));
    assert!(reg.restore(settings("v1")).unwrap());
    let client = reg.open_client();
    let err = reg
        .fetch(client, &Request::get("https://album.invalid/img/9.png"))
        .unwrap_err();
    assert!(matches!(err, FetchError::Network { .. }));
}

#[test]
fn test_failed_install_keeps_previous_version_serving() {
    let storage = CacheStorage::in_memory();
    let mut reg = Registration::new(storage.clone(), manifest_network());
    reg.register(settings("v1")).unwrap();

    let mut broken = settings("v2");
    broken.manifest.push("/missing.png".into());
    assert!(reg.register(broken).is_err());
    assert_eq!(reg.active().unwrap().bucket(), "cache-v1");
    assert_eq!(storage.keys(), vec!["cache-v1".to_string()]);
}

#[test]
fn test_cross_origin_and_post_bypass_cache() {
    let storage = CacheStorage::in_memory();
    let net = Arc::new(FixtureNetwork::new(&[
        ("https://album.invalid/a.js", "a"),
        ("https://album.invalid/b.css", "b"),
        ("https://fonts.invalid/f.css", "font"),
    ]));
    let mut reg = Registration::new(storage.clone(), net);
    reg.register(settings("v1")).unwrap();
    let client = reg.open_client();

    let f = reg
        .fetch(client, &Request::get("https://fonts.invalid/f.css"))
        .unwrap();
    assert_eq!(f.source, Source::Passthrough);
    let f = reg
        .fetch(client, &Request::new("POST", "https://album.invalid/img/new.png"))
        .unwrap_err();
    assert!(matches!(f, FetchError::Network { .. }));
    let f = reg
        .fetch(client, &Request::new("POST", "https://album.invalid/a.js"))
        .unwrap();
    assert_eq!(f.source, Source::Passthrough);
    assert_eq!(storage.entry_keys("cache-v1").len(), 2);
}

#[test]
fn test_persistent_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    {
        let storage = CacheStorage::open_dir(dir.path()).unwrap();
        let mut reg = Registration::new(storage, manifest_network());
        reg.register(settings("v1")).unwrap();
    }
    let storage = CacheStorage::open_dir(dir.path()).unwrap();
    let mut reg = Registration::new(storage, Arc::new(FixtureNetwork::default()));
    assert!(reg.restore(settings("v1")).unwrap());
    let client = reg.open_client();
    let f = reg
        .fetch(client, &Request::get("https://album.invalid/b.css"))
        .unwrap();
    assert_eq!(f.source, Source::Cache);
    assert_eq!(f.response.body, b"body{}");
    f.revalidation.wait();
}

#[test]
fn test_album_feeds_cache_settings() {
    let album = Album::parse(
        r#"
        title = "Trip"
        scope = "https://album.invalid/"
        [offline]
        prefix = "cache"
        version = "v1"
        assets = ["/a.js", "/b.css"]
        [[slides]]
        image = "img/0.png"
        "#,
    )
    .unwrap();
    let mut reg = Registration::new(CacheStorage::in_memory(), manifest_network());
    assert_eq!(reg.register(album.cache_settings()).unwrap(), WorkerState::Active);
    assert_eq!(reg.active().unwrap().bucket(), "cache-v1");
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

#[test]
fn test_every_slide_reachable_with_progress() {
    let count = 7;
    let (mut c, screen) = controller(count);
    let mut now = Instant::now();
    for i in (0..count).rev() {
        assert!(c.go_to_slide(i, now));
        now += Duration::from_millis(600);
        c.tick(now);
        assert_eq!(c.current(), i);
        assert!(!c.is_transitioning());
        assert_eq!(screen.borrow().page, i + 1);
        assert!((screen.borrow().progress - (i + 1) as f64 / count as f64).abs() < 1e-9);
    }
}

#[test]
fn test_swipe_threshold() {
    let (mut c, _) = controller(5);
    let now = Instant::now();
    let swipe = |c: &mut TestController, dx: f64, dy: f64, now| {
        c.handle_input(
            &InputEvent::TouchStart {
                touches: vec![Point::new(200.0, 300.0)],
            },
            now,
        );
        c.handle_input(
            &InputEvent::TouchEnd {
                point: Point::new(200.0 - dx, 300.0 + dy),
                remaining: 0,
            },
            now,
        );
    };
    swipe(&mut c, 40.0, 0.0, now);
    assert_eq!(c.current(), 0);
    swipe(&mut c, 60.0, 10.0, now);
    assert_eq!(c.current(), 1);
}

#[test]
fn test_pinch_zoom_clamped() {
    let (mut c, screen) = controller(3);
    let now = Instant::now();
    // Two fingers on a horizontal line, `from` then `to` px apart.
    let pinch = |c: &mut TestController, from: f64, to: f64| {
        c.handle_input(
            &InputEvent::TouchStart {
                touches: vec![Point::new(0.0, 100.0), Point::new(from, 100.0)],
            },
            now,
        );
        c.handle_input(
            &InputEvent::TouchMove {
                touches: vec![Point::new(0.0, 100.0), Point::new(to, 100.0)],
            },
            now,
        );
        c.handle_input(
            &InputEvent::TouchEnd {
                point: Point::new(0.0, 100.0),
                remaining: 1,
            },
            now,
        );
        c.handle_input(
            &InputEvent::TouchEnd {
                point: Point::new(to, 100.0),
                remaining: 0,
            },
            now,
        );
    };
    pinch(&mut c, 100.0, 200.0);
    assert!((c.zoom() - 2.0).abs() < 1e-9);
    assert!((screen.borrow().zoom - 2.0).abs() < 1e-9);
    assert_eq!(c.current(), 0);

    pinch(&mut c, 100.0, 1100.0);
    assert_eq!(c.zoom(), 5.0);
    pinch(&mut c, 1100.0, 100.0);
    assert_eq!(c.zoom(), 1.0);
}

#[test]
fn test_keyboard_ends_are_noops_and_last_slide_celebrates() {
    let (mut c, screen) = controller(3);
    let mut now = Instant::now();
    c.handle_input(&InputEvent::Key(Key::Left), now);
    assert_eq!(c.current(), 0);
    assert!(!c.is_transitioning());

    c.handle_input(&InputEvent::Key(Key::End), now);
    assert_eq!(c.current(), 2);
    now += Duration::from_millis(600);
    c.tick(now);
    now += Duration::from_secs(3);
    c.tick(now);
    let confetti = screen
        .borrow()
        .effects
        .iter()
        .filter(|k| **k == EffectKind::Confetti)
        .count();
    assert_eq!(confetti, EffectKind::Confetti.burst_len());

    c.handle_input(&InputEvent::Key(Key::Right), now);
    assert_eq!(c.current(), 2);
    assert!(!c.is_transitioning());
}
