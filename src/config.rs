use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;

use crate::nav::{GestureSettings, Settings};

// ---------------------------------------------------------------------------
// ConfigFile — deserialized from TOML (all fields optional)
// ---------------------------------------------------------------------------

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    #[serde(default)]
    pub viewer: ViewerConfigFile,
    #[serde(default)]
    pub cache: CacheConfigFile,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ViewerConfigFile {
    pub settle_delay_ms: Option<u64>,
    pub swipe_threshold: Option<f64>,
    pub pinch_scale: Option<f64>,
    pub double_tap_ms: Option<u64>,
    pub lazy_margin: Option<f64>,
    pub eager_count: Option<usize>,
    pub music_volume: Option<f32>,
    /// Shell-free command line; `{url}` and `{volume}` (0-100) are substituted.
    pub music_command: Option<String>,
    pub frame_budget_ms: Option<u64>,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct CacheConfigFile {
    pub dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
}

// ---------------------------------------------------------------------------
// Config — resolved (all fields concrete)
// ---------------------------------------------------------------------------

pub struct Config {
    pub viewer: ViewerConfig,
    pub cache: CacheConfig,
}

pub struct ViewerConfig {
    pub nav: Settings,
    pub music_volume: f32,
    pub music_command: Option<String>,
    pub frame_budget: Duration,
}

pub struct CacheConfig {
    /// `None` keeps buckets in memory only.
    pub dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl ConfigFile {
    /// Merge CLI values (overwrites non-None fields).
    pub fn merge_cli(&mut self, cache_dir: Option<PathBuf>) {
        if let Some(ref v) = cache_dir {
            debug!("config: CLI override cache.dir={}", v.display());
            self.cache.dir = cache_dir;
        }
    }

    /// Resolve to a Config by applying defaults to missing fields.
    pub fn resolve(self) -> Config {
        let defaults = Settings::default();
        let gesture_defaults = GestureSettings::default();
        let v = self.viewer;
        let nav = Settings {
            settle_delay: v
                .settle_delay_ms
                .map_or(defaults.settle_delay, Duration::from_millis),
            lazy_margin: v.lazy_margin.unwrap_or(defaults.lazy_margin),
            eager_count: v.eager_count.unwrap_or(defaults.eager_count),
            gestures: GestureSettings {
                swipe_threshold: v.swipe_threshold.unwrap_or(gesture_defaults.swipe_threshold),
                pinch_scale: v.pinch_scale.unwrap_or(gesture_defaults.pinch_scale),
                double_tap_window: v
                    .double_tap_ms
                    .map_or(gesture_defaults.double_tap_window, Duration::from_millis),
                ..gesture_defaults
            },
            ..defaults
        };
        let config = Config {
            viewer: ViewerConfig {
                nav,
                music_volume: v.music_volume.unwrap_or(0.5).clamp(0.0, 1.0),
                music_command: v.music_command,
                frame_budget: Duration::from_millis(v.frame_budget_ms.unwrap_or(32)),
            },
            cache: CacheConfig {
                dir: self.cache.dir.or_else(default_cache_dir),
                timeout: Duration::from_secs(self.cache.timeout_secs.unwrap_or(30)),
            },
        };
        info!(
            "config: resolved settle_delay={}ms, swipe_threshold={}, pinch_scale={}, \
             double_tap={}ms, lazy_margin={}, eager_count={}, music_volume={}, \
             frame_budget={}ms, cache_dir={:?}, timeout={}s",
            config.viewer.nav.settle_delay.as_millis(),
            config.viewer.nav.gestures.swipe_threshold,
            config.viewer.nav.gestures.pinch_scale,
            config.viewer.nav.gestures.double_tap_window.as_millis(),
            config.viewer.nav.lazy_margin,
            config.viewer.nav.eager_count,
            config.viewer.music_volume,
            config.viewer.frame_budget.as_millis(),
            config.cache.dir,
            config.cache.timeout.as_secs(),
        );
        config
    }
}

fn xdg_dir(var: &str, fallback: &str) -> Option<PathBuf> {
    std::env::var_os(var)
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(fallback)))
}

/// `$XDG_CACHE_HOME/folio` (fallback `~/.cache/folio`).
fn default_cache_dir() -> Option<PathBuf> {
    Some(xdg_dir("XDG_CACHE_HOME", ".cache")?.join("folio"))
}

/// Resolve the XDG config path for folio.
fn config_path() -> Option<PathBuf> {
    Some(xdg_dir("XDG_CONFIG_HOME", ".config")?.join("folio").join("config.toml"))
}

/// Load config file. Returns `ConfigFile::default()` if no file exists.
/// Returns an error if the file exists but cannot be parsed.
pub fn load_config() -> anyhow::Result<ConfigFile> {
    let path = match config_path() {
        Some(p) => p,
        None => {
            info!("config: no HOME or XDG_CONFIG_HOME set, using defaults");
            return Ok(ConfigFile::default());
        }
    };
    debug!("config: looking for {}", path.display());
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            info!("config: loaded from {}", path.display());
            let cfg: ConfigFile = toml::from_str(&text)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("config: {} not found, using defaults", path.display());
            Ok(ConfigFile::default())
        }
        Err(e) => Err(anyhow::anyhow!("failed to read {}: {e}", path.display())),
    }
}
