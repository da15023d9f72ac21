//! Swipeable photo album engine.
//!
//! - [`nav`]: slide navigation state machine (gestures, zoom, flip-book, prefetch)
//! - [`cache`]: versioned stale-while-revalidate asset cache
//! - [`viewer`]: terminal front end hosting both
//! - [`album`]: `album.toml` parsing (slides, music, offline manifest)
//! - [`config`]: user configuration (`~/.config/folio/config.toml`)

pub mod album;
pub mod cache;
pub mod config;
pub mod nav;
pub mod viewer;

/// Version string shown by `folio --version`.
pub fn build_version() -> String {
    let hash = env!("FOLIO_BUILD_GIT_HASH");
    let profile = env!("FOLIO_BUILD_PROFILE");
    if hash.is_empty() {
        format!("{} ({profile})", env!("CARGO_PKG_VERSION"))
    } else {
        format!("{} ({hash}, {profile})", env!("CARGO_PKG_VERSION"))
    }
}
