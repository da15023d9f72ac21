//! `album.toml`: slides, scope and offline manifest of one album.

use std::path::Path;

use anyhow::{Context, bail};
use log::info;
use serde::Deserialize;

use crate::cache::{CacheSettings, Scope};
use crate::nav::SlideState;

#[derive(Debug, Deserialize)]
pub struct Album {
    #[serde(default)]
    pub title: String,
    /// URL the album is served from; slide and asset paths resolve against it.
    pub scope: String,
    /// Background music, relative to the scope.
    pub music: Option<String>,
    /// Offer the flip-book presentation.
    #[serde(default)]
    pub flip_book: bool,
    #[serde(default)]
    pub offline: OfflineSection,
    #[serde(default)]
    pub slides: Vec<SlideEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OfflineSection {
    pub prefix: String,
    pub version: String,
    pub assets: Vec<String>,
}

impl Default for OfflineSection {
    fn default() -> Self {
        Self {
            prefix: "album-cache".into(),
            version: "v1".into(),
            assets: vec!["./".into(), "./index.html".into()],
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SlideEntry {
    pub image: String,
    #[serde(default)]
    pub caption: Option<String>,
}

impl Album {
    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let album: Album = toml::from_str(text).context("invalid album file")?;
        album.validate()?;
        Ok(album)
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let album = Self::parse(&text).with_context(|| format!("in {}", path.display()))?;
        info!(
            "album: loaded {:?} ({} slides, cache {}-{})",
            album.title,
            album.slides.len(),
            album.offline.prefix,
            album.offline.version
        );
        Ok(album)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.slides.is_empty() {
            bail!("album has no slides");
        }
        if self.offline.prefix.is_empty() || self.offline.version.is_empty() {
            bail!("offline.prefix and offline.version must not be empty");
        }
        Scope::parse(&self.scope).with_context(|| format!("bad scope {:?}", self.scope))?;
        Ok(())
    }

    fn scope(&self) -> anyhow::Result<Scope> {
        Ok(Scope::parse(&self.scope)?)
    }

    /// Absolute image URL of every slide, in order.
    pub fn slide_urls(&self) -> anyhow::Result<Vec<String>> {
        let scope = self.scope()?;
        Ok(self.slides.iter().map(|s| scope.resolve(&s.image)).collect())
    }

    pub fn slide_states(&self) -> anyhow::Result<Vec<SlideState>> {
        Ok(self.slide_urls()?.into_iter().map(SlideState::new).collect())
    }

    pub fn caption(&self, index: usize) -> Option<&str> {
        self.slides.get(index)?.caption.as_deref()
    }

    pub fn music_url(&self) -> anyhow::Result<Option<String>> {
        let scope = self.scope()?;
        Ok(self.music.as_deref().map(|m| scope.resolve(m)))
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            scope: self.scope.clone(),
            prefix: self.offline.prefix.clone(),
            version: self.offline.version.clone(),
            manifest: self.offline.assets.clone(),
            skip_waiting_on_install: true,
        }
    }
}
