//! Screen model: what the controller asked to show, and where it goes.
//!
//! `TerminalUi` only records state and raises a dirty flag; the event loop
//! turns that into terminal output once per frame.

use log::debug;

use crate::nav::{EffectKind, PresentationMode, UiRenderer};

const MAX_EFFECT_GLYPHS: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Layout {
    pub cols: u16,
    /// Rows available for the slide (everything above the status bar).
    pub image_rows: u16,
    pub status_row: u16,
    pub cell_w: u16,
    pub cell_h: u16,
}

pub(super) fn compute_layout(cols: u16, rows: u16, pixel_w: u16, pixel_h: u16) -> Layout {
    let cols = cols.max(1);
    let rows = rows.max(2);
    Layout {
        cols,
        image_rows: rows - 1,
        status_row: rows - 1,
        cell_w: (pixel_w / cols).max(1),
        cell_h: (pixel_h / rows).max(1),
    }
}

impl Layout {
    pub(super) fn width_px(&self) -> f64 {
        f64::from(self.cols) * f64::from(self.cell_w)
    }
}

/// Source crop (pixels) and destination cell rectangle of one slide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Placement {
    pub src_x: u32,
    pub src_y: u32,
    pub src_w: u32,
    pub src_h: u32,
    pub col: u16,
    pub row: u16,
    pub cols: u16,
    pub rows: u16,
}

/// Width and height from a PNG's IHDR chunk.
pub(super) fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    const SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";
    if data.len() < 24 || !data.starts_with(SIGNATURE) || &data[12..16] != b"IHDR" {
        return None;
    }
    let w = u32::from_be_bytes(data[16..20].try_into().ok()?);
    let h = u32::from_be_bytes(data[20..24].try_into().ok()?);
    (w > 0 && h > 0).then_some((w, h))
}

/// Fit an image into the slide area. Zoom crops a centered region of
/// `1/zoom` of each dimension and scales it to fill the same space.
pub(super) fn fit_image(layout: &Layout, img_w: u32, img_h: u32, zoom: f64) -> Placement {
    let zoom = zoom.max(1.0);
    let src_w = ((f64::from(img_w) / zoom).round() as u32).clamp(1, img_w);
    let src_h = ((f64::from(img_h) / zoom).round() as u32).clamp(1, img_h);
    let src_x = (img_w - src_w) / 2;
    let src_y = (img_h - src_h) / 2;

    let area_w = f64::from(layout.cols) * f64::from(layout.cell_w);
    let area_h = f64::from(layout.image_rows) * f64::from(layout.cell_h);
    let scale = (area_w / f64::from(src_w)).min(area_h / f64::from(src_h));
    let cols = ((f64::from(src_w) * scale / f64::from(layout.cell_w)).floor() as u16)
        .clamp(1, layout.cols);
    let rows = ((f64::from(src_h) * scale / f64::from(layout.cell_h)).floor() as u16)
        .clamp(1, layout.image_rows);

    Placement {
        src_x,
        src_y,
        src_w,
        src_h,
        col: (layout.cols - cols) / 2,
        row: (layout.image_rows - rows) / 2,
        cols,
        rows,
    }
}

#[derive(Debug)]
pub(super) struct TerminalUi {
    pub page: usize,
    pub progress: f64,
    pub zoom: f64,
    pub mode: PresentationMode,
    pub emphasis: bool,
    /// Slide the screen should show; the terminal has no scroll animation,
    /// so animated and instant scrolls look the same.
    pub shown: usize,
    pub effects: String,
    dirty: bool,
}

impl TerminalUi {
    pub(super) fn new() -> Self {
        Self {
            page: 1,
            progress: 0.0,
            zoom: 1.0,
            mode: PresentationMode::Paged,
            emphasis: false,
            shown: 0,
            effects: String::new(),
            dirty: true,
        }
    }

    pub(super) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Returns whether anything changed since the last call.
    pub(super) fn take_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    /// `▕████░░░░▏` style bar.
    pub(super) fn progress_bar(&self, width: usize) -> String {
        let filled = ((self.progress.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
        format!("▕{}{}▏", "█".repeat(filled), "░".repeat(width - filled))
    }
}

impl UiRenderer for TerminalUi {
    fn set_page_indicator(&mut self, page: usize) {
        self.page = page;
        self.dirty = true;
    }

    fn set_progress(&mut self, fraction: f64) {
        self.progress = fraction;
        self.dirty = true;
    }

    fn scroll_to_slide(&mut self, index: usize, animated: bool) {
        debug!("ui: show slide {index} (animated={animated})");
        if self.shown != index {
            self.effects.clear();
        }
        self.shown = index;
        self.dirty = true;
    }

    fn apply_zoom_style(&mut self, level: f64) {
        self.zoom = level;
        self.dirty = true;
    }

    fn set_mode(&mut self, mode: PresentationMode) {
        self.mode = mode;
        self.dirty = true;
    }

    fn show_floating_effect(&mut self, kind: EffectKind, count: usize) {
        let glyphs = kind.glyphs();
        for _ in 0..count {
            let n = self.effects.chars().count();
            self.effects.push_str(glyphs[n % glyphs.len()]);
        }
        let n = self.effects.chars().count();
        if n > MAX_EFFECT_GLYPHS {
            self.effects = self.effects.chars().skip(n - MAX_EFFECT_GLYPHS).collect();
        }
        self.dirty = true;
    }

    fn set_indicator_emphasis(&mut self, on: bool) {
        self.emphasis = on;
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_header(w: u32, h: u32) -> Vec<u8> {
        let mut v = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR".to_vec();
        v.extend_from_slice(&w.to_be_bytes());
        v.extend_from_slice(&h.to_be_bytes());
        v
    }

    #[test]
    fn test_png_dimensions() {
        assert_eq!(png_dimensions(&png_header(640, 480)), Some((640, 480)));
        assert_eq!(png_dimensions(b"GIF89a"), None);
        assert_eq!(png_dimensions(&png_header(0, 10)), None);
    }

    #[test]
    fn test_layout() {
        let l = compute_layout(80, 24, 800, 480);
        assert_eq!(l.image_rows, 23);
        assert_eq!(l.status_row, 23);
        assert_eq!((l.cell_w, l.cell_h), (10, 20));
        assert_eq!(l.width_px(), 800.0);
    }

    #[test]
    fn test_fit_wide_image_fills_width() {
        let l = compute_layout(80, 24, 800, 480);
        let p = fit_image(&l, 1600, 400, 1.0);
        assert_eq!(p.cols, 80);
        assert_eq!(p.col, 0);
        assert!(p.rows < l.image_rows);
        assert_eq!((p.src_x, p.src_y, p.src_w, p.src_h), (0, 0, 1600, 400));
    }

    #[test]
    fn test_fit_zoom_crops_center() {
        let l = compute_layout(80, 24, 800, 480);
        let p = fit_image(&l, 1000, 1000, 2.0);
        assert_eq!((p.src_x, p.src_y, p.src_w, p.src_h), (250, 250, 500, 500));
    }

    #[test]
    fn test_effects_capped_and_cleared_on_slide_change() {
        let mut ui = TerminalUi::new();
        ui.show_floating_effect(EffectKind::Confetti, 30);
        assert_eq!(ui.effects.chars().count(), MAX_EFFECT_GLYPHS);
        ui.scroll_to_slide(0, true);
        assert!(!ui.effects.is_empty());
        ui.scroll_to_slide(1, true);
        assert!(ui.effects.is_empty());
    }

    #[test]
    fn test_progress_bar() {
        let mut ui = TerminalUi::new();
        ui.set_progress(0.5);
        assert_eq!(ui.progress_bar(4), "▕██░░▏");
        assert!(ui.take_dirty());
        assert!(!ui.take_dirty());
    }
}
