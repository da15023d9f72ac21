//! Terminal I/O layer: raw mode, Kitty Graphics Protocol, status bar.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use crossterm::{
    ExecutableCommand, QueueableCommand, cursor, event,
    style::{self, Stylize},
    terminal,
};
use std::io::{self, Write, stdout};

use super::ui::{Layout, Placement};

const CHUNK_SIZE: usize = 4096;

// ---------------------------------------------------------------------------
// RawGuard — restores raw mode / alternate screen / images on Drop
// ---------------------------------------------------------------------------

pub(super) struct RawGuard {
    cleaned: bool,
}

impl RawGuard {
    pub(super) fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut out = stdout();
        out.execute(terminal::EnterAlternateScreen)?;
        out.execute(cursor::Hide)?;
        out.execute(event::EnableMouseCapture)?;
        out.execute(event::EnableFocusChange)?;
        Ok(Self { cleaned: false })
    }

    pub(super) fn cleanup(&mut self) {
        if self.cleaned {
            return;
        }
        self.cleaned = true;
        let mut out = stdout();
        let _ = write!(out, "\x1b_Ga=d,d=A,q=2\x1b\\");
        let _ = out.execute(event::DisableFocusChange);
        let _ = out.execute(event::DisableMouseCapture);
        let _ = out.execute(cursor::Show);
        let _ = out.execute(terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

impl Drop for RawGuard {
    fn drop(&mut self) {
        self.cleanup();
    }
}

// ---------------------------------------------------------------------------
// Kitty protocol helpers
// ---------------------------------------------------------------------------

/// Transmit PNG data in chunks (a=t: store only, no placement).
pub(super) fn send_image(png_data: &[u8], image_id: u32) -> io::Result<()> {
    let encoded = BASE64.encode(png_data);
    let chunks: Vec<&[u8]> = encoded.as_bytes().chunks(CHUNK_SIZE).collect();

    let mut out = stdout();
    for (i, chunk) in chunks.iter().enumerate() {
        let m = if i + 1 == chunks.len() { 0 } else { 1 };
        // base64 output is ASCII, so any byte split is valid UTF-8.
        let chunk = String::from_utf8_lossy(chunk);
        if i == 0 {
            write!(
                out,
                "\x1b_Ga=t,f=100,i={image_id},t=d,q=2,m={m};{chunk}\x1b\\"
            )?;
        } else {
            write!(out, "\x1b_Gm={m},q=2;{chunk}\x1b\\")?;
        }
    }
    out.flush()
}

/// Delete every placement; transmitted image data stays.
pub(super) fn delete_placements() -> io::Result<()> {
    let mut out = stdout();
    write!(out, "\x1b_Ga=d,d=a,q=2\x1b\\")?;
    out.flush()
}

/// Delete all images and their data.
pub(super) fn delete_all_images() -> io::Result<()> {
    let mut out = stdout();
    write!(out, "\x1b_Ga=d,d=A,q=2\x1b\\")?;
    out.flush()
}

pub(super) fn clear_screen() -> io::Result<()> {
    let mut out = stdout();
    out.queue(terminal::Clear(terminal::ClearType::All))?;
    out.flush()
}

/// Place a (possibly cropped) image at a cell rectangle.
pub(super) fn place_image(image_id: u32, p: &Placement) -> io::Result<()> {
    let mut out = stdout();
    out.queue(cursor::MoveTo(p.col, p.row))?;
    write!(
        out,
        "\x1b_Ga=p,i={image_id},x={},y={},w={},h={},c={},r={},C=1,q=2\x1b\\",
        p.src_x, p.src_y, p.src_w, p.src_h, p.cols, p.rows
    )?;
    out.flush()
}

/// Centered text in the image area (loading / error notices, captions).
pub(super) fn draw_centered(layout: &Layout, row: u16, text: &str) -> io::Result<()> {
    let mut out = stdout();
    let width = text.chars().count() as u16;
    let col = layout.cols.saturating_sub(width) / 2;
    out.queue(cursor::MoveTo(col, row))?;
    write!(out, "{text}")?;
    out.flush()
}

/// Draw the status bar on the last terminal row.
pub(super) fn draw_status_bar(layout: &Layout, left: &str, right: &str, emphasis: bool) -> io::Result<()> {
    let mut out = stdout();
    out.queue(cursor::MoveTo(0, layout.status_row))?;

    let total = layout.cols as usize;
    let right_len = right.chars().count();
    let left: String = left.chars().take(total.saturating_sub(right_len + 1)).collect();
    let line = format!("{left:<width$}{right}", width = total.saturating_sub(right_len));
    if emphasis {
        write!(out, "{}", line.on_white().black().bold())?;
    } else {
        write!(out, "{}", line.on_dark_grey().white())?;
    }
    out.queue(style::ResetColor)?;
    out.flush()
}

pub(super) fn check_tty() -> anyhow::Result<()> {
    use std::io::IsTerminal;
    if !io::stdout().is_terminal() {
        anyhow::bail!(
            "folio viewer requires an interactive terminal.\n\
             \n\
             Supported terminals: Kitty, Ghostty, WezTerm\n\
             To warm the offline cache instead, use: folio cache install <album.toml>"
        );
    }
    Ok(())
}
