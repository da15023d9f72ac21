//! Terminal implementations of the controller's collaborators.

use std::cell::RefCell;
use std::process::{Child, Command, Stdio};
use std::rc::Rc;
use std::sync::mpsc;

use log::{debug, info, warn};

use crate::nav::{FlipEngine, FlipError, ImageLoader, MediaPlayer, PlaybackError};

// ---------------------------------------------------------------------------
// ChannelLoader — hands load requests to the fetch worker
// ---------------------------------------------------------------------------

pub(super) struct ChannelLoader {
    tx: mpsc::Sender<(usize, String)>,
}

impl ChannelLoader {
    pub(super) fn new(tx: mpsc::Sender<(usize, String)>) -> Self {
        Self { tx }
    }
}

impl ImageLoader for ChannelLoader {
    fn begin_load(&mut self, index: usize, uri: &str) {
        if self.tx.send((index, uri.to_string())).is_err() {
            warn!("loader: fetch worker gone, dropping slide {index}");
        }
    }
}

// ---------------------------------------------------------------------------
// CommandPlayer — background music through an external player process
// ---------------------------------------------------------------------------

/// Runs a user-configured player command, e.g.
/// `mpv --no-video --loop --volume={volume} {url}`.
pub(super) struct CommandPlayer {
    argv: Vec<String>,
    child: Option<Child>,
}

impl CommandPlayer {
    /// `{url}` and `{volume}` (0–100) are substituted per argument.
    pub(super) fn new(template: &str, url: &str, volume: f32) -> Option<Self> {
        let volume = ((volume.clamp(0.0, 1.0) * 100.0).round() as u32).to_string();
        let argv: Vec<String> = template
            .split_whitespace()
            .map(|arg| arg.replace("{url}", url).replace("{volume}", &volume))
            .collect();
        if argv.is_empty() {
            return None;
        }
        Some(Self { argv, child: None })
    }

    pub(super) fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl MediaPlayer for CommandPlayer {
    fn play(&mut self) -> Result<(), PlaybackError> {
        if self.child.is_some() {
            return Ok(());
        }
        let child = Command::new(&self.argv[0])
            .args(&self.argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| PlaybackError::Unavailable(format!("{}: {e}", self.argv[0])))?;
        info!("music: started {} (pid {})", self.argv[0], child.id());
        self.child = Some(child);
        Ok(())
    }

    fn pause(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill() {
                debug!("music: kill failed: {e}");
            }
            let _ = child.wait();
            info!("music: stopped");
        }
    }

    fn is_playing(&self) -> bool {
        self.child.is_some()
    }
}

impl Drop for CommandPlayer {
    fn drop(&mut self) {
        self.pause();
    }
}

// ---------------------------------------------------------------------------
// FlipBook — page-turn state the viewer drives while in flip-book mode
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub(super) struct FlipBook {
    open: bool,
    page: usize,
    page_count: usize,
}

impl FlipBook {
    pub(super) fn is_open(&self) -> bool {
        self.open
    }

    /// Turn `forward` or back one page. Returns the new page, or `None` at
    /// either end or when closed.
    pub(super) fn turn(&mut self, forward: bool) -> Option<usize> {
        if !self.open {
            return None;
        }
        let next = if forward {
            (self.page + 1 < self.page_count).then_some(self.page + 1)?
        } else {
            self.page.checked_sub(1)?
        };
        self.page = next;
        Some(next)
    }

    pub(super) fn jump(&mut self, page: usize) -> Option<usize> {
        if !self.open || page >= self.page_count || page == self.page {
            return None;
        }
        self.page = page;
        Some(page)
    }
}

/// The controller's handle on a shared [`FlipBook`].
pub(super) struct FlipHandle(pub Rc<RefCell<FlipBook>>);

impl FlipEngine for FlipHandle {
    fn open(&mut self, page_count: usize, start: usize) -> Result<(), FlipError> {
        if page_count == 0 || start >= page_count {
            return Err(FlipError::Open(format!(
                "start page {start} out of range for {page_count} pages"
            )));
        }
        let mut book = self.0.borrow_mut();
        book.open = true;
        book.page = start;
        book.page_count = page_count;
        debug!("flip: opened at {start}/{page_count}");
        Ok(())
    }

    fn destroy(&mut self) -> Result<(), FlipError> {
        let mut book = self.0.borrow_mut();
        if !book.open {
            return Err(FlipError::Destroy("not open".into()));
        }
        book.open = false;
        debug!("flip: closed at {}", book.page);
        Ok(())
    }
}
