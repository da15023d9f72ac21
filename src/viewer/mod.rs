//! Terminal album viewer with Kitty Graphics Protocol
//!
//! Layout:
//!   rows 0..rows-1 : current slide, fitted and centered
//!   row rows-1     : status bar (page, progress, zoom, mode, music, effects)
//!
//! Threads:
//!   main   : crossterm event loop driving the navigation controller
//!   fetch  : loads slide images through the cache registration, FIFO
//!
//! Kitty response suppression:
//!   All Kitty Graphics Protocol commands use `q=2` (suppress all responses).
//!   Without this, error responses are delivered as APC sequences that
//!   crossterm misparses as key events. The viewer never reads Kitty
//!   responses, so this is always safe.

mod host;
mod input;
mod terminal;
mod ui;

use crossterm::{
    event::{self, Event},
    terminal as crossterm_terminal,
};
use log::{debug, info, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use crate::album::Album;
use crate::cache::{Registration, Request};
use crate::config::ViewerConfig;
use crate::nav::{Command, Controller, PresentationMode};

use host::{ChannelLoader, CommandPlayer, FlipBook, FlipHandle};
use input::{Action, map_event};
use ui::{Layout, TerminalUi, compute_layout, fit_image, png_dimensions};

const IDLE_POLL: Duration = Duration::from_secs(86400);
const PROGRESS_WIDTH: usize = 12;

/// What the viewer knows about a slide's image.
enum SlideImage {
    /// Transmitted to the terminal under `image_id(index)`.
    Png { width: u32, height: u32 },
    Unsupported,
    Failed(String),
}

fn image_id(index: usize) -> u32 {
    index as u32 + 1
}

type FetchResult = (usize, Result<Vec<u8>, String>);

/// Run the terminal viewer.
///
/// `registration` must already have an active worker (or none, in which case
/// every image comes straight from the network).
pub fn run(album: &Album, config: &ViewerConfig, registration: &mut Registration) -> anyhow::Result<()> {
    terminal::check_tty()?;

    let slides = album.slide_states()?;
    let slide_count = slides.len();
    let music_url = album.music_url()?;

    let winsize = crossterm_terminal::window_size()
        .map_err(|e| anyhow::anyhow!("failed to get terminal size: {e}"))?;
    if winsize.width == 0 || winsize.height == 0 {
        anyhow::bail!(
            "terminal pixel size {}x{} is zero; Kitty graphics requires non-zero pixel dimensions",
            winsize.width,
            winsize.height
        );
    }
    let mut layout = compute_layout(winsize.columns, winsize.rows, winsize.width, winsize.height);

    let client = registration.open_client();
    let registration = &*registration;
    let mut guard = terminal::RawGuard::enter()?;

    thread::scope(|s| -> anyhow::Result<()> {
        let (req_tx, req_rx) = mpsc::channel::<(usize, String)>();
        let (res_tx, res_rx) = mpsc::channel::<FetchResult>();

        // Fetch worker: FIFO, one request at a time. Cache hits return
        // immediately; their revalidation threads are left detached.
        s.spawn(move || {
            debug!("fetch worker: started for {client}");
            while let Ok((index, url)) = req_rx.recv() {
                let result = registration
                    .fetch(client, &Request::get(url.as_str()))
                    .map_err(|e| e.to_string())
                    .and_then(|fetched| {
                        debug!("fetch worker: slide {index} via {:?}", fetched.source);
                        if fetched.response.is_ok() {
                            Ok(fetched.response.body)
                        } else {
                            Err(format!("{url}: status {}", fetched.response.status))
                        }
                    });
                if res_tx.send((index, result)).is_err() {
                    break;
                }
            }
            debug!("fetch worker: channel closed, exiting");
        });

        let book = Rc::new(RefCell::new(FlipBook::default()));
        let mut controller = Controller::new(
            slides,
            TerminalUi::new(),
            Box::new(ChannelLoader::new(req_tx)),
            config.nav.clone(),
        );
        if album.flip_book {
            controller = controller.with_flip_engine(Box::new(FlipHandle(Rc::clone(&book))));
        }
        if let (Some(url), Some(template)) = (&music_url, &config.music_command) {
            match CommandPlayer::new(template, url, config.music_volume) {
                Some(player) => controller = controller.with_player(Box::new(player)),
                None => warn!("music: empty music_command, music disabled"),
            }
        }

        controller.start();
        controller.on_viewport(0.0, layout.width_px());

        let mut images: HashMap<usize, SlideImage> = HashMap::new();
        let mut flash: Option<String> = None;
        let mut dirty = true;
        let mut last_render = Instant::now();

        loop {
            while let Ok((index, result)) = res_rx.try_recv() {
                receive_image(&mut controller, &mut images, index, result)?;
                if index == controller.current() {
                    dirty = true;
                }
            }

            let now = Instant::now();
            controller.tick(now);
            dirty |= controller.ui_mut().take_dirty();

            // Keep waking up while fetches are outstanding so arrivals get drawn.
            let pending = controller
                .state()
                .slides
                .iter()
                .any(|s| s.is_requested() && !s.is_loaded());
            let mut timeout = if dirty {
                config.frame_budget.saturating_sub(last_render.elapsed())
            } else if pending {
                config.frame_budget
            } else {
                IDLE_POLL
            };
            if let Some(deadline) = controller.next_deadline() {
                timeout = timeout.min(deadline.saturating_duration_since(now));
            }

            if event::poll(timeout)? {
                let ev = event::read()?;
                debug!("event: {:?}", ev);
                if flash.take().is_some() {
                    dirty = true;
                }

                if let Event::Resize(cols, rows) = ev {
                    let ws = crossterm_terminal::window_size()?;
                    layout = compute_layout(cols, rows, ws.width, ws.height);
                    terminal::clear_screen()?;
                    dirty = true;
                }

                match map_event(&ev, &layout) {
                    Some(Action::Quit) => break,
                    Some(Action::Input(input)) => {
                        let dispatch = controller.handle_input(&input, now);
                        if dispatch.command == Some(Command::ToggleMode)
                            && !controller.has_flip_engine()
                        {
                            flash = Some("this album has no flip-book mode".into());
                            dirty = true;
                        }
                        if controller.mode() == PresentationMode::FlipBook
                            && let Some(command) = dispatch.command
                        {
                            turn_page(&mut controller, &book, command, slide_count, now);
                        }
                    }
                    Some(Action::Command(command)) => {
                        controller.execute(command, now);
                    }
                    None => {}
                }
                let width = layout.width_px();
                controller.on_viewport(controller.current() as f64 * width, width);
                continue;
            }

            if dirty {
                redraw(&layout, &controller, album, &images, flash.as_deref())?;
                dirty = false;
                last_render = Instant::now();
            }
        }
        info!("viewer: quit at slide {}", controller.current());
        Ok(())
        // controller (and its req_tx) dropped here → worker exits → scope joins
    })?;

    guard.cleanup();
    Ok(())
}

/// Record a fetch result, transmitting PNGs to the terminal right away.
fn receive_image(
    controller: &mut Controller<TerminalUi>,
    images: &mut HashMap<usize, SlideImage>,
    index: usize,
    result: Result<Vec<u8>, String>,
) -> anyhow::Result<()> {
    match result {
        Ok(data) => {
            let image = match png_dimensions(&data) {
                Some((width, height)) => {
                    terminal::send_image(&data, image_id(index))?;
                    SlideImage::Png { width, height }
                }
                None => {
                    debug!("slide {index}: not a PNG ({} bytes)", data.len());
                    SlideImage::Unsupported
                }
            };
            images.insert(index, image);
            controller.mark_loaded(index);
        }
        Err(e) => {
            warn!("slide {index}: {e}");
            controller.mark_load_failed(index);
            images.insert(index, SlideImage::Failed(e));
        }
    }
    Ok(())
}

/// In flip-book mode the page turns happen here, standing in for the
/// paging library, and are reported back to the controller.
fn turn_page(
    controller: &mut Controller<TerminalUi>,
    book: &RefCell<FlipBook>,
    command: Command,
    slide_count: usize,
    now: Instant,
) {
    let turned = {
        let mut book = book.borrow_mut();
        match command {
            Command::Next => book.turn(true),
            Command::Prev => book.turn(false),
            Command::First => book.jump(0),
            Command::Last => book.jump(slide_count.saturating_sub(1)),
            _ => None,
        }
    };
    if let Some(page) = turned {
        controller.on_page_turned(page, now);
        controller.ui_mut().mark_dirty();
    }
}

fn redraw(
    layout: &Layout,
    controller: &Controller<TerminalUi>,
    album: &Album,
    images: &HashMap<usize, SlideImage>,
    flash: Option<&str>,
) -> anyhow::Result<()> {
    terminal::delete_placements()?;
    terminal::clear_screen()?;

    let index = controller.current();
    let ui = controller.ui();
    let middle = layout.image_rows / 2;
    match images.get(&index) {
        Some(SlideImage::Png { width, height }) => {
            let placement = fit_image(layout, *width, *height, ui.zoom);
            terminal::place_image(image_id(index), &placement)?;
        }
        Some(SlideImage::Unsupported) => {
            terminal::draw_centered(layout, middle, "[image format not displayable; PNG only]")?;
        }
        Some(SlideImage::Failed(e)) => {
            terminal::draw_centered(layout, middle, &format!("[failed to load: {e}]"))?;
        }
        None => terminal::draw_centered(layout, middle, "loading…")?,
    }

    let state = controller.state();
    let music = if state.music_playing { " | ♪" } else { "" };
    let left = format!(
        " {} | {}/{} {} | {:.1}x | {}{music} {}",
        album.title,
        ui.page,
        state.slide_count(),
        ui.progress_bar(PROGRESS_WIDTH),
        ui.zoom,
        ui.mode,
        ui.effects,
    );
    let right = match flash.or_else(|| album.caption(index)) {
        Some(text) => format!("{text} "),
        None => "[←/→ z:zoom f:flip m:music r:restart q:quit] ".to_string(),
    };
    terminal::draw_status_bar(layout, &left, &right, ui.emphasis)?;
    Ok(())
}
