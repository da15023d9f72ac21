//! Presentation strategies: scroll paging and flip-book paging.

use log::debug;

use super::collab::{FlipEngine, FlipError, UiRenderer};

pub trait Pager {
    /// Whether the controller's own navigation may drive this pager.
    fn accepts_navigation(&self) -> bool;

    /// Take over presentation at `current`.
    fn attach(
        &mut self,
        page_count: usize,
        current: usize,
        ui: &mut dyn UiRenderer,
    ) -> Result<(), FlipError>;

    fn detach(&mut self) -> Result<(), FlipError>;

    fn show(&mut self, index: usize, ui: &mut dyn UiRenderer);
}

/// Default presentation: slides laid out horizontally, one viewport each.
#[derive(Debug, Default)]
pub struct ScrollPager;

impl Pager for ScrollPager {
    fn accepts_navigation(&self) -> bool {
        true
    }

    fn attach(
        &mut self,
        _page_count: usize,
        current: usize,
        ui: &mut dyn UiRenderer,
    ) -> Result<(), FlipError> {
        ui.scroll_to_slide(current, false);
        Ok(())
    }

    fn detach(&mut self) -> Result<(), FlipError> {
        Ok(())
    }

    fn show(&mut self, index: usize, ui: &mut dyn UiRenderer) {
        ui.scroll_to_slide(index, true);
    }
}

/// Flip-book presentation; page turning belongs to the engine.
pub struct FlipPager {
    engine: Box<dyn FlipEngine>,
    open: bool,
}

impl FlipPager {
    pub fn new(engine: Box<dyn FlipEngine>) -> Self {
        Self {
            engine,
            open: false,
        }
    }
}

impl Pager for FlipPager {
    fn accepts_navigation(&self) -> bool {
        false
    }

    fn attach(
        &mut self,
        page_count: usize,
        current: usize,
        _ui: &mut dyn UiRenderer,
    ) -> Result<(), FlipError> {
        self.engine.open(page_count, current)?;
        self.open = true;
        debug!("flip pager: opened {page_count} pages at {current}");
        Ok(())
    }

    fn detach(&mut self) -> Result<(), FlipError> {
        if !self.open {
            return Ok(());
        }
        // The instance is gone from our side even if the engine complains.
        self.open = false;
        self.engine.destroy()
    }

    fn show(&mut self, _index: usize, _ui: &mut dyn UiRenderer) {}
}
