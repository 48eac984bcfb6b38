//! Window hiding on a process-private virtual display.
//!
//! The captured window keeps rendering (the compositor still draws it)
//! but the user cannot see it: it is moved onto a virtual display
//! parked at the bottom-left of the arrangement with exactly one pixel
//! of overlap with the main display's left edge, so the cursor cannot
//! easily wander onto it.
//!
//! Hidden windows stack vertically with a 50 pt margin and never
//! overlap. The display starts at 1920x1080 and is live-resized in
//! 1080 steps up to a hard cap when more room is needed.
//!
//! Coordinates are global display space with Y growing downward; the
//! display grows toward larger Y.

pub mod display;

pub use display::{
    DisplayHandle, MockVirtualDisplay, MockWindowControl, UnsupportedVirtualDisplay,
    VirtualDisplayApi, WindowControl, WindowRef,
};

use tracing::{debug, info};

use crate::error::BeamError;
use crate::types::{Point, Rect};

/// Virtual display width.
pub const DISPLAY_WIDTH: u32 = 1920;

/// Initial virtual display height, also the growth step.
pub const DISPLAY_HEIGHT_STEP: u32 = 1080;

/// Hard cap on the virtual display height.
pub const DISPLAY_MAX_HEIGHT: u32 = 10_800;

/// Margin between stacked windows and from the display edges.
const STACK_MARGIN: f64 = 50.0;

// ── HiddenWindow ─────────────────────────────────────────────────

/// Bookkeeping for one hidden window.
#[derive(Debug, Clone)]
struct HiddenWindow {
    window: WindowRef,
    /// On-screen position before the hide.
    original: Point,
    /// Assigned slot on the virtual display.
    slot: Rect,
}

// ── WindowHider ──────────────────────────────────────────────────

/// Owns the virtual display and the hidden-window entries. The
/// session borrows window refs for the lifetime of each hide.
pub struct WindowHider {
    display_api: Box<dyn VirtualDisplayApi>,
    windows: Box<dyn WindowControl>,
    display: Option<DisplayHandle>,
    height: u32,
    hidden: Vec<HiddenWindow>,
}

impl WindowHider {
    /// Create the session's virtual display and position it. Creation
    /// refusal is fatal to session start (callers may continue
    /// unhidden on `Unsupported`).
    pub fn create(
        mut display_api: Box<dyn VirtualDisplayApi>,
        windows: Box<dyn WindowControl>,
    ) -> Result<Self, BeamError> {
        let handle = display_api.create(DISPLAY_WIDTH, DISPLAY_HEIGHT_STEP)?;

        // Bottom-left of the arrangement: to the left of the main
        // display, with the rightmost pixel column overlapping its
        // left edge.
        let main = display_api.main_display_bounds();
        let origin = Point::new(main.x - (DISPLAY_WIDTH as f64 - 1.0), main.y);
        display_api.place(handle, origin)?;

        info!(
            "virtual display created at ({}, {})",
            origin.x, origin.y
        );
        Ok(Self {
            display_api,
            windows,
            display: Some(handle),
            height: DISPLAY_HEIGHT_STEP,
            hidden: Vec::new(),
        })
    }

    /// Current virtual display bounds.
    pub fn display_bounds(&self) -> Option<Rect> {
        self.display.map(|h| self.display_api.bounds(h))
    }

    /// Number of windows currently hidden.
    pub fn hidden_count(&self) -> usize {
        self.hidden.len()
    }

    /// The current frame of a hidden window on the virtual display
    /// (what input denormalization maps into).
    pub fn window_frame(&self, window: WindowRef) -> Option<Rect> {
        self.hidden
            .iter()
            .find(|h| h.window == window)
            .map(|h| h.slot)
    }

    /// Hide a window of `pid` (by title substring when given): record
    /// its position and move it into the next free slot.
    pub fn hide(&mut self, pid: i32, title: Option<&str>) -> Result<WindowRef, BeamError> {
        let handle = self
            .display
            .ok_or(BeamError::Unsupported("virtual display"))?;

        let window = self.windows.locate(pid, title)?;
        let original = self.windows.position(window)?;
        let (width, height) = self.windows.size(window)?;

        let bounds = self.display_api.bounds(handle);
        let slot_y = match self.hidden.last() {
            None => bounds.y + STACK_MARGIN,
            Some(previous) => previous.slot.max_y() + STACK_MARGIN,
        };
        let slot = Rect::new(bounds.x + STACK_MARGIN, slot_y, width, height);

        // Grow the display when the slot's bottom falls off the end.
        let needed = (slot.max_y() - bounds.y).ceil() as u32;
        if needed > self.height {
            let target = needed.div_ceil(DISPLAY_HEIGHT_STEP) * DISPLAY_HEIGHT_STEP;
            if target > DISPLAY_MAX_HEIGHT {
                return Err(BeamError::DisplayLimit {
                    requested: target,
                    max: DISPLAY_MAX_HEIGHT,
                });
            }
            self.display_api.resize(handle, target)?;
            self.height = target;
            debug!("virtual display grown to {target}");
        }

        debug_assert!(
            self.hidden.iter().all(|h| !h.slot.intersects(&slot)),
            "hidden window slots must not overlap"
        );

        self.windows.set_position(window, slot.origin())?;
        self.hidden.push(HiddenWindow {
            window,
            original,
            slot,
        });
        debug!("hid window {window} of pid {pid} at ({}, {})", slot.x, slot.y);
        Ok(window)
    }

    /// Move a hidden window back where it was and raise it.
    pub fn restore(&mut self, window: WindowRef) -> Result<(), BeamError> {
        let index = self
            .hidden
            .iter()
            .position(|h| h.window == window)
            .ok_or_else(|| BeamError::Accessibility("window is not hidden".into()))?;
        let entry = self.hidden.remove(index);
        self.windows.set_position(entry.window, entry.original)?;
        self.windows.raise(entry.window)?;
        Ok(())
    }

    /// Restore every hidden window in reverse hide order, then destroy
    /// the virtual display.
    pub fn restore_all(&mut self) {
        while let Some(entry) = self.hidden.pop() {
            if let Err(e) = self.windows.set_position(entry.window, entry.original) {
                debug!("restore of {} failed: {e}", entry.window);
            }
            let _ = self.windows.raise(entry.window);
        }
        if let Some(handle) = self.display.take() {
            self.display_api.destroy(handle);
            info!("virtual display destroyed");
        }
    }
}

impl Drop for WindowHider {
    fn drop(&mut self) {
        // The display config is session-scoped; never leak it.
        self.restore_all();
    }
}

// ── Tests ────────────────────────────────────────────────────────
