//! External interfaces for the virtual display and window control.
//!
//! The virtual display is a private OS facility (a process-created
//! display the compositor renders to without physical hardware); window
//! positioning goes through the accessibility layer. Both are platform
//! bindings outside the core, specified here as traits. On platforms
//! without them the session continues unhidden.

use std::collections::HashMap;

use crate::error::BeamError;
use crate::types::{Point, Rect};

/// Opaque id of a created virtual display.
pub type DisplayHandle = u32;

/// Opaque accessibility reference to a window.
pub type WindowRef = u64;

// ── VirtualDisplayApi ────────────────────────────────────────────

/// Creation and geometry of the process-private virtual display.
pub trait VirtualDisplayApi: Send {
    /// Create a display of the given size. Refusal is fatal to
    /// session start.
    fn create(&mut self, width: u32, height: u32) -> Result<DisplayHandle, BeamError>;

    /// Live-resize the display height.
    fn resize(&mut self, handle: DisplayHandle, height: u32) -> Result<(), BeamError>;

    /// Remove the display. Session-scoped: also happens on process
    /// exit.
    fn destroy(&mut self, handle: DisplayHandle);

    /// Current bounds in global display coordinates.
    fn bounds(&self, handle: DisplayHandle) -> Rect;

    /// Position the display's origin in the global arrangement.
    fn place(&mut self, handle: DisplayHandle, origin: Point) -> Result<(), BeamError>;

    /// Bounds of the main physical display.
    fn main_display_bounds(&self) -> Rect;
}

// ── WindowControl ────────────────────────────────────────────────

/// Accessibility-backed window geometry operations.
pub trait WindowControl: Send {
    /// Locate a window of `pid`, by title substring when given, else
    /// the first titled window.
    fn locate(&mut self, pid: i32, title: Option<&str>) -> Result<WindowRef, BeamError>;

    fn position(&mut self, window: WindowRef) -> Result<Point, BeamError>;

    fn set_position(&mut self, window: WindowRef, origin: Point) -> Result<(), BeamError>;

    fn size(&mut self, window: WindowRef) -> Result<(f64, f64), BeamError>;

    /// Bring the window to the front of its app.
    fn raise(&mut self, window: WindowRef) -> Result<(), BeamError>;
}

// ── Unsupported stub ─────────────────────────────────────────────

/// Platform without the private display facility.
#[derive(Debug, Default)]
pub struct UnsupportedVirtualDisplay;

impl VirtualDisplayApi for UnsupportedVirtualDisplay {
    fn create(&mut self, _width: u32, _height: u32) -> Result<DisplayHandle, BeamError> {
        Err(BeamError::Unsupported("virtual display"))
    }

    fn resize(&mut self, _handle: DisplayHandle, _height: u32) -> Result<(), BeamError> {
        Err(BeamError::Unsupported("virtual display"))
    }

    fn destroy(&mut self, _handle: DisplayHandle) {}

    fn bounds(&self, _handle: DisplayHandle) -> Rect {
        Rect::default()
    }

    fn place(&mut self, _handle: DisplayHandle, _origin: Point) -> Result<(), BeamError> {
        Err(BeamError::Unsupported("virtual display"))
    }

    fn main_display_bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, 1920.0, 1080.0)
    }
}

// ── Mock implementations ─────────────────────────────────────────

/// In-memory virtual display for tests and loopback runs.
pub struct MockVirtualDisplay {
    main: Rect,
    display: Option<Rect>,
    next_handle: DisplayHandle,
    /// Heights passed to `resize`, in order.
    pub resizes: Vec<u32>,
    pub destroyed: bool,
}

impl MockVirtualDisplay {
    pub fn new(main: Rect) -> Self {
        Self {
            main,
            display: None,
            next_handle: 7,
            resizes: Vec::new(),
            destroyed: false,
        }
    }
}

impl Default for MockVirtualDisplay {
    fn default() -> Self {
        Self::new(Rect::new(0.0, 0.0, 2560.0, 1440.0))
    }
}

impl VirtualDisplayApi for MockVirtualDisplay {
    fn create(&mut self, width: u32, height: u32) -> Result<DisplayHandle, BeamError> {
        self.display = Some(Rect::new(0.0, 0.0, width as f64, height as f64));
        Ok(self.next_handle)
    }

    fn resize(&mut self, _handle: DisplayHandle, height: u32) -> Result<(), BeamError> {
        let display = self
            .display
            .as_mut()
            .ok_or_else(|| BeamError::Other("no display".into()))?;
        display.height = height as f64;
        self.resizes.push(height);
        Ok(())
    }

    fn destroy(&mut self, _handle: DisplayHandle) {
        self.display = None;
        self.destroyed = true;
    }

    fn bounds(&self, _handle: DisplayHandle) -> Rect {
        self.display.unwrap_or_default()
    }

    fn place(&mut self, _handle: DisplayHandle, origin: Point) -> Result<(), BeamError> {
        let display = self
            .display
            .as_mut()
            .ok_or_else(|| BeamError::Other("no display".into()))?;
        display.x = origin.x;
        display.y = origin.y;
        Ok(())
    }

    fn main_display_bounds(&self) -> Rect {
        self.main
    }
}

/// In-memory window table for tests and loopback runs.
///
/// Cloneable handle over shared state, so a test can keep inspecting
/// positions after moving a clone into a `WindowHider`.
#[derive(Default, Clone)]
pub struct MockWindowControl {
    inner: std::sync::Arc<std::sync::Mutex<MockWindowsInner>>,
}

#[derive(Default)]
struct MockWindowsInner {
    windows: HashMap<WindowRef, MockWindow>,
    next_ref: WindowRef,
    raised: Vec<WindowRef>,
}

struct MockWindow {
    pid: i32,
    title: String,
    origin: Point,
    size: (f64, f64),
}

impl MockWindowControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_window(
        &self,
        pid: i32,
        title: &str,
        origin: Point,
        size: (f64, f64),
    ) -> WindowRef {
        let mut inner = self.inner.lock().unwrap();
        inner.next_ref += 1;
        let id = inner.next_ref;
        inner.windows.insert(
            id,
            MockWindow {
                pid,
                title: title.to_string(),
                origin,
                size,
            },
        );
        id
    }

    /// Test inspection of a window's current origin.
    pub fn origin_of(&self, window: WindowRef) -> Option<Point> {
        self.inner.lock().unwrap().windows.get(&window).map(|w| w.origin)
    }

    /// Windows raised so far, in order.
    pub fn raised(&self) -> Vec<WindowRef> {
        self.inner.lock().unwrap().raised.clone()
    }
}

impl WindowControl for MockWindowControl {
    fn locate(&mut self, pid: i32, title: Option<&str>) -> Result<WindowRef, BeamError> {
        let inner = self.inner.lock().unwrap();
        let mut candidates: Vec<(&WindowRef, &MockWindow)> = inner
            .windows
            .iter()
            .filter(|(_, w)| w.pid == pid)
            .collect();
        candidates.sort_by_key(|(id, _)| **id);
        candidates
            .into_iter()
            .find(|(_, w)| match title {
                Some(t) => w.title.contains(t),
                None => true,
            })
            .map(|(id, _)| *id)
            .ok_or(BeamError::WindowNotFound { pid })
    }

    fn position(&mut self, window: WindowRef) -> Result<Point, BeamError> {
        self.inner
            .lock()
            .unwrap()
            .windows
            .get(&window)
            .map(|w| w.origin)
            .ok_or_else(|| BeamError::Accessibility("unknown window".into()))
    }

    fn set_position(&mut self, window: WindowRef, origin: Point) -> Result<(), BeamError> {
        self.inner
            .lock()
            .unwrap()
            .windows
            .get_mut(&window)
            .map(|w| w.origin = origin)
            .ok_or_else(|| BeamError::Accessibility("unknown window".into()))
    }

    fn size(&mut self, window: WindowRef) -> Result<(f64, f64), BeamError> {
        self.inner
            .lock()
            .unwrap()
            .windows
            .get(&window)
            .map(|w| w.size)
            .ok_or_else(|| BeamError::Accessibility("unknown window".into()))
    }

    fn raise(&mut self, window: WindowRef) -> Result<(), BeamError> {
        self.inner.lock().unwrap().raised.push(window);
        Ok(())
    }
}
