//! Sender-side input injection.
//!
//! Consumes normalized input events from the control channel and
//! delivers them into the hidden target window. Delivery strategies,
//! in order of preference:
//!
//! 1. Clicks resolve through an accessibility press (no cursor
//!    movement). A buffered `mouseDown` is matched against the
//!    `mouseUp`: same button, under 10 logical points of travel,
//!    under half a second.
//! 2. Everything the press path cannot carry (failed presses, drags,
//!    non-click down/up pairs) goes out as OS-synthesized mouse events
//!    posted to the target process, wrapped in a save/warp/restore of
//!    the local cursor because some apps ignore event coordinates.
//! 3. Scrolls drive the first accessibility scroll area's vertical
//!    scroll bar; when none exists, Page-Down/Page-Up keys.
//!
//! Unknown event types are dropped silently.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::control::{InputEvent, MouseButton};
use crate::error::BeamError;
use crate::input::ax::{find_scroll_area, AxTree};
use crate::input::capture::Modifiers;
use crate::types::{Point, Rect};

/// A down/up pair closer than this is a click (logical points).
const CLICK_MAX_DISTANCE: f64 = 10.0;

/// A down/up pair quicker than this is a click.
const CLICK_MAX_DURATION: Duration = Duration::from_millis(500);

/// Scroll-area search depth below the window root.
const SCROLL_SEARCH_DEPTH: usize = 5;

/// Virtual key codes for the scroll fallback.
const PAGE_DOWN_KEY: u16 = 121;
const PAGE_UP_KEY: u16 = 116;

// ── Backend types ────────────────────────────────────────────────

/// Kinds of OS-synthesized pointer events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseKind {
    Move,
    Down,
    Up,
    Drag,
}

/// One OS pointer event to post to the target process.
#[derive(Debug, Clone, PartialEq)]
pub struct MouseInjection {
    pub kind: MouseKind,
    pub point: Point,
    pub button: MouseButton,
    /// Raw motion deltas for apps reading them in capture mode.
    pub delta_x: f64,
    pub delta_y: f64,
}

/// One OS key event to post to the target process.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyInjection {
    pub key_code: u16,
    pub down: bool,
    pub modifiers: Modifiers,
    /// When present on key-down, the backend also injects the string
    /// through the OS Unicode path so composed characters survive any
    /// keymap.
    pub text: Option<String>,
}

/// OS event-posting seam. Events are posted directly to the target
/// process, not routed globally.
pub trait InjectionBackend: Send {
    /// Activate the target app once so posted pointer events count as
    /// input rather than bring-to-front requests.
    fn activate_app(&mut self, pid: i32) -> Result<(), BeamError>;

    /// Current local cursor position.
    fn cursor_location(&mut self) -> Point;

    /// Move the local cursor without generating events.
    fn warp_cursor(&mut self, point: Point);

    fn post_mouse(&mut self, pid: i32, injection: MouseInjection) -> Result<(), BeamError>;

    fn post_key(&mut self, pid: i32, injection: KeyInjection) -> Result<(), BeamError>;
}

/// Backend that accepts every event and posts nothing. Used by the
/// loopback binaries and tests on hosts without an event-posting
/// binding.
#[derive(Debug, Default)]
pub struct NullInjectionBackend {
    cursor: Point,
}

impl InjectionBackend for NullInjectionBackend {
    fn activate_app(&mut self, _pid: i32) -> Result<(), BeamError> {
        Ok(())
    }

    fn cursor_location(&mut self) -> Point {
        self.cursor
    }

    fn warp_cursor(&mut self, point: Point) {
        self.cursor = point;
    }

    fn post_mouse(&mut self, _pid: i32, _injection: MouseInjection) -> Result<(), BeamError> {
        Ok(())
    }

    fn post_key(&mut self, _pid: i32, _injection: KeyInjection) -> Result<(), BeamError> {
        Ok(())
    }
}

// ── Click predicate ──────────────────────────────────────────────

/// A buffered mouse-down waiting for its up.
#[derive(Debug, Clone)]
struct PendingDown {
    point: Point,
    button: MouseButton,
    at: Instant,
}

/// Whether a down/up pair forms a click.
fn is_click(
    pending: &PendingDown,
    up_point: Point,
    up_button: MouseButton,
    now: Instant,
) -> bool {
    pending.button == up_button
        && pending.point.distance(&up_point) < CLICK_MAX_DISTANCE
        && now.duration_since(pending.at) < CLICK_MAX_DURATION
}

/// Map a normalized position into the hidden window's current frame.
pub fn denormalize(frame: &Rect, x: f64, y: f64) -> Point {
    Point::new(frame.x + x * frame.width, frame.y + y * frame.height)
}

// ── InputInjector ────────────────────────────────────────────────

/// Routes wire events into the hidden target window.
pub struct InputInjector {
    backend: Box<dyn InjectionBackend>,
    ax: Box<dyn AxTree>,
    target_pid: i32,
    pending_down: Option<PendingDown>,
    events_injected: u64,
}

impl InputInjector {
    /// Create an injector for the target process and activate the app
    /// once.
    pub fn new(
        mut backend: Box<dyn InjectionBackend>,
        ax: Box<dyn AxTree>,
        target_pid: i32,
    ) -> Result<Self, BeamError> {
        backend.activate_app(target_pid)?;
        Ok(Self {
            backend,
            ax,
            target_pid,
            pending_down: None,
            events_injected: 0,
        })
    }

    /// Events delivered so far.
    pub fn events_injected(&self) -> u64 {
        self.events_injected
    }

    /// Deliver one event. `window_frame` is the hidden window's
    /// current frame on the virtual display.
    pub fn inject(&mut self, event: &InputEvent, window_frame: &Rect) -> Result<(), BeamError> {
        self.events_injected += 1;
        match event {
            InputEvent::MouseMove {
                x,
                y,
                delta_x,
                delta_y,
            } => {
                let point = denormalize(window_frame, *x, *y);
                self.backend.post_mouse(
                    self.target_pid,
                    MouseInjection {
                        kind: MouseKind::Move,
                        point,
                        button: MouseButton::Left,
                        delta_x: *delta_x,
                        delta_y: *delta_y,
                    },
                )
            }

            InputEvent::MouseDown { x, y, button } => {
                let point = denormalize(window_frame, *x, *y);
                // A down arriving while one is already buffered means
                // the up was lost; flush the stale down as an OS event.
                if let Some(stale) = self.pending_down.take() {
                    self.post_warped(MouseKind::Down, stale.point, stale.button)?;
                    self.post_warped(MouseKind::Up, stale.point, stale.button)?;
                }
                self.pending_down = Some(PendingDown {
                    point,
                    button: *button,
                    at: Instant::now(),
                });
                Ok(())
            }

            InputEvent::MouseUp { x, y, button } => {
                let point = denormalize(window_frame, *x, *y);
                match self.pending_down.take() {
                    Some(pending) if is_click(&pending, point, *button, Instant::now()) => {
                        match self.ax.press_at(self.target_pid, point) {
                            Ok(()) => Ok(()),
                            Err(e) => {
                                // Accessibility denied or failed: fall
                                // back to the OS-event path.
                                debug!("ax press failed ({e}); posting os click");
                                self.post_warped(MouseKind::Down, pending.point, pending.button)?;
                                self.post_warped(MouseKind::Up, point, *button)
                            }
                        }
                    }
                    Some(pending) => {
                        self.post_warped(MouseKind::Down, pending.point, pending.button)?;
                        self.post_warped(MouseKind::Up, point, *button)
                    }
                    None => self.post_warped(MouseKind::Up, point, *button),
                }
            }

            InputEvent::MouseDrag { x, y } => {
                let point = denormalize(window_frame, *x, *y);
                // Any drag turns a buffered down into a real one.
                if let Some(pending) = self.pending_down.take() {
                    self.post_warped(MouseKind::Down, pending.point, pending.button)?;
                }
                self.post_warped(MouseKind::Drag, point, MouseButton::Left)
            }

            InputEvent::Scroll { delta_y } => self.scroll(*delta_y),

            InputEvent::KeyDown {
                key_code,
                shift,
                control,
                option,
                command,
                text,
            } => self.backend.post_key(
                self.target_pid,
                KeyInjection {
                    key_code: *key_code,
                    down: true,
                    modifiers: Modifiers {
                        shift: *shift,
                        control: *control,
                        option: *option,
                        command: *command,
                    },
                    text: text.clone(),
                },
            ),

            InputEvent::KeyUp {
                key_code,
                shift,
                control,
                option,
                command,
            } => self.backend.post_key(
                self.target_pid,
                KeyInjection {
                    key_code: *key_code,
                    down: false,
                    modifiers: Modifiers {
                        shift: *shift,
                        control: *control,
                        option: *option,
                        command: *command,
                    },
                    text: None,
                },
            ),

            InputEvent::Unknown => Ok(()),
        }
    }

    /// Post one pointer event wrapped in a save/warp/restore of the
    /// local cursor: some targets only honor events at the cursor.
    fn post_warped(
        &mut self,
        kind: MouseKind,
        point: Point,
        button: MouseButton,
    ) -> Result<(), BeamError> {
        let saved = self.backend.cursor_location();
        self.backend.warp_cursor(point);
        let result = self.backend.post_mouse(
            self.target_pid,
            MouseInjection {
                kind,
                point,
                button,
                delta_x: 0.0,
                delta_y: 0.0,
            },
        );
        self.backend.warp_cursor(saved);
        result
    }

    /// Preferred scroll path: first accessibility scroll area's
    /// vertical bar, value clamped to `[0, 1]`. Fallback: page keys.
    fn scroll(&mut self, delta_y: f64) -> Result<(), BeamError> {
        if let Some(area) = find_scroll_area(self.ax.as_mut(), self.target_pid, SCROLL_SEARCH_DEPTH)
        {
            if let Ok(Some(bar)) = self.ax.vertical_scroll_bar(area) {
                if let Ok(value) = self.ax.value(bar) {
                    let next = (value + delta_y).clamp(0.0, 1.0);
                    match self.ax.set_value(bar, next) {
                        Ok(()) => return Ok(()),
                        Err(e) => warn!("scroll bar write failed: {e}"),
                    }
                }
            }
        }

        let key_code = if delta_y > 0.0 { PAGE_DOWN_KEY } else { PAGE_UP_KEY };
        for down in [true, false] {
            self.backend.post_key(
                self.target_pid,
                KeyInjection {
                    key_code,
                    down,
                    modifiers: Modifiers::default(),
                    text: None,
                },
            )?;
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
