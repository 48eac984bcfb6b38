//! Receiver-side input observation and normalization.
//!
//! The display view reports raw events in view coordinates (origin at
//! the bottom-left, native view space). `InputCapture` normalizes them
//! into wire events: positions to `[0, 1]^2` with Y flipped so 0 is the
//! top, scroll deltas to the protocol scale and sign, and modifier-flag
//! transitions to synthesized key events.
//!
//! Key events are consumed (never propagated up the responder chain,
//! which would beep); unhandled pointer events are propagated so local
//! window drags still work.

use crate::control::{InputEvent, MouseButton};

/// Events with normalized coordinates outside this band are considered
/// off-surface drags and dropped.
const OFF_SURFACE_MIN: f64 = -0.1;
const OFF_SURFACE_MAX: f64 = 1.1;

/// Divisor for high-precision (trackpad) scroll deltas.
const PRECISE_SCROLL_DIVISOR: f64 = 500.0;

/// Multiplier for coarse (wheel-line) scroll deltas.
const COARSE_SCROLL_MULTIPLIER: f64 = 0.03;

/// Virtual key code of Escape.
pub const ESCAPE_KEY_CODE: u16 = 53;

// ── Modifiers ────────────────────────────────────────────────────

/// Modifier flag set attached to key events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub control: bool,
    pub option: bool,
    pub command: bool,
}

/// Which modifier flag a modifier key code toggles.
fn modifier_flag(key_code: u16, modifiers: Modifiers) -> Option<bool> {
    match key_code {
        54 | 55 => Some(modifiers.command),
        56 | 60 => Some(modifiers.shift),
        58 | 61 => Some(modifiers.option),
        59 | 62 => Some(modifiers.control),
        _ => None,
    }
}

// ── ViewEvent ────────────────────────────────────────────────────

/// A raw event observed on the display surface. Pointer coordinates
/// are in view space with the origin at the bottom-left.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    PointerMove {
        x: f64,
        y: f64,
        delta_x: f64,
        delta_y: f64,
    },
    PointerDrag { x: f64, y: f64 },
    PointerDown { x: f64, y: f64, button: MouseButton },
    PointerUp { x: f64, y: f64, button: MouseButton },
    Wheel {
        delta_y: f64,
        /// Whether the OS reported high-precision deltas.
        precise: bool,
    },
    KeyDown {
        key_code: u16,
        modifiers: Modifiers,
        text: Option<String>,
    },
    KeyUp { key_code: u16, modifiers: Modifiers },
    /// A modifier flag changed; `key_code` is the affected modifier
    /// key, `modifiers` the new flag set.
    ModifiersChanged { key_code: u16, modifiers: Modifiers },
}

// ── Observation ──────────────────────────────────────────────────

/// Result of observing one view event.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// The wire event to forward, if any.
    pub event: Option<InputEvent>,
    /// Whether the raw event should continue up the responder chain.
    pub propagate: bool,
}

impl Observation {
    fn forward(event: InputEvent) -> Self {
        Self {
            event: Some(event),
            propagate: false,
        }
    }

    fn consume() -> Self {
        Self {
            event: None,
            propagate: false,
        }
    }

    fn propagate() -> Self {
        Self {
            event: None,
            propagate: true,
        }
    }
}

// ── InputCapture ─────────────────────────────────────────────────

/// Normalizes view events for the control channel and tracks the
/// cursor-capture mode.
pub struct InputCapture {
    view_width: f64,
    view_height: f64,
    cursor_captured: bool,
}

impl InputCapture {
    pub fn new(view_width: f64, view_height: f64) -> Self {
        Self {
            view_width: view_width.max(1.0),
            view_height: view_height.max(1.0),
            cursor_captured: false,
        }
    }

    /// Track a view resize.
    pub fn set_view_size(&mut self, width: f64, height: f64) {
        self.view_width = width.max(1.0);
        self.view_height = height.max(1.0);
    }

    /// Whether cursor-capture mode is active.
    pub fn cursor_captured(&self) -> bool {
        self.cursor_captured
    }

    /// Enter or leave cursor capture. Driven by the sender's
    /// `cursor_state` messages: `visible == false` captures,
    /// `visible == true` releases.
    pub fn set_cursor_captured(&mut self, captured: bool) {
        self.cursor_captured = captured;
    }

    /// Observe one raw event.
    pub fn observe(&mut self, event: ViewEvent) -> Observation {
        match event {
            ViewEvent::PointerMove {
                x,
                y,
                delta_x,
                delta_y,
            } => {
                if self.cursor_captured {
                    // Position is disassociated from the physical
                    // mouse; raw deltas are the authoritative motion.
                    let (nx, ny) = self.normalize_clamped(x, y);
                    return Observation::forward(InputEvent::MouseMove {
                        x: nx,
                        y: ny,
                        delta_x,
                        delta_y,
                    });
                }
                match self.normalize(x, y) {
                    Some((nx, ny)) => Observation::forward(InputEvent::MouseMove {
                        x: nx,
                        y: ny,
                        delta_x,
                        delta_y,
                    }),
                    None => Observation::propagate(),
                }
            }

            ViewEvent::PointerDrag { x, y } => match self.normalize(x, y) {
                Some((nx, ny)) => {
                    Observation::forward(InputEvent::MouseDrag { x: nx, y: ny })
                }
                None => Observation::propagate(),
            },

            ViewEvent::PointerDown { x, y, button } => match self.normalize(x, y) {
                Some((nx, ny)) => Observation::forward(InputEvent::MouseDown {
                    x: nx,
                    y: ny,
                    button,
                }),
                None => Observation::propagate(),
            },

            ViewEvent::PointerUp { x, y, button } => match self.normalize(x, y) {
                Some((nx, ny)) => Observation::forward(InputEvent::MouseUp {
                    x: nx,
                    y: ny,
                    button,
                }),
                None => Observation::propagate(),
            },

            ViewEvent::Wheel { delta_y, precise } => {
                // The OS-natural sign is flipped here so that positive
                // on the wire always means "scroll the content down".
                let normalized = if precise {
                    -delta_y / PRECISE_SCROLL_DIVISOR
                } else {
                    -delta_y * COARSE_SCROLL_MULTIPLIER
                };
                Observation::forward(InputEvent::Scroll {
                    delta_y: normalized,
                })
            }

            ViewEvent::KeyDown {
                key_code,
                modifiers,
                text,
            } => {
                if self.cursor_captured && key_code == ESCAPE_KEY_CODE {
                    // Escape releases capture; the key is consumed,
                    // not forwarded.
                    self.cursor_captured = false;
                    return Observation::consume();
                }
                Observation::forward(key_event(key_code, true, modifiers, text))
            }

            ViewEvent::KeyUp {
                key_code,
                modifiers,
            } => Observation::forward(key_event(key_code, false, modifiers, None)),

            ViewEvent::ModifiersChanged {
                key_code,
                modifiers,
            } => match modifier_flag(key_code, modifiers) {
                Some(now_set) => {
                    Observation::forward(key_event(key_code, now_set, modifiers, None))
                }
                None => Observation::consume(),
            },
        }
    }

    /// View space (bottom-left origin) to `[0, 1]^2` (top-left origin).
    /// `None` for events outside the off-surface band.
    fn normalize(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let nx = x / self.view_width;
        let ny = 1.0 - y / self.view_height;
        let in_band = |v: f64| (OFF_SURFACE_MIN..=OFF_SURFACE_MAX).contains(&v);
        if in_band(nx) && in_band(ny) {
            Some((nx, ny))
        } else {
            None
        }
    }

    fn normalize_clamped(&self, x: f64, y: f64) -> (f64, f64) {
        let nx = (x / self.view_width).clamp(0.0, 1.0);
        let ny = (1.0 - y / self.view_height).clamp(0.0, 1.0);
        (nx, ny)
    }
}

fn key_event(
    key_code: u16,
    down: bool,
    modifiers: Modifiers,
    text: Option<String>,
) -> InputEvent {
    if down {
        InputEvent::KeyDown {
            key_code,
            shift: modifiers.shift,
            control: modifiers.control,
            option: modifiers.option,
            command: modifiers.command,
            text,
        }
    } else {
        InputEvent::KeyUp {
            key_code,
            shift: modifiers.shift,
            control: modifiers.control,
            option: modifiers.option,
            command: modifiers.command,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
