//! Input capture and injection.
//!
//! ```text
//! RECEIVER                                    SENDER
//! display view events                         control channel
//!   ↓ InputCapture (normalize)    input         ↓
//!   └──────────────────────────► ───────► InputInjector
//!                                             ↓ AX press / OS events
//!                                         hidden target window
//! ```

pub mod ax;
pub mod capture;
pub mod injector;

pub use ax::{find_scroll_area, AxNodeId, AxTree, MockAxTree, ROLE_SCROLL_AREA};
pub use capture::{InputCapture, Modifiers, Observation, ViewEvent, ESCAPE_KEY_CODE};
pub use injector::{
    denormalize, InjectionBackend, InputInjector, KeyInjection, MouseInjection, MouseKind,
    NullInjectionBackend,
};
