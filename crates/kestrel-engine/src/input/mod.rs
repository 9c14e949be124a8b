//! Input identifiers and held-input state.
//!
//! Public API is platform-agnostic and does not expose winit types.
//! Platform code maps its events onto these types before queuing them on a
//! window (see `window::EventSender`).

pub(crate) mod platform;
mod state;
mod types;

pub use state::InputState;
pub use types::{ControllerAxis, ControllerButton, InputMode, Key, Modifiers, MouseButton};
