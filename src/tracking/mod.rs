//! Per-frame tracking gate.
//!
//! - [`frame`] - validation of the incoming images
//! - [`state`] - the engine's tracking state
//! - [`result`] - what happened to a frame

pub mod frame;
pub mod result;
pub mod state;

pub use frame::{ConversionError, Frame, FrameInput, ImageMsg};
pub use result::{FrameOutcome, Rejection};
pub use state::TrackingState;
