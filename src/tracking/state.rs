//! Tracking state reported by the engine after each frame.

use std::fmt;

use tracing::warn;

/// Outcome classification of the engine's last tracking call.
///
/// The engine owns the transitions; this crate only reacts to them. The
/// numeric codes match the engine's raw state values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackingState {
    /// No frame has been processed yet.
    NoImagesYet,
    /// Frames received but the map is not initialized.
    NotInitialized,
    /// Tracking successfully.
    Ok,
    /// Tracking lost, need relocalization.
    Lost,
}

impl TrackingState {
    /// Map a raw engine code to a state. Unknown codes yield `None`.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::NoImagesYet),
            1 => Some(Self::NotInitialized),
            2 => Some(Self::Ok),
            3 => Some(Self::Lost),
            _ => None,
        }
    }

    /// Like [`from_code`](Self::from_code), but an unknown code is logged
    /// and read as `Lost` so the frame is never published.
    pub fn from_raw(code: i32) -> Self {
        Self::from_code(code).unwrap_or_else(|| {
            warn!("Unknown tracking state code {}, treating as lost", code);
            Self::Lost
        })
    }

    pub fn code(self) -> i32 {
        match self {
            Self::NoImagesYet => 0,
            Self::NotInitialized => 1,
            Self::Ok => 2,
            Self::Lost => 3,
        }
    }

    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Human-readable reason a frame in this state was not published.
    pub fn advisory(self) -> &'static str {
        match self {
            Self::NoImagesYet => "no images yet",
            Self::NotInitialized => "not initialized",
            Self::Ok => "tracking ok",
            Self::Lost => "tracking lost",
        }
    }
}

impl Default for TrackingState {
    fn default() -> Self {
        Self::NoImagesYet
    }
}

impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoImagesYet => "NO_IMAGES_YET",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::Ok => "OK",
            Self::Lost => "LOST",
        };
        f.write_str(s)
    }
}
