//! Outcome of pushing one frame through the bridge.

use crate::system::messages::TrackedPose;

use super::frame::ConversionError;
use super::TrackingState;

/// Why a frame produced no global pose. None of these are errors: the caller
/// simply tries again with the next frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    /// The images could not be handed to the engine.
    Conversion(ConversionError),
    /// Inertial tracking was requested but no IMU sample was due.
    MissingInertial,
    /// The engine is merging sub-maps; references are about to change.
    MergeInProgress,
    /// The engine did not report `Ok`.
    Tracking(TrackingState),
    /// Tracking was `Ok` but the current sub-map has no reference pose.
    NoReference,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Camera pose in the global frame.
    Tracked(TrackedPose),
    Rejected(Rejection),
}

impl FrameOutcome {
    pub fn is_tracked(&self) -> bool {
        matches!(self, Self::Tracked(_))
    }

    pub fn pose(&self) -> Option<&TrackedPose> {
        match self {
            Self::Tracked(pose) => Some(pose),
            Self::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Tracked(_) => None,
            Self::Rejected(reason) => Some(reason),
        }
    }
}
