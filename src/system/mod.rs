//! Bridge orchestration and the state shared between its callers.
//!
//! This module contains the top-level `AtlasBridge` that serializes access to
//! the engine and publishes global-frame results, along with configuration,
//! shared state and the record types handed to the application.

mod bridge;
pub mod config;
pub mod messages;
pub mod odom;
pub mod shared_state;

pub use bridge::AtlasBridge;
pub use config::{BridgeConfig, ConfigError};
pub use messages::{
    GlobalPoint, KeyFramePoints, MapData, OdometrySample, PoseGraph, PoseStamped, TrackedPose,
    TransformStamped,
};
pub use shared_state::SharedState;
