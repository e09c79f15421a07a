pub mod atlas;
pub mod engine;
pub mod export;
pub mod geometry;
pub mod imu;
pub mod io;
pub mod reference;
pub mod system;
pub mod tracking;
pub mod transform;
#[cfg(feature = "viz")]
pub mod viz;

pub use engine::{ScriptedEngine, SensorMode, SlamEngine};
pub use system::{AtlasBridge, BridgeConfig};
