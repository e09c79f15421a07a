//! Atlas records - the engine's sub-maps, keyframes and map points as seen
//! by the bridge.
//!
//! - [`SubMap`] - one independently originated map and its origin
//! - [`KeyFrame`] - a pose-graph node with its observed [`MapPoint`]s
//! - [`AtlasIndex`] - id-based lookup over all of the above

pub mod index;
pub mod keyframe;
pub mod sub_map;
pub mod types;

pub use index::AtlasIndex;
pub use keyframe::{KeyFrame, MapPoint};
pub use sub_map::SubMap;
pub use types::{KeyFrameId, MapPointId, SubMapId};
