//! Shared state between the tracking, IMU and export threads.
//!
//! Two independent locks: the IMU queue has its own mutex inside
//! [`ImuBuffer`], and the export state sits behind an `RwLock`. A long export
//! therefore never blocks IMU ingestion, and the tracking thread only takes
//! the export write lock to swap in a finished snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::imu::ImuBuffer;
use crate::reference::AtlasSnapshot;

use super::messages::TrackedPose;

/// State read by exports and map→odom queries.
#[derive(Debug, Default)]
struct ExportState {
    snapshot: Arc<AtlasSnapshot>,
    /// None until the first successful track.
    tracked: Option<TrackedPose>,
}

/// Shared state accessible by every thread driving the bridge.
#[derive(Debug, Default)]
pub struct SharedState {
    /// IMU samples waiting for their frame.
    pub imu: ImuBuffer,

    export: RwLock<ExportState>,

    shutdown_requested: AtomicBool,
}

impl SharedState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Latest published snapshot. The lock is released before returning.
    pub fn snapshot(&self) -> Arc<AtlasSnapshot> {
        Arc::clone(&self.export.read().snapshot)
    }

    pub fn tracked_pose(&self) -> Option<TrackedPose> {
        self.export.read().tracked
    }

    /// Replace the snapshot, and the tracked pose when one is given.
    pub fn publish(&self, snapshot: AtlasSnapshot, tracked: Option<TrackedPose>) {
        let snapshot = Arc::new(snapshot);
        let mut state = self.export.write();
        state.snapshot = snapshot;
        if tracked.is_some() {
            state.tracked = tracked;
        }
    }

    /// Drop the snapshot, the tracked pose and any queued IMU samples.
    pub fn clear(&self) {
        *self.export.write() = ExportState::default();
        self.imu.clear();
    }

    /// Mark shutdown. Returns false if it was already requested.
    pub fn request_shutdown(&self) -> bool {
        !self.shutdown_requested.swap(true, Ordering::SeqCst)
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}
