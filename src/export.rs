//! Pose graph and point cloud export in the global frame.
//!
//! Everything here reads a single [`AtlasSnapshot`], so an export never mixes
//! references from two different recomputations. Output order follows the
//! snapshot's keyframe order and is not re-sorted.

use std::collections::HashSet;

use tracing::warn;

use crate::atlas::{KeyFrame, KeyFrameId};
use crate::reference::AtlasSnapshot;
use crate::system::messages::{GlobalPoint, KeyFramePoints, MapData, PoseGraph};
use crate::transform::{transform_point, transform_pose_stamped};

/// Global poses of every keyframe, or only of the current sub-map's.
pub fn export_pose_graph(snapshot: &AtlasSnapshot, current_map_only: bool, frame_id: &str) -> PoseGraph {
    let mut graph = PoseGraph::default();
    if current_map_only {
        let Some(current) = snapshot.index.current_sub_map() else {
            return graph;
        };
        for kf in snapshot.index.keyframes_of(current) {
            push_keyframe(&mut graph, snapshot, kf, frame_id);
        }
    } else {
        for kf in snapshot.index.keyframes() {
            push_keyframe(&mut graph, snapshot, kf, frame_id);
        }
    }
    graph
}

fn push_keyframe(graph: &mut PoseGraph, snapshot: &AtlasSnapshot, kf: &KeyFrame, frame_id: &str) {
    match snapshot.reference_of(kf) {
        Some(reference) => graph.push(
            kf.id,
            transform_pose_stamped(reference, &kf.pose, kf.timestamp_s, frame_id),
        ),
        None => warn!("{} belongs to {} which has no reference pose", kf.id, kf.sub_map),
    }
}

/// Valid map points of one keyframe in the global frame.
fn global_points(snapshot: &AtlasSnapshot, kf: &KeyFrame) -> Option<Vec<GlobalPoint>> {
    let reference = snapshot.reference_of(kf)?;
    Some(
        kf.good_map_points()
            .map(|mp| transform_point(reference, &mp.position))
            .collect(),
    )
}

/// Per-keyframe point clouds for the requested ids.
///
/// Ids missing from the snapshot are logged and left out; the rest is still
/// returned.
pub fn keyframe_points(snapshot: &AtlasSnapshot, ids: &[KeyFrameId]) -> Vec<KeyFramePoints> {
    let mut nodes = Vec::with_capacity(ids.len());
    for &id in ids {
        let Some(kf) = snapshot.index.keyframe(id) else {
            warn!("Requested {} not available", id);
            continue;
        };
        match global_points(snapshot, kf) {
            Some(points) => nodes.push(KeyFramePoints { id, points }),
            None => warn!("{} belongs to {} which has no reference pose", id, kf.sub_map),
        }
    }
    nodes
}

/// Pose graph plus, optionally, point clouds of selected keyframes.
pub fn export_map_data(
    snapshot: &AtlasSnapshot,
    current_map_only: bool,
    include_points: bool,
    point_keyframes: &[KeyFrameId],
    frame_id: &str,
) -> MapData {
    let graph = export_pose_graph(snapshot, current_map_only, frame_id);
    let nodes = if include_points {
        keyframe_points(snapshot, point_keyframes)
    } else {
        Vec::new()
    };
    MapData {
        frame_id: frame_id.to_string(),
        graph,
        nodes,
    }
}

/// Flat global point cloud of the current sub-map.
///
/// A point observed by several keyframes is emitted once.
pub fn current_map_point_cloud(snapshot: &AtlasSnapshot) -> Vec<GlobalPoint> {
    let Some(current) = snapshot.index.current_sub_map() else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut cloud = Vec::new();
    for kf in snapshot.index.keyframes_of(current) {
        let Some(reference) = snapshot.reference_of(kf) else {
            continue;
        };
        for mp in kf.good_map_points() {
            if seen.insert(mp.id) {
                cloud.push(transform_point(reference, &mp.position));
            }
        }
    }
    cloud
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::{AtlasIndex, MapPoint, MapPointId, SubMap, SubMapId};
    use crate::geometry::SE3;
    use crate::reference::{global_offset, AnchorRule};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    const A: SubMapId = SubMapId(0);
    const B: SubMapId = SubMapId(1);

    fn kf(id: u64, sub_map: SubMapId, pose: SE3) -> KeyFrame {
        KeyFrame::new(KeyFrameId::new(id), id as f64 * 0.1, pose, sub_map)
    }

    /// Root A with keyframes 0..=5 (5 at x=1), child B anchored at 5 with
    /// keyframes 6 and 7. KeyFrame 6 sees one good and one bad point.
    fn two_map_snapshot(current: SubMapId) -> AtlasSnapshot {
        let a_kfs: Vec<KeyFrame> = (0..=5)
            .map(|i| {
                let x = if i == 5 { 1.0 } else { 0.0 };
                kf(i, A, SE3::from_translation(Vector3::new(x, 0.0, 0.0)))
            })
            .collect();

        let mut kf6 = kf(6, B, SE3::identity());
        kf6.map_points.push(MapPoint::new(MapPointId::new(1), Vector3::new(0.0, 0.0, 1.0)));
        kf6.map_points
            .push(MapPoint::new(MapPointId::new(2), Vector3::new(9.0, 9.0, 9.0)).bad());
        let mut kf7 = kf(7, B, SE3::identity());
        // Shared with keyframe 6.
        kf7.map_points.push(MapPoint::new(MapPointId::new(1), Vector3::new(0.0, 0.0, 1.0)));

        let index = AtlasIndex::build(
            vec![
                SubMap::new(A, KeyFrameId::new(0), SE3::identity()),
                SubMap::new(B, KeyFrameId::new(5), SE3::identity()),
            ],
            vec![(A, a_kfs), (B, vec![kf7, kf6])],
            Some(current),
        );
        AtlasSnapshot::compute(index, &global_offset(0.0, 0.0), AnchorRule::InitKeyframe)
    }

    #[test]
    fn test_current_map_only_has_exactly_current_ids() {
        let snapshot = two_map_snapshot(B);
        let graph = export_pose_graph(&snapshot, true, "map");

        // Engine order, not sorted.
        assert_eq!(graph.ids, vec![KeyFrameId::new(7), KeyFrameId::new(6)]);
        assert!(graph.poses.iter().all(|p| p.frame_id == "map"));
    }

    #[test]
    fn test_all_maps_covers_every_keyframe() {
        let snapshot = two_map_snapshot(B);
        let graph = export_pose_graph(&snapshot, false, "map");

        let ids: Vec<u64> = graph.ids.iter().map(|id| id.0).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5, 7, 6]);

        // Child keyframes at local identity sit at the anchor: x = 1.
        let (_, kf6) = graph.iter().find(|(id, _)| id.0 == 6).unwrap();
        assert_relative_eq!(kf6.pose.translation, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-12);
        assert_relative_eq!(kf6.timestamp_s, 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_point_in_child_exports_in_global_frame() {
        let snapshot = two_map_snapshot(B);
        let nodes = keyframe_points(&snapshot, &[KeyFrameId::new(6)]);

        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].points, vec![GlobalPoint { x: 1.0, y: 0.0, z: 1.0 }]);
    }

    #[test]
    fn test_unknown_ids_are_skipped() {
        let snapshot = two_map_snapshot(B);
        let data = export_map_data(
            &snapshot,
            false,
            true,
            &[KeyFrameId::new(99), KeyFrameId::new(6), KeyFrameId::new(100)],
            "map",
        );

        assert_eq!(data.nodes.len(), 1);
        assert_eq!(data.nodes[0].id, KeyFrameId::new(6));
        assert_eq!(data.graph.len(), 8);
    }

    #[test]
    fn test_points_not_included_unless_requested() {
        let snapshot = two_map_snapshot(B);
        let data = export_map_data(&snapshot, true, false, &[KeyFrameId::new(6)], "world");

        assert!(data.nodes.is_empty());
        assert_eq!(data.frame_id, "world");
    }

    #[test]
    fn test_cloud_excludes_bad_points_and_duplicates() {
        let snapshot = two_map_snapshot(B);
        let cloud = current_map_point_cloud(&snapshot);

        assert_eq!(cloud, vec![GlobalPoint { x: 1.0, y: 0.0, z: 1.0 }]);
    }

    #[test]
    fn test_cloud_of_pointless_map_is_empty() {
        let snapshot = two_map_snapshot(A);
        assert!(current_map_point_cloud(&snapshot).is_empty());
        assert!(current_map_point_cloud(&AtlasSnapshot::default()).is_empty());
    }

    #[test]
    fn test_keyframes_without_reference_are_skipped() {
        let orphan = SubMapId::new(5);
        let index = AtlasIndex::build(
            vec![
                SubMap::new(A, KeyFrameId::new(0), SE3::identity()),
                SubMap::new(orphan, KeyFrameId::new(50), SE3::identity()),
            ],
            vec![
                (A, vec![kf(0, A, SE3::identity())]),
                (orphan, vec![kf(51, orphan, SE3::identity())]),
            ],
            Some(orphan),
        );
        let snapshot = AtlasSnapshot::compute(index, &SE3::identity(), AnchorRule::InitKeyframe);

        let graph = export_pose_graph(&snapshot, false, "map");
        assert_eq!(graph.ids, vec![KeyFrameId::new(0)]);
        assert!(keyframe_points(&snapshot, &[KeyFrameId::new(51)]).is_empty());
    }
}
