// (c) Copyright 2025 Mikołaj Kuranowski
// SPDX-License-Identifier: MIT

use crate::geometry::Geometry;
use crate::{LatLon, Segment, TileId};

/// A point snapped onto a road segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnappedPoint {
    /// The forward-oriented segment the point was snapped to.
    pub segment: Segment,
    /// The snapped position on the segment.
    pub point: LatLon,
    /// Position along the forward segment, in [0, 1].
    pub fraction: f64,
    /// Great-circle distance from the query to `point`, in meters.
    pub distance_m: f64,
}

#[derive(Debug, Clone)]
struct Entry {
    segment: Segment,
    a: LatLon,
    b: LatLon,
    mid: LatLon,
}

#[derive(Debug, Clone)]
struct TreeNode {
    pivot: Entry,
    left: Option<Box<TreeNode>>,
    right: Option<Box<TreeNode>>,
}

/// SegmentTree implements the [k-d tree data structure](https://en.wikipedia.org/wiki/K-d_tree)
/// over segment midpoints, used to snap arbitrary coordinates onto a tile's
/// road network. Candidates are ranked by the distance to the whole segment,
/// not just its midpoint; pruning is slackened by the longest half-segment in
/// the tile so a segment body reaching across a splitting plane is not missed.
///
/// This implementation assumes euclidean geometry, which results in poor
/// snapping close to the ante meridian (180°/-180° longitude) or the poles.
#[derive(Debug, Clone)]
pub struct SegmentTree {
    root: Option<Box<TreeNode>>,
    slack_m: f64,
}

impl SegmentTree {
    /// Builds a tree over every valid segment of the tile's passable roads.
    pub fn from_geometry(tile: TileId, geometry: &Geometry) -> Self {
        let mut entries = Vec::new();
        let mut slack_m = 0.0f64;
        for feature in 0..geometry.roads_count() {
            let road = geometry.road(feature).unwrap();
            if !road.is_passable() {
                continue;
            }
            for idx in 0..road.points_count().saturating_sub(1) {
                let a = road.point(idx);
                let b = road.point(idx + 1);
                slack_m = slack_m.max(a.distance(&b) / 2.0);
                entries.push(Entry {
                    segment: Segment::new(tile, feature, idx, true),
                    a,
                    b,
                    mid: LatLon::new((a.lat + b.lat) / 2.0, (a.lon + b.lon) / 2.0),
                });
            }
        }
        Self {
            root: Self::build(entries.as_mut_slice(), false),
            slack_m,
        }
    }

    fn build(entries: &mut [Entry], lon_divides: bool) -> Option<Box<TreeNode>> {
        match entries.len() {
            0 => None,
            1 => Some(Box::new(TreeNode {
                pivot: entries[0].clone(),
                left: None,
                right: None,
            })),
            _ => {
                if lon_divides {
                    entries.sort_by(|a, b| a.mid.lon.total_cmp(&b.mid.lon));
                } else {
                    entries.sort_by(|a, b| a.mid.lat.total_cmp(&b.mid.lat));
                }
                let median = entries.len() / 2;
                let pivot = entries[median].clone();
                let (left, right_and_pivot) = entries.split_at_mut(median);
                let right = &mut right_and_pivot[1..];
                Some(Box::new(TreeNode {
                    pivot,
                    left: Self::build(left, !lon_divides),
                    right: Self::build(right, !lon_divides),
                }))
            }
        }
    }

    /// Finds the segment closest to the given position, or `None` if no
    /// segment lies within `max_radius_m` meters.
    pub fn nearest(&self, point: LatLon, max_radius_m: f64) -> Option<SnappedPoint> {
        let root = self.root.as_deref()?;
        let best = self.nearest_impl(root, point, false);
        if best.distance_m <= max_radius_m {
            return Some(best);
        }
        None
    }

    fn nearest_impl(&self, node: &TreeNode, point: LatLon, lon_divides: bool) -> SnappedPoint {
        // Start by assuming that the pivot's segment is the closest
        let mut best = snap_to(&node.pivot, point);

        // Select which branch to recurse into first
        let first_left = if lon_divides {
            point.lon < node.pivot.mid.lon
        } else {
            point.lat < node.pivot.mid.lat
        };
        let (first, second) = if first_left {
            (&node.left, &node.right)
        } else {
            (&node.right, &node.left)
        };

        // Recurse into the first branch
        if let Some(ref branch) = first {
            let alt = self.nearest_impl(branch, point, !lon_divides);
            if alt.distance_m < best.distance_m {
                best = alt;
            }
        }

        // (Optionally) recurse into the second branch
        if let Some(ref branch) = second {
            // A closer segment is possible in the second branch only if the
            // splitting axis is within the current best distance, plus the
            // slack for segment bodies that reach across the axis.
            let (axis_lat, axis_lon) = if lon_divides {
                (point.lat, node.pivot.mid.lon)
            } else {
                (node.pivot.mid.lat, point.lon)
            };
            let dist_to_axis = point.distance(&LatLon::new(axis_lat, axis_lon));

            if dist_to_axis < best.distance_m + self.slack_m {
                let alt = self.nearest_impl(branch, point, !lon_divides);
                if alt.distance_m < best.distance_m {
                    best = alt;
                }
            }
        }

        return best;
    }
}

fn snap_to(entry: &Entry, point: LatLon) -> SnappedPoint {
    // Planar projection with longitudes scaled to the segment's latitude.
    let k = ((entry.a.lat + entry.b.lat) / 2.0).to_radians().cos();
    let abx = (entry.b.lon - entry.a.lon) * k;
    let aby = entry.b.lat - entry.a.lat;
    let apx = (point.lon - entry.a.lon) * k;
    let apy = point.lat - entry.a.lat;

    let ab2 = abx * abx + aby * aby;
    let fraction = if ab2 > 0.0 {
        ((apx * abx + apy * aby) / ab2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let snapped = LatLon::new(
        entry.a.lat + fraction * (entry.b.lat - entry.a.lat),
        entry.a.lon + fraction * (entry.b.lon - entry.a.lon),
    );
    SnappedPoint {
        segment: entry.segment,
        point: snapped,
        fraction,
        distance_m: point.distance(&snapped),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{HighwayClass, RoadGeometry};

    fn road(points: Vec<LatLon>, passable: bool) -> RoadGeometry {
        RoadGeometry::new(
            points,
            false,
            passable,
            50.0,
            HighwayClass::Residential,
            false,
            false,
            String::new(),
            Vec::new(),
        )
    }

    fn grid_geometry() -> Geometry {
        Geometry::new(vec![
            // Horizontal road along lat = 0.0
            road(
                vec![
                    LatLon::new(0.0, 0.00),
                    LatLon::new(0.0, 0.01),
                    LatLon::new(0.0, 0.02),
                ],
                true,
            ),
            // Vertical road along lon = 0.05
            road(
                vec![LatLon::new(0.00, 0.05), LatLon::new(0.01, 0.05)],
                true,
            ),
        ])
    }

    #[test]
    fn snaps_to_the_nearest_segment() {
        let tree = SegmentTree::from_geometry(7, &grid_geometry());

        let hit = tree.nearest(LatLon::new(0.001, 0.015), 1_000.0).unwrap();
        assert_eq!(hit.segment, Segment::new(7, 0, 1, true));
        assert!((hit.fraction - 0.5).abs() < 0.01);
        assert!(hit.point.lat.abs() < 1e-9);

        let hit = tree.nearest(LatLon::new(0.005, 0.051), 1_000.0).unwrap();
        assert_eq!(hit.segment, Segment::new(7, 1, 0, true));
    }

    #[test]
    fn clamps_to_segment_ends() {
        let tree = SegmentTree::from_geometry(0, &grid_geometry());
        let hit = tree.nearest(LatLon::new(-0.001, -0.002), 1_000.0).unwrap();
        assert_eq!(hit.segment, Segment::new(0, 0, 0, true));
        assert_eq!(hit.fraction, 0.0);
    }

    #[test]
    fn respects_the_search_radius() {
        let tree = SegmentTree::from_geometry(0, &grid_geometry());
        assert!(tree.nearest(LatLon::new(1.0, 1.0), 500.0).is_none());
    }

    #[test]
    fn skips_impassable_roads() {
        let geometry = Geometry::new(vec![
            road(vec![LatLon::new(0.0, 0.0), LatLon::new(0.0, 0.01)], false),
            road(vec![LatLon::new(0.1, 0.0), LatLon::new(0.1, 0.01)], true),
        ]);
        let tree = SegmentTree::from_geometry(0, &geometry);
        let hit = tree.nearest(LatLon::new(0.0, 0.005), f64::INFINITY).unwrap();
        assert_eq!(hit.segment.feature, 1);
    }

    #[test]
    fn empty_tile_has_no_hits() {
        let tree = SegmentTree::from_geometry(0, &Geometry::default());
        assert!(tree.nearest(LatLon::new(0.0, 0.0), f64::INFINITY).is_none());
    }
}
