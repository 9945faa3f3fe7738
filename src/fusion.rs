// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Cross-sensor fusion into the fixed 72-sector obstacle grid.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, instrument};

use crate::{
    config::FusionConfig,
    types::{bin_index, FusedObstacle, ObstacleCluster, SensorId, NUM_BINS},
};

/// One of the four coarse navigation sectors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Cardinal {
    Front,
    Left,
    Rear,
    Right,
}

impl Cardinal {
    pub const ALL: [Cardinal; 4] = [
        Cardinal::Front,
        Cardinal::Left,
        Cardinal::Rear,
        Cardinal::Right,
    ];

    /// Sector bounds as `[start, end)` in degrees. Front wraps across 0°.
    pub fn bounds(&self) -> (f64, f64) {
        match self {
            Cardinal::Front => (315.0, 45.0),
            Cardinal::Left => (45.0, 135.0),
            Cardinal::Rear => (135.0, 225.0),
            Cardinal::Right => (225.0, 315.0),
        }
    }

    pub fn contains(&self, bearing_deg: f64) -> bool {
        let (start, end) = self.bounds();
        if start > end {
            bearing_deg >= start || bearing_deg < end
        } else {
            bearing_deg >= start && bearing_deg < end
        }
    }
}

/// Minimum obstacle range per cardinal sector in millimetres. Sectors with no
/// obstacle hold `f64::INFINITY`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct CardinalDistances {
    pub front: f64,
    pub left: f64,
    pub rear: f64,
    pub right: f64,
}

impl Default for CardinalDistances {
    fn default() -> Self {
        Self {
            front: f64::INFINITY,
            left: f64::INFINITY,
            rear: f64::INFINITY,
            right: f64::INFINITY,
        }
    }
}

impl CardinalDistances {
    pub fn get(&self, cardinal: Cardinal) -> f64 {
        match cardinal {
            Cardinal::Front => self.front,
            Cardinal::Left => self.left,
            Cardinal::Rear => self.rear,
            Cardinal::Right => self.right,
        }
    }

    fn get_mut(&mut self, cardinal: Cardinal) -> &mut f64 {
        match cardinal {
            Cardinal::Front => &mut self.front,
            Cardinal::Left => &mut self.left,
            Cardinal::Rear => &mut self.rear,
            Cardinal::Right => &mut self.right,
        }
    }

    /// Converts every distance with `f`, e.g. millimetres to metres.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> CardinalDistances {
        CardinalDistances {
            front: f(self.front),
            left: f(self.left),
            rear: f(self.rear),
            right: f(self.right),
        }
    }
}

struct Bin<'a> {
    nearest: &'a ObstacleCluster,
    confidence_sum: f64,
    contributors: usize,
    sources: BTreeSet<SensorId>,
}

/// Merges clusters from every sensor into one obstacle per occupied bin.
///
/// The nearest cluster in a bin supplies bearing, range, kind and capture
/// time; confidence is the capped mean of all contributors. Ties keep the
/// first cluster seen. The result is ordered by bin index.
#[instrument(skip_all)]
pub fn fuse<'a>(
    clusters: impl IntoIterator<Item = &'a ObstacleCluster>,
    config: &FusionConfig,
) -> Vec<FusedObstacle> {
    let mut bins: Vec<Option<Bin<'a>>> = (0..NUM_BINS).map(|_| None).collect();
    let mut inputs = 0;

    for cluster in clusters {
        inputs += 1;
        if !config.in_range(cluster.center_range_mm) {
            continue;
        }
        let bin = &mut bins[bin_index(cluster.center_bearing_deg) as usize];
        match bin {
            Some(bin) => {
                if cluster.center_range_mm < bin.nearest.center_range_mm {
                    bin.nearest = cluster;
                }
                bin.confidence_sum += cluster.confidence;
                bin.contributors += 1;
                bin.sources.insert(cluster.source);
            }
            None => {
                *bin = Some(Bin {
                    nearest: cluster,
                    confidence_sum: cluster.confidence,
                    contributors: 1,
                    sources: BTreeSet::from([cluster.source]),
                })
            }
        }
    }

    let fused: Vec<_> = bins
        .into_iter()
        .enumerate()
        .filter_map(|(index, bin)| {
            bin.map(|bin| FusedObstacle {
                bin_index: index as u8,
                bearing_deg: bin.nearest.center_bearing_deg,
                range_mm: bin.nearest.center_range_mm,
                confidence: (bin.confidence_sum / bin.contributors as f64).min(1.0),
                kind: bin.nearest.kind,
                sources: bin.sources,
                captured_at: bin.nearest.captured_at,
                velocity_mm_s: None,
            })
        })
        .collect();

    debug!(inputs, fused = fused.len(), "fusion completed");
    fused
}

/// Minimum range per cardinal sector.
pub fn cardinal_distances(obstacles: &[FusedObstacle]) -> CardinalDistances {
    let mut distances = CardinalDistances::default();
    for obstacle in obstacles {
        for cardinal in Cardinal::ALL {
            if cardinal.contains(obstacle.bearing_deg) {
                let d = distances.get_mut(cardinal);
                *d = d.min(obstacle.range_mm);
            }
        }
    }
    distances
}

/// Renders the obstacles into the autopilot distance array: centimetres per
/// 5° sector starting at 0°, 0 where no obstacle was fused.
pub fn distance_array(obstacles: &[FusedObstacle]) -> [i32; NUM_BINS] {
    let mut distances = [0; NUM_BINS];
    for obstacle in obstacles {
        distances[obstacle.bin_index as usize] = (obstacle.range_mm / 10.0) as i32;
    }
    distances
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObstacleKind;
    use std::time::Instant;

    fn cluster(source: SensorId, bearing: f64, range: f64, confidence: f64) -> ObstacleCluster {
        ObstacleCluster {
            center_bearing_deg: bearing,
            center_range_mm: range,
            min_range_mm: range,
            max_range_mm: range,
            point_count: 3,
            confidence,
            kind: ObstacleKind::Unknown,
            captured_at: Instant::now(),
            source,
        }
    }

    #[test]
    fn test_closest_wins() {
        let clusters = [
            cluster(SensorId::Lidar, 91.0, 3000.0, 0.8),
            cluster(SensorId::Camera, 93.0, 1500.0, 0.4),
        ];
        let fused = fuse(&clusters, &FusionConfig::default());
        assert_eq!(fused.len(), 1);
        let obstacle = &fused[0];
        assert_eq!(obstacle.bin_index, 18);
        assert_eq!(obstacle.range_mm, 1500.0);
        assert_eq!(obstacle.bearing_deg, 93.0);
        assert!((obstacle.confidence - 0.6).abs() < 1e-9);
        assert!(obstacle.sources.contains(&SensorId::Lidar));
        assert!(obstacle.sources.contains(&SensorId::Camera));
        assert_eq!(distance_array(&fused)[18], 150);
    }

    #[test]
    fn test_ordered_bins() {
        let clusters = [
            cluster(SensorId::Lidar, 200.0, 3000.0, 0.5),
            cluster(SensorId::Lidar, 3.0, 1000.0, 0.5),
            cluster(SensorId::Lidar, 359.9, 1000.0, 0.5),
        ];
        let fused = fuse(&clusters, &FusionConfig::default());
        let bins: Vec<_> = fused.iter().map(|o| o.bin_index).collect();
        assert_eq!(bins, vec![0, 40, 71]);
        for o in &fused {
            assert_eq!(o.bin_index, bin_index(o.bearing_deg));
        }
    }

    #[test]
    fn test_out_of_range_skipped() {
        let clusters = [
            cluster(SensorId::Lidar, 10.0, 50.0, 0.5),
            cluster(SensorId::Lidar, 20.0, 9000.0, 0.5),
        ];
        assert!(fuse(&clusters, &FusionConfig::default()).is_empty());
    }

    #[test]
    fn test_empty() {
        let fused = fuse(std::iter::empty(), &FusionConfig::default());
        assert!(fused.is_empty());
        assert_eq!(distance_array(&fused), [0; NUM_BINS]);
        let cardinals = cardinal_distances(&fused);
        for cardinal in Cardinal::ALL {
            assert!(cardinals.get(cardinal).is_infinite());
        }
    }

    #[test]
    fn test_cardinal_wraparound() {
        assert!(Cardinal::Front.contains(350.0));
        assert!(Cardinal::Front.contains(0.0));
        assert!(Cardinal::Front.contains(315.0));
        assert!(!Cardinal::Front.contains(45.0));
        assert!(Cardinal::Left.contains(45.0));
        assert!(Cardinal::Rear.contains(180.0));
        assert!(Cardinal::Right.contains(314.9));

        // every boundary bearing lands in exactly one sector
        for boundary in [45.0, 135.0, 225.0, 315.0] {
            let owners: Vec<_> = Cardinal::ALL
                .into_iter()
                .filter(|c| c.contains(boundary))
                .collect();
            assert_eq!(owners.len(), 1);
        }
        assert!(!Cardinal::Right.contains(315.0));
        assert!(Cardinal::Rear.contains(135.0));
        assert!(!Cardinal::Left.contains(135.0));

        let clusters = [
            cluster(SensorId::Lidar, 350.0, 2000.0, 0.5),
            cluster(SensorId::Lidar, 10.0, 2500.0, 0.5),
            cluster(SensorId::Lidar, 270.0, 4000.0, 0.5),
        ];
        let fused = fuse(&clusters, &FusionConfig::default());
        let cardinals = cardinal_distances(&fused);
        assert_eq!(cardinals.front, 2000.0);
        assert_eq!(cardinals.right, 4000.0);
        assert!(cardinals.left.is_infinite());
        assert!(cardinals.rear.is_infinite());
    }

    #[test]
    fn test_confidence_capped() {
        let clusters = [
            cluster(SensorId::Lidar, 10.0, 1000.0, 1.0),
            cluster(SensorId::Ultrasonic, 11.0, 1000.0, 1.0),
        ];
        let fused = fuse(&clusters, &FusionConfig::default());
        assert_eq!(fused[0].confidence, 1.0);
        // equal ranges keep the first contributor
        assert_eq!(fused[0].bearing_deg, 10.0);
    }
}
