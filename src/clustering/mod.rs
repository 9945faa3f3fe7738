// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use tracing::{debug, instrument};

use crate::{
    config::FusionConfig,
    types::{angular_distance, ObstacleCluster, ObstacleKind, RawPoint},
};

pub mod stats;

/// Result of clustering one sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepClusters {
    pub clusters: Vec<ObstacleCluster>,
    /// points received for the sweep
    pub points_in: usize,
    /// points that survived the quality and range filter
    pub points_kept: usize,
}

impl SweepClusters {
    pub fn filtered(&self) -> usize {
        self.points_in.saturating_sub(self.points_kept)
    }
}

#[derive(Debug, Clone)]
pub struct Clustering {
    /// Angular limit between a point and its cluster seed (degrees)
    angle_limit_deg: f64,

    /// Range limit between a point and its cluster seed (mm)
    radius_mm: f64,

    /// Minimum number of points for a cluster to be emitted
    point_limit: usize,

    /// Accepted detection range (mm)
    min_range_mm: f64,
    max_range_mm: f64,
}

impl Clustering {
    pub fn new(config: &FusionConfig) -> Self {
        Clustering {
            angle_limit_deg: config.cluster_angle_deg(),
            radius_mm: config.cluster_radius_mm,
            point_limit: config.min_cluster_points,
            min_range_mm: config.min_range_mm,
            max_range_mm: config.max_range_mm,
        }
    }

    /// Drops points with zero quality or a range outside the detection range.
    pub fn filter(&self, points: Vec<RawPoint>) -> Vec<RawPoint> {
        points
            .into_iter()
            .filter(|p| {
                p.quality > 0 && p.range_mm >= self.min_range_mm && p.range_mm <= self.max_range_mm
            })
            .collect()
    }

    /// Groups one sweep of points into obstacle clusters.
    ///
    /// Points are visited in arrival order. A point joins the first open
    /// cluster whose seed is within the angular and range limits, otherwise
    /// it seeds a new cluster. Clusters below the point limit are dropped.
    #[instrument(skip_all, fields(points = points.len()))]
    pub fn cluster(&self, points: Vec<RawPoint>) -> SweepClusters {
        let points_in = points.len();
        let points = self.filter(points);
        let points_kept = points.len();

        let mut groups: Vec<Vec<RawPoint>> = Vec::new();
        for p in points {
            let open = groups.iter_mut().find(|g| {
                let seed = &g[0];
                angular_distance(seed.bearing_deg, p.bearing_deg) <= self.angle_limit_deg
                    && (seed.range_mm - p.range_mm).abs() <= self.radius_mm
            });
            match open {
                Some(group) => group.push(p),
                None => groups.push(vec![p]),
            }
        }

        let clusters: Vec<_> = groups
            .iter()
            .filter(|g| g.len() >= self.point_limit)
            .map(|g| build_cluster(g))
            .collect();

        debug!(
            points_in,
            points_kept,
            groups = groups.len(),
            clusters = clusters.len(),
            "sweep clustered"
        );

        SweepClusters {
            clusters,
            points_in,
            points_kept,
        }
    }

    /// Treats every point that passes the filter as its own obstacle, for
    /// sensors whose adapters already report discrete obstacles.
    pub fn direct(&self, points: Vec<RawPoint>) -> SweepClusters {
        let points_in = points.len();
        let points = self.filter(points);
        let clusters = points
            .iter()
            .map(|p| ObstacleCluster {
                center_bearing_deg: p.bearing_deg,
                center_range_mm: p.range_mm,
                min_range_mm: p.range_mm,
                max_range_mm: p.range_mm,
                point_count: 1,
                confidence: p.quality as f64 / 255.0,
                kind: p.kind_hint.unwrap_or(ObstacleKind::Unknown),
                captured_at: p.captured_at,
                source: p.source,
            })
            .collect();

        SweepClusters {
            clusters,
            points_in,
            points_kept: points.len(),
        }
    }
}

fn build_cluster(points: &[RawPoint]) -> ObstacleCluster {
    let center_bearing_deg = stats::weighted_center_bearing(points);
    let center_range_mm = stats::weighted_center_range(points);
    let (min_range_mm, max_range_mm) = points
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
            (lo.min(p.range_mm), hi.max(p.range_mm))
        });
    let kind = stats::classify(
        stats::range_variance(points),
        stats::bearing_variance(points, center_bearing_deg),
        center_range_mm,
    );
    let captured_at = points
        .iter()
        .map(|p| p.captured_at)
        .max()
        .unwrap_or(points[0].captured_at);

    ObstacleCluster {
        center_bearing_deg,
        center_range_mm,
        min_range_mm,
        max_range_mm,
        point_count: points.len(),
        confidence: stats::confidence(points),
        kind,
        captured_at,
        source: points[0].source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SensorId;
    use std::time::Instant;

    fn point(bearing_deg: f64, range_mm: f64, quality: u8) -> RawPoint {
        RawPoint {
            bearing_deg,
            range_mm,
            quality,
            captured_at: Instant::now(),
            source: SensorId::Lidar,
            kind_hint: None,
        }
    }

    fn clustering() -> Clustering {
        Clustering::new(&FusionConfig::default())
    }

    #[test]
    fn test_min_points() {
        let c = clustering();
        let two = vec![point(10.0, 1000.0, 100), point(11.0, 1010.0, 100)];
        assert!(c.cluster(two).clusters.is_empty());

        let three = vec![
            point(10.0, 1000.0, 100),
            point(11.0, 1010.0, 100),
            point(12.0, 1020.0, 100),
        ];
        let out = c.cluster(three);
        assert_eq!(out.clusters.len(), 1);
        assert_eq!(out.clusters[0].point_count, 3);
        assert_eq!(out.clusters[0].min_range_mm, 1000.0);
        assert_eq!(out.clusters[0].max_range_mm, 1020.0);
    }

    #[test]
    fn test_filter() {
        let c = clustering();
        let points = vec![
            point(10.0, 50.0, 100),
            point(10.0, 9000.0, 100),
            point(10.0, 1000.0, 0),
            point(10.0, 1000.0, 1),
            point(10.0, 100.0, 1),
            point(10.0, 8000.0, 1),
        ];
        let out = c.cluster(points);
        assert_eq!(out.points_in, 6);
        assert_eq!(out.points_kept, 3);
        assert_eq!(out.filtered(), 3);

        let inconsistent = SweepClusters {
            clusters: Vec::new(),
            points_in: 2,
            points_kept: 4,
        };
        assert_eq!(inconsistent.filtered(), 0);
    }

    #[test]
    fn test_empty_sweep() {
        let out = clustering().cluster(Vec::new());
        assert!(out.clusters.is_empty());
        assert_eq!(out.points_in, 0);
    }

    #[test]
    fn test_seed_limits() {
        let c = clustering();
        // the fourth point is within 10° of the third but not of the seed
        let points = vec![
            point(0.0, 1000.0, 100),
            point(5.0, 1000.0, 100),
            point(10.0, 1000.0, 100),
            point(15.0, 1000.0, 100),
            point(20.0, 1000.0, 100),
        ];
        let out = c.cluster(points);
        assert_eq!(out.clusters.len(), 1);
        assert_eq!(out.clusters[0].point_count, 3);

        // range gate
        let points = vec![
            point(0.0, 1000.0, 100),
            point(1.0, 1600.0, 100),
            point(2.0, 1600.0, 100),
            point(3.0, 1500.0, 100),
            point(4.0, 1400.0, 100),
        ];
        let out = c.cluster(points);
        assert_eq!(out.clusters.len(), 1);
        assert_eq!(out.clusters[0].point_count, 3);
        assert_eq!(out.clusters[0].min_range_mm, 1000.0);
        assert_eq!(out.clusters[0].max_range_mm, 1500.0);
    }

    #[test]
    fn test_wraparound_cluster() {
        let c = clustering();
        let points = vec![
            point(358.0, 1000.0, 255),
            point(359.0, 1000.0, 255),
            point(1.0, 1000.0, 255),
            point(2.0, 1000.0, 255),
        ];
        let out = c.cluster(points);
        assert_eq!(out.clusters.len(), 1);
        let cluster = &out.clusters[0];
        assert_eq!(cluster.point_count, 4);
        assert!(angular_distance(cluster.center_bearing_deg, 0.0) < 1e-6);
        assert!(cluster.center_bearing_deg >= 0.0 && cluster.center_bearing_deg < 360.0);
        assert_eq!(cluster.kind, ObstacleKind::Static);
    }

    #[test]
    fn test_lidar_sweep() {
        let c = clustering();
        let points = (0..40).map(|_| point(10.0, 1200.0, 200)).collect();
        let out = c.cluster(points);
        assert_eq!(out.clusters.len(), 1);
        let cluster = &out.clusters[0];
        assert_eq!(cluster.center_bearing_deg, 10.0);
        assert!((cluster.center_range_mm - 1200.0).abs() < 1e-9);
        assert_eq!(cluster.confidence, 1.0);
        assert_eq!(cluster.kind, ObstacleKind::Static);
        assert_eq!(cluster.source, SensorId::Lidar);
    }

    #[test]
    fn test_far_tight_is_vegetation() {
        let c = clustering();
        let points = (0..5).map(|i| point(90.0 + i as f64 * 0.5, 3000.0, 255)).collect();
        let out = c.cluster(points);
        assert_eq!(out.clusters[0].kind, ObstacleKind::Vegetation);
        assert!((out.clusters[0].confidence - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_direct() {
        let c = clustering();
        let mut p = point(12.0, 1100.0, 51);
        p.source = SensorId::Ultrasonic;
        p.kind_hint = Some(ObstacleKind::Moving);
        let out = c.direct(vec![p, point(12.0, 20.0, 100)]);
        assert_eq!(out.clusters.len(), 1);
        assert_eq!(out.filtered(), 1);
        let cluster = &out.clusters[0];
        assert_eq!(cluster.point_count, 1);
        assert!((cluster.confidence - 0.2).abs() < 1e-9);
        assert_eq!(cluster.kind, ObstacleKind::Moving);
        assert_eq!(cluster.source, SensorId::Ultrasonic);
    }
}
