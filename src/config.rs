// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::time::Duration;

use crate::error::Error;

/// Tuning parameters shared by the clustering, fusion and tracking stages.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionConfig {
    /// Angular resolution in degrees. Points within twice this angle of a
    /// cluster seed may join it.
    pub angle_resolution_deg: f64,

    /// Closest accepted range in millimetres.
    pub min_range_mm: f64,

    /// Furthest accepted range in millimetres.
    pub max_range_mm: f64,

    /// Maximum range difference between a point and its cluster seed.
    pub cluster_radius_mm: f64,

    /// Clusters with fewer points are discarded.
    pub min_cluster_points: usize,

    /// Tracked obstacles unseen for this long are evicted.
    pub tracking_timeout: Duration,

    /// Fusion cycle cadence in Hz.
    pub fusion_rate_hz: f64,

    /// A sensor with no snapshot for this long is reported as stale.
    pub sensor_timeout: Duration,

    /// How long fused obstacles are kept in the rolling history.
    pub history_window: Duration,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            angle_resolution_deg: 5.0,
            min_range_mm: 100.0,
            max_range_mm: 8000.0,
            cluster_radius_mm: 500.0,
            min_cluster_points: 3,
            tracking_timeout: Duration::from_secs(2),
            fusion_rate_hz: 10.0,
            sensor_timeout: Duration::from_secs(2),
            history_window: Duration::from_secs(10),
        }
    }
}

impl FusionConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if !(self.angle_resolution_deg > 0.0 && self.angle_resolution_deg <= 90.0) {
            return Err(Error::InvalidConfig(format!(
                "angle resolution {} outside (0, 90]",
                self.angle_resolution_deg
            )));
        }
        if !(self.min_range_mm >= 0.0 && self.min_range_mm < self.max_range_mm) {
            return Err(Error::InvalidConfig(format!(
                "detection range [{}, {}] is empty",
                self.min_range_mm, self.max_range_mm
            )));
        }
        if !(self.cluster_radius_mm >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "negative cluster radius {}",
                self.cluster_radius_mm
            )));
        }
        if self.min_cluster_points == 0 {
            return Err(Error::InvalidConfig(
                "min cluster points must be at least 1".to_string(),
            ));
        }
        if self.tracking_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "tracking timeout must be positive".to_string(),
            ));
        }
        if !(self.fusion_rate_hz > 0.0 && self.fusion_rate_hz.is_finite()) {
            return Err(Error::InvalidConfig(format!(
                "fusion rate {} must be positive",
                self.fusion_rate_hz
            )));
        }
        Ok(())
    }

    /// Period of one fusion cycle.
    pub fn fusion_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.fusion_rate_hz)
    }

    /// Angular neighbourhood used when growing clusters.
    pub fn cluster_angle_deg(&self) -> f64 {
        2.0 * self.angle_resolution_deg
    }

    pub fn in_range(&self, range_mm: f64) -> bool {
        range_mm >= self.min_range_mm && range_mm <= self.max_range_mm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FusionConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cluster_angle_deg(), 10.0);
        assert_eq!(config.fusion_period(), Duration::from_millis(100));
        assert!(config.in_range(100.0));
        assert!(config.in_range(8000.0));
        assert!(!config.in_range(99.9));
        assert!(!config.in_range(8000.1));
    }

    #[test]
    fn test_invalid() {
        let config = FusionConfig {
            min_range_mm: 9000.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let config = FusionConfig {
            min_cluster_points: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = FusionConfig {
            fusion_rate_hz: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
