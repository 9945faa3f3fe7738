// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{collections::BTreeSet, fmt, str::FromStr, time::Instant};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Number of angular sectors in the obstacle map.
pub const NUM_BINS: usize = 72;

/// Width of one angular sector in degrees.
pub const BIN_WIDTH_DEG: f64 = 5.0;

/// Identifies the sensor a measurement came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorId {
    Lidar,
    Camera,
    Ultrasonic,
}

impl SensorId {
    pub const ALL: [SensorId; 3] = [SensorId::Lidar, SensorId::Camera, SensorId::Ultrasonic];

    pub fn as_str(&self) -> &'static str {
        match self {
            SensorId::Lidar => "lidar",
            SensorId::Camera => "camera",
            SensorId::Ultrasonic => "ultrasonic",
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SensorId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SensorId::ALL
            .into_iter()
            .find(|sensor| sensor.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidConfig(format!("unknown sensor: {}", s)))
    }
}

/// Coarse obstacle classification derived from cluster shape.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObstacleKind {
    #[default]
    Unknown,
    Static,
    Moving,
    Vegetation,
}

impl fmt::Display for ObstacleKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ObstacleKind::Unknown => write!(f, "unknown"),
            ObstacleKind::Static => write!(f, "static"),
            ObstacleKind::Moving => write!(f, "moving"),
            ObstacleKind::Vegetation => write!(f, "vegetation"),
        }
    }
}

/// A single normalized range/bearing sample.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RawPoint {
    /// Bearing in degrees clockwise from the vehicle's forward axis, [0, 360).
    pub bearing_deg: f64,
    pub range_mm: f64,
    pub quality: u8,
    pub captured_at: Instant,
    pub source: SensorId,
    /// Classification supplied by the sensor adapter, if any.
    pub kind_hint: Option<ObstacleKind>,
}

/// A group of points from one sweep believed to belong to one obstacle.
#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleCluster {
    pub center_bearing_deg: f64,
    pub center_range_mm: f64,
    pub min_range_mm: f64,
    pub max_range_mm: f64,
    pub point_count: usize,
    pub confidence: f64,
    pub kind: ObstacleKind,
    pub captured_at: Instant,
    pub source: SensorId,
}

/// The representative obstacle of one occupied angular bin.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedObstacle {
    pub bin_index: u8,
    pub bearing_deg: f64,
    pub range_mm: f64,
    pub confidence: f64,
    pub kind: ObstacleKind,
    pub sources: BTreeSet<SensorId>,
    pub captured_at: Instant,
    pub velocity_mm_s: Option<f64>,
}

/// Wraps a bearing into [0, 360).
pub fn normalize_bearing(bearing_deg: f64) -> f64 {
    let b = bearing_deg.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360.0
    if b >= 360.0 {
        0.0
    } else {
        b
    }
}

/// Shorter-arc distance between two bearings, in [0, 180].
pub fn angular_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).abs().rem_euclid(360.0);
    d.min(360.0 - d)
}

/// Signed shorter-arc offset from `reference` to `bearing`, in (-180, 180].
pub fn signed_offset(bearing: f64, reference: f64) -> f64 {
    let d = (bearing - reference).rem_euclid(360.0);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

/// Angular bin of a bearing: `floor(bearing / 5) mod 72`.
pub fn bin_index(bearing_deg: f64) -> u8 {
    let bin = (normalize_bearing(bearing_deg) / BIN_WIDTH_DEG).floor() as usize % NUM_BINS;
    bin as u8
}
