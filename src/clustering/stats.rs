// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::types::{normalize_bearing, signed_offset, ObstacleKind, RawPoint};

const TIGHT_RANGE_VAR: f64 = 100.0;
const TIGHT_BEARING_VAR: f64 = 5.0;
const SPREAD_RANGE_VAR: f64 = 500.0;
const NEAR_RANGE_MM: f64 = 2000.0;

const BEARING_SNAP: f64 = 1e9;

#[inline]
fn weight(range_mm: f64) -> f64 {
    1.0 / (range_mm + 1.0)
}

/// Range-weighted circular mean of the point bearings, in [0, 360).
pub fn weighted_center_bearing(points: &[RawPoint]) -> f64 {
    let (sin, cos) = points.iter().fold((0.0, 0.0), |(s, c), p| {
        let w = weight(p.range_mm);
        let theta = p.bearing_deg.to_radians();
        (s + w * theta.sin(), c + w * theta.cos())
    });
    let deg = sin.atan2(cos).to_degrees();
    // atan2 round-trip noise must not push an exact bin edge into the
    // previous bin
    normalize_bearing((deg * BEARING_SNAP).round() / BEARING_SNAP)
}

/// Range-weighted mean of the point ranges.
pub fn weighted_center_range(points: &[RawPoint]) -> f64 {
    let (sum, total) = points.iter().fold((0.0, 0.0), |(s, t), p| {
        let w = weight(p.range_mm);
        (s + w * p.range_mm, t + w)
    });
    if total > 0.0 {
        sum / total
    } else {
        0.0
    }
}

fn variance(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let n = values.clone().count();
    if n < 2 {
        return 0.0;
    }
    let mean = values.clone().sum::<f64>() / n as f64;
    values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64
}

/// Population variance of the point ranges.
pub fn range_variance(points: &[RawPoint]) -> f64 {
    variance(points.iter().map(|p| p.range_mm))
}

/// Population variance of the bearings, measured as shorter-arc offsets from
/// `center` so that clusters straddling 0° are not mistaken for wide ones.
pub fn bearing_variance(points: &[RawPoint], center: f64) -> f64 {
    variance(points.iter().map(move |p| signed_offset(p.bearing_deg, center)))
}

pub fn classify(range_var: f64, bearing_var: f64, center_range_mm: f64) -> ObstacleKind {
    if range_var < TIGHT_RANGE_VAR && bearing_var < TIGHT_BEARING_VAR {
        if center_range_mm < NEAR_RANGE_MM {
            ObstacleKind::Static
        } else {
            ObstacleKind::Vegetation
        }
    } else if range_var > SPREAD_RANGE_VAR {
        ObstacleKind::Moving
    } else {
        ObstacleKind::Unknown
    }
}

/// `min(1, (count / 10) * (avg_quality / 255))`
pub fn confidence(points: &[RawPoint]) -> f64 {
    if points.is_empty() {
        return 0.0;
    }
    let avg_quality = points.iter().map(|p| p.quality as f64).sum::<f64>() / points.len() as f64;
    ((points.len() as f64 / 10.0) * (avg_quality / 255.0)).min(1.0)
}
