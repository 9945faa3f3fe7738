// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Rendering of the fusion state for the autopilot and the dashboard.
//!
//! Everything here is a pure function of [`FusionState`]; nothing is cached
//! between cycles.

use std::{collections::BTreeMap, fmt, time::Instant};

use serde::Serialize;
use tracing::instrument;

use crate::{
    error::Error,
    fusion::{cardinal_distances, distance_array, CardinalDistances},
    state::{Connectivity, FusionState},
    types::{bin_index, SensorId, NUM_BINS},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorStatus {
    pub connectivity: Connectivity,
    /// clusters in the latest snapshot
    pub inputs: usize,
    pub points: usize,
    pub sweeps: u64,
    pub filtered: u64,
    pub malformed: u64,
    pub bad_sweeps: u64,
}

impl SensorStatus {
    fn disconnected() -> Self {
        SensorStatus {
            connectivity: Connectivity::Disconnected,
            inputs: 0,
            points: 0,
            sweeps: 0,
            filtered: 0,
            malformed: 0,
            bad_sweeps: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FusionStatus {
    pub fusion_rate_hz: f64,
    pub fusion_count: u64,
    pub fused_obstacles_count: usize,
    pub tracked_obstacles_count: usize,
    pub history_size: usize,
    pub sensors: BTreeMap<SensorId, SensorStatus>,
}

/// Human oriented view of the current frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub closest_distance_mm: Option<f64>,
    pub closest_bearing_deg: Option<f64>,
    pub cardinal: CardinalDistances,
    pub sensors: BTreeMap<SensorId, Connectivity>,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match (self.closest_distance_mm, self.closest_bearing_deg) {
            (Some(d), Some(b)) => write!(f, "closest {:.2}m @ {:.1}°", d / 1000.0, b)?,
            _ => write!(f, "no obstacles")?,
        }
        let c = self.cardinal.map(|d| d / 1000.0);
        write!(
            f,
            " front={:.2}m left={:.2}m rear={:.2}m right={:.2}m",
            c.front, c.left, c.rear, c.right
        )?;
        for (sensor, connectivity) in &self.sensors {
            write!(f, " {}={:?}", sensor, connectivity)?;
        }
        Ok(())
    }
}

/// Record sent to the telemetry uplink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Telemetry {
    pub count: usize,
    /// Non-finite when nothing is in view; encoded as `null` in JSON.
    pub closest_distance_m: f64,
    pub cardinal_distances: CardinalDistances,
    pub confidence: f64,
    /// Unix time in seconds.
    pub timestamp: f64,
    pub obstacle_map: Vec<i32>,
}

/// Everything rendered at the end of one fusion cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct ObstacleFrame {
    /// Centimetres per 5° sector from 0°; 0 means no obstacle.
    pub distances: [i32; NUM_BINS],
    pub cardinal: CardinalDistances,
    pub status: FusionStatus,
    pub summary: Summary,
    pub count: usize,
    pub confidence: f64,
}

impl ObstacleFrame {
    pub fn telemetry(&self, timestamp: f64) -> Telemetry {
        Telemetry {
            count: self.count,
            closest_distance_m: self.summary.closest_distance_mm.unwrap_or(f64::INFINITY)
                / 1000.0,
            cardinal_distances: self.cardinal.map(|d| d / 1000.0),
            confidence: self.confidence,
            timestamp,
            obstacle_map: self.distances.to_vec(),
        }
    }
}

/// Renders the current state into an output frame.
///
/// Refuses to render when a fused obstacle carries a bin index outside the
/// grid or one that disagrees with its bearing.
#[instrument(skip_all)]
pub fn render(state: &FusionState, now: Instant) -> Result<ObstacleFrame, Error> {
    let fused = state.fused();
    for obstacle in fused {
        let bin = obstacle.bin_index as usize;
        if bin >= NUM_BINS || bin_index(obstacle.bearing_deg) != obstacle.bin_index {
            return Err(Error::InvalidBin(bin));
        }
    }

    let closest = fused
        .iter()
        .min_by(|a, b| a.range_mm.total_cmp(&b.range_mm));
    let confidence = if fused.is_empty() {
        0.0
    } else {
        fused.iter().map(|o| o.confidence).sum::<f64>() / fused.len() as f64
    };

    let sensors: BTreeMap<_, _> = SensorId::ALL
        .iter()
        .map(|&sensor| {
            let status = match state.link(sensor) {
                None => SensorStatus::disconnected(),
                Some(link) => SensorStatus {
                    connectivity: state.connectivity(sensor, now),
                    inputs: link.latest.clusters.len(),
                    points: link.latest.points_in,
                    sweeps: link.sweeps,
                    filtered: link.filtered,
                    malformed: link.latest.malformed,
                    bad_sweeps: link.latest.bad_sweeps,
                },
            };
            (sensor, status)
        })
        .collect();

    let cardinal = cardinal_distances(fused);
    let summary = Summary {
        closest_distance_mm: closest.map(|o| o.range_mm),
        closest_bearing_deg: closest.map(|o| o.bearing_deg),
        cardinal,
        sensors: sensors
            .iter()
            .map(|(sensor, status)| (*sensor, status.connectivity))
            .collect(),
    };

    let status = FusionStatus {
        fusion_rate_hz: state.fusion_rate_hz(),
        fusion_count: state.fusion_count(),
        fused_obstacles_count: fused.len(),
        tracked_obstacles_count: state.tracker().len(),
        history_size: state.history_len(),
        sensors,
    };

    Ok(ObstacleFrame {
        distances: distance_array(fused),
        cardinal,
        status,
        summary,
        count: fused.len(),
        confidence,
    })
}
