// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{
    collections::{BTreeMap, VecDeque},
    time::Instant,
};

use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::{
    clustering::SweepClusters,
    config::FusionConfig,
    fusion,
    tracker::Tracker,
    types::{FusedObstacle, ObstacleCluster, SensorId},
};

/// Immutable result of one sensor sweep, published by the sensor task.
#[derive(Debug, Clone)]
pub struct SensorSnapshot {
    pub source: SensorId,
    pub clusters: Vec<ObstacleCluster>,
    pub points_in: usize,
    pub points_kept: usize,
    /// Cumulative count of malformed samples dropped by ingest.
    pub malformed: u64,
    /// Cumulative count of undecodable sweeps.
    pub bad_sweeps: u64,
    pub received_at: Instant,
}

impl SensorSnapshot {
    pub fn new(source: SensorId, sweep: SweepClusters, received_at: Instant) -> Self {
        SensorSnapshot {
            source,
            clusters: sweep.clusters,
            points_in: sweep.points_in,
            points_kept: sweep.points_kept,
            malformed: 0,
            bad_sweeps: 0,
            received_at,
        }
    }

    pub fn with_diagnostics(mut self, malformed: u64, bad_sweeps: u64) -> Self {
        self.malformed = malformed;
        self.bad_sweeps = bad_sweeps;
        self
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// A snapshot arrived within the sensor timeout.
    Connected,
    /// The latest snapshot is older than the sensor timeout. It is still
    /// fused.
    Stale,
    /// No snapshot has ever arrived.
    Disconnected,
}

/// Per-sensor bookkeeping kept across snapshots.
#[derive(Debug, Clone)]
pub struct SensorLink {
    pub latest: SensorSnapshot,
    pub sweeps: u64,
    /// Cumulative points dropped by the quality and range filter.
    pub filtered: u64,
}

/// Process-wide fusion state, owned by the fusion loop.
#[derive(Debug)]
pub struct FusionState {
    config: FusionConfig,
    links: BTreeMap<SensorId, SensorLink>,
    fused: Vec<FusedObstacle>,
    tracker: Tracker,
    history: VecDeque<(Instant, FusedObstacle)>,
    fusion_count: u64,
    fusion_rate_hz: f64,
    last_cycle: Option<Instant>,
}

impl FusionState {
    pub fn new(config: FusionConfig) -> Self {
        let tracker = Tracker::new(config.tracking_timeout);
        FusionState {
            config,
            links: BTreeMap::new(),
            fused: Vec::new(),
            tracker,
            history: VecDeque::new(),
            fusion_count: 0,
            fusion_rate_hz: 0.0,
            last_cycle: None,
        }
    }

    /// Replaces the sensor's latest snapshot.
    pub fn publish(&mut self, snapshot: SensorSnapshot) {
        let filtered = snapshot.points_in.saturating_sub(snapshot.points_kept) as u64;
        match self.links.get_mut(&snapshot.source) {
            Some(link) => {
                link.sweeps += 1;
                link.filtered += filtered;
                link.latest = snapshot;
            }
            None => {
                info!("first snapshot from {}", snapshot.source);
                self.links.insert(
                    snapshot.source,
                    SensorLink {
                        latest: snapshot,
                        sweeps: 1,
                        filtered,
                    },
                );
            }
        }
    }

    /// Runs fusion and tracking over the latest snapshot of every sensor.
    pub fn cycle(&mut self, now: Instant) -> &[FusedObstacle] {
        let span = info_span!("fusion_cycle", cycle = self.fusion_count + 1);
        let _enter = span.enter();

        let clusters = self.links.values().flat_map(|l| l.latest.clusters.iter());
        let mut fused = fusion::fuse(clusters, &self.config);
        self.tracker.update(&mut fused, now);

        self.history.extend(fused.iter().map(|o| (now, o.clone())));
        while let Some((at, _)) = self.history.front() {
            if now.saturating_duration_since(*at) >= self.config.history_window {
                self.history.pop_front();
            } else {
                break;
            }
        }

        if let Some(last) = self.last_cycle {
            let elapsed = now.saturating_duration_since(last).as_secs_f64();
            if elapsed > 0.0 {
                self.fusion_rate_hz = 1.0 / elapsed;
            }
        }
        self.last_cycle = Some(now);
        self.fusion_count += 1;
        self.fused = fused;

        debug!(
            fused = self.fused.len(),
            tracked = self.tracker.len(),
            rate = self.fusion_rate_hz,
            "cycle completed"
        );
        &self.fused
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn fused(&self) -> &[FusedObstacle] {
        &self.fused
    }

    #[cfg(test)]
    pub(crate) fn fused_mut(&mut self) -> &mut Vec<FusedObstacle> {
        &mut self.fused
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn link(&self, sensor: SensorId) -> Option<&SensorLink> {
        self.links.get(&sensor)
    }

    pub fn connectivity(&self, sensor: SensorId, now: Instant) -> Connectivity {
        match self.links.get(&sensor) {
            None => Connectivity::Disconnected,
            Some(link) => {
                let age = now.saturating_duration_since(link.latest.received_at);
                if age <= self.config.sensor_timeout {
                    Connectivity::Connected
                } else {
                    Connectivity::Stale
                }
            }
        }
    }

    pub fn fusion_count(&self) -> u64 {
        self.fusion_count
    }

    pub fn fusion_rate_hz(&self) -> f64 {
        self.fusion_rate_hz
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }
}
