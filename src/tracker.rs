// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use tracing::{instrument, trace};

use crate::types::FusedObstacle;

/// Width of the range buckets used to key tracked obstacles.
pub const RANGE_BUCKET_MM: f64 = 100.0;

/// Identity of a tracked obstacle: its angular bin and 100 mm range bucket.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObstacleId {
    pub bin: u8,
    pub range_bucket: u32,
}

impl ObstacleId {
    pub fn of(obstacle: &FusedObstacle) -> Self {
        ObstacleId {
            bin: obstacle.bin_index,
            range_bucket: (obstacle.range_mm / RANGE_BUCKET_MM).floor() as u32,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TrackedObstacle {
    pub id: ObstacleId,
    pub obstacle: FusedObstacle,
    pub last_seen_at: Instant,
}

/// Radial velocity in mm/s from the change in range over `dt`. Negative
/// values mean the obstacle is approaching.
pub fn radial_velocity(old_range_mm: f64, new_range_mm: f64, dt: Duration) -> Option<f64> {
    let dt = dt.as_secs_f64();
    if dt > 0.0 {
        Some((new_range_mm - old_range_mm) / dt)
    } else {
        None
    }
}

/// Associates fused obstacles across cycles through coarse identity keys.
///
/// An obstacle moving across a bin or bucket boundary between cycles is seen
/// as a new obstacle.
#[derive(Debug, Clone)]
pub struct Tracker {
    /// Tracked obstacles unseen for this long are evicted.
    timeout: Duration,
    tracks: HashMap<ObstacleId, TrackedObstacle>,
}

impl Tracker {
    pub fn new(timeout: Duration) -> Self {
        Tracker {
            timeout,
            tracks: HashMap::new(),
        }
    }

    /// Matches this cycle's obstacles against the table, annotating matched
    /// obstacles with their radial velocity, then evicts stale entries.
    #[instrument(skip_all, fields(obstacles = obstacles.len()))]
    pub fn update(&mut self, obstacles: &mut [FusedObstacle], now: Instant) {
        for obstacle in obstacles.iter_mut() {
            let id = ObstacleId::of(obstacle);
            obstacle.velocity_mm_s = match self.tracks.get(&id) {
                Some(track) => {
                    let dt = now.saturating_duration_since(track.last_seen_at);
                    if dt < self.timeout {
                        radial_velocity(track.obstacle.range_mm, obstacle.range_mm, dt)
                    } else {
                        None
                    }
                }
                None => None,
            };
            trace!(?id, velocity = ?obstacle.velocity_mm_s, "tracked");
            self.tracks.insert(
                id,
                TrackedObstacle {
                    id,
                    obstacle: obstacle.clone(),
                    last_seen_at: now,
                },
            );
        }
        self.evict(now);
    }

    /// Drops every track unseen for at least the timeout.
    pub fn evict(&mut self, now: Instant) {
        let timeout = self.timeout;
        self.tracks
            .retain(|_, track| now.saturating_duration_since(track.last_seen_at) < timeout);
    }

    pub fn get(&self, id: &ObstacleId) -> Option<&TrackedObstacle> {
        self.tracks.get(id)
    }

    pub fn tracks(&self) -> impl Iterator<Item = &TrackedObstacle> {
        self.tracks.values()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
