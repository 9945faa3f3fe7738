// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{trace, warn};

use crate::{
    error::Error,
    types::{normalize_bearing, ObstacleKind, RawPoint, SensorId},
};

/// One obstacle candidate as delivered by a sensor adapter.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub bearing_deg: f64,
    pub range_mm: f64,
    pub quality: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind_hint: Option<ObstacleKind>,
}

/// A complete sweep as carried in one datagram. Samples are decoded one by
/// one so a bad sample only costs itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepMessage {
    pub points: Vec<Value>,
}

impl SweepMessage {
    pub fn from_slice(data: &[u8]) -> Result<SweepMessage, Error> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// How a sensor's sweeps become clusters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum IngestMode {
    /// Raw sweep points grouped by the clustering engine.
    Cluster,
    /// Every candidate already describes one obstacle.
    Direct,
}

impl IngestMode {
    pub fn for_sensor(sensor: SensorId) -> IngestMode {
        match sensor {
            SensorId::Lidar => IngestMode::Cluster,
            SensorId::Camera | SensorId::Ultrasonic => IngestMode::Direct,
        }
    }
}

/// Normalizes one sensor's candidates into [`RawPoint`]s.
#[derive(Debug, Clone)]
pub struct Ingest {
    source: SensorId,
    mode: IngestMode,

    /// samples dropped for non-finite or negative values
    malformed: u64,

    /// datagrams that could not be decoded
    bad_sweeps: u64,
}

impl Ingest {
    pub fn new(source: SensorId) -> Self {
        Self::with_mode(source, IngestMode::for_sensor(source))
    }

    pub fn with_mode(source: SensorId, mode: IngestMode) -> Self {
        Ingest {
            source,
            mode,
            malformed: 0,
            bad_sweeps: 0,
        }
    }

    pub fn source(&self) -> SensorId {
        self.source
    }

    pub fn mode(&self) -> IngestMode {
        self.mode
    }

    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    pub fn bad_sweeps(&self) -> u64 {
        self.bad_sweeps
    }

    /// Converts a sweep's candidates, stamping them with `captured_at`.
    /// Malformed samples are dropped and counted.
    pub fn ingest(&mut self, candidates: &[Candidate], captured_at: Instant) -> Vec<RawPoint> {
        let mut points = Vec::with_capacity(candidates.len());
        for c in candidates {
            if !c.bearing_deg.is_finite() || !c.range_mm.is_finite() || c.range_mm < 0.0 {
                self.malformed += 1;
                trace!(source = %self.source, ?c, "dropping malformed sample");
                continue;
            }
            points.push(RawPoint {
                bearing_deg: normalize_bearing(c.bearing_deg),
                range_mm: c.range_mm,
                quality: c.quality,
                captured_at,
                source: self.source,
                kind_hint: c.kind_hint,
            });
        }
        points
    }

    /// Decodes a datagram and ingests it. Samples that do not decode as a
    /// [`Candidate`] are dropped and counted as malformed. A datagram that is
    /// not a `{"points": [...]}` object counts as a bad sweep and yields
    /// `None`.
    pub fn ingest_datagram(&mut self, data: &[u8], captured_at: Instant) -> Option<Vec<RawPoint>> {
        match SweepMessage::from_slice(data) {
            Ok(msg) => {
                let mut candidates = Vec::with_capacity(msg.points.len());
                for point in msg.points {
                    match serde_json::from_value::<Candidate>(point) {
                        Ok(candidate) => candidates.push(candidate),
                        Err(err) => {
                            self.malformed += 1;
                            trace!(source = %self.source, "dropping undecodable sample: {}", err);
                        }
                    }
                }
                Some(self.ingest(&candidates, captured_at))
            }
            Err(err) => {
                self.bad_sweeps += 1;
                warn!(source = %self.source, "undecodable sweep: {}", err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_and_drops() {
        let mut ingest = Ingest::new(SensorId::Lidar);
        let now = Instant::now();
        let candidates = [
            Candidate {
                bearing_deg: -10.0,
                range_mm: 1000.0,
                quality: 10,
                kind_hint: None,
            },
            Candidate {
                bearing_deg: f64::NAN,
                range_mm: 1000.0,
                quality: 10,
                kind_hint: None,
            },
            Candidate {
                bearing_deg: 10.0,
                range_mm: f64::INFINITY,
                quality: 10,
                kind_hint: None,
            },
            Candidate {
                bearing_deg: 370.0,
                range_mm: -5.0,
                quality: 10,
                kind_hint: None,
            },
        ];
        let points = ingest.ingest(&candidates, now);
        assert_eq!(points.len(), 1);
        assert!((points[0].bearing_deg - 350.0).abs() < 1e-9);
        assert_eq!(points[0].source, SensorId::Lidar);
        assert_eq!(points[0].captured_at, now);
        assert_eq!(ingest.malformed(), 3);
    }

    #[test]
    fn test_datagram() {
        let mut ingest = Ingest::new(SensorId::Ultrasonic);
        assert_eq!(ingest.mode(), IngestMode::Direct);

        let data = br#"{"points":[{"bearing_deg":12.0,"range_mm":1100.0,"quality":255,"kind_hint":"static"}]}"#;
        let points = ingest.ingest_datagram(data, Instant::now()).unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].kind_hint, Some(ObstacleKind::Static));
        assert_eq!(points[0].quality, 255);

        let data = br#"{"points":[{"bearing_deg":12.0,"range_mm":1100.0,"quality":255}]}"#;
        let points = ingest.ingest_datagram(data, Instant::now()).unwrap();
        assert_eq!(points[0].kind_hint, None);

        assert!(ingest.ingest_datagram(b"not json", Instant::now()).is_none());
        assert!(ingest.ingest_datagram(br#"{"points":7}"#, Instant::now()).is_none());
        assert!(ingest.ingest_datagram(br#"[1,2]"#, Instant::now()).is_none());
        assert_eq!(ingest.bad_sweeps(), 3);
        assert_eq!(ingest.malformed(), 0);

        let data = br#"{"points":[{"bearing_deg":1.0,"range_mm":1.0,"quality":300}]}"#;
        let points = ingest.ingest_datagram(data, Instant::now()).unwrap();
        assert!(points.is_empty());
        assert_eq!(ingest.malformed(), 1);
        assert_eq!(ingest.bad_sweeps(), 3);
    }

    #[test]
    fn test_bad_samples_keep_the_sweep() {
        let mut ingest = Ingest::new(SensorId::Lidar);
        let data = br#"{"points":[
            {"bearing_deg":10.0,"range_mm":1200.0,"quality":200},
            {"bearing_deg":10.0,"range_mm":1200.0,"quality":256},
            {"bearing_deg":"north","range_mm":1200.0,"quality":200},
            {"range_mm":1200.0,"quality":200},
            {"bearing_deg":10.0,"range_mm":1200.0,"quality":200,"kind_hint":"rock"},
            {"bearing_deg":11.0,"range_mm":-4.0,"quality":200},
            "noise",
            {"bearing_deg":12.0,"range_mm":1250.0,"quality":180}
        ]}"#;
        let points = ingest.ingest_datagram(data, Instant::now()).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].bearing_deg, 10.0);
        assert_eq!(points[1].range_mm, 1250.0);
        assert_eq!(ingest.malformed(), 6);
        assert_eq!(ingest.bad_sweeps(), 0);
    }

    #[test]
    fn test_default_modes() {
        assert_eq!(IngestMode::for_sensor(SensorId::Lidar), IngestMode::Cluster);
        assert_eq!(IngestMode::for_sensor(SensorId::Camera), IngestMode::Direct);
    }
}
