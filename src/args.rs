// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use clap::Parser;
use obstaclepub::{types::SensorId, Error, FusionConfig};
use tracing::level_filters::LevelFilter;

#[cfg(feature = "zenoh")]
use serde_json::json;
#[cfg(feature = "zenoh")]
use zenoh::config::{Config, WhatAmI};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Angular resolution in degrees. Sweep points within twice this angle
    /// of a cluster seed join the cluster.
    #[arg(long, env, default_value = "5.0")]
    pub angle_resolution: f64,

    /// Minimum detection range in millimetres
    #[arg(long, env, default_value = "100")]
    pub min_range: f64,

    /// Maximum detection range in millimetres
    #[arg(long, env, default_value = "8000")]
    pub max_range: f64,

    /// Clustering range limit between a point and its cluster seed (mm)
    #[arg(long, env, default_value = "500")]
    pub cluster_radius: f64,

    /// Clustering point limit
    #[arg(long, env, default_value = "3")]
    pub min_cluster_points: usize,

    /// Seconds before an unseen tracked obstacle is dropped
    #[arg(long, env, default_value = "2.0")]
    pub tracking_timeout: f64,

    /// Fusion cycle rate in Hz
    #[arg(long, env, default_value = "10.0")]
    pub fusion_rate: f64,

    /// Seconds without a sweep before a sensor is reported stale
    #[arg(long, env, default_value = "2.0")]
    pub sensor_timeout: f64,

    /// Seconds of fused obstacles kept in the rolling history
    #[arg(long, env, default_value = "10.0")]
    pub history_window: f64,

    /// Seconds between telemetry records
    #[arg(long, env, default_value = "2.0")]
    pub telemetry_interval: f64,

    /// UDP port receiving LiDAR sweeps
    #[arg(long, env)]
    pub lidar_port: Option<u16>,

    /// UDP port receiving camera detections
    #[arg(long, env)]
    pub camera_port: Option<u16>,

    /// UDP port receiving ultrasonic readings
    #[arg(long, env)]
    pub ultrasonic_port: Option<u16>,

    /// Address the sensor ports are bound to
    #[arg(long, env, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// obstacle distance array topic name
    #[cfg(feature = "zenoh")]
    #[arg(long, default_value = "rt/obstacles/distance")]
    pub distance_topic: String,

    /// obstacle telemetry topic name
    #[cfg(feature = "zenoh")]
    #[arg(long, default_value = "rt/obstacles/telemetry")]
    pub telemetry_topic: String,

    /// Application log level
    #[arg(long, env, default_value = "info")]
    pub rust_log: LevelFilter,

    /// Enable Tracy profiler broadcast
    #[arg(long, env)]
    pub tracy: bool,

    /// zenoh connection mode
    #[cfg(feature = "zenoh")]
    #[arg(long, env, default_value = "peer")]
    mode: WhatAmI,

    /// connect to zenoh endpoints
    #[cfg(feature = "zenoh")]
    #[arg(long, env)]
    connect: Vec<String>,

    /// listen to zenoh endpoints
    #[cfg(feature = "zenoh")]
    #[arg(long, env)]
    listen: Vec<String>,

    /// disable zenoh multicast scouting
    #[cfg(feature = "zenoh")]
    #[arg(long, env)]
    no_multicast_scouting: bool,
}

fn seconds(name: &str, value: f64) -> Result<Duration, Error> {
    Duration::try_from_secs_f64(value).map_err(|_| {
        Error::InvalidConfig(format!("{} must be a duration in seconds: {}", name, value))
    })
}

impl Args {
    /// Builds and validates the fusion parameters.
    pub fn fusion_config(&self) -> Result<FusionConfig, Error> {
        let config = FusionConfig {
            angle_resolution_deg: self.angle_resolution,
            min_range_mm: self.min_range,
            max_range_mm: self.max_range,
            cluster_radius_mm: self.cluster_radius,
            min_cluster_points: self.min_cluster_points,
            tracking_timeout: seconds("tracking timeout", self.tracking_timeout)?,
            fusion_rate_hz: self.fusion_rate,
            sensor_timeout: seconds("sensor timeout", self.sensor_timeout)?,
            history_window: seconds("history window", self.history_window)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn telemetry_interval(&self) -> Result<Duration, Error> {
        seconds("telemetry interval", self.telemetry_interval)
    }

    /// Sensors with a configured port and the address each one listens on.
    pub fn sensors(&self) -> Vec<(SensorId, SocketAddr)> {
        [
            (SensorId::Lidar, self.lidar_port),
            (SensorId::Camera, self.camera_port),
            (SensorId::Ultrasonic, self.ultrasonic_port),
        ]
        .into_iter()
        .filter_map(|(sensor, port)| port.map(|port| (sensor, SocketAddr::new(self.bind, port))))
        .collect()
    }

    #[cfg(feature = "zenoh")]
    pub fn zenoh_config(&self) -> Result<Config, zenoh::Error> {
        let mut config = Config::default();

        config.insert_json5("mode", &json!(self.mode).to_string())?;

        if !self.connect.is_empty() {
            config.insert_json5("connect/endpoints", &json!(self.connect).to_string())?;
        }

        if !self.listen.is_empty() {
            config.insert_json5("listen/endpoints", &json!(self.listen).to_string())?;
        }

        if self.no_multicast_scouting {
            config.insert_json5("scouting/multicast/enabled", &json!(false).to_string())?;
        }

        config.insert_json5("scouting/multicast/interface", &json!("lo").to_string())?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["obstaclepub"]).unwrap();
        assert_eq!(args.fusion_config().unwrap(), FusionConfig::default());
        assert_eq!(args.telemetry_interval().unwrap(), Duration::from_secs(2));
        assert!(args.sensors().is_empty());
    }

    #[test]
    fn test_sensors() {
        let args = Args::try_parse_from([
            "obstaclepub",
            "--lidar-port",
            "50010",
            "--ultrasonic-port",
            "50012",
            "--bind",
            "127.0.0.1",
        ])
        .unwrap();
        let sensors = args.sensors();
        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[0].0, SensorId::Lidar);
        assert_eq!(sensors[0].1, "127.0.0.1:50010".parse().unwrap());
        assert_eq!(sensors[1].0, SensorId::Ultrasonic);
    }

    #[test]
    fn test_invalid_config() {
        let args = Args::try_parse_from(["obstaclepub", "--tracking-timeout=-1"]).unwrap();
        assert!(matches!(args.fusion_config(), Err(Error::InvalidConfig(_))));

        let args =
            Args::try_parse_from(["obstaclepub", "--min-range", "500", "--max-range", "400"])
                .unwrap();
        assert!(args.fusion_config().is_err());
    }
}
