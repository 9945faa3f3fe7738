// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! ObstaclePub Library
//!
//! This library provides the obstacle perception core of the ObstaclePub
//! node: range and bearing measurements from LiDAR, camera and ultrasonic
//! adapters are clustered, fused into a fixed 72-sector obstacle map,
//! tracked across cycles and rendered for the autopilot and telemetry.
//!
//! # Features
//!
//! - **Ingest** - Normalize sensor candidates and decode UDP sweeps
//! - **Clustering** - Seed-based angular and range grouping of sweep points
//! - **Fusion** - Nearest-obstacle-per-sector merge across sensors
//! - **Tracking** - Bin and range bucket identity with radial velocity
//! - **Output** - Distance array, cardinal distances, status and telemetry

/// Clustering of sweep points into obstacle clusters
pub mod clustering;

/// Process utilities
pub mod common;

/// Fusion tuning parameters
pub mod config;

/// Library error type
pub mod error;

/// Cross-sensor fusion into the sector grid
pub mod fusion;

/// Sensor candidate ingest
pub mod ingest;

/// UDP sensor receive loops
pub mod net;

/// Frame rendering for the autopilot and telemetry
pub mod output;

/// Fusion state shared by the fusion loop
pub mod state;

/// Temporal obstacle tracking
pub mod tracker;

/// Core measurement and obstacle types
pub mod types;

pub use config::FusionConfig;
pub use error::Error;
