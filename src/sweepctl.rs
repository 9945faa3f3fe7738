// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::PathBuf,
    time::Instant,
};

use clap::Parser;
use log::{debug, warn};
use obstaclepub::{
    clustering::Clustering,
    fusion::cardinal_distances,
    ingest::Ingest,
    net::process_datagram,
    output::render,
    state::FusionState,
    types::SensorId,
    FusionConfig,
};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Sensor the sweeps were recorded from (lidar, camera or ultrasonic).
    #[arg(short, long, default_value = "lidar")]
    sensor: SensorId,

    /// Run every sweep through a fusion cycle and print the distance array.
    #[arg(short, long)]
    fuse: bool,

    /// Angular resolution in degrees
    #[arg(long, default_value = "5.0")]
    angle_resolution: f64,

    /// Clustering point limit
    #[arg(long, default_value = "3")]
    min_cluster_points: usize,

    /// File with one JSON sweep per line, stdin if omitted.
    #[arg()]
    input: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config = FusionConfig {
        angle_resolution_deg: args.angle_resolution,
        min_cluster_points: args.min_cluster_points,
        ..Default::default()
    };
    config.validate()?;

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => {
            debug!("reading sweeps from {}", path.display());
            Box::new(BufReader::new(File::open(path)?))
        }
        None => Box::new(BufReader::new(io::stdin())),
    };

    let clustering = Clustering::new(&config);
    let mut ingest = Ingest::new(args.sensor);
    let mut state = FusionState::new(config.clone());
    let start = Instant::now();

    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        // replay at the configured cadence
        let now = start + config.fusion_period() * n as u32;
        let Some(snapshot) = process_datagram(&mut ingest, &clustering, line.as_bytes(), now)
        else {
            warn!("line {}: skipped", n + 1);
            continue;
        };

        if args.fuse {
            state.publish(snapshot);
            state.cycle(now);
            let frame = render(&state, now)?;
            println!("{}", serde_json::to_string(frame.distances.as_slice())?);
            continue;
        }

        println!(
            "sweep {}: {} points, {} kept, {} clusters",
            n + 1,
            snapshot.points_in,
            snapshot.points_kept,
            snapshot.clusters.len()
        );
        for cluster in &snapshot.clusters {
            println!(
                "  {:6.1}° {:7.0}mm [{:.0}-{:.0}] n={} confidence={:.2} {}",
                cluster.center_bearing_deg,
                cluster.center_range_mm,
                cluster.min_range_mm,
                cluster.max_range_mm,
                cluster.point_count,
                cluster.confidence,
                cluster.kind
            );
        }

        state.publish(snapshot);
        let fused = state.cycle(now);
        let cardinal = cardinal_distances(fused).map(|d| d / 1000.0);
        println!(
            "  front={:.2}m left={:.2}m rear={:.2}m right={:.2}m",
            cardinal.front, cardinal.left, cardinal.rear, cardinal.right
        );
    }

    if ingest.malformed() > 0 || ingest.bad_sweeps() > 0 {
        eprintln!(
            "{} malformed samples, {} undecodable sweeps",
            ingest.malformed(),
            ingest.bad_sweeps()
        );
    }

    Ok(())
}
