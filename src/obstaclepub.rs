// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

mod args;

use args::Args;
use clap::Parser;
use kanal::AsyncReceiver;
use obstaclepub::{
    common::{set_process_priority, unix_timestamp},
    net::sensor_loop,
    output::{render, ObstacleFrame},
    state::{FusionState, SensorSnapshot},
    FusionConfig,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};
use tokio::{net::UdpSocket, time::MissedTickBehavior};
use tracing::{debug, error, info, info_span, warn};
use tracing_subscriber::{layer::SubscriberExt as _, Layer as _, Registry};
use tracy_client::{frame_mark, plot};

#[cfg(feature = "zenoh")]
use tracing::Instrument;
#[cfg(feature = "zenoh")]
use zenoh::{
    bytes::Encoding,
    qos::{CongestionControl, Priority},
    Session,
};

#[cfg(feature = "profiling")]
#[global_allocator]
static GLOBAL: tracy_client::ProfiledAllocator<std::alloc::System> =
    tracy_client::ProfiledAllocator::new(std::alloc::System, 100);

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    args.tracy.then(tracy_client::Client::start);

    let stdout_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_filter(args.rust_log);

    let journald = match tracing_journald::layer() {
        Ok(journald) => Some(journald.with_filter(args.rust_log)),
        Err(_) => None,
    };

    let tracy = match args.tracy {
        true => Some(tracing_tracy::TracyLayer::default().with_filter(args.rust_log)),
        false => None,
    };

    let subscriber = Registry::default()
        .with(stdout_log)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;

    let config = args.fusion_config()?;
    let telemetry_interval = args.telemetry_interval()?;
    info!(
        "fusion parameters: angle_resolution={}° range=[{}, {}]mm cluster_radius={}mm min_cluster_points={} rate={}Hz",
        config.angle_resolution_deg,
        config.min_range_mm,
        config.max_range_mm,
        config.cluster_radius_mm,
        config.min_cluster_points,
        config.fusion_rate_hz
    );

    #[cfg(feature = "zenoh")]
    let session = zenoh::open(args.zenoh_config()?).await?;

    let running = Arc::new(AtomicBool::new(true));
    let (tx, rx) = kanal::bounded_async(16);

    let sensors = args.sensors();
    if sensors.is_empty() {
        warn!("no sensor ports configured, publishing empty frames");
    }

    let mut sensor_threads = Vec::with_capacity(sensors.len());
    for (sensor, addr) in sensors {
        let tx = tx.clone();
        let config = config.clone();
        let running = running.clone();

        let handle = thread::Builder::new()
            .name(sensor.to_string())
            .spawn(move || {
                let res = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(obstaclepub::Error::from)
                    .and_then(|rt| {
                        rt.block_on(async {
                            let sock = UdpSocket::bind(addr).await?;
                            sensor_loop(sock, sensor, config, tx, running).await
                        })
                    });
                if let Err(e) = res {
                    error!("{} task error: {}", sensor, e);
                }
            })?;
        sensor_threads.push(handle);
    }
    drop(tx);

    let shutdown = running.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down");
            shutdown.store(false, Ordering::Relaxed);
        }
    });

    let fusion: JoinHandle<Result<(), BoxError>> = {
        let args = args.clone();
        let running = running.clone();
        #[cfg(feature = "zenoh")]
        let session = session.clone();

        thread::Builder::new()
            .name("fusion".to_string())
            .spawn(move || {
                set_process_priority();
                let res = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()?
                    .block_on(fusion_loop(
                        args,
                        config,
                        telemetry_interval,
                        rx,
                        running.clone(),
                        #[cfg(feature = "zenoh")]
                        session,
                    ));
                running.store(false, Ordering::Relaxed);
                res
            })?
    };

    let res = match fusion.join() {
        Ok(res) => res,
        Err(_) => Err("fusion thread panicked".into()),
    };

    for handle in sensor_threads {
        if handle.join().is_err() {
            error!("sensor thread panicked");
        }
    }

    if let Err(e) = &res {
        error!("fusion stopped: {}", e);
    }
    res
}

/// Fixed cadence fusion loop. Owns the fusion state for the whole run.
async fn fusion_loop(
    args: Args,
    config: FusionConfig,
    telemetry_interval: Duration,
    rx: AsyncReceiver<SensorSnapshot>,
    running: Arc<AtomicBool>,
    #[cfg(feature = "zenoh")] session: Session,
) -> Result<(), BoxError> {
    #[cfg(feature = "zenoh")]
    let distance_publisher = session
        .declare_publisher(args.distance_topic.clone())
        .priority(Priority::DataHigh)
        .congestion_control(CongestionControl::Drop)
        .await?;

    #[cfg(feature = "zenoh")]
    let telemetry_publisher = session
        .declare_publisher(args.telemetry_topic.clone())
        .priority(Priority::DataHigh)
        .congestion_control(CongestionControl::Drop)
        .await?;

    let mut interval = tokio::time::interval(config.fusion_period());
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut state = FusionState::new(config);
    let mut last_telemetry: Option<Instant> = None;

    while running.load(Ordering::Relaxed) {
        interval.tick().await;

        while let Ok(Some(snapshot)) = rx.try_recv() {
            state.publish(snapshot);
        }

        let now = Instant::now();
        state.cycle(now);
        let frame = info_span!("render").in_scope(|| render(&state, now))?;

        args.tracy.then(|| plot!("fused", frame.count as f64));
        args.tracy
            .then(|| plot!("tracked", frame.status.tracked_obstacles_count as f64));

        let distances = serde_json::to_vec(frame.distances.as_slice())?;
        #[cfg(feature = "zenoh")]
        {
            let span = info_span!("distance_publish");
            async {
                match distance_publisher
                    .put(distances)
                    .encoding(Encoding::APPLICATION_JSON)
                    .await
                {
                    Ok(_) => {}
                    Err(e) => error!("{} publish error: {:?}", args.distance_topic, e),
                }
            }
            .instrument(span)
            .await;
        }
        #[cfg(not(feature = "zenoh"))]
        debug!("distances {}", String::from_utf8_lossy(&distances));

        debug!("{}", frame.summary);

        if last_telemetry.map_or(true, |at| now.duration_since(at) >= telemetry_interval) {
            last_telemetry = Some(now);
            publish_telemetry(
                &frame,
                #[cfg(feature = "zenoh")]
                &telemetry_publisher,
                #[cfg(feature = "zenoh")]
                &args.telemetry_topic,
            )
            .await?;
        }

        args.tracy.then(frame_mark);
    }

    info!("fusion loop stopped after {} cycles", state.fusion_count());
    Ok(())
}

async fn publish_telemetry(
    frame: &ObstacleFrame,
    #[cfg(feature = "zenoh")] publisher: &zenoh::pubsub::Publisher<'_>,
    #[cfg(feature = "zenoh")] topic: &str,
) -> Result<(), BoxError> {
    let telemetry = frame.telemetry(unix_timestamp());
    let msg = serde_json::to_vec(&telemetry)?;

    info!("{}", frame.summary);

    #[cfg(feature = "zenoh")]
    if let Err(e) = publisher
        .put(msg)
        .encoding(Encoding::APPLICATION_JSON)
        .await
    {
        error!("{} publish error: {:?}", topic, e);
    }
    #[cfg(not(feature = "zenoh"))]
    info!("telemetry {}", String::from_utf8_lossy(&msg));

    Ok(())
}
