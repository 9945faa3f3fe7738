// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use kanal::AsyncSender;
use tokio::{
    net::UdpSocket,
    time::{sleep, timeout},
};
use tracing::{debug, error, info, warn};

use crate::{
    clustering::Clustering,
    config::FusionConfig,
    error::Error,
    ingest::{Ingest, IngestMode},
    state::SensorSnapshot,
    types::SensorId,
};

/// Largest sweep datagram accepted.
pub const MAX_DATAGRAM: usize = 65536;

/// Upper bound on a single blocking read so the running flag is observed.
pub const RECV_TIMEOUT: Duration = Duration::from_millis(500);

/// Delay before retrying after a failed read, doubling on every consecutive
/// failure up to one second.
#[derive(Debug, Clone, Default)]
pub struct ReadBackoff {
    delay: Duration,
}

impl ReadBackoff {
    const MIN: Duration = Duration::from_millis(10);
    const MAX: Duration = Duration::from_secs(1);

    /// Records a failure and returns how long to wait before the next read.
    pub fn failed(&mut self) -> Duration {
        self.delay = (self.delay * 2).clamp(Self::MIN, Self::MAX);
        self.delay
    }

    pub fn reset(&mut self) {
        self.delay = Duration::ZERO;
    }
}

/// Turns one sweep datagram into a snapshot. Undecodable datagrams yield
/// `None` and are counted by `ingest`.
pub fn process_datagram(
    ingest: &mut Ingest,
    clustering: &Clustering,
    data: &[u8],
    now: Instant,
) -> Option<SensorSnapshot> {
    let points = ingest.ingest_datagram(data, now)?;
    let sweep = match ingest.mode() {
        IngestMode::Cluster => clustering.cluster(points),
        IngestMode::Direct => clustering.direct(points),
    };
    Some(
        SensorSnapshot::new(ingest.source(), sweep, now)
            .with_diagnostics(ingest.malformed(), ingest.bad_sweeps()),
    )
}

/// UDP receiver for one sensor's sweeps.
///
/// Every decoded sweep is clustered and offered to the fusion loop without
/// blocking; a full channel drops the snapshot. Returns once `running` is
/// cleared or the fusion loop has gone away.
pub async fn sensor_loop(
    sock: UdpSocket,
    sensor: SensorId,
    config: FusionConfig,
    tx: AsyncSender<SensorSnapshot>,
    running: Arc<AtomicBool>,
) -> Result<(), Error> {
    info!("{} listening on {}", sensor, sock.local_addr()?);

    let mut ingest = Ingest::new(sensor);
    let clustering = Clustering::new(&config);
    let mut buf = vec![0; MAX_DATAGRAM];
    let mut backoff = ReadBackoff::default();

    while running.load(Ordering::Relaxed) {
        let n = match timeout(RECV_TIMEOUT, sock.recv_from(&mut buf)).await {
            Err(_) => continue,
            Ok(Err(e)) => {
                let delay = backoff.failed();
                error!("{} read error: {:?}, retrying in {:?}", sensor, e, delay);
                sleep(delay).await;
                continue;
            }
            Ok(Ok((n, _))) => n,
        };
        backoff.reset();

        let Some(snapshot) = process_datagram(&mut ingest, &clustering, &buf[..n], Instant::now())
        else {
            continue;
        };
        debug!(
            clusters = snapshot.clusters.len(),
            points = snapshot.points_in,
            "{} sweep",
            sensor
        );

        match tx.try_send(snapshot) {
            Ok(true) => (),
            Ok(false) => warn!("{} snapshot dropped: fusion loop busy", sensor),
            Err(e) => {
                info!("{} stopping: {:?}", sensor, e);
                break;
            }
        }
    }

    Ok(())
}
