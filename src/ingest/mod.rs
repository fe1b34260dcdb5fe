pub mod tcp;
pub mod udp;

pub use tcp::TcpDriver;
pub use udp::UdpDriver;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::buffer::PacketQueue;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("stream ended")]
    Eof,
}

/// Connection flag and packet counter shared between a driver and the
/// health/stats reporting.
pub struct IngestStatus {
    connected: AtomicBool,
    packets_received: AtomicU64,
}

impl IngestStatus {
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
            packets_received: AtomicU64::new(0),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(Ordering::Relaxed)
    }

    pub fn add_packets(&self, n: u64) {
        self.packets_received.fetch_add(n, Ordering::Relaxed);
    }
}

impl Default for IngestStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// A blocking packet producer. `run` pushes 188-byte packets into the queue
/// until shutdown, EOF or an I/O error; the reconnect loop around it decides
/// what happens next.
pub trait IngestDriver: Send {
    fn run(
        &mut self,
        queue: &PacketQueue,
        status: &IngestStatus,
        running: &AtomicBool,
    ) -> Result<(), IngestError>;
}

#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub max: Duration,
    pub backoff: f64,
}

impl ReconnectPolicy {
    fn next(&self, current: Duration) -> Duration {
        current.mul_f64(self.backoff.max(1.0)).min(self.max)
    }
}

/// Runs a driver with exponential-backoff reconnects until shutdown. The
/// blocking driver runs on the blocking pool; this future owns the retry
/// cadence.
pub async fn run_driver(
    name: String,
    mut driver: Box<dyn IngestDriver>,
    queue: Arc<PacketQueue>,
    status: Arc<IngestStatus>,
    running: Arc<AtomicBool>,
    policy: ReconnectPolicy,
) {
    let mut delay = policy.initial;
    while running.load(Ordering::Relaxed) {
        tracing::info!(driver = %name, "starting ingest driver");
        let q = queue.clone();
        let s = status.clone();
        let r = running.clone();
        let result =
            tokio::task::spawn_blocking(move || {
                let outcome = driver.run(&q, &s, &r);
                (driver, outcome)
            })
            .await;

        status.set_connected(false);
        match result {
            Ok((d, Ok(()))) => {
                driver = d;
                delay = policy.initial;
                tracing::info!(driver = %name, "ingest driver ended");
            }
            Ok((d, Err(e))) => {
                driver = d;
                tracing::error!(driver = %name, error = %e, "ingest driver failed");
            }
            Err(e) => {
                tracing::error!(driver = %name, error = %e, "ingest driver panicked");
                return;
            }
        }

        if !running.load(Ordering::Relaxed) {
            break;
        }
        tracing::info!(driver = %name, delay_ms = delay.as_millis() as u64, "reconnecting");
        // Sleep in slices so shutdown is not held up by a long backoff.
        let mut remaining = delay;
        while remaining > Duration::ZERO && running.load(Ordering::Relaxed) {
            let step = remaining.min(Duration::from_millis(250));
            tokio::time::sleep(step).await;
            remaining = remaining.saturating_sub(step);
        }
        delay = policy.next(delay);
    }
}
