use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

mod analyze;
mod api;
mod buffer;
mod config;
mod engine;
mod ingest;
mod sink;
mod source;
mod stats;
mod ts;

use api::{AppState, InputSource, InputSourceManager};
use buffer::DEFAULT_BUFFER_CAPACITY;
use config::Config;
use engine::switch::SwitchController;
use engine::{Engine, EngineError, EngineSettings};
use ingest::{IngestDriver, IngestStatus, ReconnectPolicy, TcpDriver, UdpDriver};
use sink::OutputSink;
use source::Source;
use stats::RelayStats;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("tsrelay={}", config.log_level).parse()?),
        )
        .init();

    let input = Arc::new(InputSourceManager::load(&config.input_source_file));
    let stats = Arc::new(RelayStats::new());
    let running = Arc::new(AtomicBool::new(true));

    let (event_tx, event_rx) = tokio::sync::mpsc::unbounded_channel();
    let controller = Arc::new(SwitchController::new(
        Duration::from_millis(config.max_live_gap_ms),
        config.min_consecutive_for_switch,
        Some(event_tx),
    ));
    let notifier = config
        .notify_base_url
        .clone()
        .map(|base| api::notify::spawn_notifier(base, event_rx));

    let live = Source::new("live", config.ts_queue_size, DEFAULT_BUFFER_CAPACITY);
    let fallback = Source::new("fallback", config.ts_queue_size, DEFAULT_BUFFER_CAPACITY);

    let live_driver = live_driver_for(&config, input.current())?;
    let fallback_driver: Box<dyn IngestDriver> = if let Some(port) = config.fallback_udp_port {
        Box::new(UdpDriver::new(port, config.udp_rcvbuf_size))
    } else if let Some(port) = config.fallback_tcp_port {
        Box::new(TcpDriver::new(port))
    } else {
        return Err("no fallback source configured".into());
    };

    let policy = ReconnectPolicy {
        initial: Duration::from_millis(config.reconnect.initial_ms),
        max: Duration::from_millis(config.reconnect.max_ms),
        backoff: config.reconnect.backoff,
    };
    let live_status = Arc::new(IngestStatus::new());
    let fallback_status = Arc::new(IngestStatus::new());

    let mut ingest_handles = Vec::new();
    ingest_handles.push(tokio::spawn(ingest::run_driver(
        "live".to_string(),
        live_driver,
        live.queue().clone(),
        live_status.clone(),
        running.clone(),
        policy,
    )));
    ingest_handles.push(tokio::spawn(ingest::run_driver(
        "fallback".to_string(),
        fallback_driver,
        fallback.queue().clone(),
        fallback_status.clone(),
        running.clone(),
        policy,
    )));

    let mut indexer_handles = Vec::new();
    {
        let (src, ctrl, run) = (live.clone(), controller.clone(), running.clone());
        indexer_handles.push(tokio::task::spawn_blocking(move || {
            source::run_indexer(src, Some(ctrl), run)
        }));
    }
    {
        let (src, run) = (fallback.clone(), running.clone());
        indexer_handles.push(tokio::task::spawn_blocking(move || {
            source::run_indexer(src, None, run)
        }));
    }

    let sink = OutputSink::new(
        config.rtmp_url.as_deref().unwrap_or_default(),
        config.rtmp_pacing_us,
        stats.clone(),
    );
    let engine = Engine::new(
        live.clone(),
        fallback.clone(),
        controller.clone(),
        Box::new(sink),
        stats.clone(),
        running.clone(),
        EngineSettings {
            live_idr_timeout: Duration::from_millis(config.live_idr_timeout_ms),
            fallback_idr_timeout: Duration::from_millis(config.fallback_idr_timeout_ms),
        },
    );
    let mut engine_handle = tokio::task::spawn_blocking(move || engine.run());

    let app_state = AppState {
        controller: controller.clone(),
        input: input.clone(),
        stats: stats.clone(),
    };
    let http_port = config.http_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = api::server::start_server(app_state, http_port).await {
            tracing::error!("HTTP server error: {}", e);
        }
    });

    let stats_handle = {
        let stats = stats.clone();
        let controller = controller.clone();
        let running = running.clone();
        let (live, fallback) = (live.clone(), fallback.clone());
        let (live_status, fallback_status) = (live_status.clone(), fallback_status.clone());
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(30));
            while running.load(Ordering::Relaxed) {
                interval.tick().await;
                tracing::info!(
                    mode = ?controller.state(),
                    written = stats.packets_written.load(Ordering::Relaxed),
                    dropped = stats.packets_dropped.load(Ordering::Relaxed)
                        + live.queue().dropped()
                        + fallback.queue().dropped(),
                    live_connected = live_status.is_connected(),
                    live_packets = live_status.packets_received(),
                    fallback_connected = fallback_status.is_connected(),
                    fallback_packets = fallback_status.packets_received(),
                    "relay stats"
                );
            }
        })
    };

    let mut engine_done: Option<Result<(), EngineError>> = None;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
        res = &mut engine_handle => {
            engine_done = Some(res?);
        }
    }

    running.store(false, Ordering::Relaxed);
    live.close();
    fallback.close();

    server_handle.abort();
    stats_handle.abort();
    if let Some(handle) = notifier {
        handle.abort();
    }

    if engine_done.is_none() {
        engine_done = Some(engine_handle.await?);
    }
    for handle in indexer_handles {
        let _ = handle.await;
    }
    for handle in ingest_handles {
        let _ = handle.await;
    }

    if let Some(Err(e)) = engine_done {
        tracing::error!(error = %e, "engine failed");
        std::process::exit(1);
    }
    tracing::info!("shutdown complete");
    Ok(())
}

/// Picks the driver that fills the live role, honoring the persisted input
/// selection: the drone feed when selected and configured, the camera feed
/// otherwise.
fn live_driver_for(
    config: &Config,
    selection: InputSource,
) -> Result<Box<dyn IngestDriver>, Box<dyn std::error::Error>> {
    if selection == InputSource::Drone {
        if let Some(port) = config.drone_udp_port {
            tracing::info!(port, "drone feed selected as live source");
            return Ok(Box::new(UdpDriver::new(port, config.udp_rcvbuf_size)));
        }
        tracing::warn!("drone selected but drone_udp_port not configured, using camera");
    }
    if let Some(port) = config.live_udp_port {
        Ok(Box::new(UdpDriver::new(port, config.udp_rcvbuf_size)))
    } else if let Some(port) = config.live_tcp_port {
        Ok(Box::new(TcpDriver::new(port)))
    } else if let Some(port) = config.drone_udp_port {
        tracing::info!(port, "no camera ports configured, using drone feed as live");
        Ok(Box::new(UdpDriver::new(port, config.udp_rcvbuf_size)))
    } else {
        Err("no live source configured".into())
    }
}
