// src/main.rs

use std::time::{Duration, Instant};

use crossbeam::channel::{RecvTimeoutError, bounded};
use log::{debug, info};

use camcast_node::config;
use camcast_node::recorder::{FsRetention, organize_loose_recordings};
use camcast_node::{CamNode, Config};

enum Command {
    Run,
    Sweep,
    Organize,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    // ------------------------------------------------------------
    // Args: [config.toml] [run|sweep|organize]
    // ------------------------------------------------------------
    let mut cfg_path = "config.toml".to_string();
    let mut command = Command::Run;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "run" => command = Command::Run,
            "sweep" => command = Command::Sweep,
            "organize" => command = Command::Organize,
            _ => cfg_path = arg,
        }
    }

    let cfg: Config = if std::path::Path::new(&cfg_path).exists() {
        let cfg = config::load(&cfg_path)?;
        info!("[camcast] loaded {}", cfg_path);
        cfg
    } else {
        info!("[camcast] {} not found, using defaults", cfg_path);
        let cfg = Config::default();
        cfg.validate()?;
        cfg
    };

    match command {
        Command::Run => run(cfg),
        Command::Sweep => {
            let retention = FsRetention::new(cfg.recorder.root.clone(), cfg.retention.days);
            let report = retention.sweep_now();
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.is_clean() {
                anyhow::bail!("{} directories could not be removed", report.failures.len());
            }
            Ok(())
        }
        Command::Organize => {
            let report = organize_loose_recordings(&cfg.recorder.root)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

fn run(cfg: Config) -> anyhow::Result<()> {
    // ------------------------------------------------------------
    // Graceful shutdown
    // ------------------------------------------------------------
    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })?;

    let node = CamNode::start_from_config(cfg)?;
    if let Some(addr) = node.http_addr() {
        info!("[camcast] live view at http://{}/stream.mjpg", addr);
    }
    info!("[camcast] running – Ctrl+C to stop");

    let mut last_stats = Instant::now();
    loop {
        match shutdown_rx.recv_timeout(Duration::from_millis(500)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        if !node.capture_running() {
            anyhow::bail!("camera stopped delivering frames");
        }

        if last_stats.elapsed() >= Duration::from_secs(5) {
            let stats = node.buffer().stats();
            debug!(
                "[camcast] head_seq={} viewers={} frame_bytes={}",
                stats.head_seq, stats.waiters, stats.frame_bytes
            );
            last_stats = Instant::now();
        }
    }

    info!("[camcast] shutdown requested");
    node.shutdown();
    Ok(())
}
