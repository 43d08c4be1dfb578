use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rtgp_bandwidth_monitor::calculator;
use rtgp_bandwidth_monitor::capture::{CaptureSource, FileCapture, LiveCapture, TcpdumpCapture};
use rtgp_bandwidth_monitor::config::{Args, Mode, MonitorConfig};
use rtgp_bandwidth_monitor::report;

fn main() -> ExitCode {
    let args = Args::parse();

    // RUST_LOG takes precedence over --verbose
    let log_level = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = MonitorConfig::from_args(args)?;

    if config.mode == Mode::Calculate {
        print!("{}", calculator::render());
        return Ok(());
    }

    let running = Arc::new(AtomicBool::new(true));
    let running_for_handler = running.clone();
    ctrlc::set_handler(move || {
        info!("Received Ctrl+C, finishing session");
        running_for_handler.store(false, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl+C handler")?;

    let mut source = open_source(&config, running)?;

    info!("RTGP Bandwidth Monitor");
    info!("Source: {}", source.describe());
    match config.mode {
        Mode::File(_) => info!("Port: {}", config.port),
        _ => info!("Port: {}, duration: {}s", config.port, config.duration.as_secs()),
    }

    let stats = source
        .monitor(config.duration)
        .with_context(|| format!("Monitoring session failed ({})", source.describe()))?;

    print!("{}", report::render(&stats));
    print!("{}", calculator::render());
    Ok(())
}

fn open_source(config: &MonitorConfig, running: Arc<AtomicBool>) -> Result<Box<dyn CaptureSource>> {
    let source: Box<dyn CaptureSource> = match &config.mode {
        Mode::File(path) => Box::new(FileCapture::new(path.clone(), config.port)),
        Mode::Tcpdump => Box::new(TcpdumpCapture::new(
            config.port,
            config.interface.clone(),
            running,
        )),
        Mode::Live | Mode::Calculate => {
            let live =
                LiveCapture::bind(config.bind_ip, config.port, config.report_interval, running)
                    .with_context(|| {
                        format!("Cannot listen on UDP {}:{}", config.bind_ip, config.port)
                    })?;
            Box::new(live)
        }
    };
    Ok(source)
}
