use anyhow::Result;
use clap::Parser;
use gtop::assembler::Assembler;
use gtop::cli::Cli;
use gtop::config::AppConfig;
use gtop::correlator::ContainerCorrelator;
use gtop::demo::{DemoContainerRuntime, DemoDevices, DemoInferenceClient, DemoProcessTable};
use gtop::detail::DetailService;
use gtop::docker_repo::{ContainerRuntime, DockerRepo};
use gtop::export::ExportDocument;
use gtop::nvml_repo::{DeviceSource, NvmlRepo};
use gtop::process_repo::{ProcessTable, SysinfoProcessTable};
use gtop::triton::{HttpTritonClient, InferenceClient, InferenceProber};
use gtop::{ui, version, worker};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

/// Export writes logs to stderr so stdout stays pure JSON. The interactive
/// view owns the terminal, so logs go to the configured file or nowhere.
fn init_tracing(cli: &Cli, config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter);
    if cli.query {
        builder.with_writer(std::io::stderr).init();
    } else if let Some(path) = &config.logging.file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| anyhow::anyhow!("log file {}: {}", path.display(), e))?;
        builder
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
            .init();
    } else {
        builder.with_writer(std::io::sink).init();
    }
    Ok(())
}

struct Sources {
    devices: Arc<dyn DeviceSource>,
    processes: Arc<dyn ProcessTable>,
    runtime: Option<Arc<dyn ContainerRuntime>>,
    inference: Arc<dyn InferenceClient>,
}

fn demo_sources() -> Sources {
    Sources {
        devices: Arc::new(DemoDevices),
        processes: Arc::new(DemoProcessTable),
        runtime: Some(Arc::new(DemoContainerRuntime)),
        inference: Arc::new(DemoInferenceClient),
    }
}

fn live_sources(config: &AppConfig) -> Result<Sources> {
    let nvml = NvmlRepo::init()
        .map_err(|e| anyhow::anyhow!("{} (use --demo for synthetic data)", e))?;
    let runtime: Option<Arc<dyn ContainerRuntime>> = if config.containers.enabled {
        match DockerRepo::connect() {
            Ok(repo) => Some(Arc::new(repo)),
            Err(e) => {
                tracing::warn!(error = %e, operation = "docker_connect", "Container correlation disabled");
                None
            }
        }
    } else {
        None
    };
    let inference = HttpTritonClient::new(Duration::from_millis(config.inference.probe_timeout_ms))?;
    Ok(Sources {
        devices: Arc::new(nvml),
        processes: Arc::new(SysinfoProcessTable::new()),
        runtime,
        inference: Arc::new(inference),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let app_config = AppConfig::load(cli.config.as_deref())?;
    init_tracing(&cli, &app_config)?;

    let sources = if cli.demo {
        demo_sources()
    } else {
        live_sources(&app_config)?
    };
    tracing::info!(demo = cli.demo, query = cli.query, "gtop {} starting", version::VERSION);

    let prober = app_config
        .inference
        .enabled
        .then(|| Arc::new(InferenceProber::new(sources.inference.clone(), &app_config.inference)));
    let correlator = ContainerCorrelator::new(
        sources.runtime.clone(),
        app_config.containers.markers.clone(),
    );
    let assembler = Assembler::new(
        sources.devices.clone(),
        sources.processes.clone(),
        correlator,
        prober.clone(),
        Duration::from_millis(app_config.monitoring.assembly_budget_ms),
    );

    if cli.query {
        let snapshot = assembler.without_probing().assemble(1).await;
        let document = ExportDocument::from_snapshot(&snapshot);
        println!("{}", document.to_json_pretty()?);
        return Ok(());
    }

    let header = {
        let devices = sources.devices.clone();
        let processes = sources.processes.clone();
        let (driver, host) = tokio::task::spawn_blocking(move || {
            (devices.driver_info(), processes.host_info())
        })
        .await?;
        let host = match host {
            Ok(h) => Some(h.summary()),
            Err(e) => {
                tracing::warn!(error = %e, operation = "host_info", "host info unavailable");
                None
            }
        };
        let mut title = version::title();
        if cli.demo {
            title.push_str(" [DEMO]");
        }
        ui::Header {
            title,
            driver: driver.map(|d| d.summary()),
            host,
        }
    };

    let (tx, rx) = worker::snapshot_channel();
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let worker_handle = worker::spawn(
        worker::WorkerDeps {
            assembler: Arc::new(assembler),
            tx,
            shutdown_rx,
        },
        worker::WorkerConfig {
            tick_interval_ms: app_config.monitoring.tick_interval_ms,
            stats_log_interval_secs: app_config.monitoring.stats_log_interval_secs,
        },
    );

    let details = Arc::new(DetailService::new(
        sources.processes.clone(),
        prober,
        app_config.detail.limits(),
        Duration::from_millis(app_config.detail.timeout_ms),
    ));
    let ui_result = tokio::task::spawn_blocking(move || {
        ui::run(ui::App {
            rx,
            details,
            header,
        })
    })
    .await;

    let _ = shutdown_tx.send(());
    if let Err(e) = worker_handle.await {
        tracing::warn!(error = %e, "worker task failed");
    }
    ui_result??;
    tracing::info!("gtop exiting");
    Ok(())
}
