use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod config;

#[derive(Parser)]
#[command(name = "manifold", about = "Aggregation proxy for catalog add-ons")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(long, short, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing();

    let config = match config::Config::from_file(&cli.config) {
        Ok(config) => config,
        Err(error) => {
            tracing::error!(path = %cli.config.display(), error = %error, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    if let Err(error) = config.aggregator.validate() {
        tracing::error!(error = %error, "invalid configuration");
        return ExitCode::FAILURE;
    }

    if let Some(metrics_config) = &config.metrics {
        match install_statsd(metrics_config) {
            Ok(()) => shared::metrics::describe(),
            Err(error) => {
                tracing::warn!(error = %error, "statsd exporter not installed, metrics disabled");
            }
        }
    }

    if let Err(error) = aggregator::run(config.aggregator).await {
        tracing::error!(error = %error, "server exited with error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn install_statsd(config: &config::MetricsConfig) -> Result<(), String> {
    let recorder = metrics_exporter_statsd::StatsdBuilder::from(
        config.statsd_host.as_str(),
        config.statsd_port,
    )
    .build(Some("manifold"))
    .map_err(|e| e.to_string())?;
    metrics::set_global_recorder(recorder).map_err(|e| e.to_string())?;
    Ok(())
}
