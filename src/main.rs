use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use farmhand::config::Config;
use farmhand::coordinator::Coordinator;
use farmhand::report::{LogReport, ReportSink, WebhookReport};
use farmhand::transport::relay::RelayTransport;

#[derive(Parser, Debug)]
#[command(
    name = "farmhand",
    version,
    about = "Run work, collect and deposit across every configured account"
)]
struct Cli {
    /// TOML settings file (default: ~/.farmhand/config.toml)
    #[arg(long, env = "FARMHAND_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, env = "FARMHAND_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("farmhand=info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::from_env_with_toml(cli.config.as_deref())
        .context("failed to load configuration")?;

    let transport = RelayTransport::new(&config.relay, config.channel.channel_id.clone())
        .context("failed to build relay client")?;
    let report: Arc<dyn ReportSink> = match config.report.webhook_url.clone() {
        Some(url) => Arc::new(WebhookReport::new(url).context("failed to build webhook client")?),
        None => Arc::new(LogReport),
    };

    let coordinator = Coordinator::new(
        Arc::new(transport),
        config.session_settings(),
        config.retry,
        report,
    );
    let summary = coordinator.run_all(&config.accounts.credentials).await?;
    tracing::info!(
        succeeded = summary.tally.succeeded(),
        total = summary.tally.total(),
        "all accounts processed"
    );
    Ok(())
}
