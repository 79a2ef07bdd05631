use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use map_approvalbot::config;
use map_approvalbot::forms::FormsClient;
use map_approvalbot::mail::SmtpMailer;
use map_approvalbot::maps::GoogleMapsClient;
use map_approvalbot::server;
use map_approvalbot::slack::SlackClient;
use map_approvalbot::workflow::Workflow;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;

    let forms = Arc::new(FormsClient::from_config(&cfg.forms)?);
    let slack = Arc::new(SlackClient::from_config(&cfg.slack));
    let maps = Arc::new(GoogleMapsClient::new(cfg.maps.api_key.clone()));
    let mail = Arc::new(SmtpMailer::from_config(&cfg.smtp)?);

    let workflow = Arc::new(Workflow::new(forms, slack, maps, mail, cfg.forms.clone()));

    info!("starting approval relay");
    server::serve(&cfg.server.bind, workflow).await
}
