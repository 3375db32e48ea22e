mod out;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::builder::FalseyValueParser;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tag_notify::broker::mock::RecordingBroker;
use tag_notify::broker::sns::SnsBroker;
use tag_notify::config::{BrokerSettings, MediaSettings};
use tag_notify::{ApiRequest, Broker, ChangeNotifier, StreamEvent, SubscriptionManager};

#[derive(Parser)]
#[command(name = "tag-notify", about = "Tag-filtered media notifications over SNS")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Publish notifications for a DynamoDB stream batch.
    Notify(RunArgs),
    /// Create an email subscription filtered by tags.
    Subscribe(RunArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Event JSON file. Reads stdin when omitted.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Record broker calls in memory instead of calling SNS.
    #[arg(long, env = "MOCK_MODE", value_parser = FalseyValueParser::new())]
    mock: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tag_notify=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let args = match &cli.command {
        Command::Notify(a) | Command::Subscribe(a) => a,
    };

    let settings = BrokerSettings::from_env()?;
    let media = match &cli.command {
        Command::Notify(_) => Some(MediaSettings::from_env()?),
        Command::Subscribe(_) => None,
    };
    let recorder = args.mock.then(|| Arc::new(RecordingBroker::new()));
    let broker: Arc<dyn Broker> = match &recorder {
        Some(r) => r.clone() as Arc<dyn Broker>,
        None => Arc::new(SnsBroker::connect(&settings.region).await) as Arc<dyn Broker>,
    };
    tracing::info!(
        topic = %settings.topic_arn,
        region = %settings.region,
        broker = broker.name(),
        "configuration loaded"
    );

    let raw = out::read_input(args.input.as_deref()).await?;
    let response = match media {
        Some(media) => {
            let event: StreamEvent =
                serde_json::from_str(&raw).context("input is not a stream event")?;
            ChangeNotifier::new(broker, &settings, media)
                .handle(event)
                .await
        }
        None => {
            let request: ApiRequest =
                serde_json::from_str(&raw).context("input is not an HTTP event")?;
            SubscriptionManager::new(broker, &settings)
                .handle(&request)
                .await
        }
    };

    out::emit_stdout(&response)?;
    if let Some(r) = recorder {
        out::emit_stdout(&r.snapshot())?;
    }

    if !response.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
