use clap::Parser;
use std::sync::Arc;
use tracing::info;

use lumenbot::agent::WalletAgent;
use lumenbot::config::Config;
use lumenbot::horizon::HorizonGateway;
use lumenbot::transport::ChatTransport;

/// LumenBot - custodial Stellar wallet bot over chat
#[derive(Parser, Debug)]
#[command(name = "lumenbot", version, about)]
struct Args {
    /// Path to the TOML config file (defaults apply if absent)
    #[arg(short, long, default_value = "lumenbot.toml")]
    config: String,

    /// Bot ID override (also the MQTT topic prefix)
    #[arg(short, long)]
    id: Option<String>,

    /// MQTT broker address override
    #[arg(short, long)]
    broker: Option<String>,
}

#[tokio::main(flavor = "current_thread")] // One chat bot, no need for a thread pool
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    let mut config = if std::path::Path::new(&args.config).exists() {
        Config::from_file(&args.config)?
    } else {
        Config::default()
    };
    if let Some(id) = args.id {
        config.bot_id = id;
    }
    if let Some(broker) = args.broker {
        config.mqtt.broker = broker;
    }

    info!(
        bot_id = %config.bot_id,
        broker = %config.mqtt.broker,
        horizon = %config.horizon.url,
        "LumenBot starting"
    );

    let (transport, eventloop) = ChatTransport::new(&config.mqtt, config.bot_id.clone());
    let ledger = Arc::new(HorizonGateway::new(config.horizon.clone()));
    let agent = Arc::new(WalletAgent::new(config, ledger)?);

    agent.run(transport, eventloop).await?;
    Ok(())
}
