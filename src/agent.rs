use rumqttc::{Event, EventLoop, Packet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::dialog::{DialogStore, OwnerLocks};
use crate::horizon::LedgerGateway;
use crate::registry::WalletRegistry;
use crate::transport::{parse_inbound, ChatTransport};

/// The wallet bot: owns the registry, the dialog state, and the ledger
/// gateway. One instance serves every chat; per-owner locks keep messages
/// from the same user strictly ordered.
pub struct WalletAgent {
    pub config: Config,
    pub registry: Mutex<WalletRegistry>,
    pub dialogs: DialogStore,
    pub locks: OwnerLocks,
    pub ledger: Arc<dyn LedgerGateway>,
}

impl WalletAgent {
    pub fn new(config: Config, ledger: Arc<dyn LedgerGateway>) -> Result<Self, crate::error::BotError> {
        let registry = WalletRegistry::load(&config.registry_path)?;
        Ok(Self {
            config,
            registry: Mutex::new(registry),
            dialogs: DialogStore::new(),
            locks: OwnerLocks::new(),
            ledger,
        })
    }

    /// Main event loop: poll the chat bridge, spawn one task per inbound
    /// message. Messages from distinct owners run concurrently; the per-owner
    /// lock inside `handle_message` serializes same-owner traffic.
    pub async fn run(
        self: Arc<Self>,
        transport: ChatTransport,
        mut eventloop: EventLoop,
    ) -> Result<(), crate::error::BotError> {
        transport.subscribe().await?;
        transport.announce_pairing().await?;
        info!("agent ready, entering main loop");

        let mut heartbeat = tokio::time::interval(Duration::from_secs(300));

        loop {
            tokio::select! {
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        match parse_inbound(&publish.topic, &publish.payload) {
                            Ok(msg) => {
                                let agent = self.clone();
                                let transport = transport.clone();
                                tokio::spawn(async move {
                                    let replies = agent.handle_message(&msg.chat_id, &msg.text).await;
                                    for reply in replies {
                                        if let Err(e) = transport.send(&msg.chat_id, &reply).await {
                                            warn!(chat_id = %msg.chat_id, error = %e, "failed to send reply");
                                        }
                                    }
                                });
                            }
                            Err(e) => warn!(topic = %publish.topic, error = %e, "ignoring malformed inbound message"),
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("connected to MQTT broker");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "MQTT error, reconnecting...");
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                },
                _ = heartbeat.tick() => {
                    let wallets = self.registry.lock().await.len();
                    info!(wallets = wallets, "heartbeat");
                }
            }
        }
    }
}
