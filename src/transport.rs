//! MQTT chat bridge.
//!
//! The bot never speaks to a chat network directly; a bridge publishes each
//! user's messages to `{bot_id}/chats/{chat_id}/in` and relays anything the
//! bot publishes on `{bot_id}/chats/{chat_id}/out` back to that chat. The
//! chat id doubles as the owner identity everywhere else in the crate.

use rand::Rng;
use rumqttc::{AsyncClient, EventLoop, MqttOptions, QoS};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::config::MqttConfig;
use crate::error::BotError;

/// Message from a chat user to the bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub chat_id: String,
    pub text: String,
}

/// Wire payload on the in/out topics.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatPayload {
    text: String,
}

#[derive(Clone)]
pub struct ChatTransport {
    client: AsyncClient,
    bot_id: String,
}

impl ChatTransport {
    pub fn new(config: &MqttConfig, bot_id: String) -> (Self, EventLoop) {
        let mut mqttoptions = MqttOptions::new(
            format!("lumenbot-{}", bot_id),
            &config.broker,
            config.port,
        );
        mqttoptions.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);

        (Self { client, bot_id }, eventloop)
    }

    /// Subscribe to every chat's inbound topic.
    pub async fn subscribe(&self) -> Result<(), BotError> {
        self.client
            .subscribe(format!("{}/chats/+/in", self.bot_id), QoS::AtLeastOnce)
            .await?;
        info!(bot_id = %self.bot_id, "subscribed to chat topics");
        Ok(())
    }

    /// Send a text reply to one chat.
    pub async fn send(&self, chat_id: &str, text: &str) -> Result<(), BotError> {
        let payload = serde_json::to_vec(&ChatPayload {
            text: text.to_string(),
        })
        .map_err(|e| BotError::External(e.to_string()))?;
        self.client
            .publish(
                format!("{}/chats/{}/out", self.bot_id, chat_id),
                QoS::AtLeastOnce,
                false,
                payload,
            )
            .await?;
        Ok(())
    }

    /// Publish a pairing code the bridge shows to the user linking the bot to
    /// the chat network. Retained so a bridge that connects late still sees it.
    pub async fn announce_pairing(&self) -> Result<String, BotError> {
        let code = pairing_code();
        self.client
            .publish(
                format!("{}/pairing", self.bot_id),
                QoS::AtLeastOnce,
                true,
                code.clone(),
            )
            .await?;
        info!(code = %code, "pairing code published");
        Ok(code)
    }
}

/// Extract the chat id and text from an inbound publish.
pub fn parse_inbound(topic: &str, payload: &[u8]) -> Result<InboundMessage, BotError> {
    let mut parts = topic.split('/');
    let chat_id = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(_bot), Some("chats"), Some(chat_id), Some("in")) if !chat_id.is_empty() => {
            chat_id.to_string()
        }
        _ => {
            return Err(BotError::External(format!(
                "unexpected chat topic: {}",
                topic
            )))
        }
    };
    let parsed: ChatPayload =
        serde_json::from_slice(payload).map_err(|e| BotError::External(e.to_string()))?;
    Ok(InboundMessage {
        chat_id,
        text: parsed.text,
    })
}

/// Eight random digits, enough for a human to copy into the bridge UI.
fn pairing_code() -> String {
    let mut rng = rand::thread_rng();
    (0..8).map(|_| rng.gen_range(0..10).to_string()).collect()
}
