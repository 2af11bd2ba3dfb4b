//! Alert delivery over the Telegram Bot HTTP API.
//!
//! Chat ids are a union of one seeded "home" chat (configured up front) and
//! any chat that has ever messaged the bot, discovered by periodically
//! polling `getUpdates`. Every broadcast fans out to the full set as it
//! stands at that moment.

use std::collections::HashSet;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;

#[async_trait]
pub trait Messenger: Send + Sync {
    /// Sends `text` to every known chat. Delivery failures to individual
    /// chats are logged and otherwise ignored — a single blocked or deleted
    /// chat must not suppress an alert to everyone else.
    async fn broadcast(&self, text: &str);

    /// Polls for new chats that have messaged the bot since the last call
    /// and folds their ids into the broadcast set.
    async fn refresh_chats(&self);
}

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    chat: Chat,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

pub struct TelegramMessenger {
    client: Client,
    token: String,
    chat_ids: Mutex<HashSet<i64>>,
    last_update_id: Mutex<Option<i64>>,
}

impl TelegramMessenger {
    pub fn new(client: Client, token: String, seed_chat_id: Option<i64>) -> Self {
        let mut chat_ids = HashSet::new();
        if let Some(id) = seed_chat_id {
            chat_ids.insert(id);
        }
        Self {
            client,
            token,
            chat_ids: Mutex::new(chat_ids),
            last_update_id: Mutex::new(None),
        }
    }

    fn base(&self) -> String {
        format!("https://api.telegram.org/bot{}", self.token)
    }
}

#[async_trait]
impl Messenger for TelegramMessenger {
    async fn broadcast(&self, text: &str) {
        let recipients: Vec<i64> = self.chat_ids.lock().iter().copied().collect();
        for chat_id in recipients {
            let url = format!("{}/sendMessage", self.base());
            let result = self
                .client
                .get(&url)
                .query(&[("chat_id", chat_id.to_string()), ("text", text.to_string())])
                .send()
                .await;
            if let Err(error) = result {
                tracing::warn!(%chat_id, %error, "failed to deliver telegram message");
            }
        }
    }

    async fn refresh_chats(&self) {
        let url = format!("{}/getUpdates", self.base());
        let offset = self.last_update_id.lock().map(|id| id + 1);

        let mut request = self.client.get(&url);
        if let Some(offset) = offset {
            request = request.query(&[("offset", offset)]);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(%error, "failed to poll telegram for updates");
                return;
            }
        };

        let body: UpdatesResponse = match response.json().await {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!(%error, "failed to decode telegram updates response");
                return;
            }
        };

        let mut max_update_id = None;
        let mut chat_ids = self.chat_ids.lock();
        for update in body.result {
            max_update_id = Some(update.update_id.max(max_update_id.unwrap_or(update.update_id)));
            if let Some(message) = update.message {
                chat_ids.insert(message.chat.id);
            }
        }
        drop(chat_ids);

        if let Some(max_update_id) = max_update_id {
            *self.last_update_id.lock() = Some(max_update_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_chat_id_is_present_from_construction() {
        let messenger = TelegramMessenger::new(Client::new(), "token".to_string(), Some(42));
        assert!(messenger.chat_ids.lock().contains(&42));
    }

    #[test]
    fn no_seed_starts_empty() {
        let messenger = TelegramMessenger::new(Client::new(), "token".to_string(), None);
        assert!(messenger.chat_ids.lock().is_empty());
    }
}
