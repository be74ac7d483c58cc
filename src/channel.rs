// 📣 Channel - where formatted menus are posted (and later deleted)
// The core only needs send + delete; Telegram is one implementation

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

// ============================================================================
// CORE TYPES
// ============================================================================

/// Opaque identifier the channel hands back for a posted message
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        MessageId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for MessageId {
    fn from(id: i64) -> Self {
        MessageId(id.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Channel rejected request: {0}")]
    Rejected(String),

    #[error("Response carried no message id")]
    MissingMessageId,

    #[error("Invalid message id for this channel: {0}")]
    InvalidMessageId(MessageId),
}

/// Channel - blocking send/delete against the remote service.
///
/// No retries and no timeouts are imposed here; adapters configure their
/// own client timeouts.
pub trait Channel {
    fn send(&self, text: &str) -> Result<MessageId, ChannelError>;

    fn delete(&self, message_id: &MessageId) -> Result<(), ChannelError>;
}

// ============================================================================
// DRY RUN
// ============================================================================

/// Logs instead of posting. Hands out fresh UUIDs as message ids so the
/// ledger can be exercised end to end without a bot token.
#[derive(Debug, Default, Clone)]
pub struct DryRunChannel;

impl Channel for DryRunChannel {
    fn send(&self, text: &str) -> Result<MessageId, ChannelError> {
        let id = MessageId::new(uuid::Uuid::new_v4().to_string());
        info!(message_id = %id, "[dry-run] would send:\n{}", text);
        Ok(id)
    }

    fn delete(&self, message_id: &MessageId) -> Result<(), ChannelError> {
        info!(message_id = %message_id, "[dry-run] would delete");
        Ok(())
    }
}

// ============================================================================
// TELEGRAM
// ============================================================================

#[cfg(feature = "http")]
pub use telegram::TelegramChannel;

#[cfg(feature = "http")]
mod telegram {
    use super::{Channel, ChannelError, MessageId};
    use serde::Deserialize;
    use std::time::Duration;
    use tracing::{debug, warn};

    const API_BASE: &str = "https://api.telegram.org";

    /// Bot API envelope: `{"ok": true, "result": ...}` or
    /// `{"ok": false, "description": "..."}`
    #[derive(Debug, Deserialize)]
    struct ApiResponse<T> {
        ok: bool,
        result: Option<T>,
        description: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    struct SentMessage {
        message_id: Option<i64>,
    }

    /// Posts HTML-formatted messages to one chat via the Bot API
    pub struct TelegramChannel {
        http: reqwest::blocking::Client,
        base_url: String,
        chat_id: String,
    }

    impl TelegramChannel {
        pub fn new(token: &str, chat_id: impl Into<String>) -> anyhow::Result<Self> {
            let http = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

            Ok(TelegramChannel {
                http,
                base_url: format!("{}/bot{}", API_BASE, token),
                chat_id: chat_id.into(),
            })
        }

        fn call<T: serde::de::DeserializeOwned>(
            &self,
            method: &str,
            form: &[(&str, &str)],
        ) -> Result<T, ChannelError> {
            let url = format!("{}/{}", self.base_url, method);
            let response = self
                .http
                .post(&url)
                .form(form)
                .send()
                .map_err(|e| ChannelError::Network(e.without_url().to_string()))?;

            let status = response.status();
            let body: ApiResponse<T> = response
                .json()
                .map_err(|e| ChannelError::Rejected(format!("HTTP {}: {}", status, e)))?;

            if !body.ok {
                let description = body.description.unwrap_or_else(|| format!("HTTP {}", status));
                return Err(ChannelError::Rejected(description));
            }

            body.result
                .ok_or_else(|| ChannelError::Rejected(format!("{} returned no result", method)))
        }
    }

    impl Channel for TelegramChannel {
        fn send(&self, text: &str) -> Result<MessageId, ChannelError> {
            let sent: SentMessage = self.call(
                "sendMessage",
                &[
                    ("chat_id", self.chat_id.as_str()),
                    ("text", text),
                    ("parse_mode", "HTML"),
                ],
            )?;

            let id = sent.message_id.ok_or(ChannelError::MissingMessageId)?;
            debug!(message_id = id, "Telegram accepted message");
            Ok(MessageId::from(id))
        }

        fn delete(&self, message_id: &MessageId) -> Result<(), ChannelError> {
            // Telegram ids are integers; anything else was never ours
            if message_id.as_str().parse::<i64>().is_err() {
                warn!(message_id = %message_id, "Refusing to delete non-numeric message id");
                return Err(ChannelError::InvalidMessageId(message_id.clone()));
            }

            let _: bool = self.call(
                "deleteMessage",
                &[
                    ("chat_id", self.chat_id.as_str()),
                    ("message_id", message_id.as_str()),
                ],
            )?;
            Ok(())
        }
    }
}

// ============================================================================
// TEST DOUBLE
// ============================================================================

#[cfg(test)]
pub mod fake {
    use super::{Channel, ChannelError, MessageId};
    use std::cell::RefCell;
    use std::collections::HashSet;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    pub struct Calls {
        pub sent: Vec<String>,
        pub deleted: Vec<MessageId>,
        pub failing_sends: usize,
        pub failing_deletes: HashSet<MessageId>,
        next_id: i64,
    }

    /// Records every call. Clones share state so a test can keep a handle
    /// after moving the channel into a component.
    #[derive(Debug, Default, Clone)]
    pub struct RecordingChannel {
        pub calls: Rc<RefCell<Calls>>,
    }

    impl RecordingChannel {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make the next `n` sends fail
        pub fn fail_next_sends(&self, n: usize) {
            self.calls.borrow_mut().failing_sends = n;
        }

        pub fn fail_delete_of(&self, id: &MessageId) {
            self.calls.borrow_mut().failing_deletes.insert(id.clone());
        }

        pub fn sent(&self) -> Vec<String> {
            self.calls.borrow().sent.clone()
        }

        pub fn deleted(&self) -> Vec<MessageId> {
            self.calls.borrow().deleted.clone()
        }
    }

    impl Channel for RecordingChannel {
        fn send(&self, text: &str) -> Result<MessageId, ChannelError> {
            let mut calls = self.calls.borrow_mut();
            calls.sent.push(text.to_string());
            if calls.failing_sends > 0 {
                calls.failing_sends -= 1;
                return Err(ChannelError::Network("connection reset".into()));
            }
            calls.next_id += 1;
            Ok(MessageId::from(100 + calls.next_id))
        }

        fn delete(&self, message_id: &MessageId) -> Result<(), ChannelError> {
            let mut calls = self.calls.borrow_mut();
            calls.deleted.push(message_id.clone());
            if calls.failing_deletes.contains(message_id) {
                return Err(ChannelError::Rejected("message to delete not found".into()));
            }
            Ok(())
        }
    }
}
