//! Mail dispatch collaborator.
//!
//! The core only needs `send(to, subject, body)`; delivery transport is
//! someone else's problem. The production dispatcher posts to an HTTP mail
//! API; the log dispatcher stands in when no API is configured; the memory
//! dispatcher records messages for tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

#[async_trait]
pub trait MailDispatcher: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MailAddress {
    email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMailBody {
    sender: MailAddress,
    to: Vec<MailAddress>,
    subject: String,
    text_content: String,
}

/// Dispatcher backed by a JSON-over-HTTP transactional mail API.
pub struct HttpMailDispatcher {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    sender: String,
}

impl HttpMailDispatcher {
    pub fn new(endpoint: String, api_key: String, sender: String) -> Self {
        Self { client: reqwest::Client::new(), endpoint, api_key, sender }
    }

    /// Build from `FILEGATE_MAIL_API_URL`, `FILEGATE_MAIL_API_KEY` and
    /// `FILEGATE_MAIL_SENDER`. Returns None unless all three are set.
    pub fn from_env() -> Option<Self> {
        let endpoint = std::env::var("FILEGATE_MAIL_API_URL").ok()?;
        let api_key = std::env::var("FILEGATE_MAIL_API_KEY").ok()?;
        let sender = std::env::var("FILEGATE_MAIL_SENDER").ok()?;
        if endpoint.trim().is_empty() || api_key.trim().is_empty() || sender.trim().is_empty() {
            return None;
        }
        Some(Self::new(endpoint, api_key, sender))
    }
}

#[async_trait]
impl MailDispatcher for HttpMailDispatcher {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        let payload = SendMailBody {
            sender: MailAddress { email: self.sender.clone() },
            to: vec![MailAddress { email: to.to_string() }],
            subject: subject.to_string(),
            text_content: body.to_string(),
        };
        let resp = self
            .client
            .post(&self.endpoint)
            .header("api-key", &self.api_key)
            .json(&payload)
            .send()
            .await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let detail = resp.text().await.unwrap_or_default();
        anyhow::bail!("mail send failed (status={status}): {detail}")
    }
}

/// Dev fallback: logs the message instead of delivering it.
pub struct LogMailDispatcher;

#[async_trait]
impl MailDispatcher for LogMailDispatcher {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        info!(target: "filegate::mail", "mail (log only) to={} subject={:?} body={:?}", to, subject, body);
        Ok(())
    }
}

/// Records every message; tests pull codes back out of `sent`.
#[derive(Default)]
pub struct MemoryMailDispatcher {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl MemoryMailDispatcher {
    pub fn last_to(&self, to: &str) -> Option<(String, String, String)> {
        self.sent.lock().iter().rev().find(|(t, _, _)| t == to).cloned()
    }
}

#[async_trait]
impl MailDispatcher for MemoryMailDispatcher {
    async fn send(&self, to: &str, subject: &str, body: &str) -> anyhow::Result<()> {
        self.sent
            .lock()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_dispatcher_records_in_order() {
        let m = MemoryMailDispatcher::default();
        m.send("a@x.com", "s1", "b1").await.unwrap();
        m.send("a@x.com", "s2", "b2").await.unwrap();
        let (_, subject, _) = m.last_to("a@x.com").unwrap();
        assert_eq!(subject, "s2");
        assert!(m.last_to("b@x.com").is_none());
    }
}
