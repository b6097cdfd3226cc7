//! Outbound mail dispatch

use std::{
    collections::VecDeque,
    fmt::Debug,
    path::{Component, Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use mailrelay_common::internal;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::fs;
use ulid::Ulid;

use crate::error::TransportError;

/// What the mail-sending service answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub status: u16,
    pub provider_message_id: String,
}

impl SendReceipt {
    /// A `200` receipt for `provider_message_id`
    pub fn accepted(provider_message_id: impl Into<String>) -> Self {
        Self {
            status: 200,
            provider_message_id: provider_message_id.into(),
        }
    }

    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Sends a fully rendered message. No duplicate suppression happens here.
#[async_trait]
pub trait MailTransport: Send + Sync + Debug {
    /// # Errors
    /// If the message could not be handed to the sending service
    async fn send_raw(
        &self,
        source: &str,
        destinations: &[String],
        raw: &[u8],
    ) -> Result<SendReceipt, TransportError>;
}

/// Envelope written alongside each outbox message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEnvelope {
    pub source: String,
    pub destinations: Vec<String>,
}

/// Drops messages into a directory for another process to pick up
///
/// Each message is stored as `{ulid}.eml` with its envelope in
/// `{ulid}.json`. The envelope is written first, and both go through a
/// temporary file and a rename, so a visible `.eml` is always complete.
#[derive(Debug, Clone)]
pub struct OutboxTransport {
    path: PathBuf,
}

impl<'de> Deserialize<'de> for OutboxTransport {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct OutboxTransportHelper {
            path: PathBuf,
        }

        let helper = OutboxTransportHelper::deserialize(deserializer)?;
        Self::new(helper.path).map_err(serde::de::Error::custom)
    }
}

impl OutboxTransport {
    /// # Errors
    /// If `path` is relative or contains `..`
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, TransportError> {
        let path = path.into();

        if !path.is_absolute() || path.components().any(|c| c == Component::ParentDir) {
            return Err(TransportError::Unavailable(format!(
                "Outbox path must be absolute without '..': {}",
                path.display()
            )));
        }

        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the outbox directory and remove partial writes from a crash
    ///
    /// # Errors
    /// If the directory cannot be created or cleaned
    pub fn init(&self) -> Result<(), TransportError> {
        internal!("Initialising outbox at {}", self.path.display());

        std::fs::create_dir_all(&self.path)?;
        for entry in std::fs::read_dir(&self.path)? {
            let entry = entry?;
            if entry.file_name().to_string_lossy().ends_with(".tmp") {
                std::fs::remove_file(entry.path())?;
            }
        }

        Ok(())
    }

    async fn write_atomically(&self, name: &str, data: &[u8]) -> Result<(), TransportError> {
        let temp = self.path.join(format!("{name}.tmp"));
        fs::write(&temp, data).await?;
        fs::rename(&temp, self.path.join(name)).await?;
        Ok(())
    }
}

#[async_trait]
impl MailTransport for OutboxTransport {
    async fn send_raw(
        &self,
        source: &str,
        destinations: &[String],
        raw: &[u8],
    ) -> Result<SendReceipt, TransportError> {
        if destinations.is_empty() {
            return Err(TransportError::Rejected("no destinations".to_string()));
        }

        let id = Ulid::new();
        let envelope = OutboxEnvelope {
            source: source.to_string(),
            destinations: destinations.to_vec(),
        };
        let envelope = serde_json::to_vec(&envelope)
            .map_err(|e| TransportError::Rejected(e.to_string()))?;

        self.write_atomically(&format!("{id}.json"), &envelope).await?;
        self.write_atomically(&format!("{id}.eml"), raw).await?;

        Ok(SendReceipt::accepted(id.to_string()))
    }
}

/// A message accepted by [`MemoryTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub source: String,
    pub destinations: Vec<String>,
    pub raw: Vec<u8>,
}

#[derive(Debug)]
enum Scripted {
    Fail(TransportError),
    Status(u16),
}

/// Records sent messages in memory; failures can be queued up front
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    script: Arc<Mutex<VecDeque<Scripted>>>,
}

impl MemoryTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next send fail with `error`
    pub fn fail_next(&self, error: TransportError) {
        self.script.lock().push_back(Scripted::Fail(error));
    }

    /// Make the next send return a receipt with `status` without recording
    /// the message
    pub fn respond_next_with(&self, status: u16) {
        self.script.lock().push_back(Scripted::Status(status));
    }

    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl MailTransport for MemoryTransport {
    async fn send_raw(
        &self,
        source: &str,
        destinations: &[String],
        raw: &[u8],
    ) -> Result<SendReceipt, TransportError> {
        let scripted = self.script.lock().pop_front();

        match scripted {
            Some(Scripted::Fail(error)) => return Err(error),
            Some(Scripted::Status(status)) => {
                return Ok(SendReceipt {
                    status,
                    provider_message_id: String::new(),
                });
            }
            None => {}
        }

        let mut sent = self.sent.lock();
        sent.push(SentMessage {
            source: source.to_string(),
            destinations: destinations.to_vec(),
            raw: raw.to_vec(),
        });

        Ok(SendReceipt::accepted(format!("memory-{}", sent.len())))
    }
}

/// Where forwarded messages go
#[derive(Debug, Clone, Deserialize)]
pub enum TransportConfig {
    Outbox(OutboxTransport),
}

impl TransportConfig {
    /// # Errors
    /// If the transport cannot be prepared
    pub fn into_transport(self) -> Result<Arc<dyn MailTransport>, TransportError> {
        match self {
            Self::Outbox(outbox) => {
                outbox.init()?;
                Ok(Arc::new(outbox))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use pretty_assertions::assert_eq;

    use super::*;

    fn destinations() -> Vec<String> {
        vec!["c@z.com".to_string()]
    }

    #[test]
    fn test_receipt_status() {
        assert!(SendReceipt::accepted("x").is_success());
        for status in [199, 300, 400, 503] {
            let receipt = SendReceipt {
                status,
                provider_message_id: String::new(),
            };
            assert!(!receipt.is_success(), "{status}");
        }
    }

    #[tokio::test]
    async fn test_outbox_writes_message_and_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = OutboxTransport::new(dir.path().join("outbox")).unwrap();
        outbox.init().unwrap();

        let receipt = outbox
            .send_raw("fwd@relay.example", &destinations(), b"Subject: x\r\n\r\nhi")
            .await
            .unwrap();
        assert!(receipt.is_success());

        let id = &receipt.provider_message_id;
        assert!(id.parse::<Ulid>().is_ok());

        let eml = std::fs::read(outbox.path().join(format!("{id}.eml"))).unwrap();
        assert_eq!(eml, b"Subject: x\r\n\r\nhi");

        let envelope: OutboxEnvelope = serde_json::from_slice(
            &std::fs::read(outbox.path().join(format!("{id}.json"))).unwrap(),
        )
        .unwrap();
        assert_eq!(envelope.source, "fwd@relay.example");
        assert_eq!(envelope.destinations, destinations());
    }

    #[tokio::test]
    async fn test_outbox_rejects_empty_destinations() {
        let dir = tempfile::tempdir().unwrap();
        let outbox = OutboxTransport::new(dir.path()).unwrap();
        assert!(matches!(
            outbox.send_raw("fwd@relay.example", &[], b"").await,
            Err(TransportError::Rejected(_))
        ));
    }

    #[test]
    fn test_outbox_init_cleans_partial_writes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("01J.eml.tmp"), b"partial").unwrap();

        OutboxTransport::new(dir.path()).unwrap().init().unwrap();
        assert!(!dir.path().join("01J.eml.tmp").exists());
    }

    #[test]
    fn test_outbox_config() {
        let config: TransportConfig = ron::from_str("Outbox(path: \"/var/spool/mailrelay\")").unwrap();
        let TransportConfig::Outbox(outbox) = config;
        assert_eq!(outbox.path(), Path::new("/var/spool/mailrelay"));

        assert!(ron::from_str::<TransportConfig>("Outbox(path: \"outbox\")").is_err());
    }

    #[tokio::test]
    async fn test_memory_transport_script() {
        let transport = MemoryTransport::new();
        transport.fail_next(TransportError::Unavailable("throttled".to_string()));
        transport.respond_next_with(503);

        assert!(transport.send_raw("s", &destinations(), b"1").await.is_err());
        assert_eq!(
            transport.send_raw("s", &destinations(), b"2").await.unwrap().status,
            503
        );
        assert_eq!(transport.sent_count(), 0);

        let receipt = transport.send_raw("s", &destinations(), b"3").await.unwrap();
        assert_eq!(receipt.provider_message_id, "memory-1");
        assert_eq!(transport.sent()[0].raw, b"3");
    }

    #[tokio::test]
    async fn test_memory_transport_script_survives_panicking_holder() {
        let transport = MemoryTransport::new();

        let script = Arc::clone(&transport.script);
        let panicked = std::thread::spawn(move || {
            let _guard = script.lock();
            panic!("holder panicked");
        })
        .join();
        assert!(panicked.is_err());

        transport.fail_next(TransportError::Unavailable("throttled".to_string()));
        assert!(matches!(
            transport.send_raw("s", &destinations(), b"1").await,
            Err(TransportError::Unavailable(_))
        ));

        transport.send_raw("s", &destinations(), b"2").await.unwrap();
        assert_eq!(transport.sent_count(), 1);
    }
}
