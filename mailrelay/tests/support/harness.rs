//! End-to-end test harness for mailrelay

use std::path::{Path, PathBuf};

use mailrelay::{Controller, Mailrelay};
use mailrelay_delivery::QueueRecord;
use tempfile::TempDir;

pub const BUCKET: &str = "inbound-mail";
pub const QUEUE_ARN: &str = "arn:aws:sqs:eu-west-1:123456789012:inbound";

/// A file-backed deployment rooted in a temporary directory
pub struct E2ETestHarness {
    dir: TempDir,
    controller: Controller,
}

impl E2ETestHarness {
    /// Build a deployment whose destination table maps the given pairs
    pub fn new(mappings: &[(&str, &str)]) -> anyhow::Result<Self> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("objects").join(BUCKET))?;

        let mappings = mappings
            .iter()
            .map(|(identity, destination)| format!("{identity:?}: [{destination:?}]"))
            .collect::<Vec<_>>()
            .join(", ");

        let config = format!(
            r#"Mailrelay(
                sender: "Mail Relay <forwarder@relay.example>",
                processing_timeout_secs: 60,
                max_concurrent_records: 2,
                ledger: (table: "dedupe", store: File(path: {ledger:?})),
                destinations: Table(table: "forwarding", mappings: {{ {mappings} }}),
                objects: File(root: {objects:?}),
                transport: Outbox(path: {outbox:?}),
            )"#,
            ledger = dir.path().join("ledger"),
            objects = dir.path().join("objects"),
            outbox = dir.path().join("outbox"),
        );

        let controller = Controller::new(Mailrelay::from_ron(&config)?);
        Ok(Self { dir, controller })
    }

    pub const fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn outbox(&self) -> PathBuf {
        self.dir.path().join("outbox")
    }

    /// Store a raw message in the bucket and return a record announcing it
    pub fn store_email(&self, message_id: &str, raw: &str) -> anyhow::Result<QueueRecord> {
        let key = format!("{message_id}.eml");
        std::fs::write(self.dir.path().join("objects").join(BUCKET).join(&key), raw)?;
        Ok(record(message_id, &key))
    }

    /// Raw messages in the outbox, in no particular order
    pub fn sent(&self) -> anyhow::Result<Vec<String>> {
        read_with_extension(&self.outbox(), "eml")
    }
}

pub fn record(message_id: &str, key: &str) -> QueueRecord {
    let inner = serde_json::json!({
        "receipt": { "action": { "type": "S3", "bucketName": BUCKET, "objectKey": key } }
    });
    let body = serde_json::json!({ "Type": "Notification", "Message": inner.to_string() });

    QueueRecord {
        message_id: message_id.to_string(),
        receipt_handle: format!("rh-{message_id}"),
        event_source_arn: QUEUE_ARN.to_string(),
        body: body.to_string(),
    }
}

fn read_with_extension(dir: &Path, extension: &str) -> anyhow::Result<Vec<String>> {
    let mut contents = Vec::new();
    if !dir.exists() {
        return Ok(contents);
    }

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().is_some_and(|ext| ext == extension) {
            contents.push(std::fs::read_to_string(path)?);
        }
    }
    Ok(contents)
}
