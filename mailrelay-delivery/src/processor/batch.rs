//! Concurrent handling of a queue event

use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::{
    error::ProcessingError,
    processor::Forwarder,
    record::{QueueEvent, QueueRecord},
    types::{BatchReport, Outcome, RecordReport},
};

type Handled = (usize, Result<Outcome, ProcessingError>);

impl Forwarder {
    /// Handle every record of `event`, up to `max_concurrent_records` at a
    /// time. Records are independent: one failing never affects another.
    pub async fn handle_event(self: &Arc<Self>, event: QueueEvent) -> BatchReport {
        let message_ids: Vec<String> = event
            .records
            .iter()
            .map(|record| record.message_id.clone())
            .collect();

        if message_ids.is_empty() {
            return BatchReport::default();
        }

        info!(
            records = message_ids.len(),
            max_concurrent = self.max_concurrent_records,
            "Processing queue event"
        );

        let mut results: Vec<Option<Result<Outcome, ProcessingError>>> =
            std::iter::repeat_with(|| None)
                .take(message_ids.len())
                .collect();
        let mut join_set: JoinSet<Handled> = JoinSet::new();
        let mut pending = event.records.into_iter().enumerate();

        for (index, record) in pending.by_ref().take(self.max_concurrent_records) {
            self.spawn_record(&mut join_set, index, record);
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    log_result(&message_ids[index], &result);
                    results[index] = Some(result);
                }
                Err(e) => error!(error = %e, "Record handler task failed"),
            }

            if let Some((index, record)) = pending.next() {
                self.spawn_record(&mut join_set, index, record);
            }
        }

        let records = message_ids
            .into_iter()
            .zip(results)
            .map(|(message_id, result)| RecordReport {
                message_id,
                result: result.unwrap_or_else(|| {
                    Err(ProcessingError::Internal(
                        "record handler did not complete".to_string(),
                    ))
                }),
            })
            .collect();

        let report = BatchReport { records };
        info!("Processed queue event: {report}");
        report
    }

    fn spawn_record(
        self: &Arc<Self>,
        join_set: &mut JoinSet<Handled>,
        index: usize,
        record: QueueRecord,
    ) {
        let forwarder = Arc::clone(self);
        join_set.spawn(async move { (index, forwarder.handle_record(&record).await) });
    }
}

fn log_result(message_id: &str, result: &Result<Outcome, ProcessingError>) {
    match result {
        Ok(_) => {}
        Err(e) if e.is_contended() => {
            info!(message_id, "Record left for redelivery: {e}");
        }
        Err(e) if e.is_permanent() => {
            error!(message_id, error = %e, "Record cannot be processed without intervention");
        }
        Err(e) => {
            warn!(message_id, error = %e, "Record failed and will be redelivered");
        }
    }
}
