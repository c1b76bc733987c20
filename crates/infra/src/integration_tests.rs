//! End-to-end tests for the export pipeline over a scripted transport.
//!
//! Tests: create → enqueue → poll → file → rows
//!
//! Verifies:
//! - Waits between polls follow the policy and stop at the first terminal status
//! - Downloaded files decode into typed activity rows
//! - Independent exports on one client do not interfere

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use tokio_util::sync::CancellationToken;

    use marketo_core::{
        ActivityExportFilter, ActivityExportRequest, ApiResponse, ExportFormat, ExportJob, ExportStatus,
    };

    use crate::jobs::testing::{RecordingSleeper, ScriptedTransport};
    use crate::jobs::{BulkActivityExport, RetryExecutor, RetryPolicy};
    use crate::rows::ActivityRecord;

    const FILE: &str = "\
marketoGUID,leadId,activityDate,activityTypeId,campaignId,primaryAttributeValueId,primaryAttributeValue,attributes
100,5001,2024-01-01T08:00:00Z,1,,,,
101,5002,2024-01-01T09:30:00Z,1,,,,
";

    fn request() -> ActivityExportRequest {
        ActivityExportRequest::new(
            ActivityExportFilter::created_between(
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            )
            .with_activity_types([1]),
        )
    }

    fn lifecycle(id: &str, polls: &[ExportStatus]) -> ScriptedTransport {
        let mut transport = ScriptedTransport::new()
            .reply_job("create.json", id, ExportStatus::Created)
            .reply_job("enqueue.json", id, ExportStatus::Queued)
            .reply_job("cancel.json", id, ExportStatus::Cancelled)
            .reply_text("file.json", FILE);
        for status in polls {
            transport = transport.reply_job("status.json", id, *status);
        }
        transport
    }

    fn setup(
        transport: ScriptedTransport,
    ) -> (Arc<ScriptedTransport>, BulkActivityExport<ScriptedTransport>, Arc<RecordingSleeper>) {
        let transport = Arc::new(transport);
        let sleeper = Arc::new(RecordingSleeper::default());
        let export = BulkActivityExport::new(transport.clone())
            .with_retry(RetryExecutor::new(RetryPolicy::default()).with_sleeper(sleeper.clone()));
        (transport, export, sleeper)
    }

    #[tokio::test]
    async fn processing_then_completed_waits_once() {
        let (transport, export, sleeper) =
            setup(lifecycle("EXP1", &[ExportStatus::Processing, ExportStatus::Completed]));

        let id = export
            .queue_and_wait_until_complete(&request(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(id.as_str(), "EXP1");
        assert_eq!(sleeper.calls(), vec![Duration::from_secs(30)]);
        assert_eq!(transport.count("status.json"), 2);
        assert_eq!(transport.count("cancel.json"), 0);
    }

    #[tokio::test]
    async fn k_running_polls_wait_k_times_within_the_cap() {
        for k in 0..=5usize {
            let mut polls = vec![ExportStatus::Queued; k];
            polls.push(ExportStatus::Completed);
            let (transport, export, sleeper) = setup(lifecycle("EXPK", &polls));

            export
                .queue_and_wait_until_complete(&request(), &CancellationToken::new())
                .await
                .unwrap();

            let waits = sleeper.calls();
            assert_eq!(waits.len(), k, "k = {k}");
            assert!(waits.iter().all(|d| *d <= Duration::from_secs(60)));
            assert!(waits.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(transport.count("cancel.json"), 0);
        }
    }

    #[tokio::test]
    async fn completed_export_decodes_into_activity_rows() {
        let (transport, export, _) = setup(lifecycle("EXP2", &[ExportStatus::Completed]));
        let request = request().with_options(Default::default());

        let id = export
            .queue_and_wait_until_complete(&request, &CancellationToken::new())
            .await
            .unwrap();
        let records: Vec<ActivityRecord> = export
            .trans_file_as(&id, request.format())
            .await
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].lead_id, 5001);
        assert_eq!(records[1].marketo_guid, "101");
        assert_eq!(transport.count("/EXP2/file.json"), 1);

        let lead_ids: Vec<String> = export
            .trans_file(&id, ExportFormat::Csv, |r| r[1].to_string())
            .await
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(lead_ids, vec!["5001", "5002"]);
    }

    #[tokio::test]
    async fn concurrent_exports_share_one_client() {
        let transport = ScriptedTransport::new()
            .reply_job("create.json", "EXPA", ExportStatus::Created)
            .reply_job("create.json", "EXPB", ExportStatus::Created)
            .reply("enqueue.json", ApiResponse::<ExportJob>::ok(vec![]))
            .reply_job("status.json", "EXPA", ExportStatus::Completed);
        let (transport, export, _) = setup(transport);

        let other = export.clone();
        let cancel = CancellationToken::new();
        let (req_a, req_b) = (request(), request());
        let (a, b) = tokio::join!(
            export.queue_and_wait_until_complete(&req_a, &cancel),
            other.queue_and_wait_until_complete(&req_b, &cancel),
        );

        let mut ids = vec![a.unwrap().to_string(), b.unwrap().to_string()];
        ids.sort();
        assert_eq!(ids, vec!["EXPA", "EXPB"]);
        assert_eq!(transport.count("/EXPA/enqueue.json"), 1);
        assert_eq!(transport.count("/EXPB/enqueue.json"), 1);
        assert_eq!(transport.count("/EXPA/status.json"), 1);
        assert_eq!(transport.count("/EXPB/status.json"), 1);
        assert_eq!(transport.count("cancel.json"), 0);
    }
}
