use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use trainwatch::alert::{AlertProcessor, JsonFileLedger, SentLedger};
use trainwatch::fields::Field;
use trainwatch::store::{Record, TRAININGS};
use trainwatch::testing::fixtures::builders::RecordBuilder;
use trainwatch::testing::{test_config, MemoryLedger, MemoryStore, RecordingMailer};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

fn upcoming(id: &str, date: &str, recipients: &str) -> RecordBuilder {
    RecordBuilder::new(id)
        .field(Field::TrainingTitle, format!("Capacitación {id}"))
        .field(Field::TrainingDate, date)
        .field(Field::TrainingActive, true)
        .field(Field::TrainingFinalized, false)
        .field(Field::AlertRecipients, recipients)
}

fn trainings() -> Vec<Record> {
    vec![
        // due in 3 days with the default 7-day lead
        upcoming("T1", "2024-06-13", "ana@h.org, luis@h.org").build(),
        // 10 days out, but its own lead is 14 days
        upcoming("T2", "2024-06-20", "eva@h.org")
            .field(Field::AlertLeadDays, 14)
            .build(),
        // too far out for the default lead
        upcoming("T3", "2024-06-25", "ana@h.org").build(),
        // already happened
        upcoming("T4", "2024-06-09", "ana@h.org").build(),
        // finalized
        upcoming("T5", "2024-06-12", "ana@h.org")
            .field(Field::TrainingFinalized, true)
            .build(),
        // no recipients
        upcoming("T6", "2024-06-12", "").build(),
    ]
}

#[tokio::test]
async fn test_due_trainings_are_alerted_once_per_day() {
    let store = Arc::new(MemoryStore::new().with_table(TRAININGS, trainings()));
    let mailer = Arc::new(RecordingMailer::new());
    let ledger = Arc::new(MemoryLedger::new());
    let processor =
        AlertProcessor::new(store, mailer.clone(), ledger.clone(), &test_config()).unwrap();

    let summary = processor.run(day(10)).await.unwrap();
    let due: Vec<_> = summary.due.iter().map(|d| d.training_id.as_str()).collect();
    assert_eq!(due, vec!["T1", "T2"]);
    assert_eq!(summary.candidates, 4);
    assert_eq!(summary.sent.len(), 3);
    assert!(summary.failed.is_empty());

    let sent = mailer.sent().await;
    assert_eq!(sent.len(), 3);
    assert!(sent[0].subject.contains("Capacitación T1"));
    assert!(sent[0].html.contains("en 3 días"));

    let again = processor.run(day(10)).await.unwrap();
    assert!(again.sent.is_empty());
    assert_eq!(again.skipped.len(), 3);
    assert_eq!(mailer.sent().await.len(), 3);

    let next_day = processor.run(day(11)).await.unwrap();
    assert_eq!(next_day.sent.len(), 3);
}

#[tokio::test]
async fn test_failed_recipient_does_not_block_others() {
    let store = Arc::new(MemoryStore::new().with_table(TRAININGS, trainings()));
    let mailer = Arc::new(RecordingMailer::new().failing_for("ana@h.org"));
    let ledger = Arc::new(MemoryLedger::new());
    let processor =
        AlertProcessor::new(store, mailer.clone(), ledger.clone(), &test_config()).unwrap();

    let summary = processor.run(day(10)).await.unwrap();
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].recipient, "ana@h.org");
    assert_eq!(summary.sent.len(), 2);

    // the failed pair is not marked as sent, so a retry the same day sends it
    assert_eq!(ledger.last_sent("T1", "ana@h.org").await.unwrap(), None);
    assert_eq!(ledger.recorded().await, 2);
}

#[tokio::test]
async fn test_file_ledger_dedups_across_runs() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("alerts.json");
    let store = Arc::new(MemoryStore::new().with_table(TRAININGS, trainings()));
    let mailer = Arc::new(RecordingMailer::new());

    // each scheduled invocation opens the ledger afresh
    for _ in 0..2 {
        let ledger = Arc::new(JsonFileLedger::open(&path).await.unwrap());
        let processor =
            AlertProcessor::new(store.clone(), mailer.clone(), ledger, &test_config()).unwrap();
        processor.run(day(10)).await.unwrap();
    }

    assert_eq!(mailer.sent().await.len(), 3);
    let ledger = JsonFileLedger::open(&path).await.unwrap();
    assert_eq!(
        ledger.last_sent("T2", "EVA@h.org").await.unwrap(),
        Some(day(10))
    );
}

#[tokio::test]
async fn test_long_lived_ledger_sees_sends_from_another_process() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("alerts.json");
    let store = Arc::new(MemoryStore::new().with_table(TRAININGS, trainings()));
    let mailer = Arc::new(RecordingMailer::new());

    // the server opens its ledger at startup, before the scheduled run
    let server_ledger = Arc::new(JsonFileLedger::open(&path).await.unwrap());
    let cron_ledger = Arc::new(JsonFileLedger::open(&path).await.unwrap());

    let cron =
        AlertProcessor::new(store.clone(), mailer.clone(), cron_ledger, &test_config()).unwrap();
    assert_eq!(cron.run(day(10)).await.unwrap().sent.len(), 3);

    let server = AlertProcessor::new(
        store.clone(),
        mailer.clone(),
        server_ledger.clone(),
        &test_config(),
    )
    .unwrap();
    let again = server.run(day(10)).await.unwrap();
    assert!(again.sent.is_empty());
    assert_eq!(again.skipped.len(), 3);
    assert_eq!(mailer.sent().await.len(), 3);

    // the next day's server send keeps the scheduled run's other entries
    assert!(server_ledger.claim("T1", "ana@h.org", day(11)).await.unwrap());
    let reopened = JsonFileLedger::open(&path).await.unwrap();
    assert_eq!(
        reopened.last_sent("T1", "luis@h.org").await.unwrap(),
        Some(day(10))
    );
    assert_eq!(
        reopened.last_sent("T2", "eva@h.org").await.unwrap(),
        Some(day(10))
    );
}

#[tokio::test]
async fn test_overlapping_runs_send_each_pair_once() {
    let store = Arc::new(MemoryStore::new().with_table(TRAININGS, trainings()));
    let mailer = Arc::new(RecordingMailer::new().with_delay(Duration::from_millis(20)));
    let ledger = Arc::new(MemoryLedger::new());
    let first =
        AlertProcessor::new(store.clone(), mailer.clone(), ledger.clone(), &test_config()).unwrap();
    let second =
        AlertProcessor::new(store.clone(), mailer.clone(), ledger.clone(), &test_config()).unwrap();

    let (a, b) = tokio::join!(first.run(day(10)), second.run(day(10)));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.sent.len() + b.sent.len(), 3);
    assert_eq!(a.skipped.len() + b.skipped.len(), 3);
    let mut recipients: Vec<_> = mailer.sent().await.into_iter().map(|m| m.to).collect();
    recipients.sort();
    assert_eq!(recipients, vec!["ana@h.org", "eva@h.org", "luis@h.org"]);
}

#[tokio::test]
async fn test_overlapping_runs_on_separate_file_ledgers_send_once() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("alerts.json");
    let store = Arc::new(MemoryStore::new().with_table(TRAININGS, trainings()));
    let mailer = Arc::new(RecordingMailer::new().with_delay(Duration::from_millis(20)));

    let first = AlertProcessor::new(
        store.clone(),
        mailer.clone(),
        Arc::new(JsonFileLedger::open(&path).await.unwrap()),
        &test_config(),
    )
    .unwrap();
    let second = AlertProcessor::new(
        store.clone(),
        mailer.clone(),
        Arc::new(JsonFileLedger::open(&path).await.unwrap()),
        &test_config(),
    )
    .unwrap();

    let (a, b) = tokio::join!(first.run(day(10)), second.run(day(10)));
    assert_eq!(a.unwrap().sent.len() + b.unwrap().sent.len(), 3);
    assert_eq!(mailer.sent().await.len(), 3);
}

#[tokio::test]
async fn test_failed_send_can_be_retried_the_same_day() {
    let store = Arc::new(MemoryStore::new().with_table(TRAININGS, trainings()));
    let ledger = Arc::new(MemoryLedger::new());

    let failing = AlertProcessor::new(
        store.clone(),
        Arc::new(RecordingMailer::new().failing_for("eva@h.org")),
        ledger.clone(),
        &test_config(),
    )
    .unwrap();
    assert_eq!(failing.run(day(10)).await.unwrap().failed.len(), 1);

    let mailer = Arc::new(RecordingMailer::new());
    let retry =
        AlertProcessor::new(store, mailer.clone(), ledger.clone(), &test_config()).unwrap();
    let summary = retry.run(day(10)).await.unwrap();
    assert_eq!(summary.sent.len(), 1);
    assert_eq!(summary.sent[0].recipient, "eva@h.org");
}

#[tokio::test]
async fn test_alert_run_over_http() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use trainwatch::testing::TestApp;

    let app = TestApp::new(MemoryStore::new().with_table(TRAININGS, trainings()));
    let response = trainwatch::api::router(app.state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/alerts/run")
                .body(Body::from(r#"{"date": "2024-06-10"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["sent"].as_array().unwrap().len(), 3);
    assert_eq!(app.mailer.sent().await.len(), 3);
}
