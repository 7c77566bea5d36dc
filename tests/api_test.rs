use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use trainwatch::api::router;
use trainwatch::config::Config;
use trainwatch::fields::Field;
use trainwatch::store::{RecordStore, PARTICIPATIONS, QUESTIONS, SESSIONS, TRAININGS};
use trainwatch::testing::fixtures::builders::{
    participation_record, question_record, session_record, training_record, RecordBuilder,
};
use trainwatch::testing::{MemoryStore, TestApp};

async fn call(app: &TestApp, method: &str, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = router(app.state.clone())
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn post(app: &TestApp, uri: &str, body: Value) -> (StatusCode, Value) {
    call(app, "POST", uri, body).await
}

fn seeded_store() -> MemoryStore {
    MemoryStore::new()
        .with_table(
            TRAININGS,
            vec![
                training_record("T1", "Lavado de manos", "2024-02-10"),
                training_record("T2", "RCP básico", "2024-05-03"),
            ],
        )
        .with_table(
            SESSIONS,
            vec![
                session_record("S1", "LAV01", "T1"),
                session_record("S2", "RCP01", "T2"),
            ],
        )
        .with_table(
            PARTICIPATIONS,
            vec![
                participation_record("P1", "Ana", "S1", 2.0, 4.0),
                participation_record("P2", "Luis", "S1", 3.0, 2.0),
                participation_record("P3", "Eva", "S2", 1.0, 5.0),
            ],
        )
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new(MemoryStore::new());
    let (status, body) = call(&app, "GET", "/health", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true, "data": "healthy"}));
}

#[tokio::test]
async fn test_missing_field_is_400_envelope() {
    let app = TestApp::new(seeded_store());
    let (status, body) = post(&app, "/api/reports/participants", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert!(body["error"].as_str().unwrap().contains("trainingId"));
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let app = TestApp::new(seeded_store());
    let response = router(app.state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/reports/participants")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_missing_store_credentials_is_500_per_request() {
    let app = TestApp::with_config(seeded_store(), Config::default());

    let (status, _) = call(&app, "GET", "/health", Value::Null).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post(&app, "/api/dashboard", json!({})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("TRAINWATCH_STORE_TOKEN"));
}

#[tokio::test]
async fn test_participant_rollup() {
    let app = TestApp::new(seeded_store());
    let (status, body) = post(&app, "/api/reports/participants", json!({"trainingId": "T1"})).await;
    assert_eq!(status, StatusCode::OK);

    let data = &body["data"];
    let names: Vec<_> = data["participants"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["Ana", "Luis"]);

    let stats = &data["statistics"];
    assert_eq!(stats["totalCount"], json!(2));
    assert_eq!(stats["averagePretest"], json!(3));
    assert_eq!(stats["averagePosttest"], json!(3));
    assert_eq!(stats["passRate"], json!(50));
    assert_eq!(data["degraded"], json!([]));
}

#[tokio::test]
async fn test_unknown_training_is_404() {
    let app = TestApp::new(seeded_store());
    let (status, body) = post(&app, "/api/reports/participants", json!({"trainingId": "T9"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_failed_participation_listing_degrades() {
    let app = TestApp::new(seeded_store().failing_table(PARTICIPATIONS, 503));
    let (status, body) = post(&app, "/api/reports/participants", json!({"trainingId": "T1"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["participants"], json!([]));
    assert_eq!(body["data"]["degraded"], json!([PARTICIPATIONS]));
}

#[tokio::test]
async fn test_failed_trainings_listing_propagates_status() {
    let app = TestApp::new(seeded_store().failing_table(TRAININGS, 429));
    let (status, body) = post(&app, "/api/reports/quarterly", json!({"year": 2024, "quarter": 1})).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["details"]["table"], json!(TRAININGS));
}

#[tokio::test]
async fn test_quarterly_report() {
    let app = TestApp::new(seeded_store());
    let (status, body) = post(&app, "/api/reports/quarterly", json!({"year": 2024, "quarter": 1})).await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["label"], json!("Q1 2024"));
    assert_eq!(data["trainings"].as_array().unwrap().len(), 1);
    assert_eq!(data["statistics"]["totalCount"], json!(2));
}

#[tokio::test]
async fn test_export_sets_download_headers() {
    let app = TestApp::new(seeded_store());
    let response = router(app.state.clone())
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/reports/training/export")
                .body(Body::from(json!({"trainingId": "T1", "format": "csv"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        "attachment; filename=\"reporte-lavado-de-manos.csv\""
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(csv.contains("# Participantes"));
    assert!(csv.contains("=COUNTA("));
}

#[tokio::test]
async fn test_resolve_session_reads_then_creates() {
    let app = TestApp::new(seeded_store());

    let (status, body) = post(&app, "/api/sessions/resolve", json!({"code": " lav01 "})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["session"]["id"], json!("S1"));
    assert_eq!(body["data"]["training"]["id"], json!("T1"));
    assert_eq!(body["data"]["created"], json!(false));

    let (status, _) = post(&app, "/api/sessions/resolve", json!({"code": "NEW01"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = post(
        &app,
        "/api/sessions/resolve",
        json!({"code": "new01", "trainingId": "T2"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["created"], json!(true));
    assert_eq!(body["data"]["session"]["code"], json!("NEW01"));
    assert_eq!(app.store.records(SESSIONS).await.len(), 3);
}

#[tokio::test]
async fn test_resolve_rejects_formula_injection() {
    let app = TestApp::new(seeded_store());
    let (status, _) = post(&app, "/api/sessions/resolve", json!({"code": "X' OR '1'='1"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pretest_then_posttest() {
    let app = TestApp::new(seeded_store());

    let (status, body) = post(
        &app,
        "/api/participations/pretest",
        json!({"sessionId": "S1", "name": "Marta", "department": "UCI", "score": 2}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let code = body["data"]["posttestCode"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 6);
    assert_eq!(
        body["data"]["posttestLink"],
        json!(format!("https://capacitaciones.example.org/posttest?code={code}"))
    );
    assert_eq!(body["data"]["participation"]["status"], json!("Pretest completado"));
    assert_eq!(body["data"]["participation"]["sessionIds"], json!(["S1"]));

    let (status, body) = post(
        &app,
        "/api/participations/posttest",
        json!({"code": code.to_lowercase(), "score": 4}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["passed"], json!(true));
    assert_eq!(body["data"]["participation"]["posttestScore"], json!(4.0));
    assert_eq!(body["data"]["participation"]["status"], json!("Completado"));
}

#[tokio::test]
async fn test_posttest_unknown_code_is_404() {
    let app = TestApp::new(seeded_store());
    let (status, _) = post(
        &app,
        "/api/participations/posttest",
        json!({"code": "ZZZZZZ", "score": 3}),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_score_outside_scale_is_400() {
    let app = TestApp::new(seeded_store());
    let (status, _) = post(
        &app,
        "/api/participations/pretest",
        json!({"sessionId": "S1", "name": "Marta", "score": 9}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(app.store.records(PARTICIPATIONS).await.len(), 3);
}

#[tokio::test]
async fn test_pretest_graded_from_answers() {
    let store = seeded_store().with_table(
        QUESTIONS,
        vec![
            question_record("Q1", "¿Cuántos pasos?", "Cinco", "T1"),
            question_record("Q2", "¿Duración?", "40 segundos", "T1"),
        ],
    );
    let app = TestApp::new(store);

    let (status, body) = post(
        &app,
        "/api/questions",
        json!({"trainingId": "T1", "phase": "pretest"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let questions = body["data"].as_array().unwrap();
    assert_eq!(questions.len(), 2);
    assert!(questions[0].get("answer").is_none());

    let (status, body) = post(
        &app,
        "/api/participations/pretest",
        json!({
            "sessionId": "S1",
            "name": "Marta",
            "answers": {"Q1": "cinco", "Q2": "20 segundos"}
        }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["participation"]["pretestScore"], json!(1.0));
}

#[tokio::test]
async fn test_status_toggle_cascades_and_isolates_failures() {
    let store = seeded_store()
        .with_table(SESSIONS, vec![session_record("S3", "LAV02", "T1")])
        .failing_update("S3");
    let app = TestApp::new(store);

    let (status, body) = post(
        &app,
        "/api/trainings/status",
        json!({"trainingId": "T1", "finalized": true}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let data = &body["data"];
    assert_eq!(data["training"]["finalized"], json!(true));
    assert_eq!(data["sessionsUpdated"], json!(["S1"]));
    assert_eq!(data["sessionFailures"][0]["sessionId"], json!("S3"));

    let s1 = app.store.get(SESSIONS, "S1").await.unwrap();
    assert_eq!(s1.fields[Field::SessionActive.write_name()], json!(false));
    let s2 = app.store.get(SESSIONS, "S2").await.unwrap();
    assert_eq!(s2.fields[Field::SessionActive.write_name()], json!(true));
}

#[tokio::test]
async fn test_create_training_requires_date() {
    let app = TestApp::new(MemoryStore::new());
    let (status, _) = post(&app, "/api/trainings/create", json!({"title": "RCP"})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post(
        &app,
        "/api/trainings/create",
        json!({"title": "RCP", "date": "2024-09-01", "alertEmails": "a@h.org; b@h.org"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["active"], json!(true));
    assert_eq!(body["data"]["alertRecipients"], json!(["a@h.org", "b@h.org"]));
}

#[tokio::test]
async fn test_admin_verify() {
    let store = MemoryStore::new().with_table(
        "AppConfig",
        vec![
            RecordBuilder::new("C0").raw("Nombre", "otro").build(),
            RecordBuilder::new("C1").raw("Admin Password", "s3cret").build(),
        ],
    );
    let app = TestApp::new(store);

    let (status, body) = post(&app, "/api/admin/verify", json!({"password": "s3cret"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["verified"], json!(true));

    let (status, body) = post(&app, "/api/admin/verify", json!({"password": "nope"})).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], json!(false));
}

#[tokio::test]
async fn test_admin_verify_without_configured_password_is_500() {
    let app = TestApp::new(MemoryStore::new());
    let (status, _) = post(&app, "/api/admin/verify", json!({"password": "x"})).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_dashboard_accepts_get() {
    let app = TestApp::new(seeded_store());
    let (status, body) = call(&app, "GET", "/api/dashboard", Value::Null).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalTrainings"], json!(2));
    assert_eq!(body["data"]["statistics"]["totalCount"], json!(3));
}

#[tokio::test]
async fn test_cors_preflight() {
    let app = TestApp::new(MemoryStore::new());
    let response = router(app.state.clone())
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/dashboard")
                .header(header::ORIGIN, "https://intranet.example.org")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}
