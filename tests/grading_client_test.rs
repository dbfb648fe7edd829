use exam_proctor::clients::{GradingApi, GradingClient, ProctorApi, ProctorClient};
use exam_proctor::config::Config;
use exam_proctor::error::{ApiError, AppError};
use exam_proctor::models::{FinalSubmitPayload, QuestionResult};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> Config {
    Config {
        grading_base_url: format!("{}/api", server.uri()),
        auth_token: Some("secret".to_string()),
        ..Config::default()
    }
}

fn payload() -> FinalSubmitPayload {
    FinalSubmitPayload {
        name: "Ada".into(),
        email: "ada@example.com".into(),
        batch: "B1".into(),
        submitted_at: "2026-03-01T10:00:00.000Z".into(),
        test_id: 7,
        question_results: vec![QuestionResult {
            question_id: 100,
            attempted: true,
            correct: true,
            attempts: 2,
            output: "TEST RESULTS: 2/2 Test Cases Passed".into(),
            results: vec![],
        }],
        tab_switch_count: 1,
        copy_paste_attempts: 3,
        face_warnings: None,
    }
}

#[tokio::test]
async fn test_fetch_test_by_link_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tests/link/tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 7,
            "title": "Loops",
            "duration": 30,
            "questions": [{
                "id": 100,
                "description": "print n",
                "language": "java",
                "testCases": [{ "inputData": "1", "expectedOutput": "1", "exampleCase": true }]
            }]
        })))
        .mount(&server)
        .await;

    let client = GradingClient::new(&config_for(&server)).unwrap();
    let test = client.fetch_test("tok-1").await.unwrap();

    assert_eq!(test.title, "Loops");
    assert_eq!(test.duration, 30);
    assert_eq!(test.questions.len(), 1);
}

#[tokio::test]
async fn test_fetch_inactive_test_surfaces_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tests/link/tok-1"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Test is not active"))
        .mount(&server)
        .await;

    let client = GradingClient::new(&config_for(&server)).unwrap();
    let err = client.fetch_test("tok-1").await.unwrap_err();

    match err {
        AppError::Api(ApiError::BadResponse { status, body, .. }) => {
            assert_eq!(status, 403);
            assert_eq!(body, "Test is not active");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_submit_final_posts_payload_with_bearer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/tests/link/tok-1/submit-code"))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(json!({
            "name": "Ada",
            "testId": 7,
            "tabSwitchCount": 1,
            "copyPasteAttempts": 3,
            "questionResults": [{
                "questionId": 100,
                "correct": true,
                "attempts": 2,
                "output": "TEST RESULTS: 2/2 Test Cases Passed"
            }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": 55,
            "name": "Ada",
            "score": 10
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = GradingClient::new(&config_for(&server)).unwrap();
    let record = client.submit_final("tok-1", &payload()).await.unwrap();

    assert_eq!(record.id, Some(55));
    assert_eq!(record.score, Some(10));
}

#[tokio::test]
async fn test_proctor_frame_analysis() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/process-frame"))
        .and(body_partial_json(json!({ "frame": "ZnJhbWU=" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "status": "face_moved",
            "warnings": ["Face moved"]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/start-proctoring"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .mount(&server)
        .await;

    let client = ProctorClient::new(&Config::default(), server.uri()).unwrap();
    client.start().await.unwrap();

    let analysis = client.process_frame("ZnJhbWU=").await.unwrap();
    assert!(!analysis.is_ok());
    assert_eq!(analysis.status, "face_moved");
    assert_eq!(analysis.warnings, vec!["Face moved".to_string()]);
}
