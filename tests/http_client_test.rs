//! HTTP contract tests for `AnalysisClient` against a mock server

use serde_json::json;
use wallet_analysis_client::{
    AnalysisBackend, AnalysisClient, AnalysisError, ArtifactFormat, ClientConfig, JobId, JobState,
    StatusSnapshot, WireStatus,
};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> AnalysisClient {
    AnalysisClient::new(ClientConfig {
        base_url: server.uri(),
        api_key: Some("test-key".into()),
        timeout_secs: 5,
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn test_upload_sends_multipart_file() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/upload-csv"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_string_contains("name=\"file\""))
        .and(body_string_contains("wallet_address,blockchain"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"analysis_id": "20240301_101500", "wallets_count": 2, "status": "processing"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let csv = b"wallet_address,blockchain\n0xabc0000000000000000000000000000000000001,ethereum\n".to_vec();
    let receipt = client(&server).upload_wallets("wallets.csv", csv).await.unwrap();

    assert_eq!(receipt.analysis_id, "20240301_101500");
    assert_eq!(receipt.wallets_count, 2);
}

#[tokio::test]
async fn test_status_envelope_is_unwrapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/analysis/job-1/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"status": "processing", "progress": 40, "message": "Analizando transacciones"}
        })))
        .mount(&server)
        .await;

    let status = client(&server).analysis_status(&JobId::new("job-1")).await.unwrap();
    assert_eq!(status.status, WireStatus::Processing);
    assert_eq!(status.progress, 40.0);
    assert_eq!(status.message.as_deref(), Some("Analizando transacciones"));
}

#[tokio::test]
async fn test_not_found_status_becomes_failed_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/analysis/job-404/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"status": "not_found", "progress": 0}
        })))
        .mount(&server)
        .await;

    let id = JobId::new("job-404");
    let status = client(&server).analysis_status(&id).await.unwrap();
    let snapshot = StatusSnapshot::from_response(&id, status, 1);
    assert_eq!(snapshot.state, JobState::Failed);
    assert_eq!(snapshot.failure_message(), "analysis job-404 not found");
}

#[tokio::test]
async fn test_failed_envelope_message_is_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/upload-csv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "error": "Formato de dirección inválido en la fila 3"
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .upload_wallets("wallets.csv", b"wallet_address,blockchain\n".to_vec())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        AnalysisError::ServerRejected("Formato de dirección inválido en la fila 3".into())
    );
    assert_eq!(err.to_string(), "Formato de dirección inválido en la fila 3");
}

#[tokio::test]
async fn test_error_detail_body_is_surfaced() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/analysis/job-1/report"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"detail": "Análisis no encontrado"})),
        )
        .mount(&server)
        .await;

    let err = client(&server).analysis_report(&JobId::new("job-1")).await.unwrap_err();
    assert_eq!(err, AnalysisError::ServerRejected("Análisis no encontrado".into()));
}

#[tokio::test]
async fn test_bare_gateway_error_is_transport() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/analysis/job-1/status"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let err = client(&server).analysis_status(&JobId::new("job-1")).await.unwrap_err();
    assert!(err.is_transport());
    assert!(err.to_string().contains("HTTP 502"));
}

#[tokio::test]
async fn test_missing_field_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/upload-csv"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {"analysis_id": "job-1"}
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .upload_wallets("wallets.csv", b"wallet_address,blockchain\n".to_vec())
        .await
        .unwrap_err();
    assert!(matches!(err, AnalysisError::MalformedResponse(_)));
}

#[tokio::test]
async fn test_unreachable_server_is_transport() {
    let server = MockServer::start().await;
    let client = client(&server);
    drop(server);

    let err = client.analysis_status(&JobId::new("job-1")).await.unwrap_err();
    assert!(err.is_transport());
}

#[tokio::test]
async fn test_download_returns_raw_bytes() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/analysis/job-1/download/csv"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/csv")
                .set_body_bytes(b"wallet,risk\n0xabc,0.2\n".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let bytes = client(&server)
        .download_artifact(&JobId::new("job-1"), ArtifactFormat::Csv)
        .await
        .unwrap();
    assert_eq!(bytes, b"wallet,risk\n0xabc,0.2\n");
}

#[tokio::test]
async fn test_graph_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/analysis/job-1/graph"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "nodes": [{"id": "0xa", "label": "0xa", "size": 20, "color": "#e53e3e"}],
                "edges": []
            }
        })))
        .mount(&server)
        .await;

    let graph = client(&server).analysis_graph(&JobId::new("job-1")).await.unwrap();
    assert_eq!(graph.nodes.len(), 1);
    assert_eq!(graph.nodes[0].size, 20.0);
    assert!(graph.nodes[0].properties.is_empty());
}
