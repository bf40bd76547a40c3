//! End-to-end job lifecycle against a mock analysis server

use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use wallet_analysis_client::{
    AnalysisClient, AnalysisError, AnalysisSession, ClientConfig, IntegrityFlag, JobId, JobState,
    PropertyValue, WalletList,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const A: &str = "0xabc0000000000000000000000000000000000001";
const B: &str = "0xdef0000000000000000000000000000000000002";

fn envelope(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"success": true, "data": data}))
}

fn report(risk_score: f64) -> Value {
    json!({
        "analysis_id": "job-1",
        "timestamp": "2024-03-01T10:17:42.123456",
        "summary": "Análisis completado para 2 wallets.",
        "graph_data": {
            "nodes": [
                {"id": A, "label": "0xabc0...0001", "size": 24, "color": "#e53e3e",
                 "properties": {"transaction_count": 42, "is_analyzed": true}},
                {"id": B, "label": "", "size": 12, "color": "#4299e1",
                 "properties": {"transaction_count": 7}}
            ],
            "edges": [
                {"source": A, "target": B, "weight": 3,
                 "properties": {"total_value_usd": 1520.5}}
            ]
        },
        "ai_insights": [
            {"wallet_address": A, "behavior_pattern": "high_frequency_trader",
             "entity_type": "individual", "risk_score": risk_score,
             "observations": ["Frequent DEX swaps", "Interacts with mixers"]}
        ],
        "wallets_analyzed": [
            {"address": A, "blockchain": "ethereum",
             "first_transaction_date": "2021-05-04T08:00:00Z",
             "last_transaction_date": "2024-02-28T19:30:00Z",
             "total_sent_usd": 10500.0, "total_received_usd": 12000.0,
             "transaction_count": 42,
             "unique_tokens": [
                 {"address": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", "name": "USD Coin",
                  "symbol": "USDC", "decimals": 6, "total_value_usd": 5000.0, "transaction_count": 12}
             ],
             "most_frequent_contracts": ["0x7a250d5630b4cf539739df2c5dacb4c659f2488d"],
             "interaction_hours": {"9": 4, "21": 11}},
            {"address": B, "blockchain": "ethereum",
             "first_transaction_date": "2022-01-10T12:00:00",
             "last_transaction_date": "2023-11-02T08:15:00",
             "total_sent_usd": 300.0, "total_received_usd": 1520.5,
             "transaction_count": 7}
        ]
    })
}

async fn mount_job(server: &MockServer, risk_score: f64) {
    Mock::given(method("POST"))
        .and(path("/api/v1/upload-csv"))
        .respond_with(envelope(json!({"analysis_id": "job-1", "wallets_count": 2})))
        .expect(1)
        .mount(server)
        .await;

    // First status poll sees the job processing; later ones see it done
    Mock::given(method("GET"))
        .and(path("/api/v1/analysis/job-1/status"))
        .respond_with(envelope(json!({"status": "processing", "progress": 10})))
        .up_to_n_times(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/analysis/job-1/status"))
        .respond_with(envelope(json!({"status": "completed", "progress": 100})))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/v1/analysis/job-1/report"))
        .respond_with(envelope(report(risk_score)))
        .expect(1)
        .mount(server)
        .await;
}

fn session(server: &MockServer) -> AnalysisSession {
    AnalysisSession::from_config(ClientConfig {
        base_url: server.uri(),
        poll_interval_ms: 20,
        timeout_secs: 5,
        ..Default::default()
    })
    .unwrap()
}

fn wallets() -> WalletList {
    WalletList::from_addresses([A, B]).unwrap()
}

#[tokio::test]
async fn test_submit_poll_fetch_normalize() {
    let server = MockServer::start().await;
    mount_job(&server, 0.35).await;

    let mut session = session(&server);
    let job = session.submit(&wallets()).await.unwrap();
    assert_eq!(job.id, JobId::new("job-1"));
    assert_eq!(job.wallets_count, Some(2));

    let presented = session.run_to_completion().await.unwrap();

    assert_eq!(presented.job.state, JobState::Completed);
    assert_eq!(presented.job.progress, Some(100.0));
    assert!(presented.flags.is_empty());

    let report = &presented.report;
    assert_eq!(report.wallets_analyzed.len(), 2);
    let stats = report.wallet(A).unwrap();
    assert_eq!(stats.unique_tokens[0].decimals, Some(6));
    assert_eq!(stats.interaction_hours.get(&21), Some(&11));
    assert_eq!(
        stats.contract_rank("0x7A250D5630B4CF539739DF2C5DACB4C659F2488D"),
        Some(1)
    );
    assert_eq!(stats.net_flow_usd(), 1500.0);

    let graph = &presented.graph;
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.edges.len(), 1);
    assert_eq!(graph.node(B).unwrap().label, "0xdef0...0002");
    assert_eq!(
        graph.edge(A, B).unwrap().data["total_value_usd"],
        PropertyValue::Number(1520.5)
    );

    // The report is cached; asking again does not hit the server
    session.report().await.unwrap();
    server.verify().await;
}

#[tokio::test]
async fn test_out_of_range_risk_score_is_flagged_not_clamped() {
    let server = MockServer::start().await;
    mount_job(&server, 1.4).await;

    let mut session = session(&server);
    session.submit(&wallets()).await.unwrap();
    let presented = session.run_to_completion().await.unwrap();

    assert_eq!(presented.report.ai_insights[0].risk_score, 1.4);
    assert_eq!(
        presented.flags,
        vec![IntegrityFlag::RiskScoreOutOfRange {
            wallet: A.into(),
            score: 1.4
        }]
    );
}

#[tokio::test]
async fn test_backend_failure_ends_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/analysis/job-7/status"))
        .respond_with(envelope(json!({
            "status": "error", "progress": 30, "error": "Rate limit exceeded on Moralis"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut session = session(&server);
    session.attach(JobId::new("job-7")).await;
    let err = session.run_to_completion().await.unwrap_err();

    assert_eq!(
        err,
        AnalysisError::ServerRejected("Rate limit exceeded on Moralis".into())
    );
    assert_eq!(session.job().unwrap().state, JobState::Failed);

    // Nothing else is polled once the job has failed
    tokio::time::sleep(Duration::from_millis(100)).await;
    server.verify().await;
}

#[tokio::test]
async fn test_unsupported_download_makes_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut session = session(&server);
    session.attach(JobId::new("job-1")).await;
    let err = session
        .save_artifact("xml", std::path::Path::new("."))
        .await
        .unwrap_err();

    assert!(matches!(err, AnalysisError::UnsupportedFormat(_)));
    server.verify().await;
}

#[tokio::test]
async fn test_artifact_saved_to_directory() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/analysis/job-1/download/pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4\n".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let out = TempDir::new().unwrap();
    let mut session = session(&server);
    session.attach(JobId::new("job-1")).await;

    let saved = session.save_artifact("pdf", out.path()).await.unwrap();
    assert_eq!(saved.file_name().unwrap(), "wallet-analysis-job-1.pdf");
    assert_eq!(std::fs::read(saved).unwrap(), b"%PDF-1.4\n");
}

#[tokio::test]
async fn test_client_rejects_bad_api_key() {
    let err = AnalysisClient::new(ClientConfig {
        api_key: Some("line\nbreak".into()),
        ..Default::default()
    })
    .unwrap_err();
    assert!(matches!(err, AnalysisError::Config(_)));
}
