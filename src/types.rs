//! Types for the analysis API: wire envelopes, job state and report data

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{AnalysisError, Result};

// ==================== Envelope ====================

/// Success envelope wrapping every JSON response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(default = "Option::default")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Unwrap `data`, turning a failed envelope into an error
    pub fn into_data(self) -> Result<T> {
        if !self.success {
            return Err(match self.error {
                Some(message) if !message.is_empty() => AnalysisError::ServerRejected(message),
                _ => AnalysisError::Transport(
                    "server reported failure without an error message".to_string(),
                ),
            });
        }
        self.data
            .ok_or_else(|| AnalysisError::MalformedResponse("envelope is missing `data`".into()))
    }
}

/// Body of an error response, either our envelope or a FastAPI `detail`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    /// Extract a displayable message from a raw error body, if it carries one
    pub fn message_from(body: &[u8]) -> Option<String> {
        let parsed: ErrorBody = serde_json::from_slice(body).ok()?;
        if let Some(error) = parsed.error.filter(|e| !e.is_empty()) {
            return Some(error);
        }
        match parsed.detail {
            Some(serde_json::Value::String(detail)) if !detail.is_empty() => Some(detail),
            _ => None,
        }
    }
}

// ==================== Jobs ====================

/// Opaque analysis job identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for JobId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Response from the upload endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    /// Identifier of the analysis job that was started
    pub analysis_id: String,
    /// Number of wallets the backend accepted
    pub wallets_count: u32,
    /// Initial job status, when the backend reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Submitted,
    Processing,
    Completed,
    Failed,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// Status string reported by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireStatus {
    Processing,
    Completed,
    Error,
    NotFound,
}

/// Response from the status endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: WireStatus,
    #[serde(default)]
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusResponse {
    pub fn processing(progress: f64) -> Self {
        Self {
            status: WireStatus::Processing,
            progress,
            message: None,
            error: None,
        }
    }

    pub fn completed() -> Self {
        Self {
            status: WireStatus::Completed,
            progress: 100.0,
            message: None,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: WireStatus::Error,
            progress: 0.0,
            message: None,
            error: Some(error.into()),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// One point-in-time read of a job's status
///
/// Snapshots are ordered by arrival only. Progress is kept as received, even
/// when it moves backwards between snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    /// Arrival order within one polling session, starting at 1
    pub sequence: u64,
    pub state: JobState,
    pub progress: f64,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl StatusSnapshot {
    pub fn from_response(job_id: &JobId, response: StatusResponse, sequence: u64) -> Self {
        let non_empty = |s: Option<String>| s.filter(|s| !s.is_empty());
        let mut error = non_empty(response.error);
        let state = match response.status {
            WireStatus::Processing => JobState::Processing,
            WireStatus::Completed => JobState::Completed,
            WireStatus::Error => JobState::Failed,
            WireStatus::NotFound => {
                error.get_or_insert_with(|| format!("analysis {} not found", job_id));
                JobState::Failed
            }
        };
        Self {
            sequence,
            state,
            progress: response.progress,
            message: non_empty(response.message),
            error,
        }
    }

    /// Message to show for a failed snapshot
    pub fn failure_message(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "analysis failed".to_string())
    }
}

/// Client-side view of one analysis job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job {
    pub id: JobId,
    pub wallets_count: Option<u32>,
    pub state: JobState,
    pub progress: Option<f64>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl Job {
    /// A job freshly created by the submission gateway
    pub fn submitted(id: JobId, wallets_count: u32) -> Self {
        Self {
            id,
            wallets_count: Some(wallets_count),
            state: JobState::Submitted,
            progress: None,
            message: None,
            error: None,
        }
    }

    /// A job created elsewhere that this client only follows
    pub fn attached(id: JobId) -> Self {
        Self {
            id,
            wallets_count: None,
            state: JobState::Submitted,
            progress: None,
            message: None,
            error: None,
        }
    }

    /// Apply a status snapshot. Returns false once the job is terminal.
    pub fn apply(&mut self, snapshot: &StatusSnapshot) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.state = snapshot.state;
        self.progress = Some(snapshot.progress);
        if snapshot.message.is_some() {
            self.message = snapshot.message.clone();
        }
        self.error = snapshot.error.clone();
        true
    }
}

// ==================== Report ====================

/// Value allowed in a node or edge property bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<PropertyValue>),
    Map(BTreeMap<String, PropertyValue>),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

pub type Properties = BTreeMap<String, PropertyValue>;

/// Graph vertex: one wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub size: f64,
    #[serde(default)]
    pub color: String,
    #[serde(default)]
    pub properties: Properties,
}

/// Directed relationship between two wallets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    #[serde(default)]
    pub weight: f64,
    #[serde(default)]
    pub properties: Properties,
}

/// Wallet relationship graph as returned by the backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipGraph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

/// AI-derived behavioral assessment of one wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub wallet_address: String,
    pub behavior_pattern: String,
    pub entity_type: String,
    /// Expected within [0.0, 1.0]; see [`Insight::risk_score_in_range`]
    pub risk_score: f64,
    #[serde(default)]
    pub observations: Vec<String>,
    #[serde(default)]
    pub related_entities: Vec<String>,
}

impl Insight {
    pub fn risk_score_in_range(&self) -> bool {
        (0.0..=1.0).contains(&self.risk_score)
    }
}

/// Token held or traded by a wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenHolding {
    pub address: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u8>,
    pub total_value_usd: f64,
    pub transaction_count: u64,
}

/// Aggregate on-chain activity of one wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletStatistics {
    pub address: String,
    pub blockchain: String,
    #[serde(with = "flexible_timestamp")]
    pub first_transaction_date: DateTime<Utc>,
    #[serde(with = "flexible_timestamp")]
    pub last_transaction_date: DateTime<Utc>,
    pub total_sent_usd: f64,
    pub total_received_usd: f64,
    pub transaction_count: u64,
    #[serde(default)]
    pub unique_tokens: Vec<TokenHolding>,
    /// Counterparty contracts, most frequent first, in backend order
    #[serde(default)]
    pub most_frequent_contracts: Vec<String>,
    /// Transactions per hour of day
    #[serde(default)]
    pub interaction_hours: BTreeMap<u8, u64>,
}

impl WalletStatistics {
    /// First transaction does not come after the last one
    pub fn timeline_consistent(&self) -> bool {
        self.first_transaction_date <= self.last_transaction_date
    }

    /// 1-based frequency rank of a counterparty contract
    pub fn contract_rank(&self, contract: &str) -> Option<usize> {
        self.most_frequent_contracts
            .iter()
            .position(|c| c.eq_ignore_ascii_case(contract))
            .map(|i| i + 1)
    }

    pub fn net_flow_usd(&self) -> f64 {
        self.total_received_usd - self.total_sent_usd
    }
}

/// Pairwise relationship the backend inferred between two wallets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletRelation {
    pub wallet_a: String,
    pub wallet_b: String,
    #[serde(default)]
    pub transaction_count: u64,
    #[serde(default)]
    pub total_value_usd: f64,
    #[serde(default)]
    pub similarity_score: f64,
    #[serde(default)]
    pub relationship_type: String,
}

/// Completed analysis output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis_id: Option<String>,
    #[serde(with = "flexible_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    pub graph_data: RelationshipGraph,
    pub ai_insights: Vec<Insight>,
    pub wallets_analyzed: Vec<WalletStatistics>,
    #[serde(default)]
    pub relationships: Vec<WalletRelation>,
}

impl Report {
    /// Collect every data-integrity violation in this report
    pub fn integrity_flags(&self) -> Vec<IntegrityFlag> {
        let mut flags = Vec::new();

        for insight in &self.ai_insights {
            if !insight.risk_score_in_range() {
                flags.push(IntegrityFlag::RiskScoreOutOfRange {
                    wallet: insight.wallet_address.clone(),
                    score: insight.risk_score,
                });
            }
        }

        for stats in &self.wallets_analyzed {
            if !stats.timeline_consistent() {
                flags.push(IntegrityFlag::InvertedTimeline {
                    wallet: stats.address.clone(),
                    first: stats.first_transaction_date,
                    last: stats.last_transaction_date,
                });
            }
        }

        flags.extend(self.graph_data.integrity_flags());
        flags
    }

    /// Statistics for one wallet, matched case-insensitively
    pub fn wallet(&self, address: &str) -> Option<&WalletStatistics> {
        self.wallets_analyzed
            .iter()
            .find(|w| w.address.eq_ignore_ascii_case(address))
    }

    /// Insight for one wallet, matched case-insensitively
    pub fn insight(&self, address: &str) -> Option<&Insight> {
        self.ai_insights
            .iter()
            .find(|i| i.wallet_address.eq_ignore_ascii_case(address))
    }
}

impl RelationshipGraph {
    /// Duplicate node ids and edges pointing at unknown nodes
    pub fn integrity_flags(&self) -> Vec<IntegrityFlag> {
        let mut flags = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                flags.push(IntegrityFlag::DuplicateNode {
                    id: node.id.clone(),
                });
            }
        }
        for edge in &self.edges {
            if !seen.contains(edge.source.as_str()) || !seen.contains(edge.target.as_str()) {
                flags.push(IntegrityFlag::DanglingEdge {
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                });
            }
        }
        flags
    }
}

/// A data-integrity violation found in report data
#[derive(Debug, Clone, PartialEq)]
pub enum IntegrityFlag {
    RiskScoreOutOfRange {
        wallet: String,
        score: f64,
    },
    InvertedTimeline {
        wallet: String,
        first: DateTime<Utc>,
        last: DateTime<Utc>,
    },
    DanglingEdge {
        source: String,
        target: String,
    },
    DuplicateNode {
        id: String,
    },
}

impl fmt::Display for IntegrityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityFlag::RiskScoreOutOfRange { wallet, score } => {
                write!(f, "risk score {} for {} is outside [0, 1]", score, wallet)
            }
            IntegrityFlag::InvertedTimeline {
                wallet,
                first,
                last,
            } => write!(
                f,
                "first transaction of {} ({}) is after its last ({})",
                wallet,
                first.to_rfc3339(),
                last.to_rfc3339()
            ),
            IntegrityFlag::DanglingEdge { source, target } => {
                write!(f, "edge {} -> {} references an unknown node", source, target)
            }
            IntegrityFlag::DuplicateNode { id } => write!(f, "node id {} appears more than once", id),
        }
    }
}

// ==================== Artifacts ====================

/// Rendered report encodings the backend can produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Pdf,
    Csv,
}

impl ArtifactFormat {
    pub const ALL: [ArtifactFormat; 2] = [ArtifactFormat::Pdf, ArtifactFormat::Csv];

    /// Path segment and file extension
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactFormat::Pdf => "pdf",
            ArtifactFormat::Csv => "csv",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ArtifactFormat::Pdf => "application/pdf",
            ArtifactFormat::Csv => "text/csv",
        }
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ArtifactFormat {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pdf" => Ok(ArtifactFormat::Pdf),
            "csv" => Ok(ArtifactFormat::Csv),
            _ => Err(AnalysisError::UnsupportedFormat(format!(
                "{} (expected one of: pdf, csv)",
                s
            ))),
        }
    }
}

// ==================== Timestamps ====================

/// Parse an ISO-8601 timestamp, treating values without an offset as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

mod flexible_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
    }
}
