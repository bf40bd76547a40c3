//! Rust client for the wallet analysis API
//!
//! Submits wallet lists for analysis, follows the job with a status poller,
//! fetches and caches the report, normalizes its relationship graph and
//! downloads rendered artifacts.
//!
//! # Example
//!
//! ```rust,no_run
//! use wallet_analysis_client::{AnalysisSession, ClientConfig, WalletList};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = AnalysisSession::from_config(ClientConfig {
//!     base_url: "http://localhost:8000".into(),
//!     ..Default::default()
//! })?;
//!
//! let wallets = WalletList::from_addresses(["0x742d35cc6634c0532925a3b844bc454e4438f44e"])?;
//! session.submit(&wallets).await?;
//!
//! let presented = session.run_to_completion().await?;
//! println!("{}", presented.report.summary);
//! for flag in &presented.flags {
//!     println!("warning: {}", flag);
//! }
//!
//! session.save_artifact("pdf", std::path::Path::new("reports")).await?;
//! # Ok(())
//! # }
//! ```

pub mod artifact;
pub mod backend;
pub mod config;
pub mod error;
pub mod graph;
pub mod poller;
pub mod report;
pub mod session;
pub mod submission;
pub mod types;
pub mod wallets;

// Re-export main types
pub use artifact::{Artifact, ArtifactDownloader};
pub use backend::{AnalysisBackend, AnalysisClient, MockBackend};
pub use config::{Args, ClientConfig};
pub use error::{AnalysisError, Result};
pub use graph::{normalize, NormalizedEdge, NormalizedGraph, NormalizedNode};
pub use poller::{PollEvent, PollHandle, PollObserver, PollOutcome, PollState, StatusPoller};
pub use report::ReportFetcher;
pub use session::{AnalysisSession, PresentedReport};
pub use submission::SubmissionGateway;
pub use types::*;
pub use wallets::{Blockchain, WalletEntry, WalletList};
