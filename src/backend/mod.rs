//! Analysis backend abstraction layer.
//!
//! The lifecycle components talk to the backend only through the
//! `AnalysisBackend` trait:
//! - `AnalysisClient` speaks the HTTP API
//! - `MockBackend` replays scripted responses for tests

pub mod http;
pub mod mock;
pub mod traits;

pub use http::AnalysisClient;
pub use mock::MockBackend;
pub use traits::AnalysisBackend;
