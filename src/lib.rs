//! Cycle Sniper
//!
//! Finds profitable multi-hop swap cycles across quoted token pairs and
//! executes the ones that survive fee simulation and risk scoring.
//!
//! Pipeline:
//! - cartographer: quotes in, graph snapshot out
//! - brain: four cycle searches, merging, ranking and risk
//! - executor: guarded plans, signing, submission and confirmation

pub mod brain;
pub mod cartographer;
pub mod config;
pub mod errors;
pub mod executor;
pub mod logging;
pub mod session;
pub mod tokens;

// Re-export commonly used types
pub use brain::{DetectionReport, Opportunity, OpportunityIntegrator, ScanParams};
pub use cartographer::{ArbitrageGraph, GraphSnapshot, QuoteProvider};
pub use config::{Config, ExecutionMode};
pub use executor::{Credential, ExecutionEngine, ExecutionResult, ExecutionStatus};
pub use session::Session;
pub use tokens::{Token, TokenBook};
