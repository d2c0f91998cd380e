//! Phase 1: The Cartographer (Data Ingest)
//!
//! Quote providers, concurrent collection and the graph the engines search.

pub mod collector;
pub mod graph;
pub mod historical;
pub mod live;
pub mod quote;

pub use collector::{CollectReport, CollectorSettings, QuoteCollector};
pub use graph::{ArbitrageGraph, BuildStats, EdgeData, GraphSnapshot};
pub use historical::{HistoricalProvider, QuoteRecord};
pub use live::LiveQuoteProvider;
pub use quote::{PairQuote, Quote, QuoteProvider};
