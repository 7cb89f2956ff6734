//! Arbitrage module for detecting and executing opportunities.
//!
//! This module handles:
//! - Opportunity detection from price snapshots
//! - Position sizing and order construction
//! - Bounded concurrent execution

pub mod coordinator;
pub mod pipeline;
pub mod scanner;

pub use coordinator::ExecutionCoordinator;
pub use pipeline::{ExecutionPipeline, ExecutionResult, PipelineSettings};
pub use scanner::{scan, ArbitrageOpportunity, ScanParams};
