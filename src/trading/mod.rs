//! Trading module for swap orders and settlement.
//!
//! This module handles:
//! - Swap order and hop construction
//! - Slippage and base-unit arithmetic
//! - Execution backends (simulated and HTTP)

pub mod backend;
pub mod order;

pub use backend::{
    estimated_settlement_cost, ExecutionBackend, HttpSettlementBackend, Receipt, SimulatedBackend,
};
pub use order::{
    build_hops, min_out_after_slippage, to_base_units, HopDirection, SwapHop, SwapOrder,
};
