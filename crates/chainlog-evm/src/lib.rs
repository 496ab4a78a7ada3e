//! chainlog-evm — EVM event decoding for ChainLog listeners.
//!
//! [`DecodingLogListener`] sits between the broadcaster and a consumer,
//! turning raw logs into [`chainlog_core::DecodedLog`] using an
//! [`EventTypes`] table built from Solidity event signatures.
//! [`ConnectedContract`] wires that up for one contract address.

pub mod contract;
pub mod decoding;
pub mod flux_aggregator;

pub use contract::{ConnectedContract, Unsubscribe};
pub use decoding::{decode_log, DecodingLogListener, EventTypes};
pub use flux_aggregator::{LogAnswerUpdated, LogNewRound};
