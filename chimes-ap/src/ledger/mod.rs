//! Ledger-stream client and transaction normalization

pub mod client;
pub mod normalizer;
pub mod protocol;

pub use client::{ClientConfig, LedgerStreamClient, RecordSource};
pub use normalizer::normalize;
