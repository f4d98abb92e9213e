//! # Ledger Chimes Audio Player Library (chimes-ap)
//!
//! Core sonification engine and resilient ledger-stream client.
//!
//! **Purpose:** Subscribe to the validated-transaction stream of an
//! XRP-Ledger–style network, normalize each transaction into a canonical
//! record, and turn every record into a deterministic musical phrase layered
//! over a background drone.
//!
//! **Architecture:** tokio task per component; cpal output stream rendering
//! per-sample envelopes from a capped voice registry.

pub mod ledger;
pub mod sonify;

pub use ledger::client::LedgerStreamClient;
pub use sonify::engine::SonificationEngine;
