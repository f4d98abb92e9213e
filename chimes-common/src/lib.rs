//! # Ledger Chimes Common Library (chimes-common)
//!
//! Shared types for the Ledger Chimes sonification system.
//!
//! **Purpose:** Domain records, event definitions, error taxonomy, listener
//! fan-out, and configuration loading used by the audio-player module
//! (chimes-ap) and by external observers.

pub mod config;
pub mod error;
pub mod events;
pub mod notifier;
pub mod record;

pub use config::Config;
pub use error::{Error, Result};
pub use events::{ChimesEvent, EventBus};
pub use notifier::{Notifier, SubscriptionId};
pub use record::{ConnectionState, MalformedRecord, TransactionRecord, TxKind};
