//! Domain records for the ledger transaction stream
//!
//! Canonical transaction representation produced by the normalizer, the
//! open-ended transaction-kind enumeration, and the stream client's
//! connection state machine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical, validated transaction record.
///
/// Produced by the normalizer from a raw network payload; everything
/// downstream (engine, observers) consumes only this shape. Field access
/// without having passed validation does not exist in this design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Transaction hash, unique per ledger entry (session dedup key)
    pub id: String,
    /// Milliseconds since the Unix epoch (converted from the ledger epoch)
    pub timestamp: i64,
    /// Settled amount in XRP major units, never negative
    pub amount: f64,
    /// Transaction kind; unknown kinds map to [`TxKind::Unknown`]
    pub kind: TxKind,
    /// Sending account address
    pub account: String,
    /// Receiving account address, when the kind has one
    pub destination: Option<String>,
    /// Network fee in drops (minor units)
    pub fee: u64,
    /// Index of the ledger that carried this transaction (non-decreasing)
    pub ledger_index: u64,
}

/// Transaction kinds observed on the ledger stream.
///
/// The set is open-ended upstream; anything not listed here normalizes to
/// `Unknown` rather than being rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxKind {
    Payment,
    OfferCreate,
    OfferCancel,
    TrustSet,
    EscrowCreate,
    EscrowFinish,
    NftTokenMint,
    PaymentChannelCreate,
    Unknown,
}

impl TxKind {
    /// Map a wire-format transaction type name onto a kind.
    ///
    /// Unrecognized names map to `Unknown` (never an error).
    pub fn from_name(name: &str) -> Self {
        match name {
            "Payment" => TxKind::Payment,
            "OfferCreate" => TxKind::OfferCreate,
            "OfferCancel" => TxKind::OfferCancel,
            "TrustSet" => TxKind::TrustSet,
            "EscrowCreate" => TxKind::EscrowCreate,
            "EscrowFinish" => TxKind::EscrowFinish,
            "NFTokenMint" => TxKind::NftTokenMint,
            "PaymentChannelCreate" => TxKind::PaymentChannelCreate,
            _ => TxKind::Unknown,
        }
    }

    /// Wire-format name for this kind
    pub fn name(&self) -> &'static str {
        match self {
            TxKind::Payment => "Payment",
            TxKind::OfferCreate => "OfferCreate",
            TxKind::OfferCancel => "OfferCancel",
            TxKind::TrustSet => "TrustSet",
            TxKind::EscrowCreate => "EscrowCreate",
            TxKind::EscrowFinish => "EscrowFinish",
            TxKind::NftTokenMint => "NFTokenMint",
            TxKind::PaymentChannelCreate => "PaymentChannelCreate",
            TxKind::Unknown => "Unknown",
        }
    }
}

/// Structured parse failure for payloads that cannot become a
/// [`TransactionRecord`].
///
/// A malformed payload is dropped with a diagnostic; it never crashes the
/// process.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedRecord {
    /// Payload (or its transaction envelope) is not a JSON object
    #[error("payload is not a JSON object")]
    NotAnObject,

    /// A required field is absent
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    /// A field is present but has an unusable shape
    #[error("field `{field}` has unexpected shape: {detail}")]
    InvalidField {
        field: &'static str,
        detail: String,
    },
}

/// Stream client connection lifecycle.
///
/// Single instance per client, moved only by explicit `connect()` /
/// `disconnect()` calls and transport callbacks:
///
/// `Disconnected → Connecting → Subscribed ⇄ Degraded → Reconnecting → Terminated`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Initial state; also reached by a clean `disconnect()`
    Disconnected,
    /// Transport dial and initial subscribe in flight
    Connecting,
    /// Live transaction stream plus ledger-close notifications
    Subscribed,
    /// Subscribe failed twice; polling closed ledgers instead
    Degraded,
    /// Transport lost; waiting out the backoff delay
    Reconnecting,
    /// Reconnection budget exhausted; requires a fresh `connect()`
    Terminated,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Subscribed => "subscribed",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Terminated => "terminated",
        };
        write!(f, "{}", s)
    }
}
