//! Transaction normalization
//!
//! Parses a raw network payload into a canonical [`TransactionRecord`] or a
//! structured [`MalformedRecord`] failure. No downstream code touches raw
//! payload fields; everything goes through this parse step.

use chrono::Utc;
use serde_json::{Map, Value};
use tracing::debug;

use chimes_common::record::{MalformedRecord, TransactionRecord, TxKind};

/// Offset from the ledger network epoch (2000-01-01) to the Unix epoch
pub const LEDGER_EPOCH_OFFSET_SECS: i64 = 946_684_800;

/// Minor units (drops) per major settlement unit (XRP)
pub const DROPS_PER_XRP: f64 = 1_000_000.0;

/// Normalize a raw payload into a canonical record.
///
/// Accepts both the stream shape (transaction nested under `"transaction"`
/// or `"tx_json"`) and the expanded ledger-entry shape (fields at top
/// level). Never panics; every failure is a structured [`MalformedRecord`].
pub fn normalize(payload: &Value) -> Result<TransactionRecord, MalformedRecord> {
    let envelope = payload.as_object().ok_or(MalformedRecord::NotAnObject)?;

    let tx = envelope
        .get("transaction")
        .or_else(|| envelope.get("tx_json"))
        .unwrap_or(payload)
        .as_object()
        .ok_or(MalformedRecord::NotAnObject)?;

    let id = require_string(tx, "hash")?;
    let account = require_string(tx, "Account")?;

    // Absent type degrades to Unknown; every other required field rejects.
    let kind = match tx.get("TransactionType").and_then(|v| v.as_str()) {
        Some(name) => TxKind::from_name(name),
        None => TxKind::Unknown,
    };

    let destination = tx
        .get("Destination")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string());

    let fee = tx
        .get("Fee")
        .and_then(parse_drops)
        .unwrap_or(0);

    let amount = extract_amount(tx, fee);

    let timestamp = match tx.get("date").and_then(|v| v.as_i64()) {
        Some(date) => (date + LEDGER_EPOCH_OFFSET_SECS) * 1000,
        None => {
            debug!("Transaction {} has no date field, stamping arrival time", id);
            Utc::now().timestamp_millis()
        }
    };

    let ledger_index = envelope
        .get("ledger_index")
        .or_else(|| tx.get("ledger_index"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);

    Ok(TransactionRecord {
        id,
        timestamp,
        amount,
        kind,
        account,
        destination,
        fee,
        ledger_index,
    })
}

/// Amount extraction, in priority order:
/// 1. a maximum-send field (`DeliverMax`, older nodes: `SendMax`)
/// 2. the primary `Amount` field
/// 3. neither present: 0
///
/// A zero amount with a nonzero fee reports the fee (in major units) as the
/// nominal amount for sonification; the true fee stays in `fee`.
fn extract_amount(tx: &Map<String, Value>, fee: u64) -> f64 {
    let amount = tx
        .get("DeliverMax")
        .or_else(|| tx.get("SendMax"))
        .or_else(|| tx.get("Amount"))
        .and_then(parse_amount)
        .unwrap_or(0.0);

    if amount == 0.0 && fee > 0 {
        return fee as f64 / DROPS_PER_XRP;
    }
    amount.max(0.0)
}

/// Parse one amount value: a plain numeric string is drops; a structured
/// value object carries major units in its `value` field.
fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::String(s) => s.parse::<f64>().ok().map(|drops| drops / DROPS_PER_XRP),
        Value::Number(n) => n.as_f64().map(|drops| drops / DROPS_PER_XRP),
        Value::Object(obj) => obj
            .get("value")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<f64>().ok()),
        _ => None,
    }
}

/// Parse a drops field (string or number) into minor units
fn parse_drops(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse::<u64>().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

fn require_string(
    tx: &Map<String, Value>,
    field: &'static str,
) -> Result<String, MalformedRecord> {
    match tx.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(other) => Err(MalformedRecord::InvalidField {
            field,
            detail: format!("expected string, got {}", type_name(other)),
        }),
        None => Err(MalformedRecord::MissingField(field)),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
