//! Wire protocol for the ledger WebSocket interface
//!
//! Commands are JSON objects with a client-chosen request `id`; the node
//! answers with a response envelope echoing that id, and pushes stream
//! messages (`transaction`, `ledgerClosed`) without one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Streams the client can subscribe to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamName {
    Transactions,
    Ledger,
}

/// Outbound command body
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Subscribe {
        streams: Vec<StreamName>,
    },
    Unsubscribe {
        streams: Vec<StreamName>,
    },
    Ledger {
        ledger_index: u64,
        transactions: bool,
        expand: bool,
    },
    LedgerCurrent,
    ServerInfo,
}

/// Outbound request: command body plus request id
#[derive(Debug, Clone, Serialize)]
pub struct Request {
    pub id: u64,
    #[serde(flatten)]
    pub command: Command,
}

impl Request {
    pub fn new(id: u64, command: Command) -> Self {
        Self { id, command }
    }

    pub fn to_json(&self) -> String {
        // Serialization of these shapes cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Inbound message envelope
///
/// One permissive shape covers the three message families (stream pushes,
/// command responses, errors); [`Envelope::classify`] produces the tagged
/// variant the client logic consumes, so no field is read before its family
/// is established.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub id: Option<u64>,
    pub status: Option<String>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub error_message: Option<String>,
    pub ledger_index: Option<u64>,
    pub txn_count: Option<u64>,
    pub transaction: Option<Value>,
    pub tx_json: Option<Value>,
    pub validated: Option<bool>,
}

/// Classified inbound message
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Validated transaction pushed on the live stream (full payload)
    Transaction(Value),
    /// A ledger closed carrying `txn_count` transactions
    LedgerClosed { ledger_index: u64, txn_count: u64 },
    /// Successful response to the request with this id
    Response { id: u64, result: Value },
    /// Failed response to the request with this id
    Failure { id: Option<u64>, message: String },
    /// Anything else (server_info pushes, unknown types)
    Other,
}

impl Envelope {
    /// Parse raw text into an envelope
    pub fn parse(text: &str) -> Option<Envelope> {
        serde_json::from_str(text).ok()
    }

    /// Classify this envelope into the message family the client handles
    pub fn classify(self, raw: Value) -> Inbound {
        match self.kind.as_deref() {
            Some("transaction") => Inbound::Transaction(raw),
            Some("ledgerClosed") => match (self.ledger_index, self.txn_count) {
                (Some(ledger_index), Some(txn_count)) => Inbound::LedgerClosed {
                    ledger_index,
                    txn_count,
                },
                _ => Inbound::Other,
            },
            Some("response") | None => match (self.status.as_deref(), self.id) {
                (Some("success"), Some(id)) => Inbound::Response {
                    id,
                    result: self.result.unwrap_or(Value::Null),
                },
                (Some(_), id) => Inbound::Failure {
                    id,
                    message: self
                        .error_message
                        .or(self.error)
                        .unwrap_or_else(|| "unspecified error".to_string()),
                },
                _ => Inbound::Other,
            },
            _ => Inbound::Other,
        }
    }
}

/// Parse and classify one wire message
pub fn classify_message(text: &str) -> Option<Inbound> {
    let raw: Value = serde_json::from_str(text).ok()?;
    let envelope: Envelope = serde_json::from_value(raw.clone()).ok()?;
    Some(envelope.classify(raw))
}

/// Transactions carried by an expanded `ledger` fetch result
///
/// Result shape: `{"ledger": {"transactions": [tx, ...]}, ...}`.
pub fn expanded_transactions(result: &Value) -> Vec<Value> {
    result
        .get("ledger")
        .and_then(|l| l.get("transactions"))
        .and_then(|t| t.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Ledger index reported by a `ledger_current` result
pub fn current_ledger_index(result: &Value) -> Option<u64> {
    result.get("ledger_current_index").and_then(|v| v.as_u64())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_request_shape() {
        let req = Request::new(
            1,
            Command::Subscribe {
                streams: vec![StreamName::Transactions, StreamName::Ledger],
            },
        );
        let json: Value = serde_json::from_str(&req.to_json()).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["command"], "subscribe");
        assert_eq!(json["streams"][0], "transactions");
        assert_eq!(json["streams"][1], "ledger");
    }

    #[test]
    fn test_ledger_fetch_request_shape() {
        let req = Request::new(
            7,
            Command::Ledger {
                ledger_index: 93_000_123,
                transactions: true,
                expand: true,
            },
        );
        let json: Value = serde_json::from_str(&req.to_json()).unwrap();
        assert_eq!(json["command"], "ledger");
        assert_eq!(json["ledger_index"], 93_000_123);
        assert_eq!(json["transactions"], true);
        assert_eq!(json["expand"], true);
    }

    #[test]
    fn test_classify_transaction_push() {
        let text = r#"{"type":"transaction","transaction":{"hash":"AB"},"ledger_index":12,"validated":true}"#;
        match classify_message(text).unwrap() {
            Inbound::Transaction(raw) => {
                assert_eq!(raw["transaction"]["hash"], "AB");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_classify_ledger_closed() {
        let text = r#"{"type":"ledgerClosed","ledger_index":93021491,"txn_count":35}"#;
        match classify_message(text).unwrap() {
            Inbound::LedgerClosed {
                ledger_index,
                txn_count,
            } => {
                assert_eq!(ledger_index, 93_021_491);
                assert_eq!(txn_count, 35);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_classify_success_and_failure_responses() {
        let ok = r#"{"id":3,"status":"success","type":"response","result":{"ledger_current_index":42}}"#;
        match classify_message(ok).unwrap() {
            Inbound::Response { id, result } => {
                assert_eq!(id, 3);
                assert_eq!(current_ledger_index(&result), Some(42));
            }
            other => panic!("unexpected: {:?}", other),
        }

        let err = r#"{"id":4,"status":"error","error":"noPermission","error_message":"not allowed"}"#;
        match classify_message(err).unwrap() {
            Inbound::Failure { id, message } => {
                assert_eq!(id, Some(4));
                assert_eq!(message, "not allowed");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_expanded_transactions_extraction() {
        let result: Value = serde_json::from_str(
            r#"{"ledger":{"transactions":[{"hash":"A"},{"hash":"B"}]},"validated":true}"#,
        )
        .unwrap();
        let txs = expanded_transactions(&result);
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0]["hash"], "A");

        // Absent list is an empty vec, not an error
        assert!(expanded_transactions(&Value::Null).is_empty());
    }
}
