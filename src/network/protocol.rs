//! Gateway Protocol
//!
//! JSON messages exchanged with gateway clients over WebSocket. Clients
//! authenticate once, then push transactions signed by their account
//! and query round timing.

use serde::{Deserialize, Serialize};

use crate::core::account::Account;
use crate::host::action::Action;
use crate::host::executor::TransactionReceipt;
use crate::round::error::ErrorKind;
use crate::round::participants::Participant;
use crate::round::state::{Round, RoundPhase};

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Authenticate the connection.
    Auth(AuthRequest),

    /// Push a transaction signed by the authenticated account.
    Push(PushRequest),

    /// Seconds left in a round's seed window.
    SeedTime { round: u16 },

    /// Seconds left in a round's redeem window.
    RedeemTime { round: u16 },

    /// Round aggregates plus the caller's participant row.
    GetRound { round: u16 },

    /// Latency probe.
    Ping { timestamp: u64 },
}

/// Authentication request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    /// JWT from the auth provider.
    pub token: String,
    /// Client version.
    pub client_version: String,
}

/// Transaction request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRequest {
    /// Echoed back in the response.
    pub request_id: u64,
    /// Actions executed atomically, in order.
    pub actions: Vec<Action>,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from gateway to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// Transaction committed.
    Receipt {
        request_id: u64,
        receipt: TransactionReceipt,
    },

    /// Answer to `SeedTime` or `RedeemTime`.
    TimeRemaining {
        round: u16,
        window: TimeWindow,
        seconds: u32,
    },

    /// Answer to `GetRound`.
    Round(RoundInfo),

    /// Pong response.
    Pong { timestamp: u64, server_time: u64 },

    /// Request failed.
    Error(ServerError),

    /// Gateway is shutting down.
    Shutdown { reason: String },
}

/// Authentication result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether auth succeeded.
    pub success: bool,
    /// Account the connection now signs for.
    pub account: Option<Account>,
    /// Error message if failed.
    pub error: Option<String>,
    /// Gateway version.
    pub server_version: String,
}

/// Which window a time query refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeWindow {
    /// Seed submission window.
    Seed,
    /// Redemption window.
    Redeem,
}

/// Round snapshot for one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundInfo {
    /// Round aggregates.
    pub round: Round,
    /// Phase at query time.
    pub phase: RoundPhase,
    /// Whether this is the most recently opened round.
    pub current: bool,
    /// The caller's row, if it has one.
    pub participant: Option<Participant>,
}

/// Error details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Contract error classification, for rejected transactions.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub kind: Option<ErrorKind>,
    /// Human-readable message.
    pub message: String,
}

impl ServerError {
    /// Error without a contract classification.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            kind: None,
            message: message.into(),
        }
    }
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Authentication failed.
    AuthFailed,
    /// Not authenticated.
    NotAuthenticated,
    /// JWT token has expired.
    TokenExpired,
    /// Invalid JWT token (signature, format, claims).
    InvalidToken,
    /// Malformed message.
    InvalidInput,
    /// The contract rejected the transaction.
    Rejected,
    /// Gateway overloaded.
    ServerOverloaded,
    /// Internal error.
    InternalError,
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::sha256;

    #[test]
    fn test_push_parses_from_client_json() {
        let value = sha256(b"seed");
        let json = format!(
            r#"{{"type":"push","request_id":7,"actions":[{{"name":"submit_seed","data":{{"account":"usera","value":"{}"}}}}]}}"#,
            value.to_hex()
        );

        let msg = ClientMessage::from_json(&json).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Push(PushRequest {
                request_id: 7,
                actions: vec![Action::SubmitSeed {
                    account: Account::new("usera"),
                    value,
                }],
            })
        );
    }

    #[test]
    fn test_time_query_shape() {
        let msg = ClientMessage::from_json(r#"{"type":"redeem_time","round":3}"#).unwrap();
        assert_eq!(msg, ClientMessage::RedeemTime { round: 3 });

        let reply = ServerMessage::TimeRemaining {
            round: 3,
            window: TimeWindow::Redeem,
            seconds: 42,
        };
        let json = reply.to_json().unwrap();
        assert!(json.contains(r#""type":"time_remaining""#));
        assert!(json.contains(r#""window":"redeem""#));
    }

    #[test]
    fn test_rejection_carries_kind() {
        let msg = ServerMessage::Error(ServerError {
            code: ErrorCode::Rejected,
            kind: Some(ErrorKind::AlreadyClaimed),
            message: "usera already claimed round 1".into(),
        });
        let json = msg.to_json().unwrap();
        assert!(json.contains("already_claimed"));
        assert_eq!(ServerMessage::from_json(&json).unwrap(), msg);

        let plain = ServerError::new(ErrorCode::InvalidInput, "bad");
        assert!(!ServerMessage::Error(plain).to_json().unwrap().contains("kind"));
    }

    #[test]
    fn test_unknown_type_rejected() {
        assert!(ClientMessage::from_json(r#"{"type":"matchmaking"}"#).is_err());
    }
}
