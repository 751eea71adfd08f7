//! Network Layer
//!
//! WebSocket gateway in front of the contract. This layer is
//! **non-deterministic**; every state change still goes through the
//! executor one transaction at a time.

pub mod auth;
pub mod protocol;
pub mod server;

pub use auth::{authenticate, validate_token, AuthConfig, AuthError, TokenClaims};
pub use protocol::{
    AuthRequest, AuthResult, ClientMessage, ErrorCode, PushRequest, RoundInfo, ServerError,
    ServerMessage, TimeWindow,
};
pub use server::{Gateway, GatewayConfig, GatewayError, GatewayState};
