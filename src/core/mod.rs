//! Core deterministic primitives.
//!
//! Hashing, the random oracle, time and account identity. Nothing in this
//! module touches the host ledger.

pub mod account;
pub mod hash;
pub mod oracle;
pub mod time;

// Re-export core types
pub use account::Account;
pub use hash::{hash_pair, sha256, Hash256};
pub use oracle::{draw, draw_points, POINTS_MAX, POINTS_MIN};
pub use time::{Clock, ManualClock, SystemClock, TimePointSec};
