//! # Rambler
//!
//! Commit-reveal round lottery. Players submit seeds for tickets, the
//! operator reveals a pre-committed secret, tickets are redeemed for
//! points drawn from `sha256(secret || seed)`, and the resource credit
//! released by deleted seeds is paid out in proportion to points.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         RAMBLER                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── hash.rs     - SHA-256 hashes and state fingerprints     │
//! │  ├── oracle.rs   - Secret+seed point draw                    │
//! │  ├── time.rs     - Second-resolution time and clocks         │
//! │  └── account.rs  - Ledger account names                      │
//! │                                                              │
//! │  round/          - Contract state machine (deterministic)    │
//! │  ├── state.rs    - Round aggregates and phase windows        │
//! │  ├── commits.rs  - Seed commitment store                     │
//! │  ├── participants.rs - Tickets and points per account        │
//! │  └── contract.rs - Operations and queries                    │
//! │                                                              │
//! │  settlement/     - Proportional reward payout                │
//! │  host/           - Ledger trait, in-memory ledger, executor  │
//! │  operator/       - Secret vault and round keeper (async)     │
//! │  network/        - WebSocket gateway (async)                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! The `core/`, `round/` and `settlement/` modules are deterministic:
//! - Integer arithmetic only, reward products in `u128`
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - Time is an explicit input, never read from the system
//!
//! Replaying the same transactions at the same times yields the same
//! `Rambler::state_hash` on any platform.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod host;
pub mod network;
pub mod operator;
pub mod round;
pub mod settlement;

// Re-export commonly used types
pub use crate::core::{sha256, Account, Clock, Hash256, ManualClock, SystemClock, TimePointSec};
pub use host::{Action, ActionReturn, Asset, Executor, Ledger, MemoryLedger, Transaction};
pub use round::{ContractConfig, Rambler, RoundError, RAM_COST_PER_SEED};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
