//! Round Lifecycle
//!
//! Per-round state and the contract operations that drive it:
//! - `state`: round aggregates, index and phase windows
//! - `commits`: seed commitments keyed by sequence id and by value
//! - `participants`: ticket and point rows per account
//! - `contract`: the `Rambler` state machine

pub mod commits;
pub mod contract;
pub mod error;
pub mod participants;
pub mod state;

pub use commits::{CommitStore, ResourceCredit, SeedCommit, PROOF_SEQUENCE_ID, RAM_COST_PER_SEED};
pub use contract::{ContractConfig, Rambler, RoundScope};
pub use error::{ErrorKind, Missing, RoundError};
pub use participants::{Participant, ParticipantLedger};
pub use state::{Round, RoundIndex, RoundPhase};
