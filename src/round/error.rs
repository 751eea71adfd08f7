//! Round Errors
//!
//! Every contract operation either commits fully or fails with one of
//! these. Nothing is retried internally.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::account::Account;
use crate::core::hash::Hash256;
use crate::host::ledger::LedgerError;

/// Something a contract operation needed but could not find.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    /// No round has ever been opened.
    ActiveRound,
    /// The round does not exist.
    Round(u16),
    /// The account never seeded in the round.
    Participant {
        /// Round number.
        round: u16,
        /// Account looked up.
        account: Account,
    },
    /// The reserved id-0 proof commitment is gone.
    Proof(u16),
    /// The next commit in redemption order is gone.
    Commit {
        /// Round number.
        round: u16,
        /// Sequence id that was expected.
        sequence_id: u64,
    },
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActiveRound => write!(f, "no active round"),
            Self::Round(round) => write!(f, "round {} does not exist", round),
            Self::Participant { round, account } => {
                write!(f, "account {} not found in round {}", account, round)
            }
            Self::Proof(round) => write!(f, "no proof commitment in round {}", round),
            Self::Commit { round, sequence_id } => {
                write!(f, "no seed {} in round {}", sequence_id, round)
            }
        }
    }
}

/// Contract operation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoundError {
    /// The transaction lacks the required signer.
    #[error("missing authority of {0}")]
    Unauthorized(Account),

    /// Round number is not the valid successor, or the previous round is still seeding.
    #[error("round {requested} cannot open: {reason}")]
    InvalidRoundSequence {
        /// Requested round number.
        requested: u16,
        /// Why it was refused.
        reason: &'static str,
    },

    /// Operation attempted outside its phase window.
    #[error("round {round}: {reason}")]
    PhaseViolation {
        /// Round number.
        round: u16,
        /// Which window was violated.
        reason: &'static str,
    },

    /// Seed value already stored in the round.
    #[error("seed {value} already used in round {round}")]
    DuplicateCommitment {
        /// Round number.
        round: u16,
        /// Offending value.
        value: Hash256,
    },

    /// A round, participant or commit is absent.
    #[error("{0}")]
    NotFound(Missing),

    /// The revealed secret does not hash to the proof commitment.
    #[error("proof does not match commitment for round {round}")]
    RevealMismatch {
        /// Round number.
        round: u16,
    },

    /// No tickets left to redeem.
    #[error("{account} has no tickets to redeem in round {round}")]
    InsufficientTickets {
        /// Round number.
        round: u16,
        /// Account that tried.
        account: Account,
    },

    /// Reward already claimed.
    #[error("{account} already claimed round {round}")]
    AlreadyClaimed {
        /// Round number.
        round: u16,
        /// Account that tried.
        account: Account,
    },

    /// Nothing to pay out.
    #[error("no reward for {account}: {reason}")]
    NoReward {
        /// Account that tried.
        account: Account,
        /// Why nothing is owed.
        reason: &'static str,
    },

    /// The host ledger refused an operation.
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
}

/// Coarse error classification, stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Wrong or missing signer.
    Unauthorized,
    /// Round number or ordering refused.
    InvalidRoundSequence,
    /// Outside the phase window.
    PhaseViolation,
    /// Seed value reused.
    DuplicateCommitment,
    /// Entity absent.
    NotFound,
    /// Proof hash mismatch.
    RevealMismatch,
    /// No tickets.
    InsufficientTickets,
    /// Claimed twice.
    AlreadyClaimed,
    /// Nothing to pay.
    NoReward,
    /// Host ledger failure.
    Ledger,
}

impl RoundError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::InvalidRoundSequence { .. } => ErrorKind::InvalidRoundSequence,
            Self::PhaseViolation { .. } => ErrorKind::PhaseViolation,
            Self::DuplicateCommitment { .. } => ErrorKind::DuplicateCommitment,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::RevealMismatch { .. } => ErrorKind::RevealMismatch,
            Self::InsufficientTickets { .. } => ErrorKind::InsufficientTickets,
            Self::AlreadyClaimed { .. } => ErrorKind::AlreadyClaimed,
            Self::NoReward { .. } => ErrorKind::NoReward,
            Self::Ledger(_) => ErrorKind::Ledger,
        }
    }
}
