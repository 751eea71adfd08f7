//! Host Chain Boundary
//!
//! Everything between the contract and the ledger it runs on:
//! - `ledger`: the collaborator trait and the reward asset
//! - `memory`: deterministic in-memory ledger
//! - `action`: wire actions, inline work and the execution context
//! - `executor`: atomic transaction execution with rollback

pub mod action;
pub mod executor;
pub mod ledger;
pub mod memory;

pub use action::{Action, ActionContext, ActionReturn, InlineAction, Transaction};
pub use executor::{ActionTrace, Executor, TransactionReceipt};
pub use ledger::{Asset, Ledger, LedgerError, ASSET_PRECISION, ASSET_SYMBOL};
pub use memory::{MemoryLedger, ResourcePrice};
