//! Reward Settlement
//!
//! Proportional share arithmetic and the two-step liquidate-then-pay
//! protocol run against the host ledger.

pub mod coordinator;
pub mod reward;

pub use coordinator::{begin_settlement, payout, settlement_delta, SettlementPlan, SETTLEMENT_MEMO};
pub use reward::proportional_share;
