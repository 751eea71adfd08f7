//! Two-Step Settlement
//!
//! Step one marks the claim, snapshots the contract balance and asks the
//! ledger to liquidate the reward. Step two runs after the liquidation,
//! measures the balance delta against the snapshot it was handed, and
//! pays that delta out.
//!
//! The claim flag is set before anything external is requested, so a
//! retried or re-entered claim can never pay twice.

use tracing::debug;

use crate::core::account::Account;
use crate::host::action::{Action, InlineAction};
use crate::host::ledger::{Asset, LedgerError};
use crate::round::error::RoundError;
use crate::round::participants::Participant;
use crate::round::state::Round;
use crate::settlement::reward::proportional_share;

/// Memo attached to reward transfers.
pub const SETTLEMENT_MEMO: &str = "Rambler Reward";

/// Output of the first settlement step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementPlan {
    /// Account being paid.
    pub account: Account,
    /// Round the points came from.
    pub round: u16,
    /// Resource units to liquidate.
    pub reward: i64,
    /// Contract balance before liquidation.
    pub balance_before: Asset,
}

impl SettlementPlan {
    /// Inline work: liquidate, then confirm with the carried balance.
    pub fn inline_actions(&self, contract: &Account) -> [InlineAction; 2] {
        [
            InlineAction::SellResource {
                account: contract.clone(),
                units: self.reward,
            },
            InlineAction::Contract {
                action: Action::ConfirmSettlement {
                    account: self.account.clone(),
                    balance_before: self.balance_before,
                },
            },
        ]
    }
}

/// Validate a claim, mark it, and compute the reward.
///
/// The share is taken of the pool released at claim time. Claims made
/// while others are still redeeming are not reconciled later, so the
/// round's total liquidation can exceed `resource_released`.
pub fn begin_settlement(
    round: &Round,
    participant: &mut Participant,
    account: &Account,
    balance_before: Asset,
) -> Result<SettlementPlan, RoundError> {
    if participant.points_accumulated == 0 {
        return Err(RoundError::NoReward {
            account: account.clone(),
            reason: "no points to redeem",
        });
    }
    if participant.claimed {
        return Err(RoundError::AlreadyClaimed {
            round: round.number,
            account: account.clone(),
        });
    }

    let reward = proportional_share(
        round.resource_released,
        participant.points_accumulated,
        round.total_points,
    )
    .ok_or_else(|| RoundError::NoReward {
        account: account.clone(),
        reason: "round has no points",
    })?;

    if reward <= 0 {
        return Err(RoundError::NoReward {
            account: account.clone(),
            reason: "share rounds to zero",
        });
    }

    participant.claimed = true;

    debug!(
        "settlement for {} in round {}: {} of {} points, reward {} units",
        account, round.number, participant.points_accumulated, round.total_points, reward
    );

    Ok(SettlementPlan {
        account: account.clone(),
        round: round.number,
        reward,
        balance_before,
    })
}

/// Measure the liquidation proceeds.
pub fn settlement_delta(
    account: &Account,
    balance_before: Asset,
    balance_after: Asset,
) -> Result<Asset, RoundError> {
    let delta = balance_after
        .checked_sub(balance_before)
        .ok_or(LedgerError::Overflow)?;
    if delta.amount <= 0 {
        return Err(RoundError::NoReward {
            account: account.clone(),
            reason: "no balance diff",
        });
    }
    Ok(delta)
}

/// Transfer paying out `delta`.
pub fn payout(contract: &Account, account: &Account, delta: Asset) -> InlineAction {
    InlineAction::Transfer {
        from: contract.clone(),
        to: account.clone(),
        quantity: delta,
        memo: SETTLEMENT_MEMO.to_string(),
    }
}
