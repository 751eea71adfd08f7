//! Actions and Transactions
//!
//! Wire shape of every contract operation, the inline actions a contract
//! operation may schedule, and the per-action execution context.

use serde::{Deserialize, Serialize};

use crate::core::account::Account;
use crate::core::hash::Hash256;
use crate::core::time::TimePointSec;
use crate::host::ledger::{Asset, Ledger, LedgerError};
use crate::round::error::RoundError;

/// Contract operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "data", rename_all = "snake_case")]
pub enum Action {
    /// Operator opens a round with the hash of its secret.
    OpenRound {
        /// Round number (1, then successors).
        round: u16,
        /// `sha256(secret)`.
        secret_hash: Hash256,
        /// Seed window in seconds.
        seed_phase_secs: u32,
        /// Redeem window in seconds.
        redeem_phase_secs: u32,
    },
    /// Participant commits a seed in the current round.
    SubmitSeed {
        /// Seeding account.
        account: Account,
        /// Committed value.
        value: Hash256,
    },
    /// Operator reveals the secret.
    Reveal {
        /// Raw secret.
        secret: Hash256,
        /// Round number.
        round: u16,
    },
    /// Participant converts one ticket to points.
    RedeemTicket {
        /// Redeeming account.
        account: Account,
        /// Round number.
        round: u16,
    },
    /// Participant claims its reward share.
    ClaimReward {
        /// Claiming account.
        account: Account,
        /// Round number.
        round: u16,
    },
    /// Second settlement step, scheduled by the contract itself.
    ConfirmSettlement {
        /// Account being paid.
        account: Account,
        /// Contract balance before liquidation.
        balance_before: Asset,
    },
}

impl Action {
    /// Short action name for traces and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::OpenRound { .. } => "open_round",
            Self::SubmitSeed { .. } => "submit_seed",
            Self::Reveal { .. } => "reveal",
            Self::RedeemTicket { .. } => "redeem_ticket",
            Self::ClaimReward { .. } => "claim_reward",
            Self::ConfirmSettlement { .. } => "confirm_settlement",
        }
    }
}

/// Work scheduled by a contract action, executed after it in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InlineAction {
    /// Liquidate resource into the reward asset.
    SellResource {
        /// Selling account.
        account: Account,
        /// Resource units.
        units: i64,
    },
    /// Transfer the reward asset.
    Transfer {
        /// Payer.
        from: Account,
        /// Payee.
        to: Account,
        /// Quantity.
        quantity: Asset,
        /// Memo.
        memo: String,
    },
    /// Call back into the contract with its own authority.
    Contract {
        /// The action.
        action: Action,
    },
}

impl InlineAction {
    /// Short name for traces and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SellResource { .. } => "sell_resource",
            Self::Transfer { .. } => "transfer",
            Self::Contract { action } => action.name(),
        }
    }
}

/// Value an action hands back to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ActionReturn {
    /// Sequence id assigned to a submitted seed.
    SeedId(u64),
    /// Points won by a redeemed ticket.
    Points(u64),
    /// Resource units being liquidated for a claim.
    Reward(i64),
    /// Asset paid out by the settlement.
    Payout(Asset),
}

/// A signed batch of actions executed atomically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Actions, in order.
    pub actions: Vec<Action>,
    /// Accounts that signed.
    pub authorization: Vec<Account>,
}

impl Transaction {
    /// Single action signed by one account.
    pub fn new(action: Action, signer: impl Into<Account>) -> Self {
        Self {
            actions: vec![action],
            authorization: vec![signer.into()],
        }
    }

    /// Append another action.
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }
}

/// Everything a contract action may observe or schedule.
pub struct ActionContext<'a> {
    now: TimePointSec,
    authorization: &'a [Account],
    ledger: &'a dyn Ledger,
    inline: Vec<InlineAction>,
}

impl<'a> ActionContext<'a> {
    /// Create a context for one action.
    pub fn new(now: TimePointSec, authorization: &'a [Account], ledger: &'a dyn Ledger) -> Self {
        Self {
            now,
            authorization,
            ledger,
            inline: Vec::new(),
        }
    }

    /// Current block time.
    pub fn now(&self) -> TimePointSec {
        self.now
    }

    /// Fail unless `account` signed.
    pub fn require_auth(&self, account: &Account) -> Result<(), RoundError> {
        if self.authorization.iter().any(|a| a == account) {
            Ok(())
        } else {
            Err(RoundError::Unauthorized(account.clone()))
        }
    }

    /// Read a balance from the ledger.
    pub fn balance(&self, account: &Account) -> Result<Asset, LedgerError> {
        self.ledger.balance(account)
    }

    /// Schedule work to run after this action.
    pub fn send_inline(&mut self, action: InlineAction) {
        self.inline.push(action);
    }

    /// Drain scheduled work.
    pub fn into_inline(self) -> Vec<InlineAction> {
        self.inline
    }
}
