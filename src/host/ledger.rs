//! Host Ledger Interface
//!
//! What the contract needs from the ledger it runs on: the balance of the
//! reward asset, resource liquidation, and asset transfers.

use std::fmt;
use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};

use crate::core::account::Account;

/// Symbol of the reward asset.
pub const ASSET_SYMBOL: &str = "EOS";

/// Decimal places of the reward asset.
pub const ASSET_PRECISION: u32 = 4;

/// Quantity of the reward asset in its smallest unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asset {
    /// Amount in 10^-4 units.
    pub amount: i64,
}

impl Asset {
    /// Zero balance.
    pub const ZERO: Asset = Asset { amount: 0 };

    /// Create from raw units.
    pub const fn new(amount: i64) -> Self {
        Self { amount }
    }

    /// Checked subtraction.
    pub fn checked_sub(self, other: Asset) -> Option<Asset> {
        self.amount.checked_sub(other.amount).map(Asset::new)
    }

    /// Checked addition.
    pub fn checked_add(self, other: Asset) -> Option<Asset> {
        self.amount.checked_add(other.amount).map(Asset::new)
    }
}

impl Add for Asset {
    type Output = Asset;

    fn add(self, rhs: Asset) -> Asset {
        Asset::new(self.amount + rhs.amount)
    }
}

impl Sub for Asset {
    type Output = Asset;

    fn sub(self, rhs: Asset) -> Asset {
        Asset::new(self.amount - rhs.amount)
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = 10i64.pow(ASSET_PRECISION);
        let sign = if self.amount < 0 { "-" } else { "" };
        let abs = self.amount.unsigned_abs();
        write!(
            f,
            "{}{}.{:0width$} {}",
            sign,
            abs / scale as u64,
            abs % scale as u64,
            ASSET_SYMBOL,
            width = ASSET_PRECISION as usize
        )
    }
}

/// Ledger failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Account has no balance row.
    #[error("account {0} not found for balance fetch")]
    UnknownAccount(Account),

    /// Not enough of the asset.
    #[error("{account} has {available}, needs {required}")]
    InsufficientFunds {
        /// Paying account.
        account: Account,
        /// Current balance.
        available: Asset,
        /// Requested quantity.
        required: Asset,
    },

    /// Not enough unused resource to sell.
    #[error("{account} has {available} resource units, cannot sell {requested}")]
    InsufficientResource {
        /// Selling account.
        account: Account,
        /// Units available.
        available: i64,
        /// Units requested.
        requested: i64,
    },

    /// Quantities must be positive.
    #[error("quantity must be positive, got {0}")]
    NonPositiveQuantity(i64),

    /// Arithmetic overflow.
    #[error("balance overflow")]
    Overflow,
}

/// Host ledger collaborator.
pub trait Ledger {
    /// Balance of the reward asset held by `account`.
    fn balance(&self, account: &Account) -> Result<Asset, LedgerError>;

    /// Sell `units` of `account`'s resource for the reward asset.
    ///
    /// The proceeds are only observable as a balance change.
    fn sell_resource(&mut self, account: &Account, units: i64) -> Result<(), LedgerError>;

    /// Move `quantity` of the reward asset between accounts.
    fn transfer(
        &mut self,
        from: &Account,
        to: &Account,
        quantity: Asset,
        memo: &str,
    ) -> Result<(), LedgerError>;
}
