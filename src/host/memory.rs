//! In-Memory Reference Ledger
//!
//! Deterministic stand-in for the host chain. Holds token balances and
//! unused resource per account, and sells resource at a fixed linear
//! price minus a 0.5% fee. `Clone` is how the executor snapshots it.

use std::collections::BTreeMap;

use tracing::debug;

use crate::core::account::Account;
use crate::host::ledger::{Asset, Ledger, LedgerError};

/// Resource sale pricing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourcePrice {
    /// Asset units paid per 1024 resource units.
    pub per_kib: i64,
    /// Fee in basis points (rounded up).
    pub fee_bps: i64,
}

impl Default for ResourcePrice {
    fn default() -> Self {
        Self {
            per_kib: 500, // 0.0500 EOS per KiB
            fee_bps: 50,
        }
    }
}

impl ResourcePrice {
    /// Net proceeds of selling `units`.
    pub fn proceeds(&self, units: i64) -> Result<Asset, LedgerError> {
        let gross = (units as i128 * self.per_kib as i128) / 1024;
        let fee = (gross * self.fee_bps as i128 + 9_999) / 10_000;
        i64::try_from(gross - fee)
            .map(Asset::new)
            .map_err(|_| LedgerError::Overflow)
    }
}

/// In-memory ledger.
#[derive(Clone, Debug, Default)]
pub struct MemoryLedger {
    balances: BTreeMap<Account, Asset>,
    resources: BTreeMap<Account, i64>,
    price: ResourcePrice,
}

impl MemoryLedger {
    /// Create an empty ledger with default pricing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the resource price.
    pub fn with_price(mut self, price: ResourcePrice) -> Self {
        self.price = price;
        self
    }

    /// Open an account with a balance.
    pub fn with_balance(mut self, account: impl Into<Account>, amount: Asset) -> Self {
        self.balances.insert(account.into(), amount);
        self
    }

    /// Give an account unused resource.
    pub fn with_resource(mut self, account: impl Into<Account>, units: i64) -> Self {
        self.resources.insert(account.into(), units);
        self
    }

    /// Open a zero balance row (no-op if present).
    pub fn open(&mut self, account: &Account) {
        self.balances.entry(account.clone()).or_insert(Asset::ZERO);
    }

    /// Unused resource held by `account`.
    pub fn resource_of(&self, account: &Account) -> i64 {
        self.resources.get(account).copied().unwrap_or(0)
    }

    /// Current pricing.
    pub fn price(&self) -> ResourcePrice {
        self.price
    }

    fn credit(&mut self, account: &Account, quantity: Asset) -> Result<(), LedgerError> {
        let balance = self
            .balances
            .get_mut(account)
            .ok_or_else(|| LedgerError::UnknownAccount(account.clone()))?;
        *balance = balance.checked_add(quantity).ok_or(LedgerError::Overflow)?;
        Ok(())
    }
}

impl Ledger for MemoryLedger {
    fn balance(&self, account: &Account) -> Result<Asset, LedgerError> {
        self.balances
            .get(account)
            .copied()
            .ok_or_else(|| LedgerError::UnknownAccount(account.clone()))
    }

    fn sell_resource(&mut self, account: &Account, units: i64) -> Result<(), LedgerError> {
        if units <= 0 {
            return Err(LedgerError::NonPositiveQuantity(units));
        }
        let available = self.resource_of(account);
        if available < units {
            return Err(LedgerError::InsufficientResource {
                account: account.clone(),
                available,
                requested: units,
            });
        }
        let proceeds = self.price.proceeds(units)?;
        self.credit(account, proceeds)?;
        self.resources.insert(account.clone(), available - units);

        debug!("{} sold {} resource units for {}", account, units, proceeds);
        Ok(())
    }

    fn transfer(
        &mut self,
        from: &Account,
        to: &Account,
        quantity: Asset,
        memo: &str,
    ) -> Result<(), LedgerError> {
        if quantity.amount <= 0 {
            return Err(LedgerError::NonPositiveQuantity(quantity.amount));
        }
        let available = self.balance(from)?;
        let remaining = available
            .checked_sub(quantity)
            .filter(|rest| rest.amount >= 0)
            .ok_or_else(|| LedgerError::InsufficientFunds {
                account: from.clone(),
                available,
                required: quantity,
            })?;
        // Receiver rows are opened on demand
        self.open(to);
        self.balances.insert(from.clone(), remaining);
        self.credit(to, quantity)?;

        debug!("transfer {} {} -> {} ({})", quantity, from, to, memo);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_price() {
        let price = ResourcePrice::default();
        // 312 * 500 / 1024 = 152, fee ceil(0.76) = 1
        assert_eq!(price.proceeds(312).unwrap(), Asset::new(151));
        // Tiny sales round to nothing
        assert_eq!(price.proceeds(1).unwrap(), Asset::ZERO);
    }

    #[test]
    fn test_sell_resource() {
        let mut ledger = MemoryLedger::new()
            .with_balance("contract", Asset::ZERO)
            .with_resource("contract", 1_000);
        let contract = Account::new("contract");

        ledger.sell_resource(&contract, 312).unwrap();
        assert_eq!(ledger.balance(&contract).unwrap(), Asset::new(151));
        assert_eq!(ledger.resource_of(&contract), 688);

        let err = ledger.sell_resource(&contract, 5_000).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientResource { .. }));
        assert!(matches!(
            ledger.sell_resource(&contract, 0),
            Err(LedgerError::NonPositiveQuantity(0))
        ));
    }

    #[test]
    fn test_transfer() {
        let mut ledger = MemoryLedger::new().with_balance("contract", Asset::new(500));
        let contract = Account::new("contract");
        let usera = Account::new("usera");

        ledger.transfer(&contract, &usera, Asset::new(200), "reward").unwrap();
        assert_eq!(ledger.balance(&contract).unwrap(), Asset::new(300));
        assert_eq!(ledger.balance(&usera).unwrap(), Asset::new(200));

        let err = ledger
            .transfer(&contract, &usera, Asset::new(301), "reward")
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientFunds { .. }));
    }

    #[test]
    fn test_unknown_account() {
        let ledger = MemoryLedger::new();
        assert!(matches!(
            ledger.balance(&Account::new("nobody")),
            Err(LedgerError::UnknownAccount(_))
        ));
    }
}
