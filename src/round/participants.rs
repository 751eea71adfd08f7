//! Participant Ledger
//!
//! Per-round, per-account tickets, points and claim status. Rows are
//! never deleted so claim status survives the round.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::account::Account;
use crate::core::hash::StateHasher;

/// One account's standing in a round.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Tickets not yet redeemed.
    pub tickets_available: u64,
    /// Tickets redeemed.
    pub tickets_used: u64,
    /// Points accumulated from redemptions.
    pub points_accumulated: u64,
    /// Reward already claimed.
    pub claimed: bool,
}

impl Participant {
    /// Record one redemption worth `points`.
    pub fn redeem(&mut self, points: u64) {
        self.tickets_available -= 1;
        self.tickets_used += 1;
        self.points_accumulated += points;
    }
}

/// Participants of one round, in account order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantLedger {
    rows: BTreeMap<Account, Participant>,
}

impl ParticipantLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure a row exists without issuing anything.
    pub fn register(&mut self, account: &Account) {
        self.rows.entry(account.clone()).or_default();
    }

    /// Issue one ticket, creating the row on first use.
    pub fn issue_ticket(&mut self, account: &Account) -> &Participant {
        let row = self.rows.entry(account.clone()).or_default();
        row.tickets_available += 1;
        row
    }

    /// Look up a participant.
    pub fn get(&self, account: &Account) -> Option<&Participant> {
        self.rows.get(account)
    }

    /// Look up a participant for update.
    pub fn get_mut(&mut self, account: &Account) -> Option<&mut Participant> {
        self.rows.get_mut(account)
    }

    /// All participants in account order.
    pub fn iter(&self) -> impl Iterator<Item = (&Account, &Participant)> {
        self.rows.iter()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of redeemed tickets over all rows.
    pub fn total_tickets_used(&self) -> u64 {
        self.rows.values().map(|p| p.tickets_used).sum()
    }

    /// Sum of points over all rows.
    pub fn total_points(&self) -> u64 {
        self.rows.values().map(|p| p.points_accumulated).sum()
    }

    /// Feed into a state fingerprint.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u64(self.rows.len() as u64);
        for (account, p) in &self.rows {
            hasher.update_str(account.as_str());
            hasher.update_u64(p.tickets_available);
            hasher.update_u64(p.tickets_used);
            hasher.update_u64(p.points_accumulated);
            hasher.update_bool(p.claimed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_ticket_creates_then_increments() {
        let mut ledger = ParticipantLedger::new();
        let usera = Account::new("usera");

        assert_eq!(ledger.issue_ticket(&usera).tickets_available, 1);
        assert_eq!(ledger.issue_ticket(&usera).tickets_available, 2);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut ledger = ParticipantLedger::new();
        let usera = Account::new("usera");

        ledger.issue_ticket(&usera);
        ledger.register(&usera);

        assert_eq!(ledger.get(&usera).unwrap().tickets_available, 1);
    }

    #[test]
    fn test_totals() {
        let mut ledger = ParticipantLedger::new();
        let usera = Account::new("usera");
        let userb = Account::new("userb");

        ledger.issue_ticket(&usera);
        ledger.issue_ticket(&usera);
        ledger.issue_ticket(&userb);

        ledger.get_mut(&usera).unwrap().redeem(40);
        ledger.get_mut(&userb).unwrap().redeem(2);

        assert_eq!(ledger.total_tickets_used(), 2);
        assert_eq!(ledger.total_points(), 42);
        assert_eq!(ledger.get(&usera).unwrap().tickets_available, 1);
    }
}
