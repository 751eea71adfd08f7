//! Transaction Executor
//!
//! Runs signed transactions against the contract and the host ledger:
//! - Each transaction reads the clock once
//! - Inline work runs depth-first, in the order it was scheduled
//! - Any failure restores both the contract and the ledger snapshot
//!
//! A transaction is the unit of atomicity, so a claim and the settlement
//! steps it schedules either all land or none do.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::account::Account;
use crate::core::hash::Hash256;
use crate::core::time::{Clock, TimePointSec};
use crate::host::action::{ActionContext, ActionReturn, InlineAction, Transaction};
use crate::host::ledger::Ledger;
use crate::round::contract::Rambler;
use crate::round::error::RoundError;

/// Result of one executed action, top-level or inline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionTrace {
    /// Action name.
    pub name: String,
    /// Value returned, if any.
    pub return_value: Option<ActionReturn>,
}

/// Outcome of a committed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    /// Block time the transaction ran at.
    pub time: TimePointSec,
    /// Every executed action, in execution order.
    pub traces: Vec<ActionTrace>,
}

impl TransactionReceipt {
    /// Return values, skipping actions that returned nothing.
    pub fn returns(&self) -> impl Iterator<Item = ActionReturn> + '_ {
        self.traces.iter().filter_map(|t| t.return_value)
    }

    /// First return value of the transaction.
    pub fn first_return(&self) -> Option<ActionReturn> {
        self.returns().next()
    }
}

/// Queued unit of work with the authority it runs under.
struct Pending {
    action: InlineAction,
    authorization: Vec<Account>,
}

/// Executes transactions atomically.
///
/// Rollback snapshots clone the whole contract, every past round
/// included, and the whole ledger. Transaction cost therefore grows with
/// history. This is a reference host, not a production chain.
pub struct Executor<L, C> {
    contract: Rambler,
    ledger: L,
    clock: C,
}

impl<L: Ledger + Clone, C: Clock> Executor<L, C> {
    /// Create an executor.
    pub fn new(contract: Rambler, ledger: L, clock: C) -> Self {
        Self {
            contract,
            ledger,
            clock,
        }
    }

    /// Execute a transaction. On error nothing it did is kept.
    pub fn push_transaction(&mut self, tx: &Transaction) -> Result<TransactionReceipt, RoundError> {
        let now = self.clock.now();
        let contract_snapshot = self.contract.clone();
        let ledger_snapshot = self.ledger.clone();

        match self.execute(tx, now) {
            Ok(receipt) => Ok(receipt),
            Err(e) => {
                self.contract = contract_snapshot;
                self.ledger = ledger_snapshot;
                let names: Vec<&str> = tx.actions.iter().map(|a| a.name()).collect();
                warn!("Transaction {:?} rolled back: {}", names, e);
                Err(e)
            }
        }
    }

    fn execute(&mut self, tx: &Transaction, now: TimePointSec) -> Result<TransactionReceipt, RoundError> {
        let mut traces = Vec::new();

        for action in &tx.actions {
            let mut queue = VecDeque::new();
            queue.push_back(Pending {
                action: InlineAction::Contract {
                    action: action.clone(),
                },
                authorization: tx.authorization.clone(),
            });

            while let Some(pending) = queue.pop_front() {
                let (trace, scheduled) = self.run(pending, now)?;
                traces.push(trace);

                // Scheduled work runs before anything queued earlier
                let contract_auth = vec![self.contract.account().clone()];
                for action in scheduled.into_iter().rev() {
                    queue.push_front(Pending {
                        action,
                        authorization: contract_auth.clone(),
                    });
                }
            }
        }

        Ok(TransactionReceipt { time: now, traces })
    }

    fn run(
        &mut self,
        pending: Pending,
        now: TimePointSec,
    ) -> Result<(ActionTrace, Vec<InlineAction>), RoundError> {
        let name = pending.action.name().to_string();
        debug!("Executing {} at {}", name, now);

        match pending.action {
            InlineAction::Contract { action } => {
                let mut ctx = ActionContext::new(now, &pending.authorization, &self.ledger);
                let return_value = self.contract.apply(&mut ctx, &action)?;
                let scheduled = ctx.into_inline();
                Ok((ActionTrace { name, return_value }, scheduled))
            }
            InlineAction::SellResource { account, units } => {
                self.require(&pending.authorization, &account)?;
                self.ledger.sell_resource(&account, units)?;
                Ok((ActionTrace { name, return_value: None }, Vec::new()))
            }
            InlineAction::Transfer {
                from,
                to,
                quantity,
                memo,
            } => {
                self.require(&pending.authorization, &from)?;
                self.ledger.transfer(&from, &to, quantity, &memo)?;
                Ok((ActionTrace { name, return_value: None }, Vec::new()))
            }
        }
    }

    fn require(&self, authorization: &[Account], account: &Account) -> Result<(), RoundError> {
        if authorization.contains(account) {
            Ok(())
        } else {
            Err(RoundError::Unauthorized(account.clone()))
        }
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Current time according to the executor's clock.
    pub fn now(&self) -> TimePointSec {
        self.clock.now()
    }

    /// Seconds left in the round's seed window.
    pub fn seed_time_remaining(&self, round: u16) -> Result<u32, RoundError> {
        self.contract.seed_time_remaining(round, self.clock.now())
    }

    /// Seconds left in the round's redeem window.
    pub fn redeem_time_remaining(&self, round: u16) -> Result<u32, RoundError> {
        self.contract.redeem_time_remaining(round, self.clock.now())
    }

    /// Most recently opened round.
    pub fn current_round(&self) -> Option<u16> {
        self.contract.current_round()
    }

    /// Contract state fingerprint.
    pub fn state_hash(&self) -> Hash256 {
        self.contract.state_hash()
    }

    /// Contract state.
    pub fn contract(&self) -> &Rambler {
        &self.contract
    }

    /// Host ledger.
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Host ledger, mutably (outside any transaction).
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    /// Clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::sha256;
    use crate::core::oracle::draw_points;
    use crate::core::time::ManualClock;
    use crate::host::action::Action;
    use crate::host::ledger::Asset;
    use crate::host::memory::{MemoryLedger, ResourcePrice};
    use crate::round::commits::RAM_COST_PER_SEED;
    use crate::round::contract::ContractConfig;
    use crate::round::error::ErrorKind;

    const START: u32 = 1_700_000_000;
    const OPERATOR: &str = "rambler";
    const USERS: [&str; 3] = ["usera", "userb", "userc"];

    fn executor() -> (Executor<MemoryLedger, ManualClock>, ManualClock) {
        let clock = ManualClock::new(TimePointSec(START));
        // Generous price so even a one-unit reward liquidates to something
        let ledger = MemoryLedger::new()
            .with_price(ResourcePrice {
                per_kib: 102_400,
                fee_bps: 50,
            })
            .with_balance(OPERATOR, Asset::new(5_000))
            .with_resource(OPERATOR, 100_000);
        let exec = Executor::new(Rambler::new(ContractConfig::default()), ledger, clock.clone());
        (exec, clock)
    }

    fn secret() -> Hash256 {
        sha256(b"round secret")
    }

    fn push(
        exec: &mut Executor<MemoryLedger, ManualClock>,
        action: Action,
        signer: &str,
    ) -> Result<TransactionReceipt, RoundError> {
        exec.push_transaction(&Transaction::new(action, signer))
    }

    fn open(exec: &mut Executor<MemoryLedger, ManualClock>, round: u16) {
        push(
            exec,
            Action::OpenRound {
                round,
                secret_hash: sha256(secret().as_bytes()),
                seed_phase_secs: 100,
                redeem_phase_secs: 50,
            },
            OPERATOR,
        )
        .unwrap();
    }

    /// Three seeds, reveal, three redemptions. Returns each user's points.
    fn played_round(exec: &mut Executor<MemoryLedger, ManualClock>, clock: &ManualClock) -> Vec<u64> {
        open(exec, 1);
        for (i, user) in USERS.iter().enumerate() {
            clock.advance(1);
            push(
                exec,
                Action::SubmitSeed {
                    account: Account::new(*user),
                    value: sha256(format!("seed-{}", i).as_bytes()),
                },
                user,
            )
            .unwrap();
        }

        clock.set(TimePointSec(START + 101));
        push(exec, Action::Reveal { secret: secret(), round: 1 }, OPERATOR).unwrap();

        USERS
            .iter()
            .map(|user| {
                let receipt = push(
                    exec,
                    Action::RedeemTicket {
                        account: Account::new(*user),
                        round: 1,
                    },
                    user,
                )
                .unwrap();
                match receipt.first_return() {
                    Some(ActionReturn::Points(points)) => points,
                    other => panic!("unexpected return {:?}", other),
                }
            })
            .collect()
    }

    #[test]
    fn test_submit_returns_sequence_id() {
        let (mut exec, clock) = executor();
        open(&mut exec, 1);
        clock.advance(5);

        let receipt = push(
            &mut exec,
            Action::SubmitSeed {
                account: Account::new("usera"),
                value: sha256(b"a"),
            },
            "usera",
        )
        .unwrap();
        assert_eq!(receipt.first_return(), Some(ActionReturn::SeedId(1)));
        assert_eq!(receipt.time, TimePointSec(START + 5));
        assert_eq!(exec.seed_time_remaining(1).unwrap(), 95);
    }

    #[test]
    fn test_full_round_lifecycle() {
        let (mut exec, clock) = executor();
        let points = played_round(&mut exec, &clock);

        // Redemptions walk the commits in submission order
        for (i, p) in points.iter().enumerate() {
            let seed = sha256(format!("seed-{}", i).as_bytes());
            assert_eq!(*p, u64::from(draw_points(&secret(), &seed)));
            assert!((1..=9_999).contains(p));
        }

        let round = exec.contract().round(1).unwrap().clone();
        let total: u64 = points.iter().sum();
        assert_eq!(round.total_points, total);
        assert_eq!(round.resource_released, 3 * RAM_COST_PER_SEED);

        let price = exec.ledger().price();
        let operator = Account::new(OPERATOR);
        let operator_start = exec.ledger().balance(&operator).unwrap();

        for (user, p) in USERS.iter().zip(&points) {
            let account = Account::new(*user);
            let receipt = push(
                &mut exec,
                Action::ClaimReward {
                    account: account.clone(),
                    round: 1,
                },
                user,
            )
            .unwrap();

            let reward = (round.resource_released as u64 * p / total) as i64;
            let names: Vec<&str> = receipt.traces.iter().map(|t| t.name.as_str()).collect();
            assert_eq!(names, ["claim_reward", "sell_resource", "confirm_settlement", "transfer"]);

            let proceeds = price.proceeds(reward).unwrap();
            assert_eq!(receipt.first_return(), Some(ActionReturn::Reward(reward)));
            assert_eq!(receipt.traces[2].return_value, Some(ActionReturn::Payout(proceeds)));
            assert_eq!(exec.ledger().balance(&account).unwrap(), proceeds);
            assert!(exec.contract().participant(1, &account).unwrap().claimed);
        }

        // Contract passes every liquidation straight through
        assert_eq!(exec.ledger().balance(&operator).unwrap(), operator_start);
    }

    #[test]
    fn test_failed_liquidation_rolls_back_claim() {
        let clock = ManualClock::new(TimePointSec(START));
        // No resource to sell
        let ledger = MemoryLedger::new().with_balance(OPERATOR, Asset::new(5_000));
        let mut exec = Executor::new(Rambler::new(ContractConfig::default()), ledger, clock.clone());
        played_round(&mut exec, &clock);

        let before = exec.state_hash();
        let err = push(
            &mut exec,
            Action::ClaimReward {
                account: Account::new("usera"),
                round: 1,
            },
            "usera",
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Ledger);
        assert_eq!(exec.state_hash(), before);
        assert!(!exec.contract().participant(1, &Account::new("usera")).unwrap().claimed);
        assert!(exec.ledger().balance(&Account::new("usera")).is_err());
    }

    #[test]
    fn test_worthless_sale_rolls_back_claim() {
        let clock = ManualClock::new(TimePointSec(START));
        // Sale goes through but rounds down to nothing
        let ledger = MemoryLedger::new()
            .with_price(ResourcePrice { per_kib: 1, fee_bps: 0 })
            .with_balance(OPERATOR, Asset::new(5_000))
            .with_resource(OPERATOR, 100_000);
        let mut exec = Executor::new(Rambler::new(ContractConfig::default()), ledger, clock.clone());
        played_round(&mut exec, &clock);

        let operator = Account::new(OPERATOR);
        let hash_before = exec.state_hash();
        let resource_before = exec.ledger().resource_of(&operator);

        let err = push(
            &mut exec,
            Action::ClaimReward {
                account: Account::new("usera"),
                round: 1,
            },
            "usera",
        )
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NoReward);
        assert!(!exec.contract().participant(1, &Account::new("usera")).unwrap().claimed);
        assert_eq!(exec.state_hash(), hash_before);
        assert_eq!(exec.ledger().resource_of(&operator), resource_before);
    }

    #[test]
    fn test_early_claim_pays_from_partial_pool() {
        let (mut exec, clock) = executor();
        open(&mut exec, 1);
        for (user, seeds) in [("usera", 1), ("userb", 19)] {
            for n in 0..seeds {
                clock.advance(1);
                let value = sha256(format!("{}-{}", user, n).as_bytes());
                push(&mut exec, Action::SubmitSeed { account: Account::new(user), value }, user).unwrap();
            }
        }
        clock.set(TimePointSec(START + 101));
        push(&mut exec, Action::Reveal { secret: secret(), round: 1 }, OPERATOR).unwrap();

        let redeem_all = |exec: &mut Executor<MemoryLedger, ManualClock>, user: &str, tickets: u32| {
            for _ in 0..tickets {
                let action = Action::RedeemTicket {
                    account: Account::new(user),
                    round: 1,
                };
                push(exec, action, user).unwrap();
            }
        };
        let claim = |exec: &mut Executor<MemoryLedger, ManualClock>, user: &str| -> i64 {
            let action = Action::ClaimReward {
                account: Account::new(user),
                round: 1,
            };
            match push(exec, action, user).unwrap().first_return() {
                Some(ActionReturn::Reward(units)) => units,
                other => panic!("unexpected return {:?}", other),
            }
        };

        // Sole redeemer so far takes everything released so far
        redeem_all(&mut exec, "usera", 1);
        assert_eq!(claim(&mut exec, "usera"), RAM_COST_PER_SEED);

        redeem_all(&mut exec, "userb", 19);
        let round = exec.contract().round(1).unwrap().clone();
        let userb_points = exec.contract().participant(1, &Account::new("userb")).unwrap().points_accumulated;
        let userb_reward = claim(&mut exec, "userb");
        assert_eq!(
            userb_reward,
            (round.resource_released as u64 * userb_points / round.total_points) as i64
        );

        // Each claim is bounded by the pool it saw, not the sum of claims
        assert_eq!(round.resource_released, 20 * RAM_COST_PER_SEED);
        assert!(exec.contract().scope(1).unwrap().conserves_totals());
    }

    #[test]
    fn test_multi_action_transaction_is_atomic() {
        let (mut exec, clock) = executor();
        open(&mut exec, 1);
        clock.advance(1);

        let tx = Transaction::new(
            Action::SubmitSeed {
                account: Account::new("usera"),
                value: sha256(b"one"),
            },
            "usera",
        )
        .with_action(Action::SubmitSeed {
            account: Account::new("usera"),
            value: sha256(b"one"),
        });

        let err = exec.push_transaction(&tx).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateCommitment);
        assert_eq!(exec.contract().round(1).unwrap().plays_count, 0);
        assert!(exec.contract().participant(1, &Account::new("usera")).is_none());
    }

    #[test]
    fn test_users_cannot_confirm_settlement() {
        let (mut exec, clock) = executor();
        played_round(&mut exec, &clock);

        let err = push(
            &mut exec,
            Action::ConfirmSettlement {
                account: Account::new("usera"),
                balance_before: Asset::ZERO,
            },
            "usera",
        )
        .unwrap_err();
        assert_eq!(err, RoundError::Unauthorized(Account::new(OPERATOR)));
    }

    #[test]
    fn test_confirm_without_proceeds_fails() {
        let (mut exec, _clock) = executor();
        let balance = exec.ledger().balance(&Account::new(OPERATOR)).unwrap();

        let err = push(
            &mut exec,
            Action::ConfirmSettlement {
                account: Account::new("usera"),
                balance_before: balance,
            },
            OPERATOR,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoReward);
    }

    #[test]
    fn test_redeem_window_queries() {
        let (mut exec, clock) = executor();
        open(&mut exec, 1);
        assert_eq!(exec.redeem_time_remaining(1).unwrap(), 50);

        clock.set(TimePointSec(START + 120));
        push(&mut exec, Action::Reveal { secret: secret(), round: 1 }, OPERATOR).unwrap();
        clock.advance(20);
        assert_eq!(exec.redeem_time_remaining(1).unwrap(), 30);
        clock.advance(60);
        assert_eq!(exec.redeem_time_remaining(1).unwrap(), 0);
        assert_eq!(exec.current_round(), Some(1));
    }

    #[test]
    fn test_random_round_pays_within_pool() {
        use rand::rngs::StdRng;
        use rand::{Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(0x5eed);
        let (mut exec, clock) = executor();
        open(&mut exec, 1);

        let mut seeded = 0;
        for _ in 0..40 {
            let user = USERS[rng.gen_range(0..USERS.len())];
            let value = Hash256::new(rng.gen::<[u8; 32]>());
            if push(&mut exec, Action::SubmitSeed { account: Account::new(user), value }, user).is_ok() {
                seeded += 1;
            }
        }

        clock.set(TimePointSec(START + 101));
        push(&mut exec, Action::Reveal { secret: secret(), round: 1 }, OPERATOR).unwrap();

        // Redeem in random order until every ticket is spent
        let mut redeemed = 0;
        while redeemed < seeded {
            let user = USERS[rng.gen_range(0..USERS.len())];
            let action = Action::RedeemTicket {
                account: Account::new(user),
                round: 1,
            };
            if push(&mut exec, action, user).is_ok() {
                redeemed += 1;
            }
        }

        let pool = exec.contract().round(1).unwrap().resource_released;
        let mut liquidated = 0;
        for user in USERS {
            let claim = Action::ClaimReward {
                account: Account::new(user),
                round: 1,
            };
            if let Ok(receipt) = push(&mut exec, claim, user) {
                if let Some(ActionReturn::Reward(units)) = receipt.first_return() {
                    liquidated += units;
                }
            }
        }

        assert_eq!(pool, seeded * RAM_COST_PER_SEED);
        // Holds only because every claim follows the last redemption
        assert!(liquidated <= pool);
        assert!(exec.contract().scope(1).unwrap().conserves_totals());
    }
}
