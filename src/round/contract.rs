//! Round State Machine
//!
//! The `Rambler` contract: round index plus one independently owned
//! state bundle per round number. Every operation validates fully before
//! its first mutation, and anything external (liquidation, transfers) is
//! only ever scheduled as inline work for the executor.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::core::account::Account;
use crate::core::hash::{sha256, Hash256, StateHasher};
use crate::core::oracle::draw_points;
use crate::core::time::TimePointSec;
use crate::host::action::{Action, ActionContext, ActionReturn};
use crate::host::ledger::Asset;
use crate::round::commits::{CommitStore, RAM_COST_PER_SEED};
use crate::round::error::{Missing, RoundError};
use crate::round::participants::{Participant, ParticipantLedger};
use crate::round::state::{Round, RoundIndex};
use crate::settlement::{begin_settlement, payout, settlement_delta};

/// Contract configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractConfig {
    /// The contract's own (operator) account.
    pub account: Account,
    /// Resource credit released per deleted seed.
    pub resource_cost_per_seed: i64,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            account: Account::new("rambler"),
            resource_cost_per_seed: RAM_COST_PER_SEED,
        }
    }
}

impl ContractConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            account: std::env::var("RAMBLER_CONTRACT_ACCOUNT")
                .map(Account::new)
                .unwrap_or(defaults.account),
            resource_cost_per_seed: defaults.resource_cost_per_seed,
        }
    }
}

/// All state belonging to one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundScope {
    /// Aggregates and timing.
    pub round: Round,
    /// Seed commitments.
    pub commits: CommitStore,
    /// Participants.
    pub participants: ParticipantLedger,
}

impl RoundScope {
    /// Participant sums agree with the round aggregates.
    pub fn conserves_totals(&self) -> bool {
        self.participants.total_tickets_used() == self.round.tickets_used
            && self.participants.total_points() == self.round.total_points
    }
}

/// The lottery contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rambler {
    config: ContractConfig,
    index: Option<RoundIndex>,
    rounds: BTreeMap<u16, RoundScope>,
}

impl Rambler {
    /// Create a contract with no rounds.
    pub fn new(config: ContractConfig) -> Self {
        Self {
            config,
            index: None,
            rounds: BTreeMap::new(),
        }
    }

    /// The contract's own account.
    pub fn account(&self) -> &Account {
        &self.config.account
    }

    /// Configuration.
    pub fn config(&self) -> &ContractConfig {
        &self.config
    }

    /// Dispatch one action.
    pub fn apply(
        &mut self,
        ctx: &mut ActionContext<'_>,
        action: &Action,
    ) -> Result<Option<ActionReturn>, RoundError> {
        match action {
            Action::OpenRound {
                round,
                secret_hash,
                seed_phase_secs,
                redeem_phase_secs,
            } => {
                self.open_round(ctx, *round, *secret_hash, *seed_phase_secs, *redeem_phase_secs)?;
                Ok(None)
            }
            Action::SubmitSeed { account, value } => self
                .submit_seed(ctx, account, *value)
                .map(|id| Some(ActionReturn::SeedId(id))),
            Action::Reveal { secret, round } => {
                self.reveal(ctx, *secret, *round)?;
                Ok(None)
            }
            Action::RedeemTicket { account, round } => self
                .redeem_ticket(ctx, account, *round)
                .map(|points| Some(ActionReturn::Points(points))),
            Action::ClaimReward { account, round } => self
                .claim_reward(ctx, account, *round)
                .map(|reward| Some(ActionReturn::Reward(reward))),
            Action::ConfirmSettlement {
                account,
                balance_before,
            } => self
                .confirm_settlement(ctx, account, *balance_before)
                .map(|paid| Some(ActionReturn::Payout(paid))),
        }
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Open the next round, committing to `secret_hash` as sequence id 0.
    #[instrument(skip(self, ctx, secret_hash), fields(proof = %secret_hash.short()))]
    pub fn open_round(
        &mut self,
        ctx: &mut ActionContext<'_>,
        round: u16,
        secret_hash: Hash256,
        seed_phase_secs: u32,
        redeem_phase_secs: u32,
    ) -> Result<(), RoundError> {
        ctx.require_auth(&self.config.account)?;
        let now = ctx.now();

        match self.index {
            Some(index) => {
                let expected = index.current_round.checked_add(1).ok_or(
                    RoundError::InvalidRoundSequence {
                        requested: round,
                        reason: "round index exhausted",
                    },
                )?;
                if round < expected {
                    return Err(RoundError::InvalidRoundSequence {
                        requested: round,
                        reason: "round already exists",
                    });
                }
                if round > expected {
                    return Err(RoundError::InvalidRoundSequence {
                        requested: round,
                        reason: "previous round does not exist",
                    });
                }
                let previous = self
                    .rounds
                    .get(&index.current_round)
                    .ok_or(RoundError::NotFound(Missing::Round(index.current_round)))?;
                if !previous.round.seed_phase_over(now) {
                    return Err(RoundError::InvalidRoundSequence {
                        requested: round,
                        reason: "previous round is not over",
                    });
                }
            }
            None => {
                if round != 1 {
                    return Err(RoundError::InvalidRoundSequence {
                        requested: round,
                        reason: "round must be 1",
                    });
                }
            }
        }

        let mut participants = ParticipantLedger::new();
        participants.register(&self.config.account);

        self.index = Some(RoundIndex {
            current_round: round,
        });
        self.rounds.insert(
            round,
            RoundScope {
                round: Round::new(round, now, seed_phase_secs, redeem_phase_secs),
                commits: CommitStore::with_proof(secret_hash),
                participants,
            },
        );

        info!(
            "Opened round {} at {} (seed {}s, redeem {}s)",
            round, now, seed_phase_secs, redeem_phase_secs
        );
        Ok(())
    }

    /// Commit a seed in the current round. Returns its sequence id.
    pub fn submit_seed(
        &mut self,
        ctx: &mut ActionContext<'_>,
        account: &Account,
        value: Hash256,
    ) -> Result<u64, RoundError> {
        ctx.require_auth(account)?;
        let now = ctx.now();

        let current = self
            .index
            .ok_or(RoundError::NotFound(Missing::ActiveRound))?
            .current_round;
        let scope = self
            .rounds
            .get_mut(&current)
            .ok_or(RoundError::NotFound(Missing::Round(current)))?;

        if !scope.round.is_seeding(now) {
            return Err(RoundError::PhaseViolation {
                round: current,
                reason: "seed phase is over",
            });
        }

        let sequence_id = scope
            .commits
            .append(value)
            .ok_or(RoundError::DuplicateCommitment {
                round: current,
                value,
            })?;
        let tickets = scope.participants.issue_ticket(account).tickets_available;
        scope.round.plays_count += 1;

        debug!(
            "Seed {} from {} in round {} (id {}, {} tickets)",
            value.short(),
            account,
            current,
            sequence_id,
            tickets
        );
        Ok(sequence_id)
    }

    /// Reveal the round secret, opening the redeem window.
    #[instrument(skip(self, ctx, secret))]
    pub fn reveal(
        &mut self,
        ctx: &mut ActionContext<'_>,
        secret: Hash256,
        round: u16,
    ) -> Result<(), RoundError> {
        ctx.require_auth(&self.config.account)?;
        let now = ctx.now();

        let scope = self
            .rounds
            .get_mut(&round)
            .ok_or(RoundError::NotFound(Missing::Round(round)))?;

        if scope.round.is_revealed() {
            return Err(RoundError::PhaseViolation {
                round,
                reason: "proof already revealed",
            });
        }

        let proof = scope
            .commits
            .proof()
            .ok_or(RoundError::NotFound(Missing::Proof(round)))?;
        if sha256(secret.as_bytes()) != proof {
            return Err(RoundError::RevealMismatch { round });
        }

        if !scope.round.seed_phase_over(now) {
            return Err(RoundError::PhaseViolation {
                round,
                reason: "seed phase is not over",
            });
        }

        scope.round.revealed_secret = Some(secret);
        scope.round.proof_time = Some(now);

        info!(
            "Revealed proof for round {} at {} ({} plays)",
            round, now, scope.round.plays_count
        );
        Ok(())
    }

    /// Redeem one ticket against the next unconsumed seed of the round.
    ///
    /// Seeds are drawn in global submission order, not per account.
    pub fn redeem_ticket(
        &mut self,
        ctx: &mut ActionContext<'_>,
        account: &Account,
        round: u16,
    ) -> Result<u64, RoundError> {
        ctx.require_auth(account)?;
        let now = ctx.now();
        let cost = self.config.resource_cost_per_seed;

        let scope = self
            .rounds
            .get_mut(&round)
            .ok_or(RoundError::NotFound(Missing::Round(round)))?;

        if !scope.round.seed_phase_over(now) {
            return Err(RoundError::PhaseViolation {
                round,
                reason: "seed phase is not over",
            });
        }
        let secret = scope.round.revealed_secret.ok_or(RoundError::PhaseViolation {
            round,
            reason: "no proof",
        })?;
        if !scope.round.redeem_window_open(now) {
            return Err(RoundError::PhaseViolation {
                round,
                reason: "redeem phase is over",
            });
        }

        let participant = scope.participants.get_mut(account).ok_or_else(|| {
            RoundError::NotFound(Missing::Participant {
                round,
                account: account.clone(),
            })
        })?;
        if participant.tickets_available == 0 {
            return Err(RoundError::InsufficientTickets {
                round,
                account: account.clone(),
            });
        }

        // Id 0 is the proof, so the n-th redemption consumes id n
        let next_id = scope.round.tickets_used + 1;
        let (commit, credit) = scope
            .commits
            .consume(next_id, cost)
            .ok_or(RoundError::NotFound(Missing::Commit {
                round,
                sequence_id: next_id,
            }))?;

        let points = u64::from(draw_points(&secret, &commit.value));

        participant.redeem(points);
        scope.round.tickets_used += 1;
        scope.round.total_points += points;
        scope.round.resource_released += credit.amount;

        debug!(
            "{} redeemed seed {} in round {} for {} points",
            account, commit.sequence_id, round, points
        );
        Ok(points)
    }

    /// First settlement step. Returns the resource units being liquidated.
    pub fn claim_reward(
        &mut self,
        ctx: &mut ActionContext<'_>,
        account: &Account,
        round: u16,
    ) -> Result<i64, RoundError> {
        ctx.require_auth(account)?;
        let now = ctx.now();
        let contract = self.config.account.clone();

        let scope = self
            .rounds
            .get_mut(&round)
            .ok_or(RoundError::NotFound(Missing::Round(round)))?;

        if !scope.round.seed_phase_over(now) {
            return Err(RoundError::PhaseViolation {
                round,
                reason: "seed phase is not over",
            });
        }

        let participant = scope.participants.get_mut(account).ok_or_else(|| {
            RoundError::NotFound(Missing::Participant {
                round,
                account: account.clone(),
            })
        })?;

        let balance_before = ctx.balance(&contract)?;
        let plan = begin_settlement(&scope.round, participant, account, balance_before)?;
        for inline in plan.inline_actions(&contract) {
            ctx.send_inline(inline);
        }

        info!(
            "{} claimed round {}: liquidating {} units (balance before {})",
            account, round, plan.reward, balance_before
        );
        Ok(plan.reward)
    }

    /// Second settlement step: pay out the liquidation proceeds.
    pub fn confirm_settlement(
        &mut self,
        ctx: &mut ActionContext<'_>,
        account: &Account,
        balance_before: Asset,
    ) -> Result<Asset, RoundError> {
        let contract = self.config.account.clone();
        ctx.require_auth(&contract)?;

        let balance_after = ctx.balance(&contract)?;
        let delta = settlement_delta(account, balance_before, balance_after)?;
        ctx.send_inline(payout(&contract, account, delta));

        info!("Paying {} to {}", delta, account);
        Ok(delta)
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    /// Seconds left in the round's seed window.
    pub fn seed_time_remaining(&self, round: u16, now: TimePointSec) -> Result<u32, RoundError> {
        self.round(round)
            .map(|r| r.seed_time_remaining(now))
            .ok_or(RoundError::NotFound(Missing::Round(round)))
    }

    /// Seconds left in the round's redeem window.
    pub fn redeem_time_remaining(&self, round: u16, now: TimePointSec) -> Result<u32, RoundError> {
        self.round(round)
            .map(|r| r.redeem_time_remaining(now))
            .ok_or(RoundError::NotFound(Missing::Round(round)))
    }

    /// Most recently opened round number.
    pub fn current_round(&self) -> Option<u16> {
        self.index.map(|i| i.current_round)
    }

    /// Round aggregates.
    pub fn round(&self, round: u16) -> Option<&Round> {
        self.rounds.get(&round).map(|s| &s.round)
    }

    /// Full round state.
    pub fn scope(&self, round: u16) -> Option<&RoundScope> {
        self.rounds.get(&round)
    }

    /// One participant's row.
    pub fn participant(&self, round: u16, account: &Account) -> Option<&Participant> {
        self.rounds.get(&round)?.participants.get(account)
    }

    /// All participant rows of a round.
    pub fn participants(&self, round: u16) -> Option<&ParticipantLedger> {
        self.rounds.get(&round).map(|s| &s.participants)
    }

    /// Unconsumed commits of a round.
    pub fn commits(&self, round: u16) -> Option<&CommitStore> {
        self.rounds.get(&round).map(|s| &s.commits)
    }

    /// Fingerprint of the whole contract state.
    pub fn state_hash(&self) -> Hash256 {
        let mut hasher = StateHasher::for_contract_state();
        hasher.update_str(self.config.account.as_str());
        hasher.update_u16(self.current_round().unwrap_or(0));
        hasher.update_u64(self.rounds.len() as u64);
        for scope in self.rounds.values() {
            scope.round.hash_into(&mut hasher);
            scope.commits.hash_into(&mut hasher);
            scope.participants.hash_into(&mut hasher);
        }
        hasher.finalize()
    }

    /// Serialize to binary.
    pub fn to_bytes(&self) -> Result<Vec<u8>, bincode::Error> {
        bincode::serialize(self)
    }

    /// Deserialize from binary.
    pub fn from_bytes(data: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(data)
    }
}

// =============================================================================
// TESTS
// =============================================================================
