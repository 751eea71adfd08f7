//! Operator Keeper
//!
//! Polls the contract and drives the operator side of the round cycle:
//! - No round yet: open round 1
//! - Seed phase over with a stored secret: reveal it
//! - Round revealed, or its secret was lost: open the next round
//!
//! Secrets are persisted in the vault before the round that commits to
//! them is opened.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, Mutex};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::core::time::{Clock, TimePointSec};
use crate::host::action::{Action, Transaction};
use crate::host::executor::Executor;
use crate::host::ledger::Ledger;
use crate::operator::vault::{ProofVault, VaultError};
use crate::round::contract::Rambler;
use crate::round::error::RoundError;

/// Operator configuration.
#[derive(Debug, Clone)]
pub struct OperatorConfig {
    /// Seed window of each new round.
    pub seed_phase_secs: u32,
    /// Redeem window of each new round.
    pub redeem_phase_secs: u32,
    /// How often the contract is polled.
    pub poll_interval: Duration,
    /// Proof vault file.
    pub vault_path: PathBuf,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            seed_phase_secs: 24 * 60 * 60,
            redeem_phase_secs: 48 * 60 * 60,
            poll_interval: Duration::from_secs(20),
            vault_path: PathBuf::from("./proofs.json"),
        }
    }
}

impl OperatorConfig {
    /// Create config from environment variables.
    ///
    /// Phase lengths are given in (possibly fractional) hours.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            seed_phase_secs: hours_from_env("RAMBLER_SEED_PHASE_HOURS")
                .unwrap_or(defaults.seed_phase_secs),
            redeem_phase_secs: hours_from_env("RAMBLER_REDEEM_PHASE_HOURS")
                .unwrap_or(defaults.redeem_phase_secs),
            poll_interval: std::env::var("RAMBLER_POLL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            vault_path: std::env::var("RAMBLER_VAULT_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.vault_path),
        }
    }
}

fn hours_from_env(key: &str) -> Option<u32> {
    let hours: f64 = std::env::var(key).ok()?.parse().ok()?;
    if !hours.is_finite() || hours < 0.0 {
        return None;
    }
    Some((hours * 3600.0).min(u32::MAX as f64) as u32)
}

/// Keeper errors.
#[derive(Debug, thiserror::Error)]
pub enum KeeperError {
    /// The contract rejected the operator's transaction.
    #[error("contract: {0}")]
    Round(#[from] RoundError),

    /// The proof vault failed.
    #[error("vault: {0}")]
    Vault(#[from] VaultError),
}

/// What the operator should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorStep {
    /// Open this round with a fresh secret.
    StartRound(u16),
    /// Reveal the stored secret of this round.
    SendProof(u16),
    /// Nothing to do yet.
    Wait,
}

/// Decide the next operator step from contract state.
pub fn plan_next_step(contract: &Rambler, vault: &ProofVault, now: TimePointSec) -> OperatorStep {
    let current = match contract.current_round() {
        None => return OperatorStep::StartRound(1),
        Some(n) => n,
    };
    let round = match contract.round(current) {
        Some(r) => r,
        None => return OperatorStep::Wait,
    };

    let lost_proof = vault.get(current).is_none() && round.seed_phase_over(now);
    if round.is_revealed() || lost_proof {
        return match current.checked_add(1) {
            Some(next) => OperatorStep::StartRound(next),
            None => OperatorStep::Wait,
        };
    }

    if round.seed_phase_over(now) {
        OperatorStep::SendProof(current)
    } else {
        OperatorStep::Wait
    }
}

/// Runs the operator side of the round cycle against a shared executor.
pub struct Keeper<L, C> {
    config: OperatorConfig,
    vault: ProofVault,
    executor: Arc<Mutex<Executor<L, C>>>,
}

impl<L, C> Keeper<L, C>
where
    L: Ledger + Clone + Send + 'static,
    C: Clock + Send + 'static,
{
    /// Create a keeper.
    pub fn new(config: OperatorConfig, vault: ProofVault, executor: Arc<Mutex<Executor<L, C>>>) -> Self {
        Self {
            config,
            vault,
            executor,
        }
    }

    /// Proof vault.
    pub fn vault(&self) -> &ProofVault {
        &self.vault
    }

    /// Plan and perform one step.
    pub async fn tick(&mut self) -> Result<OperatorStep, KeeperError> {
        let mut executor = self.executor.lock().await;
        let step = plan_next_step(executor.contract(), &self.vault, executor.now());
        let operator = executor.contract().account().clone();

        match step {
            OperatorStep::StartRound(round) => {
                let proof = self.vault.issue(round)?;
                let tx = Transaction::new(
                    Action::OpenRound {
                        round,
                        secret_hash: proof.proof_hash,
                        seed_phase_secs: self.config.seed_phase_secs,
                        redeem_phase_secs: self.config.redeem_phase_secs,
                    },
                    operator,
                );
                executor.push_transaction(&tx)?;
                info!("Started round {}", round);
            }
            OperatorStep::SendProof(round) => {
                // plan_next_step only sends a proof the vault holds
                if let Some(proof) = self.vault.get(round) {
                    let tx = Transaction::new(
                        Action::Reveal {
                            secret: proof.proof,
                            round,
                        },
                        operator,
                    );
                    executor.push_transaction(&tx)?;
                    info!("Started redeem phase for round {}", round);
                }
            }
            OperatorStep::Wait => {
                debug!("Checking round {:?}: nothing to do", executor.current_round());
            }
        }

        Ok(step)
    }

    /// Poll until shutdown. Failed steps are logged and retried next tick.
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!("Operator keeper polling every {:?}", self.config.poll_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Operator step failed: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    warn!("Operator keeper stopping");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::hash::sha256;
    use crate::core::time::ManualClock;
    use crate::host::ledger::Asset;
    use crate::host::memory::MemoryLedger;
    use crate::round::contract::ContractConfig;
    use uuid::Uuid;

    const START: u32 = 1_700_000_000;

    fn temp_vault() -> ProofVault {
        let path = std::env::temp_dir().join(format!("rambler-keeper-{}.json", Uuid::new_v4()));
        ProofVault::load(path).unwrap()
    }

    fn keeper() -> (Keeper<MemoryLedger, ManualClock>, ManualClock) {
        let clock = ManualClock::new(TimePointSec(START));
        let ledger = MemoryLedger::new().with_balance("rambler", Asset::new(1_000));
        let executor = Executor::new(Rambler::new(ContractConfig::default()), ledger, clock.clone());
        let config = OperatorConfig {
            seed_phase_secs: 100,
            redeem_phase_secs: 50,
            ..Default::default()
        };
        (
            Keeper::new(config, temp_vault(), Arc::new(Mutex::new(executor))),
            clock,
        )
    }

    #[test]
    fn test_plan_without_rounds() {
        let contract = Rambler::new(ContractConfig::default());
        let vault = temp_vault();
        assert_eq!(
            plan_next_step(&contract, &vault, TimePointSec(START)),
            OperatorStep::StartRound(1)
        );
    }

    #[tokio::test]
    async fn test_keeper_cycle() {
        let (mut keeper, clock) = keeper();

        assert_eq!(keeper.tick().await.unwrap(), OperatorStep::StartRound(1));
        let proof = *keeper.vault().get(1).unwrap();
        {
            let exec = keeper.executor.lock().await;
            assert_eq!(exec.contract().commits(1).unwrap().proof(), Some(proof.proof_hash));
        }

        clock.advance(50);
        assert_eq!(keeper.tick().await.unwrap(), OperatorStep::Wait);

        // Exactly at the boundary the reveal would still be refused
        clock.advance(50);
        assert_eq!(keeper.tick().await.unwrap(), OperatorStep::Wait);

        clock.advance(1);
        assert_eq!(keeper.tick().await.unwrap(), OperatorStep::SendProof(1));
        {
            let exec = keeper.executor.lock().await;
            assert_eq!(exec.contract().round(1).unwrap().revealed_secret, Some(proof.proof));
        }

        assert_eq!(keeper.tick().await.unwrap(), OperatorStep::StartRound(2));
        assert_eq!(keeper.executor.lock().await.current_round(), Some(2));
    }

    #[tokio::test]
    async fn test_lost_proof_skips_to_next_round() {
        let (mut keeper, clock) = keeper();
        keeper.tick().await.unwrap();

        // Operator restarted with an empty vault
        keeper.vault = temp_vault();
        assert_eq!(keeper.tick().await.unwrap(), OperatorStep::Wait);

        clock.advance(101);
        assert_eq!(keeper.tick().await.unwrap(), OperatorStep::StartRound(2));
        assert!(keeper.vault().get(2).is_some());
        assert!(keeper.vault().get(1).is_none());
    }

    #[tokio::test]
    async fn test_shutdown_stops_run() {
        let (keeper, _clock) = keeper();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(keeper.run(shutdown_rx));
        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[test]
    fn test_config_default() {
        let config = OperatorConfig::default();
        assert_eq!(config.seed_phase_secs, 86_400);
        assert_eq!(config.redeem_phase_secs, 172_800);
        assert_eq!(config.poll_interval, Duration::from_secs(20));
    }

    #[test]
    fn test_secret_matches_commitment() {
        let mut vault = temp_vault();
        let proof = vault.issue(7).unwrap();
        assert_eq!(sha256(proof.proof.as_bytes()), proof.proof_hash);
        std::fs::remove_file(vault.path()).unwrap();
    }
}
