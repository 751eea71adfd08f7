//! Rambler Server
//!
//! Without arguments, plays one complete round against the in-memory
//! ledger and logs the outcome. With `serve`, runs the WebSocket gateway
//! and the operator keeper over a shared executor until Ctrl-C.

use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use rambler::{
    host::ActionReturn,
    network::{AuthConfig, Gateway, GatewayConfig},
    operator::{generate_round_proof, Keeper, OperatorConfig, ProofVault},
    sha256, Account, Action, Asset, ContractConfig, Executor, Ledger, ManualClock, MemoryLedger,
    Rambler, SystemClock, TimePointSec, Transaction, VERSION,
};

#[cfg(feature = "debug-tracing")]
const DEFAULT_FILTER: &str = "debug";
#[cfg(not(feature = "debug-tracing"))]
const DEFAULT_FILTER: &str = "info";

/// Resource units the contract account starts with in the in-memory ledger.
const INITIAL_RESOURCE: i64 = 1 << 20;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;

    info!("Rambler Server v{}", VERSION);

    match std::env::args().nth(1).as_deref() {
        None | Some("demo") => demo_round(),
        Some("serve") => serve().await,
        Some(other) => bail!("unknown command {:?} (expected `demo` or `serve`)", other),
    }
}

fn contract_ledger(contract: &Account) -> MemoryLedger {
    MemoryLedger::new()
        .with_balance(contract.clone(), Asset::ZERO)
        .with_resource(contract.clone(), INITIAL_RESOURCE)
}

/// Play one round end to end.
fn demo_round() -> anyhow::Result<()> {
    info!("=== Starting Demo Round ===");

    let config = ContractConfig::default();
    let operator = config.account.clone();
    let clock = ManualClock::new(TimePointSec::from_secs(1_700_000_000));
    let mut exec = Executor::new(Rambler::new(config), contract_ledger(&operator), clock.clone());

    let proof = generate_round_proof();
    info!("Proof hash: {}", proof.proof_hash);
    exec.push_transaction(&Transaction::new(
        Action::OpenRound {
            round: 1,
            secret_hash: proof.proof_hash,
            seed_phase_secs: 100,
            redeem_phase_secs: 50,
        },
        operator.clone(),
    ))?;

    let players: Vec<Account> = ["alice", "bob", "carol"].into_iter().map(Account::from).collect();
    for (i, player) in players.iter().enumerate() {
        for n in 0..=i {
            clock.advance(1);
            let value = sha256(format!("{}-{}", player, n).as_bytes());
            exec.push_transaction(&Transaction::new(
                Action::SubmitSeed {
                    account: player.clone(),
                    value,
                },
                player.clone(),
            ))?;
        }
    }
    info!("Seed window closes in {}s", exec.seed_time_remaining(1)?);

    clock.set(TimePointSec::from_secs(1_700_000_101));
    exec.push_transaction(&Transaction::new(
        Action::Reveal {
            secret: proof.proof,
            round: 1,
        },
        operator.clone(),
    ))?;
    info!("Proof revealed, redeem window {}s", exec.redeem_time_remaining(1)?);

    for player in &players {
        let tickets = exec
            .contract()
            .participant(1, player)
            .map(|p| p.tickets_available)
            .unwrap_or(0);
        for _ in 0..tickets {
            let receipt = exec.push_transaction(&Transaction::new(
                Action::RedeemTicket {
                    account: player.clone(),
                    round: 1,
                },
                player.clone(),
            ))?;
            if let Some(ActionReturn::Points(points)) = receipt.first_return() {
                info!("{} redeemed a ticket for {} points", player, points);
            }
        }
    }

    if let Some(round) = exec.contract().round(1) {
        info!(
            "Round 1: {} plays, {} points, {} resource units released",
            round.plays_count, round.total_points, round.resource_released
        );
    }

    for player in &players {
        let claim = Transaction::new(
            Action::ClaimReward {
                account: player.clone(),
                round: 1,
            },
            player.clone(),
        );
        match exec.push_transaction(&claim) {
            Ok(receipt) => {
                for value in receipt.returns() {
                    if let ActionReturn::Payout(paid) = value {
                        info!("{} was paid {}", player, paid);
                    }
                }
            }
            // A tiny share can liquidate to nothing
            Err(e) => warn!("{} could not claim: {}", player, e),
        }
    }

    info!("=== Round Results ===");
    if let Some(participants) = exec.contract().participants(1) {
        for (player, row) in participants.iter() {
            let balance = exec.ledger().balance(player).unwrap_or(Asset::ZERO);
            info!(
                "{}: {} points, claimed {}, balance {}",
                player, row.points_accumulated, row.claimed, balance
            );
        }
    }

    let hash = exec.state_hash();
    info!("Final State Hash: {}", hash);

    // Snapshot must reproduce the same state
    let restored = Rambler::from_bytes(&exec.contract().to_bytes()?)?;
    if restored.state_hash() == hash {
        info!("SNAPSHOT VERIFIED: Hashes match!");
    } else {
        warn!("SNAPSHOT FAILURE: Hashes differ!");
    }

    Ok(())
}

/// Run the gateway and the operator keeper until Ctrl-C.
async fn serve() -> anyhow::Result<()> {
    let contract_config = ContractConfig::from_env();
    let operator_config = OperatorConfig::from_env();
    let gateway_config = GatewayConfig::from_env();
    let auth = AuthConfig::from_env();

    if !auth.is_configured() {
        if auth.insecure_dev {
            warn!("AUTH_INSECURE_DEV is set: tokens are accepted as account names");
        } else {
            warn!("No AUTH_SECRET or AUTH_PUBLIC_KEY_PEM configured; all logins will fail");
        }
    }

    let ledger = contract_ledger(&contract_config.account);
    let executor = Arc::new(Mutex::new(Executor::new(
        Rambler::new(contract_config),
        ledger,
        SystemClock,
    )));

    let vault = ProofVault::load(&operator_config.vault_path)
        .with_context(|| format!("loading proof vault {}", operator_config.vault_path.display()))?;
    let gateway = Arc::new(Gateway::new(gateway_config, auth, executor.clone()));
    let keeper = Keeper::new(operator_config, vault, executor);
    let keeper_handle = tokio::spawn(keeper.run(gateway.shutdown_receiver()));

    let signal_gateway = gateway.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received, shutting down");
            signal_gateway.shutdown();
        }
    });

    gateway.run().await?;
    keeper_handle.await?;
    Ok(())
}
