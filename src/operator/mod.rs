//! Round Operator
//!
//! Off-contract automation run by the contract's operator: secret
//! generation and persistence, and the polling loop that opens and
//! reveals rounds.

pub mod keeper;
pub mod vault;

pub use keeper::{plan_next_step, Keeper, KeeperError, OperatorConfig, OperatorStep};
pub use vault::{generate_round_proof, ProofVault, RoundProof, VaultError};
