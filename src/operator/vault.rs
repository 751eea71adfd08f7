//! Proof Vault
//!
//! Round secrets must survive operator restarts, otherwise a round whose
//! proof was lost can never be revealed. Secrets are written to a JSON
//! file keyed by round number before the round is opened.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::hash::{sha256, Hash256};

/// Vault errors.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// Reading or writing the vault file failed.
    #[error("vault I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The vault file is not valid JSON.
    #[error("vault format: {0}")]
    Json(#[from] serde_json::Error),
}

/// A round secret and its public commitment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundProof {
    /// Secret revealed after seeding.
    pub proof: Hash256,
    /// `sha256(proof)`, committed when the round opens.
    pub proof_hash: Hash256,
}

/// Generate a fresh round secret from a random v4 UUID.
pub fn generate_round_proof() -> RoundProof {
    let proof = sha256(Uuid::new_v4().to_string().as_bytes());
    RoundProof {
        proof,
        proof_hash: sha256(proof.as_bytes()),
    }
}

/// File-backed store of round secrets.
#[derive(Debug)]
pub struct ProofVault {
    path: PathBuf,
    proofs: BTreeMap<u16, RoundProof>,
}

impl ProofVault {
    /// Load the vault at `path`, starting empty if the file does not exist.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, VaultError> {
        let path = path.into();
        let proofs = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            serde_json::from_str(&text)?
        } else {
            BTreeMap::new()
        };

        info!("Loaded {} round proofs from {}", proofs.len(), path.display());
        Ok(Self { path, proofs })
    }

    /// Write the vault to disk.
    pub fn save(&self) -> Result<(), VaultError> {
        let text = serde_json::to_string_pretty(&self.proofs)?;
        std::fs::write(&self.path, text)?;
        Ok(())
    }

    /// Generate, store and persist the secret for `round`.
    ///
    /// Replaces any earlier secret for the same round.
    pub fn issue(&mut self, round: u16) -> Result<RoundProof, VaultError> {
        let proof = generate_round_proof();
        self.proofs.insert(round, proof);
        self.save()?;
        debug!("Issued proof {} for round {}", proof.proof_hash.short(), round);
        Ok(proof)
    }

    /// Stored secret for `round`.
    pub fn get(&self, round: u16) -> Option<&RoundProof> {
        self.proofs.get(&round)
    }

    /// Number of stored secrets.
    pub fn len(&self) -> usize {
        self.proofs.len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.proofs.is_empty()
    }

    /// Backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("rambler-vault-{}.json", Uuid::new_v4()))
    }

    #[test]
    fn test_proof_hash_commits_to_proof() {
        let p = generate_round_proof();
        assert_eq!(p.proof_hash, sha256(p.proof.as_bytes()));
        assert_ne!(generate_round_proof().proof, p.proof);
    }

    #[test]
    fn test_missing_file_is_empty() {
        let vault = ProofVault::load(temp_path()).unwrap();
        assert!(vault.is_empty());
        assert!(vault.get(1).is_none());
    }

    #[test]
    fn test_issue_persists() {
        let path = temp_path();
        let mut vault = ProofVault::load(&path).unwrap();
        let p1 = vault.issue(1).unwrap();
        let p2 = vault.issue(2).unwrap();

        let reloaded = ProofVault::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get(1), Some(&p1));
        assert_eq!(reloaded.get(2), Some(&p2));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_corrupt_file_rejected() {
        let path = temp_path();
        std::fs::write(&path, "not json").unwrap();

        let err = ProofVault::load(&path).unwrap_err();
        assert!(matches!(err, VaultError::Json(_)));

        std::fs::remove_file(&path).unwrap();
    }
}
