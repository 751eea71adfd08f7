//! Round State
//!
//! The process-wide round index and the per-round aggregate ledger,
//! including the time-based phase derivation.

use serde::{Deserialize, Serialize};

use crate::core::hash::{Hash256, StateHasher};
use crate::core::time::TimePointSec;

/// Pointer to the most recently opened round.
///
/// Created by the first round open, only ever bumped afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundIndex {
    /// Current round number (first round is 1).
    pub current_round: u16,
}

/// Lifecycle phase of a round.
///
/// Phases only move forward: Seeding → AwaitingReveal → Redeeming → Closed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    /// Seeds are accepted.
    Seeding,
    /// Seed window over, waiting for the operator's proof.
    AwaitingReveal,
    /// Proof revealed, tickets may be redeemed.
    Redeeming,
    /// Redeem window over. Claims are still honoured.
    Closed,
}

/// Aggregate ledger for one round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    /// Round number.
    pub number: u16,
    /// When the round opened.
    pub start_time: TimePointSec,
    /// Seconds the seed window stays open.
    pub seed_phase_duration: u32,
    /// Seconds the redeem window stays open after the reveal.
    pub redeem_phase_duration: u32,
    /// When the proof was revealed.
    pub proof_time: Option<TimePointSec>,
    /// The revealed secret.
    pub revealed_secret: Option<Hash256>,
    /// Accepted seed submissions.
    pub plays_count: u64,
    /// Tickets redeemed across all participants.
    pub tickets_used: u64,
    /// Points awarded across all participants.
    pub total_points: u64,
    /// Resource credit released by deleted commits.
    pub resource_released: i64,
}

impl Round {
    /// Create a freshly opened round.
    pub fn new(
        number: u16,
        start_time: TimePointSec,
        seed_phase_duration: u32,
        redeem_phase_duration: u32,
    ) -> Self {
        Self {
            number,
            start_time,
            seed_phase_duration,
            redeem_phase_duration,
            proof_time: None,
            revealed_secret: None,
            plays_count: 0,
            tickets_used: 0,
            total_points: 0,
            resource_released: 0,
        }
    }

    /// Seconds since the round opened.
    #[inline]
    pub fn seed_elapsed(&self, now: TimePointSec) -> u32 {
        now.elapsed_since(self.start_time)
    }

    /// Seeds are accepted strictly before the seed window ends.
    #[inline]
    pub fn is_seeding(&self, now: TimePointSec) -> bool {
        self.seed_elapsed(now) < self.seed_phase_duration
    }

    /// Reveal, redeem and claim need the seed window strictly past.
    ///
    /// The boundary second itself belongs to neither side.
    #[inline]
    pub fn seed_phase_over(&self, now: TimePointSec) -> bool {
        self.seed_elapsed(now) > self.seed_phase_duration
    }

    /// Has the proof been revealed?
    #[inline]
    pub fn is_revealed(&self) -> bool {
        self.revealed_secret.is_some()
    }

    /// Inside the redeem window (requires a reveal).
    pub fn redeem_window_open(&self, now: TimePointSec) -> bool {
        match self.proof_time {
            Some(proof_time) => now.elapsed_since(proof_time) < self.redeem_phase_duration,
            None => false,
        }
    }

    /// Derive the current phase.
    pub fn phase(&self, now: TimePointSec) -> RoundPhase {
        if self.is_seeding(now) {
            RoundPhase::Seeding
        } else if !self.is_revealed() {
            RoundPhase::AwaitingReveal
        } else if self.redeem_window_open(now) {
            RoundPhase::Redeeming
        } else {
            RoundPhase::Closed
        }
    }

    /// Seconds left in the seed window (zero once over).
    pub fn seed_time_remaining(&self, now: TimePointSec) -> u32 {
        self.seed_phase_duration
            .saturating_sub(self.seed_elapsed(now))
    }

    /// Seconds left in the redeem window, measured from the reveal.
    ///
    /// Before the reveal the window has not started and the full
    /// duration is reported.
    pub fn redeem_time_remaining(&self, now: TimePointSec) -> u32 {
        match self.proof_time {
            Some(proof_time) => self
                .redeem_phase_duration
                .saturating_sub(now.elapsed_since(proof_time)),
            None => self.redeem_phase_duration,
        }
    }

    /// Feed this round into a state fingerprint.
    pub fn hash_into(&self, hasher: &mut StateHasher) {
        hasher.update_u16(self.number);
        hasher.update_u32(self.start_time.secs());
        hasher.update_u32(self.seed_phase_duration);
        hasher.update_u32(self.redeem_phase_duration);
        hasher.update_u32(self.proof_time.map(TimePointSec::secs).unwrap_or(0));
        hasher.update_opt_hash(self.revealed_secret.as_ref());
        hasher.update_u64(self.plays_count);
        hasher.update_u64(self.tickets_used);
        hasher.update_u64(self.total_points);
        hasher.update_i64(self.resource_released);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round() -> Round {
        Round::new(1, TimePointSec(1_000), 100, 50)
    }

    #[test]
    fn test_seed_window_boundaries() {
        let r = round();

        assert!(r.is_seeding(TimePointSec(1_000)));
        assert!(r.is_seeding(TimePointSec(1_099)));

        // Boundary second: neither seeding nor over
        assert!(!r.is_seeding(TimePointSec(1_100)));
        assert!(!r.seed_phase_over(TimePointSec(1_100)));

        assert!(r.seed_phase_over(TimePointSec(1_101)));
    }

    #[test]
    fn test_phase_progression() {
        let mut r = round();
        assert_eq!(r.phase(TimePointSec(1_010)), RoundPhase::Seeding);
        assert_eq!(r.phase(TimePointSec(1_200)), RoundPhase::AwaitingReveal);

        r.proof_time = Some(TimePointSec(1_200));
        r.revealed_secret = Some(Hash256([1; 32]));

        assert_eq!(r.phase(TimePointSec(1_249)), RoundPhase::Redeeming);
        assert_eq!(r.phase(TimePointSec(1_250)), RoundPhase::Closed);
    }

    #[test]
    fn test_time_remaining() {
        let mut r = round();
        assert_eq!(r.seed_time_remaining(TimePointSec(1_030)), 70);
        assert_eq!(r.seed_time_remaining(TimePointSec(5_000)), 0);

        // Not revealed yet: full window
        assert_eq!(r.redeem_time_remaining(TimePointSec(1_200)), 50);

        r.proof_time = Some(TimePointSec(1_200));
        r.revealed_secret = Some(Hash256([1; 32]));
        assert_eq!(r.redeem_time_remaining(TimePointSec(1_220)), 30);
        assert_eq!(r.redeem_time_remaining(TimePointSec(9_999)), 0);
    }
}
