//! Random Oracle
//!
//! Maps the revealed round secret and a participant's seed to a bounded
//! integer. Pure and deterministic: the same inputs always give the same
//! draw on every platform.
//!
//! ## Entropy
//!
//! Only the first byte of `sha256(secret ‖ seed)` feeds the reduction, so at
//! most 256 distinct outcomes exist regardless of the requested range, and
//! for the ticket range `[1, 10000)` every draw lands in `[1, 256]`. Ticket
//! payouts depend on this exact reduction, so it is kept as is.

use super::hash::{hash_pair, Hash256};

/// Lowest number of points a ticket can yield.
pub const POINTS_MIN: u32 = 1;

/// Exclusive upper bound on points per ticket.
pub const POINTS_MAX: u32 = 10_000;

/// Draw a number in `[min, max)` from a secret and a seed.
///
/// Returns `None` when the range is empty (`max <= min`).
///
/// # Example
///
/// ```
/// use rambler::core::hash::Hash256;
/// use rambler::core::oracle::draw;
///
/// let secret = Hash256::new([1; 32]);
/// let seed = Hash256::new([2; 32]);
/// let value = draw(&secret, &seed, 1, 10_000).unwrap();
/// assert!((1..10_000).contains(&value));
/// assert_eq!(Some(value), draw(&secret, &seed, 1, 10_000));
/// ```
pub fn draw(secret: &Hash256, seed: &Hash256, min: u32, max: u32) -> Option<u32> {
    if max <= min {
        return None;
    }
    let digest = hash_pair(secret, seed);
    let range = max - min;
    Some(u32::from(digest.0[0]) % range + min)
}

/// Draw the points awarded for redeeming one ticket.
#[inline]
pub fn draw_points(secret: &Hash256, seed: &Hash256) -> u32 {
    // POINTS_MAX > POINTS_MIN, so the range is never empty
    draw(secret, seed, POINTS_MIN, POINTS_MAX).unwrap_or(POINTS_MIN)
}
