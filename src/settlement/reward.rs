//! Proportional Reward Arithmetic

/// Share of the released resource owed for `points` out of `total_points`.
///
/// `floor(resource_released * points / total_points)`, computed in `u128`
/// so the product cannot overflow. The rounding remainder stays in the
/// pool. Returns `None` when `total_points` is zero.
pub fn proportional_share(resource_released: i64, points: u64, total_points: u64) -> Option<i64> {
    if total_points == 0 {
        return None;
    }
    let released = u128::try_from(resource_released.max(0)).ok()?;
    let share = released * u128::from(points) / u128::from(total_points);
    i64::try_from(share).ok()
}
