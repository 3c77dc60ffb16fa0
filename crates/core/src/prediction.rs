//! Post-processing of raw model output into a persisted visitor count.

/// Floor a raw regression output to an integer.
///
/// Returns `None` for NaN and infinities, which no model should produce
/// for a finite population.
pub fn floor_output(raw: f64) -> Option<i64> {
    if !raw.is_finite() {
        return None;
    }
    let floored = raw.floor();
    if floored < i64::MIN as f64 || floored > i64::MAX as f64 {
        return None;
    }
    Some(floored as i64)
}

/// Clamp a predicted visitor count to the non-negative range stored in
/// `visitor_prediction.predicted_visitors`.
pub fn clamp_visitors(predicted: i64) -> i64 {
    predicted.max(0)
}
