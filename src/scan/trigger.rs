//! Checkpoint trigger predicate.
//!
//! A checkpoint fires when the accumulated piezo displacement sits close to an
//! integer multiple of the recording step. The closeness test is done on the
//! ratio `displacement / interval`, not on the displacement itself, and the
//! nearest integer is found with round-half-away-from-zero (`f64::round`), so a
//! ratio of exactly 2.5 resolves to 3.

use crate::error::{AppResult, DaqError};

/// Returns `true` when `displacement` is within `tolerance` of an integer
/// multiple of `interval`, measured in units of `interval`.
///
/// # Errors
///
/// Returns [`DaqError::ZeroRecordInterval`] when `interval` is zero, whatever
/// the other arguments are.
pub fn is_near_multiple(displacement: f64, interval: f64, tolerance: f64) -> AppResult<bool> {
    if interval == 0.0 {
        return Err(DaqError::ZeroRecordInterval);
    }

    let ratio = displacement / interval;
    let nearest = ratio.round();
    Ok((ratio - nearest).abs() < tolerance.abs())
}
