//! Contention back-off
//!
//! A thin dispatcher from the configured [`BackOffKind`] to the crossbeam
//! back-off primitive. Back-off is a throughput knob only; no loop in this
//! crate depends on it for progress.

use crossbeam::utils::Backoff;
use shoal_core::BackOffKind;

/// Applies one back-off step of the configured strategy
#[inline]
pub(crate) fn pause(kind: BackOffKind, backoff: &Backoff) {
    match kind {
        BackOffKind::Spin => backoff.spin(),
        BackOffKind::SpinThenYield => backoff.snooze(),
        BackOffKind::None => {}
    }
}
