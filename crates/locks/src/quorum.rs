// SPDX-License-Identifier: LGPL-2.1-or-later
// Copyright (C) 2025 Shahzad A. Bhatti <bhatti@plexobject.com>
//
// This file is part of RedQuorum.
//
// RedQuorum is free software: you can redistribute it and/or modify
// it under the terms of the GNU Lesser General Public License as published by
// the Free Software Foundation, either version 2.1 of the License, or
// (at your option) any later version.
//
// RedQuorum is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public License
// along with RedQuorum. If not, see <https://www.gnu.org/licenses/>.

//! Acquisition evaluator: quorum and timing arithmetic.
//!
//! ## Purpose
//! A lock attempt is safe only when a strict majority of servers granted it
//! AND enough of the TTL remains after subtracting the time the acquisition
//! itself consumed plus a clock-drift allowance. This module is the pure
//! decision function for that rule; the manager feeds it observed counts and
//! elapsed time.

use std::fmt;

/// Why an acquisition attempt was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Fewer than `quorum` servers granted the lock
    InsufficientConsensus,
    /// The grant propagated too slowly; remaining validity would not be
    /// strictly positive after drift correction
    TimingConstraint,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::InsufficientConsensus => write!(f, "insufficient consensus"),
            RejectReason::TimingConstraint => write!(f, "timing constraint violated"),
        }
    }
}

/// Outcome of evaluating one acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptDecision {
    /// The attempt is safe; the lock may be treated as held for
    /// `validity_ms` milliseconds.
    Accepted { validity_ms: u64 },
    /// The attempt must be abandoned and its partial grants cleaned up.
    Rejected(RejectReason),
}

/// Evaluate one acquisition attempt.
///
/// `drift = round(drift_factor * ttl_ms)` and
/// `validity = ttl_ms - elapsed_ms - drift`. The attempt is accepted when
/// `success_count >= quorum` and `validity > 1`.
pub fn evaluate_attempt(
    success_count: usize,
    quorum: usize,
    ttl_ms: u64,
    elapsed_ms: u64,
    drift_factor: f64,
) -> AttemptDecision {
    let drift = (drift_factor * ttl_ms as f64).round() as i64;
    let validity = ttl_ms as i64 - elapsed_ms as i64 - drift;

    if success_count < quorum {
        AttemptDecision::Rejected(RejectReason::InsufficientConsensus)
    } else if validity <= 1 {
        AttemptDecision::Rejected(RejectReason::TimingConstraint)
    } else {
        AttemptDecision::Accepted {
            validity_ms: validity as u64,
        }
    }
}
