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

//! Lock manager configuration.

use crate::error::{LockError, LockResult};
use crate::token::DEFAULT_TOKEN_LENGTH;

/// Tunables for a [`LockManager`](crate::manager::LockManager).
///
/// | Option | Default | Constraint |
/// |---|---|---|
/// | `drift_factor` | 0.01 | 0.0 ..= 0.1 |
/// | `retry_delay_ms` | 200 | - |
/// | `retry_jitter_ms` | 100 | - |
/// | `max_retry_attempts` | 3 | - |
/// | `token_length` | 22 | >= 1 |
#[derive(Debug, Clone)]
pub struct LockManagerOptions {
    /// Fraction of the TTL reserved to compensate for clock skew across
    /// servers; subtracted from the apparent validity of every grant.
    pub drift_factor: f64,
    /// Fixed delay between acquisition attempts.
    pub retry_delay_ms: u64,
    /// Upper bound of the uniform random delay added to `retry_delay_ms`.
    pub retry_jitter_ms: u64,
    /// Number of retries after the initial attempt.
    pub max_retry_attempts: u32,
    /// Length of generated ownership tokens, in base64 characters.
    pub token_length: usize,
}

impl Default for LockManagerOptions {
    fn default() -> Self {
        Self {
            drift_factor: 0.01,
            retry_delay_ms: 200,
            retry_jitter_ms: 100,
            max_retry_attempts: 3,
            token_length: DEFAULT_TOKEN_LENGTH,
        }
    }
}

impl LockManagerOptions {
    /// Validate option ranges. Called once at manager construction.
    pub(crate) fn validate(&self) -> LockResult<()> {
        if !self.drift_factor.is_finite() || !(0.0..=0.1).contains(&self.drift_factor) {
            return Err(LockError::InvalidParameter(format!(
                "drift_factor must be between 0.0 and 0.1, got {}",
                self.drift_factor
            )));
        }
        if self.token_length == 0 {
            return Err(LockError::InvalidParameter(
                "token_length must be a positive integer".to_string(),
            ));
        }
        Ok(())
    }
}
