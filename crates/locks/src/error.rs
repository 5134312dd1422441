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

//! Error types for quorum lock operations.

use thiserror::Error;

/// Result type for lock operations.
pub type LockResult<T> = Result<T, LockError>;

/// Errors that can occur during lock operations.
///
/// Per-server transport and script failures never surface directly from the
/// manager's fan-outs; they are demoted to per-server rejections so that a
/// minority of failed servers cannot fail an otherwise healthy operation.
/// The variants here cover the paths that are meaningful to callers.
#[derive(Error, Debug)]
pub enum LockError {
    /// Invalid caller-supplied parameter (key, TTL, threshold, configuration)
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// No quorum of servers granted the lock within the configured retries.
    /// Only surfaced by the scoped `with_lock` form; plain `acquire` reports
    /// this as an absent handle instead.
    #[error("Failed to acquire lock for {0}")]
    AcquisitionFailed(String),

    /// Extension failed for a reason other than losing the majority
    #[error("Lock extension failed: {0}")]
    ExtensionFailed(String),

    /// Operation on a handle that has already been released
    #[error("Lock has already been released")]
    Released,

    /// Script execution failed on a server (transport or command error)
    #[error("Server script error: {0}")]
    ServerScript(String),
}

impl From<redis::RedisError> for LockError {
    fn from(err: redis::RedisError) -> Self {
        LockError::ServerScript(format!("Redis error: {}", err))
    }
}
