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

//! Script execution contract for an individual key-value server.

use crate::error::LockResult;
use async_trait::async_trait;

/// The entire per-server contract of the quorum protocol.
///
/// ## Purpose
/// Each of the N independent servers must provide exactly one primitive:
/// execute an atomic script against a key vector and an argument vector and
/// return its integer reply. Connection lifecycle, TLS, and retry policies
/// belong to the implementation, not to this trait.
///
/// ## Behavior
/// - The script observes and mutates the given KEYS atomically
/// - Transport and command failures return an error; callers in the quorum
///   fan-out demote errors to per-server rejections
#[async_trait]
pub trait ScriptExecutor: Send + Sync {
    /// Execute `script` with the given KEYS and ARGV, returning the integer
    /// reply.
    async fn run_script(&self, script: &str, keys: &[String], args: &[String])
        -> LockResult<i64>;
}
