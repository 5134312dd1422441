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

//! Server-side scripts for atomic multi-key lock operations.
//!
//! All three scripts iterate the full KEYS vector inside a single atomic
//! execution, so a multi-resource lock is acquired, released, and extended
//! all-or-nothing on each server; partial per-server state is never visible.

/// Acquire: if every key is absent, set each to the token with a millisecond
/// TTL and return 1; otherwise change nothing and return 0.
///
/// ARGV: `[token, ttl_ms]`. The single-key form is equivalent to
/// `SET key token NX PX ttl_ms`.
pub const ACQUIRE_SCRIPT: &str = r#"
for i = 1, #KEYS do
    if redis.call('exists', KEYS[i]) == 1 then
        return 0
    end
end
for i = 1, #KEYS do
    redis.call('set', KEYS[i], ARGV[1], 'PX', ARGV[2])
end
return 1
"#;

/// Release: delete every key whose value equals the token; return the number
/// of keys deleted (0 if none matched).
///
/// ARGV: `[token]`.
pub const RELEASE_SCRIPT: &str = r#"
local deleted = 0
for i = 1, #KEYS do
    if redis.call('get', KEYS[i]) == ARGV[1] then
        deleted = deleted + redis.call('del', KEYS[i])
    end
end
return deleted
"#;

/// Extend: if every key's value equals the token, reset each key's TTL and
/// return 1; otherwise change nothing and return 0.
///
/// ARGV: `[token, ttl_ms]`.
pub const EXTEND_SCRIPT: &str = r#"
for i = 1, #KEYS do
    if redis.call('get', KEYS[i]) ~= ARGV[1] then
        return 0
    end
end
for i = 1, #KEYS do
    redis.call('pexpire', KEYS[i], ARGV[2])
end
return 1
"#;
