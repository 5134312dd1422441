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

//! Per-server operation wrappers.
//!
//! Each wrapper runs one script against one server and maps the reply to a
//! boolean grant. Errors are demoted to `false` here, never propagated: a
//! server that raises is indistinguishable from a server that said no, which
//! is what lets the quorum tolerate a minority of failed servers.

use crate::error::LockResult;
use crate::executor::ScriptExecutor;
use crate::scripts::{ACQUIRE_SCRIPT, EXTEND_SCRIPT, RELEASE_SCRIPT};
use tracing::debug;

/// Run the acquire script on one server. True iff the server granted every
/// key.
pub(crate) async fn acquire_on_server(
    server: &dyn ScriptExecutor,
    keys: &[String],
    token: &str,
    ttl_ms: u64,
) -> bool {
    let reply = server
        .run_script(
            ACQUIRE_SCRIPT,
            keys,
            &[token.to_string(), ttl_ms.to_string()],
        )
        .await;
    settle(reply, "acquire") == 1
}

/// Run the release script on one server. True iff the server deleted at
/// least one key it still held under this token.
pub(crate) async fn release_on_server(
    server: &dyn ScriptExecutor,
    keys: &[String],
    token: &str,
) -> bool {
    let reply = server
        .run_script(RELEASE_SCRIPT, keys, &[token.to_string()])
        .await;
    settle(reply, "release") >= 1
}

/// Run the extend script on one server. True iff the server still held every
/// key under this token and refreshed the TTLs.
pub(crate) async fn extend_on_server(
    server: &dyn ScriptExecutor,
    keys: &[String],
    token: &str,
    ttl_ms: u64,
) -> bool {
    let reply = server
        .run_script(
            EXTEND_SCRIPT,
            keys,
            &[token.to_string(), ttl_ms.to_string()],
        )
        .await;
    settle(reply, "extend") == 1
}

/// Demote a per-server error to a 0 reply.
fn settle(reply: LockResult<i64>, operation: &str) -> i64 {
    match reply {
        Ok(value) => value,
        Err(err) => {
            debug!(operation, error = %err, "server rejected via error");
            0
        }
    }
}
