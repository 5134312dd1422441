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

//! Redis-backed script executor.
//!
//! ## Architecture
//! - `redis` crate with async `ConnectionManager` (automatic reconnection,
//!   cloned per call)
//! - Scripts run through `redis::Script`, which handles EVALSHA caching and
//!   the EVAL fallback transparently
//!
//! Each [`RedisServer`] wraps exactly one independent Redis instance; the
//! quorum property of the lock manager depends on the instances not
//! replicating from each other.

use crate::error::{LockError, LockResult};
use crate::executor::ScriptExecutor;
use crate::manager::LockManager;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

/// One Redis instance participating in the quorum.
#[derive(Clone)]
pub struct RedisServer {
    manager: ConnectionManager,
}

impl RedisServer {
    /// Connect to a single Redis instance.
    ///
    /// Example URLs:
    /// - `redis://127.0.0.1:6379/`
    /// - `redis+tls://host:6379/`
    ///
    /// ## Errors
    /// - [`LockError::ServerScript`]: client construction or connection failed
    pub async fn connect(url: &str) -> LockResult<Self> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl ScriptExecutor for RedisServer {
    async fn run_script(
        &self,
        script: &str,
        keys: &[String],
        args: &[String],
    ) -> LockResult<i64> {
        let mut conn = self.manager.clone();
        let script = Script::new(script);
        let mut invocation = script.prepare_invoke();
        for key in keys {
            invocation.key(key.as_str());
        }
        for arg in args {
            invocation.arg(arg.as_str());
        }
        let reply: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(reply)
    }
}

impl LockManager {
    /// Create a manager connected to the given Redis instances, with default
    /// options.
    pub async fn connect(urls: &[&str]) -> LockResult<Self> {
        Self::connect_with_options(urls, crate::config::LockManagerOptions::default()).await
    }

    /// Create a manager connected to the given Redis instances.
    ///
    /// ## Errors
    /// - [`LockError::InvalidParameter`]: `urls` is empty or options invalid
    /// - [`LockError::ServerScript`]: a connection failed
    pub async fn connect_with_options(
        urls: &[&str],
        options: crate::config::LockManagerOptions,
    ) -> LockResult<Self> {
        if urls.is_empty() {
            return Err(LockError::InvalidParameter(
                "at least one server URL is required".to_string(),
            ));
        }
        let mut servers: Vec<std::sync::Arc<dyn ScriptExecutor>> =
            Vec::with_capacity(urls.len());
        for url in urls {
            servers.push(std::sync::Arc::new(RedisServer::connect(url).await?));
        }
        Self::with_options(servers, options)
    }
}
