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

//! In-memory script executor (for testing).
//!
//! ## Purpose
//! Emulates one key-value server's view of the three lock scripts over a
//! `HashMap` with millisecond expiry, so the full quorum algorithm can run
//! in-process against N simulated servers. Also supports fault injection:
//! a failing server raises on every call, which the quorum fan-outs must
//! tolerate for a minority of servers.
//!
//! ## Limitations
//! - Not persistent, not shared across processes
//! - Expired entries are dropped lazily, on the next access to their key

use crate::error::{LockError, LockResult};
use crate::executor::ScriptExecutor;
use crate::scripts::{ACQUIRE_SCRIPT, EXTEND_SCRIPT, RELEASE_SCRIPT};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
    value: String,
    expires_at: Instant,
}

/// One simulated key-value server.
///
/// Clones share the same underlying store, so tests can keep a handle for
/// inspection while the manager drives the executor.
#[derive(Clone)]
pub struct MemoryServer {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryServer {
    /// Create an empty server.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Make every subsequent script call raise (or stop doing so).
    pub fn fail_requests(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Current value stored under `key`, if present and not expired.
    pub async fn value_of(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone())
    }

    /// Remaining TTL of `key`, if present and not expired.
    pub async fn ttl_of(&self, key: &str) -> Option<Duration> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .map(|entry| entry.expires_at.saturating_duration_since(Instant::now()))
            .filter(|remaining| !remaining.is_zero())
    }

    /// Number of live (non-expired) keys.
    pub async fn key_count(&self) -> usize {
        let entries = self.entries.read().await;
        let now = Instant::now();
        entries
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    /// Drop all keys, as if every TTL had elapsed.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    async fn run_acquire(&self, keys: &[String], args: &[String]) -> LockResult<i64> {
        let (token, ttl) = parse_token_ttl(args)?;
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let any_held = keys
            .iter()
            .any(|key| matches!(entries.get(key), Some(entry) if entry.expires_at > now));
        if any_held {
            return Ok(0);
        }
        for key in keys {
            entries.insert(
                key.clone(),
                Entry {
                    value: token.clone(),
                    expires_at: now + ttl,
                },
            );
        }
        Ok(1)
    }

    async fn run_release(&self, keys: &[String], args: &[String]) -> LockResult<i64> {
        let token = parse_token(args)?;
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let mut deleted = 0;
        for key in keys {
            match entries.get(key) {
                Some(entry) if entry.expires_at <= now => {
                    entries.remove(key);
                }
                Some(entry) if entry.value == token => {
                    entries.remove(key);
                    deleted += 1;
                }
                _ => {}
            }
        }
        Ok(deleted)
    }

    async fn run_extend(&self, keys: &[String], args: &[String]) -> LockResult<i64> {
        let (token, ttl) = parse_token_ttl(args)?;
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let all_held = keys.iter().all(
            |key| matches!(entries.get(key), Some(entry) if entry.expires_at > now && entry.value == token),
        );
        if !all_held {
            return Ok(0);
        }
        for key in keys {
            if let Some(entry) = entries.get_mut(key) {
                entry.expires_at = now + ttl;
            }
        }
        Ok(1)
    }
}

impl Default for MemoryServer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ScriptExecutor for MemoryServer {
    async fn run_script(
        &self,
        script: &str,
        keys: &[String],
        args: &[String],
    ) -> LockResult<i64> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(LockError::ServerScript(
                "injected server failure".to_string(),
            ));
        }
        if keys.is_empty() {
            return Err(LockError::ServerScript(
                "script requires at least one key".to_string(),
            ));
        }
        match script {
            ACQUIRE_SCRIPT => self.run_acquire(keys, args).await,
            RELEASE_SCRIPT => self.run_release(keys, args).await,
            EXTEND_SCRIPT => self.run_extend(keys, args).await,
            _ => Err(LockError::ServerScript("unrecognized script".to_string())),
        }
    }
}

fn parse_token(args: &[String]) -> LockResult<String> {
    args.first()
        .cloned()
        .ok_or_else(|| LockError::ServerScript("missing token argument".to_string()))
}

fn parse_token_ttl(args: &[String]) -> LockResult<(String, Duration)> {
    let token = parse_token(args)?;
    let ttl_ms = args
        .get(1)
        .and_then(|raw| raw.parse::<u64>().ok())
        .ok_or_else(|| LockError::ServerScript("missing or invalid ttl argument".to_string()))?;
    Ok((token, Duration::from_millis(ttl_ms)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_string()).collect()
    }

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    #[tokio::test]
    async fn test_acquire_sets_all_keys_or_none() {
        let server = MemoryServer::new();

        let granted = server
            .run_script(ACQUIRE_SCRIPT, &keys(&["a", "b"]), &args(&["t1", "60000"]))
            .await
            .unwrap();
        assert_eq!(granted, 1);

        // "b" is taken, so ["b", "c"] must be refused without touching "c".
        let refused = server
            .run_script(ACQUIRE_SCRIPT, &keys(&["b", "c"]), &args(&["t2", "60000"]))
            .await
            .unwrap();
        assert_eq!(refused, 0);
        assert_eq!(server.value_of("c").await, None);
        assert_eq!(server.value_of("b").await.as_deref(), Some("t1"));
    }

    #[tokio::test]
    async fn test_release_counts_only_matching_tokens() {
        let server = MemoryServer::new();
        server
            .run_script(ACQUIRE_SCRIPT, &keys(&["a", "b"]), &args(&["t1", "60000"]))
            .await
            .unwrap();

        let wrong = server
            .run_script(RELEASE_SCRIPT, &keys(&["a", "b"]), &args(&["t2"]))
            .await
            .unwrap();
        assert_eq!(wrong, 0);
        assert_eq!(server.key_count().await, 2);

        let right = server
            .run_script(RELEASE_SCRIPT, &keys(&["a", "b"]), &args(&["t1"]))
            .await
            .unwrap();
        assert_eq!(right, 2);
        assert_eq!(server.key_count().await, 0);
    }

    #[tokio::test]
    async fn test_extend_requires_every_key() {
        let server = MemoryServer::new();
        server
            .run_script(ACQUIRE_SCRIPT, &keys(&["a"]), &args(&["t1", "60000"]))
            .await
            .unwrap();

        // "b" is not held at all, so the vector extension must refuse.
        let refused = server
            .run_script(EXTEND_SCRIPT, &keys(&["a", "b"]), &args(&["t1", "60000"]))
            .await
            .unwrap();
        assert_eq!(refused, 0);

        let extended = server
            .run_script(EXTEND_SCRIPT, &keys(&["a"]), &args(&["t1", "90000"]))
            .await
            .unwrap();
        assert_eq!(extended, 1);
        assert!(server.ttl_of("a").await.unwrap() > Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_expired_keys_are_reacquirable() {
        let server = MemoryServer::new();
        server
            .run_script(ACQUIRE_SCRIPT, &keys(&["a"]), &args(&["t1", "30"]))
            .await
            .unwrap();
        sleep(Duration::from_millis(60)).await;

        assert_eq!(server.value_of("a").await, None);
        let granted = server
            .run_script(ACQUIRE_SCRIPT, &keys(&["a"]), &args(&["t2", "60000"]))
            .await
            .unwrap();
        assert_eq!(granted, 1);

        // The stale token cannot release the new grant.
        let stale = server
            .run_script(RELEASE_SCRIPT, &keys(&["a"]), &args(&["t1"]))
            .await
            .unwrap();
        assert_eq!(stale, 0);
        assert_eq!(server.value_of("a").await.as_deref(), Some("t2"));
    }

    #[tokio::test]
    async fn test_fault_injection_raises() {
        let server = MemoryServer::new();
        server.fail_requests(true);

        let result = server
            .run_script(ACQUIRE_SCRIPT, &keys(&["a"]), &args(&["t1", "60000"]))
            .await;
        assert!(matches!(result, Err(LockError::ServerScript(_))));

        server.fail_requests(false);
        assert!(server
            .run_script(ACQUIRE_SCRIPT, &keys(&["a"]), &args(&["t1", "60000"]))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_unrecognized_script_raises() {
        let server = MemoryServer::new();
        let result = server
            .run_script("return 1", &keys(&["a"]), &args(&["t1"]))
            .await;
        assert!(matches!(result, Err(LockError::ServerScript(_))));
    }
}
