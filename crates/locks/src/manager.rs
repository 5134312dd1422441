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

//! Quorum lock manager.
//!
//! ## Purpose
//! Coordinates lock acquisition, release, and extension across N independent
//! key-value servers. A lock is held only when a strict majority of servers
//! granted it and the grant propagated fast enough that its remaining
//! validity is strictly positive after clock-drift correction.
//!
//! ## Behavior
//! - **Acquire**: fresh token per attempt, concurrent fan-out to all servers,
//!   quorum + timing evaluation, best-effort cleanup of partial grants on
//!   rejection, randomized retry delay
//! - **Release**: best-effort; succeeds when any server deleted a key
//! - **Extend**: requires a majority, like acquisition
//! - **Scoped sections**: [`LockManager::with_lock`] wraps acquire, the
//!   caller's work, and a guaranteed release epilogue
//!
//! Fan-outs wait for every server and capture each outcome; a server that
//! raises counts as a rejection from that server. The fan-out never
//! short-circuits on the first error, which is what makes a minority of
//! unreachable servers harmless.

use crate::config::LockManagerOptions;
use crate::error::{LockError, LockResult};
use crate::executor::ScriptExecutor;
use crate::handle::Lock;
use crate::quorum::{evaluate_attempt, AttemptDecision};
use crate::server;
use crate::token::generate_token;
use futures::future::join_all;
use rand::Rng;
use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

struct ManagerInner {
    servers: Vec<Arc<dyn ScriptExecutor>>,
    quorum: usize,
    options: LockManagerOptions,
}

/// Distributed lock manager over N script-capable key-value servers.
///
/// Cheap to clone; clones share the server list and configuration. Multiple
/// managers can coexist over the same server set without coordination.
#[derive(Clone)]
pub struct LockManager {
    inner: Arc<ManagerInner>,
}

impl LockManager {
    /// Create a manager with default options.
    ///
    /// ## Errors
    /// - [`LockError::InvalidParameter`]: `servers` is empty
    pub fn new(servers: Vec<Arc<dyn ScriptExecutor>>) -> LockResult<Self> {
        Self::with_options(servers, LockManagerOptions::default())
    }

    /// Create a manager with explicit options.
    ///
    /// The quorum is derived once from the server count: `N / 2 + 1`.
    pub fn with_options(
        servers: Vec<Arc<dyn ScriptExecutor>>,
        options: LockManagerOptions,
    ) -> LockResult<Self> {
        if servers.is_empty() {
            return Err(LockError::InvalidParameter(
                "at least one server is required".to_string(),
            ));
        }
        options.validate()?;
        let quorum = servers.len() / 2 + 1;
        Ok(Self {
            inner: Arc::new(ManagerInner {
                servers,
                quorum,
                options,
            }),
        })
    }

    /// Minimum number of servers that must grant a lock.
    pub fn quorum(&self) -> usize {
        self.inner.quorum
    }

    /// Number of configured servers.
    pub fn server_count(&self) -> usize {
        self.inner.servers.len()
    }

    /// The manager's configuration.
    pub fn options(&self) -> &LockManagerOptions {
        &self.inner.options
    }

    /// Acquire a lock on one or more resources for `ttl_ms` milliseconds.
    ///
    /// Resource keys are canonicalized: duplicates removed (with a warning)
    /// and the remainder sorted ascending. The whole key vector is then
    /// acquired atomically per server, so a multi-resource lock either
    /// covers every key on a given server or none of them.
    ///
    /// Runs up to `1 + max_retry_attempts` attempts, each with a fresh
    /// token. Exhausting retries is not an error: the lock was simply not
    /// available, and `Ok(None)` is returned.
    ///
    /// ## Errors
    /// - [`LockError::InvalidParameter`]: empty key vector, empty or
    ///   whitespace-only key, or zero TTL
    pub async fn acquire(&self, resources: &[&str], ttl_ms: u64) -> LockResult<Option<Lock>> {
        let keys = canonicalize_resources(resources)?;
        if ttl_ms == 0 {
            return Err(LockError::InvalidParameter(
                "ttl must be a positive number of milliseconds".to_string(),
            ));
        }

        let options = &self.inner.options;
        for attempt in 0..=options.max_retry_attempts {
            let token = generate_token(options.token_length)?;
            let start = Instant::now();
            let grants = join_all(self.inner.servers.iter().map(|server| {
                server::acquire_on_server(server.as_ref(), &keys, &token, ttl_ms)
            }))
            .await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            let success_count = grants.iter().filter(|granted| **granted).count();

            match evaluate_attempt(
                success_count,
                self.inner.quorum,
                ttl_ms,
                elapsed_ms,
                options.drift_factor,
            ) {
                AttemptDecision::Accepted { validity_ms } => {
                    debug!(keys = ?keys, attempt, success_count, validity_ms, "lock acquired");
                    return Ok(Some(Lock::new(
                        self.clone(),
                        keys,
                        token,
                        ttl_ms,
                        validity_ms,
                    )));
                }
                AttemptDecision::Rejected(reason) => {
                    debug!(
                        keys = ?keys,
                        attempt,
                        success_count,
                        %reason,
                        "lock attempt rejected; cleaning up partial grants"
                    );
                    let _ = self.release_owned(&keys, &token).await;
                    if attempt < options.max_retry_attempts {
                        sleep(Duration::from_millis(
                            options.retry_delay_ms + self.jitter_ms(),
                        ))
                        .await;
                    }
                }
            }
        }
        Ok(None)
    }

    /// Run `work` inside an acquired lock, releasing on every exit path.
    ///
    /// When `extend_threshold_ms` is supplied, auto-extension keeps the lock
    /// alive for the duration of `work`. The closure receives a clone of the
    /// handle so it can observe validity; release still happens here, in the
    /// epilogue, and its failures are logged rather than surfaced so they
    /// never mask the outcome of `work`.
    ///
    /// ## Errors
    /// - [`LockError::AcquisitionFailed`]: no quorum within the configured
    ///   retries; the message names the requested resource(s)
    /// - [`LockError::InvalidParameter`]: as for [`LockManager::acquire`]
    pub async fn with_lock<T, F, Fut>(
        &self,
        resources: &[&str],
        ttl_ms: u64,
        extend_threshold_ms: Option<u64>,
        work: F,
    ) -> LockResult<T>
    where
        F: FnOnce(Lock) -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = match self.acquire(resources, ttl_ms).await? {
            Some(lock) => lock,
            None => {
                return Err(LockError::AcquisitionFailed(describe_resources(resources)));
            }
        };

        if let Some(threshold_ms) = extend_threshold_ms {
            if let Err(err) = lock.start_auto_extension(Some(threshold_ms)) {
                lock.release().await;
                return Err(err);
            }
        }

        let result = work(lock.clone()).await;

        // Epilogue for every exit of the critical section; release failures
        // are logged, never raised, so the caller's own outcome survives.
        lock.stop_auto_extension();
        if !lock.release().await {
            debug!(resources = ?resources, "post-section release reported no deletions");
        }
        Ok(result)
    }

    /// Release `keys` held under `token` on all servers. True when at least
    /// one server deleted a key; per-server failures are tolerated.
    pub(crate) async fn release_owned(&self, keys: &[String], token: &str) -> LockResult<bool> {
        if keys.is_empty() || token.is_empty() {
            return Err(LockError::InvalidParameter(
                "release requires a key vector and a token".to_string(),
            ));
        }
        let deletions = join_all(
            self.inner
                .servers
                .iter()
                .map(|server| server::release_on_server(server.as_ref(), keys, token)),
        )
        .await;
        Ok(deletions.into_iter().any(|deleted| deleted))
    }

    /// Extend `keys` held under `token` on all servers. True only when a
    /// quorum confirmed; a handle that no longer holds a majority is no
    /// longer safe to prolong.
    pub(crate) async fn extend_owned(
        &self,
        keys: &[String],
        token: &str,
        ttl_ms: u64,
    ) -> LockResult<bool> {
        if keys.is_empty() || token.is_empty() {
            return Err(LockError::InvalidParameter(
                "extend requires a key vector and a token".to_string(),
            ));
        }
        let extensions = join_all(
            self.inner
                .servers
                .iter()
                .map(|server| server::extend_on_server(server.as_ref(), keys, token, ttl_ms)),
        )
        .await;
        Ok(extensions.into_iter().filter(|extended| *extended).count() >= self.inner.quorum)
    }

    fn jitter_ms(&self) -> u64 {
        let jitter = self.inner.options.retry_jitter_ms;
        if jitter == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..jitter)
        }
    }
}

/// Validate and canonicalize a resource key vector: reject empty or
/// whitespace-only keys, drop duplicates with a warning, sort ascending.
fn canonicalize_resources(resources: &[&str]) -> LockResult<Vec<String>> {
    if resources.is_empty() {
        return Err(LockError::InvalidParameter(
            "at least one resource key is required".to_string(),
        ));
    }
    let mut keys = BTreeSet::new();
    let mut removed = Vec::new();
    for resource in resources {
        if resource.trim().is_empty() {
            return Err(LockError::InvalidParameter(
                "resource keys must be non-empty, non-whitespace strings".to_string(),
            ));
        }
        if !keys.insert((*resource).to_string()) {
            removed.push(*resource);
        }
    }
    if !removed.is_empty() {
        removed.sort_unstable();
        removed.dedup();
        warn!(removed = ?removed, "duplicate resource keys removed from lock request");
    }
    Ok(keys.into_iter().collect())
}

/// Human-readable resource list for acquisition-failure messages, in the
/// caller's original order.
fn describe_resources(resources: &[&str]) -> String {
    if resources.len() == 1 {
        format!("resource: {}", resources[0])
    } else {
        format!("resources: [{}]", resources.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryServer;

    fn servers(count: usize) -> Vec<MemoryServer> {
        (0..count).map(|_| MemoryServer::new()).collect()
    }

    fn manager_for(servers: &[MemoryServer], options: LockManagerOptions) -> LockManager {
        let executors: Vec<Arc<dyn ScriptExecutor>> = servers
            .iter()
            .map(|server| Arc::new(server.clone()) as Arc<dyn ScriptExecutor>)
            .collect();
        LockManager::with_options(executors, options).unwrap()
    }

    fn cluster(count: usize) -> (Vec<MemoryServer>, LockManager) {
        let servers = servers(count);
        let manager = manager_for(&servers, LockManagerOptions::default());
        (servers, manager)
    }

    fn fast_options() -> LockManagerOptions {
        LockManagerOptions {
            retry_delay_ms: 5,
            retry_jitter_ms: 5,
            ..Default::default()
        }
    }

    #[test]
    fn test_quorum_derivation() {
        for (servers, quorum) in [(1, 1), (2, 2), (3, 2), (4, 3), (5, 3), (7, 4)] {
            let (_, manager) = cluster(servers);
            assert_eq!(manager.quorum(), quorum);
        }
    }

    #[test]
    fn test_requires_at_least_one_server() {
        let result = LockManager::new(Vec::new());
        assert!(matches!(result, Err(LockError::InvalidParameter(_))));
    }

    #[test]
    fn test_canonicalize_sorts_and_dedups() {
        let keys = canonicalize_resources(&["zebra", "alpha", "beta", "alpha"]).unwrap();
        assert_eq!(keys, vec!["alpha", "beta", "zebra"]);
    }

    #[test]
    fn test_canonicalize_rejects_bad_keys() {
        assert!(canonicalize_resources(&[]).is_err());
        assert!(canonicalize_resources(&[""]).is_err());
        assert!(canonicalize_resources(&["ok", "   "]).is_err());
    }

    #[test]
    fn test_describe_resources() {
        assert_eq!(describe_resources(&["r1"]), "resource: r1");
        assert_eq!(
            describe_resources(&["r2", "r1"]),
            "resources: [r2, r1]"
        );
    }

    #[tokio::test]
    async fn test_acquire_rejects_zero_ttl() {
        let (_, manager) = cluster(3);
        let result = manager.acquire(&["r1"], 0).await;
        assert!(matches!(result, Err(LockError::InvalidParameter(_))));
    }

    #[tokio::test]
    async fn test_acquire_stores_token_on_every_server() {
        let (servers, manager) = cluster(5);
        let lock = manager.acquire(&["r1"], 5000).await.unwrap().unwrap();

        for server in &servers {
            assert_eq!(server.value_of("r1").await.as_deref(), Some(lock.token()));
        }
        assert!(lock.release().await);
        for server in &servers {
            assert_eq!(server.value_of("r1").await, None);
        }
    }

    #[tokio::test]
    async fn test_consecutive_acquisitions_use_fresh_tokens() {
        let (servers, manager) = cluster(3);

        let first = manager.acquire(&["r1"], 5000).await.unwrap().unwrap();
        let first_token = first.token().to_string();
        assert!(first.release().await);

        let second = manager.acquire(&["r1"], 5000).await.unwrap().unwrap();
        assert_ne!(second.token(), first_token);
        assert_eq!(
            servers[0].value_of("r1").await.as_deref(),
            Some(second.token())
        );
    }

    #[tokio::test]
    async fn test_extend_with_wrong_token_leaves_owner_untouched() {
        let (servers, manager) = cluster(5);
        let owner = manager.acquire(&["r1"], 5000).await.unwrap().unwrap();
        let owner_expiry = owner.expiration_instant();

        // A handle with a synthetic token does not own the key.
        let intruder = Lock::new(
            manager.clone(),
            vec!["r1".to_string()],
            "forged-token-value".to_string(),
            5000,
            4000,
        );
        assert!(!intruder.extend(Some(60_000)).await.unwrap());

        assert_eq!(owner.expiration_instant(), owner_expiry);
        for server in &servers {
            assert_eq!(server.value_of("r1").await.as_deref(), Some(owner.token()));
        }
        assert!(owner.release().await);
        assert!(!intruder.release().await);
    }

    #[tokio::test]
    async fn test_release_true_when_any_server_deletes() {
        let (servers, manager) = cluster(3);
        let lock = manager.acquire(&["r1"], 5000).await.unwrap().unwrap();

        // Simulate TTL expiry on two of three servers.
        servers[0].clear().await;
        servers[1].clear().await;

        assert!(lock.release().await);
    }

    #[tokio::test]
    async fn test_no_majority_returns_absent_handle() {
        let servers = servers(5);
        let manager = manager_for(&servers, fast_options());

        // Three of five servers already hold the key under a foreign token.
        for server in servers.iter().take(3) {
            server
                .run_script(
                    crate::scripts::ACQUIRE_SCRIPT,
                    &["r1".to_string()],
                    &["foreign-holder".to_string(), "60000".to_string()],
                )
                .await
                .unwrap();
        }

        let handle = manager.acquire(&["r1"], 5000).await.unwrap();
        assert!(handle.is_none());

        // The two grantable servers were cleaned up after each rejection.
        for server in servers.iter().skip(3) {
            assert_eq!(server.value_of("r1").await, None);
        }
    }

    #[tokio::test]
    async fn test_with_lock_runs_work_and_releases() {
        let (servers, manager) = cluster(5);

        let result = manager
            .with_lock(&["r1"], 5000, None, |lock| async move {
                assert!(lock.is_valid());
                21 * 2
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        for server in &servers {
            assert_eq!(server.value_of("r1").await, None);
        }
    }

    #[tokio::test]
    async fn test_with_lock_failure_names_the_resources() {
        let servers = servers(3);
        let manager = manager_for(&servers, fast_options());

        for server in &servers {
            server
                .run_script(
                    crate::scripts::ACQUIRE_SCRIPT,
                    &["busy".to_string()],
                    &["foreign-holder".to_string(), "60000".to_string()],
                )
                .await
                .unwrap();
        }

        let err = manager
            .with_lock(&["busy"], 5000, None, |_| async {})
            .await
            .unwrap_err();
        assert!(err.to_string().contains("resource: busy"), "{err}");

        let err = manager
            .with_lock(&["busy", "also"], 5000, None, |_| async {})
            .await
            .unwrap_err();
        assert!(
            err.to_string().contains("resources: [busy, also]"),
            "{err}"
        );
    }

    #[tokio::test]
    async fn test_with_lock_invalid_threshold_releases_before_raising() {
        let (servers, manager) = cluster(3);

        let result = manager
            .with_lock(&["r1"], 5000, Some(0), |_| async {})
            .await;
        assert!(matches!(result, Err(LockError::InvalidParameter(_))));
        for server in &servers {
            assert_eq!(server.value_of("r1").await, None);
        }
    }
}
