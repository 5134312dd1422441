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

//! Per-acquisition lock handle.
//!
//! ## Purpose
//! A [`Lock`] represents one successful quorum acquisition: it owns the
//! acquisition token, tracks the locally-computed expiration instant, and
//! exposes release, extension, and background auto-extension.
//!
//! ## Renewal state machine
//! ```text
//!            start_auto_extension
//!   Idle ──────────────────────────> Scheduled
//!                                       │  timer elapses
//!                                       ▼
//!                  reschedule ┌──── Running
//!   Scheduled <───────────────┘        │ lost majority / error /
//!                                      │ release / stop
//!                                      ▼
//!                                   Stopped
//! ```
//! At most one renewal timer is pending per handle. `release` and `stop`
//! move any state to Stopped; a renewal already in flight re-checks the
//! released flag before and after its extend fan-out, so a racing release
//! wins and the stray extension is undone by the token-guarded release
//! script or by server-side TTL expiry.

use crate::error::{LockError, LockResult};
use crate::manager::LockManager;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Default number of milliseconds before expiration at which a scheduled
/// renewal fires.
pub const DEFAULT_EXTEND_THRESHOLD_MS: u64 = 1000;

/// Lifecycle of the background renewal timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenewalState {
    /// Auto-extension has never been started
    Idle,
    /// A single-shot renewal timer is armed
    Scheduled,
    /// A renewal fan-out is in flight
    Running,
    /// Auto-extension has terminated (stop, release, lost majority, error)
    Stopped,
}

struct HandleState {
    released: bool,
    expires_at: Instant,
    renewal: RenewalState,
    extend_threshold_ms: Option<u64>,
    stop_tx: Option<watch::Sender<bool>>,
}

struct LockInner {
    manager: LockManager,
    keys: Vec<String>,
    token: String,
    ttl_ms: u64,
    state: Arc<Mutex<HandleState>>,
}

/// Handle for a single held acquisition.
///
/// Clones share the same underlying acquisition; release through any clone
/// releases them all. The token is immutable for the life of the handle and
/// never leaves the crate.
#[derive(Clone)]
pub struct Lock {
    inner: Arc<LockInner>,
}

impl Lock {
    pub(crate) fn new(
        manager: LockManager,
        keys: Vec<String>,
        token: String,
        ttl_ms: u64,
        validity_ms: u64,
    ) -> Self {
        Self {
            inner: Arc::new(LockInner {
                manager,
                keys,
                token,
                ttl_ms,
                state: Arc::new(Mutex::new(HandleState {
                    released: false,
                    expires_at: Instant::now() + Duration::from_millis(validity_ms),
                    renewal: RenewalState::Idle,
                    extend_threshold_ms: None,
                    stop_tx: None,
                })),
            }),
        }
    }

    /// Canonicalized resource keys covered by this acquisition.
    pub fn resource_keys(&self) -> &[String] {
        &self.inner.keys
    }

    /// Instant at which this handle considers itself expired locally.
    pub fn expiration_instant(&self) -> Instant {
        self.inner.state.lock().unwrap().expires_at
    }

    /// Whether `release` has completed (or begun) on this handle.
    pub fn is_released(&self) -> bool {
        self.inner.state.lock().unwrap().released
    }

    /// Whether the locally-tracked validity window has passed.
    pub fn is_expired(&self) -> bool {
        Instant::now() > self.inner.state.lock().unwrap().expires_at
    }

    /// Not released and not expired.
    pub fn is_valid(&self) -> bool {
        let state = self.inner.state.lock().unwrap();
        !state.released && Instant::now() <= state.expires_at
    }

    /// Current state of the background renewal timer.
    pub fn renewal_state(&self) -> RenewalState {
        self.inner.state.lock().unwrap().renewal
    }

    pub(crate) fn token(&self) -> &str {
        &self.inner.token
    }

    /// Release the lock on all servers.
    ///
    /// Idempotent: the first call stops auto-extension and dispatches the
    /// release script everywhere; every subsequent call returns `true`
    /// without touching the servers. Returns `false` when no server reported
    /// a deletion (for example after the TTL already expired everywhere) or
    /// when the release fan-out itself failed; failures are logged, never
    /// raised.
    pub async fn release(&self) -> bool {
        {
            let mut state = self.inner.state.lock().unwrap();
            if state.released {
                return true;
            }
            state.released = true;
            state.extend_threshold_ms = None;
            if let Some(stop_tx) = state.stop_tx.take() {
                let _ = stop_tx.send(true);
            }
            state.renewal = RenewalState::Stopped;
        }

        match self
            .inner
            .manager
            .release_owned(&self.inner.keys, &self.inner.token)
            .await
        {
            Ok(deleted) => deleted,
            Err(err) => {
                warn!(keys = ?self.inner.keys, error = %err, "lock release failed");
                false
            }
        }
    }

    /// Extend the lock's TTL on a quorum of servers.
    ///
    /// `new_ttl_ms` defaults to the TTL the lock was acquired with. On
    /// success the local expiration instant advances to now + TTL and the
    /// call returns `true`; when the quorum no longer holds every key under
    /// this token it returns `false` and the expiration is unchanged.
    ///
    /// ## Errors
    /// - [`LockError::Released`]: the handle was already released
    /// - [`LockError::InvalidParameter`]: `new_ttl_ms` is zero
    /// - [`LockError::ExtensionFailed`]: the extend fan-out itself failed
    pub async fn extend(&self, new_ttl_ms: Option<u64>) -> LockResult<bool> {
        if self.is_released() {
            return Err(LockError::Released);
        }
        let ttl_ms = new_ttl_ms.unwrap_or(self.inner.ttl_ms);
        if ttl_ms == 0 {
            return Err(LockError::InvalidParameter(
                "ttl must be a positive number of milliseconds".to_string(),
            ));
        }

        match self
            .inner
            .manager
            .extend_owned(&self.inner.keys, &self.inner.token, ttl_ms)
            .await
        {
            Ok(true) => {
                let mut state = self.inner.state.lock().unwrap();
                state.expires_at = Instant::now() + Duration::from_millis(ttl_ms);
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(err) => Err(LockError::ExtensionFailed(err.to_string())),
        }
    }

    /// Start background auto-extension.
    ///
    /// Schedules a renewal `threshold_ms` (default 1000) milliseconds before
    /// each expiration. A renewal that succeeds advances the expiration and
    /// reschedules itself; one that loses the majority or fails stops the
    /// timer and logs a warning, leaving the critical section to observe
    /// invalidity through [`Lock::is_valid`].
    ///
    /// ## Errors
    /// - [`LockError::Released`]: the handle was already released
    /// - [`LockError::InvalidParameter`]: `threshold_ms` is zero
    pub fn start_auto_extension(&self, threshold_ms: Option<u64>) -> LockResult<()> {
        let threshold_ms = threshold_ms.unwrap_or(DEFAULT_EXTEND_THRESHOLD_MS);
        if threshold_ms == 0 {
            return Err(LockError::InvalidParameter(
                "extension threshold must be a positive number of milliseconds".to_string(),
            ));
        }

        let stop_rx = {
            let mut state = self.inner.state.lock().unwrap();
            if state.released {
                return Err(LockError::Released);
            }
            // Replace any previously armed timer; a single slot only.
            if let Some(stop_tx) = state.stop_tx.take() {
                let _ = stop_tx.send(true);
            }
            let (stop_tx, stop_rx) = watch::channel(false);
            state.stop_tx = Some(stop_tx);
            state.extend_threshold_ms = Some(threshold_ms);
            state.renewal = RenewalState::Scheduled;
            stop_rx
        };

        tokio::spawn(renewal_loop(
            self.inner.manager.clone(),
            self.inner.keys.clone(),
            self.inner.token.clone(),
            self.inner.ttl_ms,
            Arc::clone(&self.inner.state),
            stop_rx,
        ));
        Ok(())
    }

    /// Cancel any pending renewal and disable auto-extension. Called
    /// implicitly by [`Lock::release`].
    pub fn stop_auto_extension(&self) {
        let mut state = self.inner.state.lock().unwrap();
        state.extend_threshold_ms = None;
        if let Some(stop_tx) = state.stop_tx.take() {
            let _ = stop_tx.send(true);
            state.renewal = RenewalState::Stopped;
        }
    }
}

impl Drop for LockInner {
    fn drop(&mut self) {
        let was_released = {
            let mut state = self.state.lock().unwrap();
            if let Some(stop_tx) = state.stop_tx.take() {
                let _ = stop_tx.send(true);
            }
            let was_released = state.released;
            state.released = true;
            state.renewal = RenewalState::Stopped;
            was_released
        };
        if !was_released {
            warn!(keys = ?self.keys, "lock handle dropped while held; scheduling best-effort release");
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                let manager = self.manager.clone();
                let keys = std::mem::take(&mut self.keys);
                let token = std::mem::take(&mut self.token);
                runtime.spawn(async move {
                    let _ = manager.release_owned(&keys, &token).await;
                });
            }
        }
    }
}

/// Background renewal task: Scheduled -> Running -> Scheduled until stopped
/// or a renewal fails.
async fn renewal_loop(
    manager: LockManager,
    keys: Vec<String>,
    token: String,
    ttl_ms: u64,
    state: Arc<Mutex<HandleState>>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        // Scheduled: arm a single-shot wait ending `threshold` before the
        // current expiration. An already-passed deadline fires immediately.
        let wait = {
            let mut current = state.lock().unwrap();
            if current.released || *stop_rx.borrow() {
                current.renewal = RenewalState::Stopped;
                return;
            }
            current.renewal = RenewalState::Scheduled;
            let threshold = Duration::from_millis(
                current
                    .extend_threshold_ms
                    .unwrap_or(DEFAULT_EXTEND_THRESHOLD_MS),
            );
            current
                .expires_at
                .saturating_duration_since(Instant::now())
                .checked_sub(threshold)
        };
        if let Some(wait) = wait.filter(|wait| !wait.is_zero()) {
            tokio::select! {
                _ = stop_rx.changed() => {
                    state.lock().unwrap().renewal = RenewalState::Stopped;
                    return;
                }
                _ = sleep(wait) => {}
            }
        }

        // Running: re-check the released flag so a racing release wins.
        {
            let mut current = state.lock().unwrap();
            if current.released || *stop_rx.borrow() {
                current.renewal = RenewalState::Stopped;
                return;
            }
            current.renewal = RenewalState::Running;
        }

        match manager.extend_owned(&keys, &token, ttl_ms).await {
            Ok(true) => {
                let mut current = state.lock().unwrap();
                if current.released {
                    current.renewal = RenewalState::Stopped;
                    return;
                }
                current.expires_at = Instant::now() + Duration::from_millis(ttl_ms);
                current.renewal = RenewalState::Scheduled;
                debug!(keys = ?keys, ttl_ms, "lock auto-extended");
            }
            Ok(false) => {
                warn!(keys = ?keys, "auto-extension lost its majority; renewals stopped");
                state.lock().unwrap().renewal = RenewalState::Stopped;
                return;
            }
            Err(err) => {
                warn!(keys = ?keys, error = %err, "auto-extension failed; renewals stopped");
                state.lock().unwrap().renewal = RenewalState::Stopped;
                return;
            }
        }
    }
}
