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

//! # RedQuorum Distributed Locks
//!
//! ## Purpose
//! Distributed mutual exclusion over N independent key-value servers that
//! support atomic conditional-set-with-expiry and server-side scripting.
//! A lock is held only when a strict majority of the servers granted it,
//! the grant propagated fast enough that its remaining validity is strictly
//! positive after clock-drift correction, and the holder alone can release
//! or extend it through a cryptographically unpredictable per-acquisition
//! token.
//!
//! ## Design Decisions
//! - **Quorum over replication**: the servers must be independent; safety
//!   comes from majority agreement, not from a replicated log
//! - **Token-scoped mutation**: release and extension run as server-side
//!   scripts that compare the stored token before touching anything
//! - **Fault-demoting fan-outs**: every per-server call settles to a boolean;
//!   a raising server is just a rejecting server
//! - **Fence-free**: correctness assumes bounded clock drift and bounded
//!   process pauses; there are no fencing tokens
//!
//! ## Example
//! ```rust,no_run
//! use redquorum_locks::LockManager;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = LockManager::connect(&[
//!     "redis://127.0.0.1:6380/",
//!     "redis://127.0.0.1:6381/",
//!     "redis://127.0.0.1:6382/",
//! ])
//! .await?;
//!
//! // Scoped critical section with auto-extension 500ms before expiry.
//! let rows = manager
//!     .with_lock(&["orders:2025-08"], 10_000, Some(500), |lock| async move {
//!         assert!(lock.is_valid());
//!         // ... the work the lock protects ...
//!         42
//!     })
//!     .await?;
//! assert_eq!(rows, 42);
//!
//! // Or manage the handle explicitly.
//! if let Some(lock) = manager.acquire(&["orders:2025-08"], 10_000).await? {
//!     let extended = lock.extend(None).await?;
//!     assert!(extended);
//!     lock.release().await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod handle;
pub mod manager;
pub mod memory;
pub mod quorum;
pub mod redis;
pub mod scripts;
pub mod token;

mod server;

pub use config::LockManagerOptions;
pub use error::{LockError, LockResult};
pub use executor::ScriptExecutor;
pub use handle::{Lock, RenewalState, DEFAULT_EXTEND_THRESHOLD_MS};
pub use manager::LockManager;
pub use memory::MemoryServer;
pub use redis::RedisServer;
pub use token::{generate_token, DEFAULT_TOKEN_LENGTH};
