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

//! Per-acquisition ownership tokens.
//!
//! ## Purpose
//! Every acquisition attempt stores an unpredictable token as the value of
//! each locked key. The token is the sole proof of ownership: release and
//! extension scripts compare it server-side before mutating anything, so a
//! client can never delete or prolong a grant it does not hold.
//!
//! Tokens come from the OS cryptographic RNG and are encoded with the
//! URL-safe base64 alphabet, truncated to the requested length.

use crate::error::{LockError, LockResult};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};

/// Default token length in characters (128 bits of randomness, base64).
pub const DEFAULT_TOKEN_LENGTH: usize = 22;

/// Generate a random token of exactly `length` base64 characters.
///
/// ## Errors
/// - [`LockError::InvalidParameter`]: `length` is zero
pub fn generate_token(length: usize) -> LockResult<String> {
    if length == 0 {
        return Err(LockError::InvalidParameter(
            "token length must be a positive integer".to_string(),
        ));
    }

    // Each 3 random bytes yield 4 encoded characters; over-generate slightly
    // and truncate so the output is exactly `length` characters.
    let byte_len = (length * 3) / 4 + 3;
    let mut bytes = vec![0u8; byte_len];
    OsRng.fill_bytes(&mut bytes);

    let mut encoded = URL_SAFE_NO_PAD.encode(&bytes);
    encoded.truncate(length);
    Ok(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_token_has_requested_length() {
        for length in [1, 8, DEFAULT_TOKEN_LENGTH, 64, 200] {
            let token = generate_token(length).unwrap();
            assert_eq!(token.len(), length);
        }
    }

    #[test]
    fn test_token_rejects_zero_length() {
        let result = generate_token(0);
        assert!(matches!(result, Err(LockError::InvalidParameter(_))));
    }

    #[test]
    fn test_token_uses_url_safe_alphabet() {
        let token = generate_token(1000).unwrap();
        assert!(token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_tokens_do_not_collide() {
        let mut seen = HashSet::new();
        for _ in 0..10_000 {
            let token = generate_token(DEFAULT_TOKEN_LENGTH).unwrap();
            assert!(seen.insert(token), "token collision at default length");
        }
    }
}
