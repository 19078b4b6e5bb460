//! Lock tokens over sets of signal paths.
//!
//! A token is an exclusive, time-bounded lease on a fixed set of paths.
//! Expiry is lazy: a token is only discovered to be expired when it is
//! touched (looked up by path, validated, unlocked) or when a new lock is
//! requested, at which point it is dropped exactly as if it had been
//! unlocked. There is no background sweeper.
//!
//! The manager takes the current time as an argument on every call so the
//! owner decides the clock; the store passes `Utc::now()`.

use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::{ShadowError, ShadowResult};
use crate::path::SignalPath;

/// Opaque, unguessable lock token identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(Uuid);

impl TokenId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a token id presented by a client.
    ///
    /// Anything that is not a well-formed id can never name a live token,
    /// so it is reported as an invalid token.
    pub fn parse(s: &str) -> ShadowResult<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| ShadowError::InvalidToken)
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A lease on a set of paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockToken {
    id: TokenId,
    paths: BTreeSet<SignalPath>,
    expires_at: DateTime<Utc>,
}

impl LockToken {
    pub fn id(&self) -> TokenId {
        self.id
    }

    pub fn paths(&self) -> &BTreeSet<SignalPath> {
        &self.paths
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Lock table: live tokens plus a path -> holder index.
#[derive(Debug, Default)]
pub struct LockManager {
    tokens: HashMap<TokenId, LockToken>,
    holders: HashMap<SignalPath, TokenId>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock every path in `paths`, or none of them.
    pub fn lock(
        &mut self,
        paths: BTreeSet<SignalPath>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> ShadowResult<LockToken> {
        if paths.is_empty() {
            return Err(ShadowError::invalid_request("lock requires at least one path"));
        }
        if ttl.is_zero() {
            return Err(ShadowError::invalid_request("lock ttl must be positive"));
        }
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|_| ShadowError::invalid_request("lock ttl out of range"))?;

        self.sweep_expired(now);

        if let Some(path) = paths.iter().find(|p| self.holders.contains_key(*p)) {
            return Err(ShadowError::LockConflict {
                path: path.to_string(),
            });
        }

        let expires_at = now
            .checked_add_signed(ttl)
            .ok_or_else(|| ShadowError::invalid_request("lock ttl out of range"))?;

        let token = LockToken {
            id: TokenId::generate(),
            paths,
            expires_at,
        };
        for path in &token.paths {
            self.holders.insert(path.clone(), token.id);
        }
        self.tokens.insert(token.id, token.clone());

        debug!(
            "Granted lock {} on {} path(s) until {}",
            token.id,
            token.paths.len(),
            token.expires_at
        );
        Ok(token)
    }

    /// Release every path held by `id`.
    ///
    /// An expired token is dropped as well but still reported as invalid.
    pub fn unlock(&mut self, id: &TokenId, now: DateTime<Utc>) -> ShadowResult<LockToken> {
        let token = self.tokens.remove(id).ok_or(ShadowError::InvalidToken)?;
        self.release_paths(&token);

        if token.is_expired(now) {
            debug!("Unlock of expired token {}", token.id);
            return Err(ShadowError::InvalidToken);
        }

        debug!("Released lock {}", token.id);
        Ok(token)
    }

    /// Look up a live token.
    pub fn validate(&mut self, id: &TokenId, now: DateTime<Utc>) -> ShadowResult<&LockToken> {
        self.expire_token(id, now);
        self.tokens.get(id).ok_or(ShadowError::InvalidToken)
    }

    /// The live token holding `path`, expiring a stale holder on the way.
    pub fn holder(&mut self, path: &SignalPath, now: DateTime<Utc>) -> Option<TokenId> {
        let id = *self.holders.get(path)?;
        if self.expire_token(&id, now) {
            None
        } else {
            Some(id)
        }
    }

    /// Read-only lock check; does not drop expired tokens.
    pub fn is_locked(&self, path: &SignalPath, now: DateTime<Utc>) -> bool {
        self.holders
            .get(path)
            .and_then(|id| self.tokens.get(id))
            .map_or(false, |token| !token.is_expired(now))
    }

    /// Number of tokens that have not expired yet.
    pub fn active_count(&self, now: DateTime<Utc>) -> usize {
        self.tokens.values().filter(|t| !t.is_expired(now)).count()
    }

    /// Drop `id` if it has expired. Returns true when it was dropped.
    fn expire_token(&mut self, id: &TokenId, now: DateTime<Utc>) -> bool {
        let expired = self.tokens.get(id).map_or(false, |t| t.is_expired(now));
        if expired {
            if let Some(token) = self.tokens.remove(id) {
                debug!("Lock {} expired", token.id);
                self.release_paths(&token);
            }
        }
        expired
    }

    fn sweep_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<TokenId> = self
            .tokens
            .values()
            .filter(|t| t.is_expired(now))
            .map(|t| t.id)
            .collect();
        for id in expired {
            self.expire_token(&id, now);
        }
    }

    fn release_paths(&mut self, token: &LockToken) {
        for path in &token.paths {
            if self.holders.get(path) == Some(&token.id) {
                self.holders.remove(path);
            }
        }
    }
}
