//! Signal store.
//!
//! The store owns the path -> record map, the lock table and the
//! subscription hub behind one `RwLock`. Every mutation (set, lock,
//! unlock, subscribe, unsubscribe) runs under the write half, which makes
//! that lock the commit sequencer: one mutation is validated, applied and
//! handed to the hub before the next one starts. Reads take the read half
//! and therefore never see a half-applied batch.
//!
//! Nothing under the lock blocks on I/O. Fan-out uses non-blocking sends
//! into bounded per-subscriber queues.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::catalog::CatalogEntry;
use crate::config::StoreConfig;
use crate::error::{ShadowError, ShadowResult};
use crate::hub::{CloseReason, Subscription, SubscriptionHub, SubscriptionId};
use crate::lock::{LockManager, LockToken, TokenId};
use crate::model::{SignalConfig, SignalRecord, SignalUpdate, SignalValue, ValueType};
use crate::path::SignalPath;

/// Outcome of one entry of a set batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SetStatus {
    /// Applied; the path now has this version.
    Committed { version: u64 },
    /// The path is locked and the caller does not hold that lock.
    LockConflict,
    /// The presented token is unknown or expired.
    InvalidToken,
    /// The value's kind differs from the path's declared or established kind.
    TypeMismatch {
        expected: ValueType,
        actual: ValueType,
    },
    /// Valid on its own, but not applied because another entry failed.
    Aborted,
}

/// Per-path result of a set batch, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetResult {
    pub path: SignalPath,
    #[serde(flatten)]
    pub status: SetStatus,
}

impl SetResult {
    pub fn is_committed(&self) -> bool {
        matches!(self.status, SetStatus::Committed { .. })
    }

    /// The failure this entry reports, if any.
    pub fn error(&self) -> Option<ShadowError> {
        let path = self.path.to_string();
        match self.status {
            SetStatus::Committed { .. } => None,
            SetStatus::LockConflict => Some(ShadowError::LockConflict { path }),
            SetStatus::InvalidToken => Some(ShadowError::InvalidToken),
            SetStatus::TypeMismatch { expected, actual } => Some(ShadowError::TypeMismatch {
                path,
                expected,
                actual,
            }),
            SetStatus::Aborted => Some(ShadowError::InvalidRequest {
                reason: format!("{} not applied: another entry in the batch failed", path),
            }),
        }
    }
}

/// Point-in-time counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Paths with a record.
    pub signals: usize,
    /// Paths with a declaration.
    pub declared: usize,
    pub active_locks: usize,
    pub subscriptions: usize,
    /// Set batches committed since startup.
    pub commits: u64,
}

#[derive(Debug)]
struct Slot {
    value: SignalValue,
    version: u64,
    last_updated: DateTime<Utc>,
}

#[derive(Debug)]
struct StoreState {
    records: BTreeMap<SignalPath, Slot>,
    locks: LockManager,
    hub: SubscriptionHub,
    commits: u64,
}

impl StoreState {
    fn record(&self, path: &SignalPath, now: DateTime<Utc>) -> Option<SignalRecord> {
        self.records.get(path).map(|slot| SignalRecord {
            path: path.clone(),
            value: slot.value.clone(),
            version: slot.version,
            locked: self.locks.is_locked(path, now),
            last_updated: slot.last_updated,
        })
    }
}

/// The shared vehicle signal store.
///
/// Construct one at startup and share it by reference (typically in an
/// `Arc`) with the RPC layer and the producer.
#[derive(Debug)]
pub struct SignalStore {
    config: StoreConfig,
    declared: HashMap<SignalPath, SignalConfig>,
    state: RwLock<StoreState>,
}

impl SignalStore {
    /// Create an empty store with no declared signals.
    pub fn new(config: StoreConfig) -> Self {
        let hub = SubscriptionHub::new(config.subscriber_queue_capacity);
        Self {
            config,
            declared: HashMap::new(),
            state: RwLock::new(StoreState {
                records: BTreeMap::new(),
                locks: LockManager::new(),
                hub,
                commits: 0,
            }),
        }
    }

    /// Create a store, declare every catalog signal and write its default.
    ///
    /// Defaults go through the regular set path as one batch, so a catalog
    /// whose default does not match its declared type is rejected.
    pub fn with_catalog(config: StoreConfig, catalog: &[CatalogEntry]) -> ShadowResult<Self> {
        let mut store = Self::new(config);

        for entry in catalog {
            if store
                .declared
                .insert(entry.path.clone(), entry.config())
                .is_some()
            {
                return Err(ShadowError::invalid_request(format!(
                    "{} declared twice in catalog",
                    entry.path
                )));
            }
        }

        let defaults = catalog
            .iter()
            .map(|e| (e.path.clone(), SignalValue::new(e.default.clone())))
            .collect();
        if let Some(err) = store.set(defaults, None).iter().find_map(SetResult::error) {
            return Err(err);
        }

        info!("Loaded {} catalog signal(s)", catalog.len());
        Ok(store)
    }

    /// Read the current record of each path.
    ///
    /// Unknown paths map to `None`. An empty request returns every record.
    pub fn get(&self, paths: &BTreeSet<SignalPath>) -> BTreeMap<SignalPath, Option<SignalRecord>> {
        let state = self.read();
        let now = Utc::now();

        if paths.is_empty() {
            return state
                .records
                .keys()
                .map(|p| (p.clone(), state.record(p, now)))
                .collect();
        }

        paths
            .iter()
            .map(|p| (p.clone(), state.record(p, now)))
            .collect()
    }

    /// Read a single path.
    pub fn get_one(&self, path: &SignalPath) -> Option<SignalRecord> {
        self.read().record(path, Utc::now())
    }

    /// Paths that have a record, in order.
    pub fn paths(&self) -> Vec<SignalPath> {
        self.read().records.keys().cloned().collect()
    }

    /// Write a batch of values, all or nothing.
    ///
    /// Every entry is validated against the lock table and the path's type
    /// before anything is applied. If any entry fails, no entry is applied
    /// and the valid ones report [`SetStatus::Aborted`]. On success every
    /// path's version grows by one per entry and the batch is queued to
    /// subscribers, in request order, before this returns.
    pub fn set(
        &self,
        entries: Vec<(SignalPath, SignalValue)>,
        token: Option<&TokenId>,
    ) -> Vec<SetResult> {
        if entries.is_empty() {
            return Vec::new();
        }

        let mut guard = self.write();
        let state = &mut *guard;
        let now = Utc::now();

        let token_valid = match token {
            Some(id) => state.locks.validate(id, now).is_ok(),
            None => true,
        };

        let mut pending: HashMap<&SignalPath, ValueType> = HashMap::new();
        let mut statuses = Vec::with_capacity(entries.len());

        for (path, value) in &entries {
            let actual = value.value_type();
            let expected = self
                .declared
                .get(path)
                .map(|c| c.data_type)
                .or_else(|| pending.get(path).copied())
                .or_else(|| state.records.get(path).map(|s| s.value.value_type()));

            let status = if !token_valid {
                Some(SetStatus::InvalidToken)
            } else if state
                .locks
                .holder(path, now)
                .map_or(false, |holder| Some(&holder) != token)
            {
                Some(SetStatus::LockConflict)
            } else {
                match expected {
                    Some(expected) if expected != actual => {
                        Some(SetStatus::TypeMismatch { expected, actual })
                    }
                    _ => None,
                }
            };

            if status.is_none() {
                pending.insert(path, actual);
            }
            statuses.push(status);
        }
        drop(pending);

        if statuses.iter().any(Option::is_some) {
            debug!("Rejected set batch of {} entries", entries.len());
            return entries
                .into_iter()
                .zip(statuses)
                .map(|((path, _), status)| SetResult {
                    path,
                    status: status.unwrap_or(SetStatus::Aborted),
                })
                .collect();
        }

        let mut updates = Vec::with_capacity(entries.len());
        let mut results = Vec::with_capacity(entries.len());

        for (path, value) in entries {
            let unit = self.declared.get(&path).and_then(|c| c.unit.as_deref());
            let value = value.or_unit(unit);

            let version = match state.records.get_mut(&path) {
                Some(slot) => {
                    slot.version += 1;
                    slot.value = value.clone();
                    slot.last_updated = now;
                    slot.version
                }
                None => {
                    state.records.insert(
                        path.clone(),
                        Slot {
                            value: value.clone(),
                            version: 1,
                            last_updated: now,
                        },
                    );
                    1
                }
            };

            updates.push(SignalUpdate::committed(path.clone(), value, version));
            results.push(SetResult {
                path,
                status: SetStatus::Committed { version },
            });
        }

        state.commits += 1;
        state.hub.publish(&updates);

        results
    }

    /// Lock every path in `paths` for `ttl` (or the configured default).
    pub fn lock(
        &self,
        paths: BTreeSet<SignalPath>,
        ttl: Option<Duration>,
    ) -> ShadowResult<LockToken> {
        let ttl = self.config.lock_ttl(ttl);
        self.write().locks.lock(paths, ttl, Utc::now())
    }

    /// Release every path held by `token`.
    pub fn unlock(&self, token: &TokenId) -> ShadowResult<()> {
        self.write().locks.unlock(token, Utc::now()).map(|_| ())
    }

    /// Open a subscription on `paths` (empty = every path).
    ///
    /// The current value of every requested path, or a not-found marker, is
    /// queued before any live update. Registration happens under the commit
    /// lock, so the baseline and the live stream neither overlap nor leave
    /// a gap.
    pub fn subscribe(&self, paths: BTreeSet<SignalPath>) -> Subscription {
        let mut state = self.write();
        let now = Utc::now();

        let baseline: Vec<SignalUpdate> = if paths.is_empty() {
            state
                .records
                .keys()
                .map(|p| SignalUpdate::baseline(p.clone(), state.record(p, now).as_ref()))
                .collect()
        } else {
            paths
                .iter()
                .map(|p| SignalUpdate::baseline(p.clone(), state.record(p, now).as_ref()))
                .collect()
        };

        state.hub.register(paths, baseline)
    }

    /// Close a subscription. Returns false if it was not active.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.write().hub.close(id, CloseReason::Unsubscribed)
    }

    pub fn stats(&self) -> StoreStats {
        let state = self.read();
        StoreStats {
            signals: state.records.len(),
            declared: self.declared.len(),
            active_locks: state.locks.active_count(Utc::now()),
            subscriptions: state.hub.len(),
            commits: state.commits,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::default_catalog;
    use crate::hub::SubscriptionStatus;
    use crate::model::Value;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn path(p: &str) -> SignalPath {
        SignalPath::parse(p).unwrap()
    }

    fn paths(list: &[&str]) -> BTreeSet<SignalPath> {
        list.iter().map(|p| path(p)).collect()
    }

    fn write(p: &str, v: impl Into<Value>) -> (SignalPath, SignalValue) {
        (path(p), SignalValue::new(v))
    }

    fn catalog_store() -> SignalStore {
        SignalStore::with_catalog(StoreConfig::default(), &default_catalog()).unwrap()
    }

    fn version_of(store: &SignalStore, p: &str) -> Option<u64> {
        store.get_one(&path(p)).map(|r| r.version)
    }

    #[test]
    fn test_unknown_path_is_not_found() {
        let store = SignalStore::new(StoreConfig::default());
        let result = store.get(&paths(&["Vehicle.Speed", "Vehicle.Unknown"]));

        assert_eq!(result.len(), 2);
        assert!(result.values().all(Option::is_none));
    }

    #[test]
    fn test_set_then_get_increments_version() {
        let store = SignalStore::new(StoreConfig::default());

        let results = store.set(vec![write("Vehicle.Speed", 10.0f32)], None);
        assert_eq!(results[0].status, SetStatus::Committed { version: 1 });

        let results = store.set(vec![write("Vehicle.Speed", 20.0f32)], None);
        assert_eq!(results[0].status, SetStatus::Committed { version: 2 });

        let record = store.get_one(&path("Vehicle.Speed")).unwrap();
        assert_eq!(record.version, 2);
        assert_eq!(record.value.value(), &Value::Float(20.0));
        assert!(!record.locked);
    }

    #[test]
    fn test_catalog_loads_as_version_one() {
        let store = catalog_store();

        assert_eq!(store.paths().len(), 10);
        assert_eq!(version_of(&store, "Vehicle.Speed"), Some(1));

        let voltage = store.get_one(&path("Vehicle.Battery.Voltage")).unwrap();
        assert_eq!(voltage.value.value(), &Value::Float(12.0));
        assert_eq!(voltage.value.unit(), Some("V"));
    }

    #[test]
    fn test_catalog_rejects_bad_default() {
        let mut catalog = default_catalog();
        catalog[0].default = Value::Bool(true);

        let err = SignalStore::with_catalog(StoreConfig::default(), &catalog).unwrap_err();
        assert!(matches!(err, ShadowError::TypeMismatch { .. }));
    }

    #[test]
    fn test_catalog_rejects_duplicate_declaration() {
        let mut catalog = default_catalog();
        catalog.push(catalog[0].clone());

        let err = SignalStore::with_catalog(StoreConfig::default(), &catalog).unwrap_err();
        assert!(matches!(err, ShadowError::InvalidRequest { .. }));
    }

    #[test]
    fn test_declared_unit_is_inherited() {
        let store = catalog_store();
        store.set(vec![write("Vehicle.Speed", 42.0f32)], None);

        let record = store.get_one(&path("Vehicle.Speed")).unwrap();
        assert_eq!(record.value.unit(), Some("km/h"));
    }

    #[test]
    fn test_type_mismatch_against_declaration() {
        let store = catalog_store();

        let results = store.set(vec![write("Vehicle.Engine.RPM", 2500.0f32)], None);
        assert_eq!(
            results[0].status,
            SetStatus::TypeMismatch {
                expected: ValueType::Uint32,
                actual: ValueType::Float,
            }
        );
        assert_eq!(version_of(&store, "Vehicle.Engine.RPM"), Some(1));
    }

    #[test]
    fn test_first_write_establishes_type() {
        let store = SignalStore::new(StoreConfig::default());
        store.set(vec![write("Vehicle.Cabin.Fan", 3u32)], None);

        let results = store.set(vec![write("Vehicle.Cabin.Fan", "high")], None);
        assert!(matches!(results[0].status, SetStatus::TypeMismatch { .. }));
    }

    #[test]
    fn test_type_established_within_batch() {
        let store = SignalStore::new(StoreConfig::default());
        let results = store.set(
            vec![write("Vehicle.New", true), write("Vehicle.New", 1u32)],
            None,
        );

        assert_eq!(results[0].status, SetStatus::Aborted);
        assert!(matches!(results[1].status, SetStatus::TypeMismatch { .. }));
        assert_eq!(version_of(&store, "Vehicle.New"), None);
    }

    #[test]
    fn test_duplicate_paths_apply_in_order() {
        let store = SignalStore::new(StoreConfig::default());
        let results = store.set(
            vec![write("Vehicle.Speed", 1.0f32), write("Vehicle.Speed", 2.0f32)],
            None,
        );

        assert_eq!(results[0].status, SetStatus::Committed { version: 1 });
        assert_eq!(results[1].status, SetStatus::Committed { version: 2 });
        let record = store.get_one(&path("Vehicle.Speed")).unwrap();
        assert_eq!(record.value.value(), &Value::Float(2.0));
    }

    #[test]
    fn test_lock_blocks_other_writers() {
        let store = catalog_store();
        let token = store.lock(paths(&["Vehicle.Speed"]), None).unwrap();

        let results = store.set(vec![write("Vehicle.Speed", 1.0f32)], None);
        assert_eq!(results[0].status, SetStatus::LockConflict);

        let other = store.lock(paths(&["Vehicle.Position.X"]), None).unwrap();
        let results = store.set(vec![write("Vehicle.Speed", 1.0f32)], Some(&other.id()));
        assert_eq!(results[0].status, SetStatus::LockConflict);

        let results = store.set(vec![write("Vehicle.Speed", 1.0f32)], Some(&token.id()));
        assert_eq!(results[0].status, SetStatus::Committed { version: 2 });

        assert!(store.get_one(&path("Vehicle.Speed")).unwrap().locked);
    }

    #[test]
    fn test_mixed_batch_is_all_or_nothing() {
        let store = catalog_store();
        let _held = store.lock(paths(&["Vehicle.Position.X"]), None).unwrap();

        let results = store.set(
            vec![
                write("Vehicle.Position.X", 5.0f32),
                write("Vehicle.Position.Y", 6.0f32),
            ],
            None,
        );

        assert_eq!(results[0].status, SetStatus::LockConflict);
        assert_eq!(results[1].status, SetStatus::Aborted);

        let x = store.get_one(&path("Vehicle.Position.X")).unwrap();
        let y = store.get_one(&path("Vehicle.Position.Y")).unwrap();
        assert_eq!((x.version, y.version), (1, 1));
        assert_eq!(x.value.value(), &Value::Float(0.0));
        assert_eq!(y.value.value(), &Value::Float(0.0));
    }

    #[test]
    fn test_invalid_token_rejects_batch() {
        let store = catalog_store();
        let token = store.lock(paths(&["Vehicle.Speed"]), None).unwrap();
        store.unlock(&token.id()).unwrap();

        let results = store.set(vec![write("Vehicle.Position.Y", 6.0f32)], Some(&token.id()));
        assert_eq!(results[0].status, SetStatus::InvalidToken);
        assert_eq!(version_of(&store, "Vehicle.Position.Y"), Some(1));
    }

    #[test]
    fn test_token_allows_unlocked_paths_in_batch() {
        let store = catalog_store();
        let token = store.lock(paths(&["Vehicle.Speed"]), None).unwrap();

        let results = store.set(
            vec![
                write("Vehicle.Speed", 30.0f32),
                write("Vehicle.Engine.RPM", 1500u32),
            ],
            Some(&token.id()),
        );
        assert!(results.iter().all(SetResult::is_committed));
    }

    #[test]
    fn test_lock_conflict_is_whole_request() {
        let store = catalog_store();
        store.lock(paths(&["Vehicle.Speed"]), None).unwrap();

        let err = store
            .lock(paths(&["Vehicle.Speed", "Vehicle.Engine.RPM"]), None)
            .unwrap_err();
        assert!(matches!(err, ShadowError::LockConflict { .. }));

        // RPM stayed free.
        let results = store.set(vec![write("Vehicle.Engine.RPM", 900u32)], None);
        assert!(results[0].is_committed());
    }

    #[test]
    fn test_unlock_unknown_or_expired_token() {
        let store = catalog_store();
        let before = store.get(&BTreeSet::new());

        let token = store
            .lock(paths(&["Vehicle.Speed"]), Some(Duration::from_millis(20)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(40));

        assert_eq!(store.unlock(&token.id()), Err(ShadowError::InvalidToken));
        assert_eq!(store.unlock(&token.id()), Err(ShadowError::InvalidToken));
        assert_eq!(store.get(&BTreeSet::new()), before);
    }

    #[test]
    fn test_expired_lock_no_longer_blocks() {
        let store = catalog_store();
        let token = store
            .lock(paths(&["Vehicle.Speed"]), Some(Duration::from_millis(20)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(40));

        let results = store.set(vec![write("Vehicle.Speed", 5.0f32)], None);
        assert!(results[0].is_committed());

        // The stale token is now invalid for writes too.
        let results = store.set(vec![write("Vehicle.Speed", 6.0f32)], Some(&token.id()));
        assert_eq!(results[0].status, SetStatus::InvalidToken);
    }

    #[test]
    fn test_lock_ttl_is_clamped() {
        let config = StoreConfig {
            max_lock_ttl_ms: 1_000,
            ..StoreConfig::default()
        };
        let store = SignalStore::new(config);

        let before = Utc::now();
        let token = store
            .lock(paths(&["Vehicle.Speed"]), Some(Duration::from_secs(3600)))
            .unwrap();
        assert!(token.expires_at() <= before + chrono::Duration::seconds(2));
    }

    #[test]
    fn test_door_scenario() {
        let store = catalog_store();
        let door = "Vehicle.Doors.FrontLeft";

        let token = store
            .lock(paths(&[door]), Some(Duration::from_secs(30)))
            .unwrap();

        let r = store.set(vec![write(door, true)], Some(&token.id()));
        assert!(r[0].is_committed());

        let r = store.set(vec![write(door, false)], None);
        assert_eq!(r[0].status, SetStatus::LockConflict);

        store.unlock(&token.id()).unwrap();

        let r = store.set(vec![write(door, false)], None);
        assert!(r[0].is_committed());

        let record = store.get_one(&path(door)).unwrap();
        assert_eq!(record.value.value(), &Value::Bool(false));
        assert_eq!(record.version, 3);
    }

    #[test]
    fn test_subscription_baseline_then_live() {
        let store = catalog_store();
        let mut sub = store.subscribe(paths(&["Vehicle.Speed"]));

        let baseline = sub.try_recv().unwrap().unwrap();
        assert!(baseline.initial);
        assert_eq!(baseline.version, 1);

        store.set(vec![write("Vehicle.Engine.RPM", 800u32)], None);
        store.set(vec![write("Vehicle.Speed", 10.0f32)], None);
        store.set(vec![write("Vehicle.Speed", 20.0f32)], None);

        let a = sub.try_recv().unwrap().unwrap();
        let b = sub.try_recv().unwrap().unwrap();
        assert_eq!((a.version, b.version), (2, 3));
        assert!(!a.initial && !b.initial);
        assert_eq!(b.value.unwrap().value(), &Value::Float(20.0));
        assert!(sub.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_subscription_baseline_not_found() {
        let store = SignalStore::new(StoreConfig::default());
        let mut sub = store.subscribe(paths(&["Vehicle.Speed"]));

        let baseline = sub.try_recv().unwrap().unwrap();
        assert!(baseline.is_not_found());
        assert_eq!(baseline.version, 0);

        store.set(vec![write("Vehicle.Speed", 1.0f32)], None);
        assert_eq!(sub.try_recv().unwrap().unwrap().version, 1);
    }

    #[test]
    fn test_subscribe_all_paths() {
        let store = catalog_store();
        let mut sub = store.subscribe(BTreeSet::new());

        let mut baseline = 0;
        while let Some(update) = sub.try_recv().unwrap() {
            assert!(update.initial);
            baseline += 1;
        }
        assert_eq!(baseline, 10);

        store.set(vec![write("Vehicle.Anything", 1u64)], None);
        assert_eq!(
            sub.try_recv().unwrap().unwrap().path.as_str(),
            "Vehicle.Anything"
        );
    }

    #[test]
    fn test_rejected_batch_is_not_published() {
        let store = catalog_store();
        let mut sub = store.subscribe(paths(&["Vehicle.Position.Y"]));
        let _ = sub.try_recv().unwrap();

        store.lock(paths(&["Vehicle.Position.X"]), None).unwrap();
        store.set(
            vec![
                write("Vehicle.Position.X", 1.0f32),
                write("Vehicle.Position.Y", 1.0f32),
            ],
            None,
        );

        assert!(sub.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_unsubscribe() {
        let store = catalog_store();
        let mut sub = store.subscribe(paths(&["Vehicle.Speed"]));

        assert!(store.unsubscribe(sub.id()));
        assert!(!store.unsubscribe(sub.id()));
        assert_eq!(sub.status(), SubscriptionStatus::Closed);
        assert_eq!(sub.try_recv(), Err(ShadowError::SubscriptionClosed));

        // Writes after close are unaffected.
        let r = store.set(vec![write("Vehicle.Speed", 1.0f32)], None);
        assert!(r[0].is_committed());
    }

    #[test]
    fn test_slow_subscriber_does_not_block_writer() {
        let config = StoreConfig {
            subscriber_queue_capacity: 4,
            ..StoreConfig::default()
        };
        let store = SignalStore::with_catalog(config, &default_catalog()).unwrap();
        let mut slow = store.subscribe(paths(&["Vehicle.Speed"]));

        for i in 0..10 {
            let r = store.set(vec![write("Vehicle.Speed", i as f32)], None);
            assert!(r[0].is_committed());
        }

        assert_eq!(slow.status(), SubscriptionStatus::Closed);
        let mut drained = 0;
        let err = loop {
            match slow.try_recv() {
                Ok(Some(_)) => drained += 1,
                Ok(None) => panic!("closed subscription reported empty"),
                Err(e) => break e,
            }
        };
        // Baseline plus the live capacity.
        assert_eq!(drained, 5);
        assert_eq!(err, ShadowError::BackpressureExceeded);
        assert_eq!(store.stats().subscriptions, 0);
    }

    #[test]
    fn test_slow_subscriber_never_sees_half_a_batch() {
        let config = StoreConfig {
            subscriber_queue_capacity: 2,
            ..StoreConfig::default()
        };
        let store = SignalStore::with_catalog(config, &default_catalog()).unwrap();
        let mut sub = store.subscribe(paths(&[
            "Vehicle.Position.X",
            "Vehicle.Position.Y",
            "Vehicle.Position.Z",
        ]));

        let results = store.set(
            vec![
                write("Vehicle.Position.X", 1.0f32),
                write("Vehicle.Position.Y", 2.0f32),
                write("Vehicle.Position.Z", 3.0f32),
            ],
            None,
        );
        assert!(results.iter().all(SetResult::is_committed));

        let mut delivered = Vec::new();
        let end = loop {
            match sub.try_recv() {
                Ok(Some(update)) => delivered.push(update),
                Ok(None) => panic!("closed subscription reported empty"),
                Err(e) => break e,
            }
        };
        assert_eq!(delivered.len(), 3);
        assert!(delivered.iter().all(|u| u.initial));
        assert_eq!(end, ShadowError::BackpressureExceeded);
    }

    #[test]
    fn test_stats() {
        let store = catalog_store();
        let _sub = store.subscribe(BTreeSet::new());
        store.lock(paths(&["Vehicle.Speed"]), None).unwrap();
        store.set(vec![write("Vehicle.Engine.RPM", 1000u32)], None);

        let stats = store.stats();
        assert_eq!(stats.signals, 10);
        assert_eq!(stats.declared, 10);
        assert_eq!(stats.active_locks, 1);
        assert_eq!(stats.subscriptions, 1);
        assert_eq!(stats.commits, 2);
    }

    #[test]
    fn test_concurrent_writers_are_totally_ordered() {
        let store = Arc::new(catalog_store());
        let mut sub = store.subscribe(paths(&["Vehicle.Engine.RPM"]));
        let _ = sub.try_recv().unwrap();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..25u32 {
                        let r = store.set(vec![write("Vehicle.Engine.RPM", t * 100 + i)], None);
                        assert!(r[0].is_committed());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let versions: Vec<u64> = std::iter::from_fn(|| sub.try_recv().unwrap())
            .map(|u| u.version)
            .collect();
        assert_eq!(versions, (2..=101).collect::<Vec<_>>());
        assert_eq!(version_of(&store, "Vehicle.Engine.RPM"), Some(101));
    }

    #[test]
    fn test_composite_write_is_never_half_visible() {
        let store = Arc::new(catalog_store());

        let writer = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for i in 1..=200 {
                    let v = i as f32;
                    store.set(
                        vec![
                            write("Vehicle.Position.X", v),
                            write("Vehicle.Position.Y", v),
                            write("Vehicle.Position.Z", v),
                        ],
                        None,
                    );
                }
            })
        };

        let xyz = paths(&["Vehicle.Position.X", "Vehicle.Position.Y", "Vehicle.Position.Z"]);
        for _ in 0..200 {
            let snapshot = store.get(&xyz);
            let versions: BTreeSet<u64> = snapshot
                .values()
                .map(|r| r.as_ref().unwrap().version)
                .collect();
            assert_eq!(versions.len(), 1, "torn read: {:?}", snapshot);
        }

        writer.join().unwrap();
    }
}
