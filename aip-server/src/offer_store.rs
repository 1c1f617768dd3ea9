//! Time-bounded, single-redemption offer store.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use aip_core::{AipError, AipResult, Offer};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::Value;

/// Message used for both unknown and expired offers.
pub const OFFER_NOT_FOUND: &str = "Offer not found or expired";

/// Longest offer lifetime accepted from configuration, in days.
pub const MAX_OFFER_TTL_DAYS: i64 = 3650;

/// Reject offer lifetimes that are not positive or exceed [`MAX_OFFER_TTL_DAYS`].
pub fn check_ttl(ttl: Duration) -> AipResult<Duration> {
    if ttl <= Duration::zero() {
        return Err(AipError::InvalidConfig(format!(
            "offer TTL must be positive, got {}s",
            ttl.num_seconds()
        )));
    }
    if ttl > Duration::days(MAX_OFFER_TTL_DAYS) {
        return Err(AipError::InvalidConfig(format!(
            "offer TTL must not exceed {} days",
            MAX_OFFER_TTL_DAYS
        )));
    }
    Ok(ttl)
}

/// Time source for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Offer content produced by a handler, before the store assigns id and expiry.
#[derive(Debug, Clone)]
pub struct PendingOffer {
    pub intake_id: String,
    pub session_id: String,
    pub intake_data: Value,
    pub summary: String,
    pub details: Value,
    pub bind_endpoint: Option<String>,
    pub bind_requires: Option<Vec<String>>,
}

/// Offer as held by the store.
#[derive(Debug, Clone)]
pub struct StoredOffer {
    pub offer: Offer,
    pub intake_id: String,
    pub session_id: String,
    pub intake_data: Value,
}

impl StoredOffer {
    pub fn id(&self) -> &str {
        &self.offer.id
    }

    /// Offers without a bind endpoint cannot be redeemed.
    pub fn is_bindable(&self) -> bool {
        self.offer.bind_endpoint.is_some()
    }

    pub fn bind_requires(&self) -> &[String] {
        self.offer.bind_requires.as_deref().unwrap_or(&[])
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.offer.expires
    }
}

/// Keyed store of issued offers.
///
/// A single mutex guards the map, so `put` and `take` are linearizable per
/// key and a removed offer is never observable again.
pub struct OfferStore {
    offers: Mutex<HashMap<String, StoredOffer>>,
    clock: Arc<dyn Clock>,
}

impl OfferStore {
    /// Store backed by the wall clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            offers: Mutex::new(HashMap::new()),
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Mint an id, stamp expiry at `now + ttl` and store the offer.
    pub fn put(&self, pending: PendingOffer, ttl: Duration) -> AipResult<Offer> {
        self.put_with_id(uuid::Uuid::new_v4().to_string(), pending, ttl)
    }

    fn put_with_id(&self, id: String, pending: PendingOffer, ttl: Duration) -> AipResult<Offer> {
        let expires = self
            .clock
            .now()
            .checked_add_signed(ttl)
            .ok_or_else(|| AipError::Internal(format!("offer expiry overflows with TTL {}", ttl)))?;
        let offer = Offer {
            id: id.clone(),
            summary: pending.summary,
            details: pending.details,
            expires,
            bind_endpoint: pending.bind_endpoint,
            bind_requires: pending.bind_requires,
        };

        let mut offers = self.offers.lock();
        match offers.entry(id) {
            Entry::Occupied(entry) => {
                tracing::error!(offer_id = %entry.key(), "offer id collision");
                Err(AipError::IdCollision(entry.key().clone()))
            }
            Entry::Vacant(slot) => {
                slot.insert(StoredOffer {
                    offer: offer.clone(),
                    intake_id: pending.intake_id,
                    session_id: pending.session_id,
                    intake_data: pending.intake_data,
                });
                Ok(offer)
            }
        }
    }

    /// Atomically remove and return an offer.
    pub fn take(&self, id: &str) -> AipResult<StoredOffer> {
        self.take_if(id, |_| Ok(()))
    }

    /// Atomically remove and return an offer if `check` accepts it.
    ///
    /// Absent and expired offers yield `NOT_FOUND`. When `check` fails the
    /// offer stays in the store and the check's error is returned.
    pub fn take_if<F>(&self, id: &str, check: F) -> AipResult<StoredOffer>
    where
        F: FnOnce(&StoredOffer) -> AipResult<()>,
    {
        let now = self.clock.now();
        let mut offers = self.offers.lock();

        let stored = match offers.get(id) {
            Some(stored) => stored,
            None => return Err(AipError::NotFound(OFFER_NOT_FOUND.to_string())),
        };

        if stored.is_expired_at(now) {
            offers.remove(id);
            tracing::debug!(offer_id = %id, "evicted expired offer on access");
            return Err(AipError::NotFound(OFFER_NOT_FOUND.to_string()));
        }

        check(stored)?;

        offers
            .remove(id)
            .ok_or_else(|| AipError::NotFound(OFFER_NOT_FOUND.to_string()))
    }

    /// Drop every expired offer, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut offers = self.offers.lock();
        let before = offers.len();
        offers.retain(|_, stored| !stored.is_expired_at(now));
        before - offers.len()
    }

    /// Offers physically held, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.offers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for OfferStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending(bindable: bool) -> PendingOffer {
        PendingOffer {
            intake_id: "trial-setup".to_string(),
            session_id: "s1".to_string(),
            intake_data: json!({"team_size": "2-5"}),
            summary: "Team plan".to_string(),
            details: json!({"plan": "Team"}),
            bind_endpoint: bindable.then(|| "http://localhost/api/aip/bind".to_string()),
            bind_requires: bindable.then(|| vec!["email".to_string()]),
        }
    }

    fn store_with_clock() -> (OfferStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (OfferStore::with_clock(clock.clone()), clock)
    }

    #[test]
    fn put_stamps_expiry_from_clock() {
        let (store, clock) = store_with_clock();
        let offer = store.put(pending(true), Duration::days(7)).unwrap();
        assert_eq!(offer.expires, clock.now() + Duration::days(7));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn ttl_bounds() {
        assert!(check_ttl(Duration::minutes(5)).is_ok());
        let max = Duration::days(MAX_OFFER_TTL_DAYS);
        assert!(check_ttl(max).is_ok());
        for ttl in [Duration::zero(), Duration::seconds(-1), max + Duration::seconds(1)] {
            assert_eq!(check_ttl(ttl).unwrap_err().code(), "INVALID_CONFIG");
        }
    }

    #[test]
    fn overflowing_expiry_is_an_error() {
        let store = OfferStore::new();
        let err = store.put(pending(true), Duration::MAX).unwrap_err();
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert!(store.is_empty());
    }

    #[test]
    fn take_is_single_use() {
        let store = OfferStore::new();
        let offer = store.put(pending(true), Duration::minutes(5)).unwrap();

        let taken = store.take(&offer.id).unwrap();
        assert_eq!(taken.id(), offer.id);
        assert_eq!(taken.session_id, "s1");

        let err = store.take(&offer.id).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(store.is_empty());
    }

    #[test]
    fn expired_offer_is_not_found_even_if_present() {
        let (store, clock) = store_with_clock();
        let offer = store.put(pending(true), Duration::seconds(1)).unwrap();

        clock.advance(Duration::seconds(2));
        assert_eq!(store.len(), 1);
        let err = store.take(&offer.id).unwrap_err();
        assert_eq!(err.to_string(), OFFER_NOT_FOUND);
        assert!(store.is_empty());
    }

    #[test]
    fn offer_is_live_exactly_at_expiry() {
        let (store, clock) = store_with_clock();
        let offer = store.put(pending(true), Duration::seconds(10)).unwrap();
        clock.set(offer.expires);
        assert!(store.take(&offer.id).is_ok());
    }

    #[test]
    fn failed_check_keeps_offer() {
        let store = OfferStore::new();
        let offer = store.put(pending(true), Duration::minutes(5)).unwrap();

        let err = store
            .take_if(&offer.id, |_| Err(AipError::MissingFields(vec!["email".into()])))
            .unwrap_err();
        assert_eq!(err.code(), "MISSING_FIELDS");
        assert_eq!(store.len(), 1);

        assert!(store.take(&offer.id).is_ok());
    }

    #[test]
    fn colliding_id_is_rejected_not_overwritten() {
        let store = OfferStore::new();
        store
            .put_with_id("fixed".to_string(), pending(true), Duration::minutes(1))
            .unwrap();
        let err = store
            .put_with_id("fixed".to_string(), pending(false), Duration::minutes(1))
            .unwrap_err();
        assert_eq!(err.code(), "ID_COLLISION");

        let kept = store.take("fixed").unwrap();
        assert!(kept.is_bindable());
    }

    #[test]
    fn purge_removes_only_expired() {
        let (store, clock) = store_with_clock();
        store.put(pending(true), Duration::seconds(1)).unwrap();
        let live = store.put(pending(true), Duration::hours(1)).unwrap();

        clock.advance(Duration::minutes(1));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
        assert!(store.take(&live.id).is_ok());
    }

    #[test]
    fn concurrent_takes_yield_exactly_one_winner() {
        let store = Arc::new(OfferStore::new());
        let offer = store.put(pending(true), Duration::minutes(5)).unwrap();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let id = offer.id.clone();
                std::thread::spawn(move || store.take(&id).is_ok())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn ids_are_unique() {
        let store = OfferStore::new();
        let ids: std::collections::HashSet<String> = (0..200)
            .map(|_| store.put(pending(false), Duration::minutes(1)).unwrap().id)
            .collect();
        assert_eq!(ids.len(), 200);
    }
}
