//! Durable faucet state: the claim ledger and per-origin rate counters.
//!
//! Both trees are shared by concurrent request handlers, so every mutation
//! is a single atomic sled operation. `mark_claimed` is a set-if-absent
//! compare-and-swap; `check_and_increment` is an atomic read-modify-write.
//! Read-then-write sequences against either tree are a correctness bug.

use crate::error::{FaucetError, FaucetResult};
use chrono::Utc;
use lume_common::Address;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use tracing::{debug, info};

/// Permanent record of a disbursed claim.
///
/// Written exactly once per address and never updated or deleted; its
/// presence alone is what denies every later request from that address.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimRecord {
    /// Unix timestamp of the grant
    pub claimed_at: i64,
    /// Amount granted (in wei)
    pub amount: String,
    /// Broadcast transaction hash (custodial strategy only)
    pub tx_hash: Option<String>,
}

impl ClaimRecord {
    pub fn new(amount: String, tx_hash: Option<String>) -> Self {
        Self {
            claimed_at: Utc::now().timestamp(),
            amount,
            tx_hash,
        }
    }
}

/// Request counter for one origin's active window.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct OriginCounter {
    count: u32,
    window_start: i64,
}

/// Faucet database
pub struct FaucetDatabase {
    _db: Db,
    /// Tree mapping canonical address -> ClaimRecord
    claims: Tree,
    /// Tree mapping origin key -> OriginCounter
    origins: Tree,
}

impl FaucetDatabase {
    /// Create or open the faucet database
    pub fn new(path: &str) -> FaucetResult<Self> {
        info!("Opening faucet database at: {}", path);

        let db = sled::open(path)?;
        let claims = db.open_tree("claims")?;
        let origins = db.open_tree("origins")?;

        Ok(Self {
            _db: db,
            claims,
            origins,
        })
    }

    /// Whether the address already holds its grant.
    pub fn has_claimed(&self, address: &Address) -> FaucetResult<bool> {
        Ok(self.claims.contains_key(address.to_string().as_bytes())?)
    }

    /// Record the grant for `address`, failing with `AlreadyClaimed` if a
    /// record exists.
    ///
    /// The write is a compare-and-swap against an absent key, so when two
    /// requests for the same address race, exactly one observes success.
    pub fn mark_claimed(&self, address: &Address, record: &ClaimRecord) -> FaucetResult<()> {
        let value =
            bincode::serialize(record).map_err(|e| FaucetError::Internal(e.to_string()))?;

        match self.claims.compare_and_swap(
            address.to_string().as_bytes(),
            None as Option<&[u8]>,
            Some(value),
        )? {
            Ok(()) => {
                debug!("Recorded claim for address: {}", address);
                Ok(())
            }
            Err(_) => Err(FaucetError::AlreadyClaimed),
        }
    }

    /// Fetch the stored claim record for an address, if any.
    pub fn get_claim(&self, address: &Address) -> FaucetResult<Option<ClaimRecord>> {
        match self.claims.get(address.to_string().as_bytes())? {
            Some(bytes) => {
                let record = bincode::deserialize(&bytes)
                    .map_err(|e| FaucetError::Internal(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Total number of claims ever granted.
    pub fn claim_count(&self) -> usize {
        self.claims.len()
    }

    /// Charge one request against `origin`'s window and report
    /// `(count, allowed)`.
    ///
    /// A counter whose window elapsed restarts at 1. An origin already at
    /// the ceiling is denied without incrementing, so a burst of rejected
    /// requests cannot push the window further out.
    pub fn check_and_increment(
        &self,
        origin: &str,
        ceiling: u32,
        window_secs: u64,
    ) -> FaucetResult<(u32, bool)> {
        self.check_and_increment_at(origin, ceiling, window_secs, Utc::now().timestamp())
    }

    fn check_and_increment_at(
        &self,
        origin: &str,
        ceiling: u32,
        window_secs: u64,
        now: i64,
    ) -> FaucetResult<(u32, bool)> {
        let window = window_secs as i64;
        let decode = |bytes: &[u8]| bincode::deserialize::<OriginCounter>(bytes).ok();

        // fetch_and_update retries the closure on contention; the new value
        // must be a pure function of the old one.
        let previous = self.origins.fetch_and_update(origin.as_bytes(), |old| {
            let next = match old.and_then(decode) {
                Some(counter) if now - counter.window_start < window => {
                    if counter.count >= ceiling {
                        counter
                    } else {
                        OriginCounter {
                            count: counter.count + 1,
                            window_start: counter.window_start,
                        }
                    }
                }
                _ => OriginCounter {
                    count: 1,
                    window_start: now,
                },
            };
            bincode::serialize(&next).ok()
        })?;

        let outcome = match previous.as_deref().and_then(decode) {
            Some(counter) if now - counter.window_start < window => {
                if counter.count >= ceiling {
                    (counter.count, false)
                } else {
                    (counter.count + 1, true)
                }
            }
            _ => (1, true),
        };

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_db() -> (FaucetDatabase, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db = FaucetDatabase::new(temp_dir.path().to_str().unwrap()).unwrap();
        (db, temp_dir)
    }

    fn addr(last: u8) -> Address {
        let mut bytes = [0xabu8; 20];
        bytes[19] = last;
        Address(bytes)
    }

    #[test]
    fn mark_claimed_is_set_if_absent() {
        let (db, _dir) = test_db();
        let address = addr(1);

        assert!(!db.has_claimed(&address).unwrap());

        let record = ClaimRecord::new("100".to_string(), None);
        db.mark_claimed(&address, &record).unwrap();
        assert!(db.has_claimed(&address).unwrap());

        let err = db.mark_claimed(&address, &record).unwrap_err();
        assert!(matches!(err, FaucetError::AlreadyClaimed));

        let stored = db.get_claim(&address).unwrap().unwrap();
        assert_eq!(stored.amount, "100");
        assert_eq!(db.claim_count(), 1);
    }

    #[test]
    fn concurrent_marks_yield_exactly_one_success() {
        let (db, _dir) = test_db();
        let db = Arc::new(db);
        let address = addr(2);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = db.clone();
                std::thread::spawn(move || {
                    let record = ClaimRecord::new("100".to_string(), None);
                    db.mark_claimed(&address, &record).is_ok()
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&ok| ok)
            .count();
        assert_eq!(successes, 1);
    }

    #[test]
    fn rate_counter_enforces_ceiling() {
        let (db, _dir) = test_db();

        for expected in 1..=5u32 {
            let (count, allowed) = db.check_and_increment("10.0.0.1", 5, 3600).unwrap();
            assert_eq!(count, expected);
            assert!(allowed);
        }

        // 6th and onward are denied and the count holds at the ceiling.
        let (count, allowed) = db.check_and_increment("10.0.0.1", 5, 3600).unwrap();
        assert_eq!(count, 5);
        assert!(!allowed);
        let (count, allowed) = db.check_and_increment("10.0.0.1", 5, 3600).unwrap();
        assert_eq!(count, 5);
        assert!(!allowed);

        // Other origins are unaffected.
        let (count, allowed) = db.check_and_increment("10.0.0.2", 5, 3600).unwrap();
        assert_eq!(count, 1);
        assert!(allowed);
    }

    #[test]
    fn rate_counter_resets_after_window() {
        let (db, _dir) = test_db();
        let start = 1_700_000_000i64;

        for _ in 0..3 {
            db.check_and_increment_at("10.0.0.9", 3, 60, start).unwrap();
        }
        let (_, allowed) = db.check_and_increment_at("10.0.0.9", 3, 60, start + 30).unwrap();
        assert!(!allowed);

        // Window elapsed: the counter restarts.
        let (count, allowed) = db.check_and_increment_at("10.0.0.9", 3, 60, start + 60).unwrap();
        assert_eq!(count, 1);
        assert!(allowed);
    }
}
