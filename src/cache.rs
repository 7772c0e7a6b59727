//! TTL balance cache
//!
//! Process-wide read cache for balance lookups, built on `cached::TimedCache`.
//! Entries expire after the configured TTL and are dropped eagerly by
//! [`BalanceCache::invalidate`], which the balance mutator calls after every
//! applied mutation. Funds checks never read from here; they run as guarded
//! updates in the store.

use cached::{Cached, TimedCache};
use std::sync::Mutex;

use crate::ledger::AccountId;
use crate::money::Amount;

/// Default TTL for cached balances in seconds
pub const DEFAULT_TTL_SECONDS: u64 = 5;

pub struct BalanceCache {
    entries: Mutex<TimedCache<AccountId, Amount>>,
    ttl_seconds: u64,
}

impl BalanceCache {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            entries: Mutex::new(TimedCache::with_lifespan(ttl_seconds)),
            ttl_seconds,
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn get(&self, account: AccountId) -> Option<Amount> {
        let mut entries = self.entries.lock().ok()?;
        entries.cache_get(&account).copied()
    }

    pub fn put(&self, account: AccountId, balance: Amount) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.cache_set(account, balance);
        }
    }

    /// Invalidation hook: drop the entry so the next read goes to the store
    pub fn invalidate(&self, account: AccountId) {
        match self.entries.lock() {
            Ok(mut entries) => {
                entries.cache_remove(&account);
                tracing::trace!(account_id = %account, "[cache] balance invalidated");
            }
            Err(_) => tracing::error!(account_id = %account, "[cache] lock poisoned"),
        }
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.cache_clear();
        }
    }
}

impl Default for BalanceCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL_SECONDS)
    }
}
