//! Capital ledger: the only writer of a strategy's capital buckets.
//!
//! `available_cash` is strictly conservative: money leaves it through a
//! compare-and-swap `lock`, and returns through `unlock` or the cooldown
//! drain. `locked_capital` holds capital committed to open orders and
//! positions; `cooldown_capital` holds resolved proceeds waiting out the
//! settlement window.

use chrono::{Duration, Utc};
use copytrade_core::db::Store;
use copytrade_core::types::{CooldownEntry, Strategy};
use copytrade_core::{Error, Result};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Snapshot of one strategy's capital buckets.
#[derive(Debug, Clone)]
pub struct LedgerState {
    pub available_cash: Decimal,
    pub locked_capital: Decimal,
    pub cooldown_capital: Decimal,
    pub initial_capital: Decimal,
    pub cooldown_hours: i64,
}

#[derive(Clone)]
pub struct CapitalLedger {
    store: Arc<dyn Store>,
}

impl CapitalLedger {
    /// Attempts for the optimistic lock: the initial try plus one retry.
    const LOCK_ATTEMPTS: u32 = 2;

    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    async fn load(&self, strategy_id: Uuid) -> Result<Strategy> {
        self.store
            .get_strategy(strategy_id)
            .await?
            .ok_or_else(|| Error::StrategyNotFound(strategy_id.to_string()))
    }

    /// Current capital state for a strategy.
    pub async fn state(&self, strategy_id: Uuid) -> Result<LedgerState> {
        let s = self.load(strategy_id).await?;
        Ok(LedgerState {
            available_cash: s.available_cash,
            locked_capital: s.locked_capital,
            cooldown_capital: s.cooldown_capital,
            initial_capital: s.initial_capital,
            cooldown_hours: s.cooldown_hours,
        })
    }

    /// Reserve `amount` from available cash. Returns available cash after
    /// the lock.
    ///
    /// The write is conditional on `available_cash` being unchanged since
    /// the read; one conflict triggers a single re-read and retry, a
    /// second fails with `ConcurrentModification`. Two overlapping runs
    /// can never both lock the same dollar.
    pub async fn lock(&self, strategy_id: Uuid, amount: Decimal) -> Result<Decimal> {
        if amount <= Decimal::ZERO {
            return Err(Error::Order {
                message: format!("lock amount must be positive, got {}", amount),
            });
        }

        for attempt in 0..Self::LOCK_ATTEMPTS {
            let s = self.load(strategy_id).await?;
            if s.available_cash < amount {
                return Err(Error::InsufficientFunds {
                    requested: amount,
                    available: s.available_cash,
                });
            }

            let new_available = s.available_cash - amount;
            let new_locked = s.locked_capital + amount;
            if self
                .store
                .cas_capital(strategy_id, s.available_cash, new_available, new_locked)
                .await?
            {
                debug!(
                    strategy_id = %strategy_id,
                    amount = %amount,
                    available_after = %new_available,
                    "Locked capital"
                );
                return Ok(new_available);
            }

            warn!(
                strategy_id = %strategy_id,
                attempt = attempt + 1,
                "Capital CAS conflict, retrying"
            );
        }

        Err(Error::ConcurrentModification(strategy_id.to_string()))
    }

    /// Return locked capital to available cash.
    ///
    /// Caps at the currently locked amount: the move is a transfer
    /// between buckets, so a duplicate or oversized unlock cannot mint
    /// cash.
    pub async fn unlock(&self, strategy_id: Uuid, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Ok(());
        }

        let s = self.load(strategy_id).await?;
        let unlocked = amount.min(s.locked_capital);
        let new_locked = s.locked_capital - unlocked;
        let new_available = s.available_cash + unlocked;

        self.store
            .write_capital(strategy_id, new_available, new_locked, s.cooldown_capital)
            .await?;

        debug!(
            strategy_id = %strategy_id,
            requested = %amount,
            unlocked = %unlocked,
            "Unlocked capital"
        );
        Ok(())
    }

    /// Settle a resolved or exited position.
    ///
    /// `invested` leaves the locked bucket for good; `exit_value` (zero
    /// for a loss) enters cooldown and, when positive, is queued for
    /// release after the strategy's cooldown window.
    pub async fn release(
        &self,
        strategy_id: Uuid,
        invested: Decimal,
        exit_value: Decimal,
        order_id: Option<Uuid>,
    ) -> Result<()> {
        let s = self.load(strategy_id).await?;
        let removed = invested.min(s.locked_capital);
        let new_locked = s.locked_capital - removed;
        let new_cooldown = s.cooldown_capital + exit_value;

        self.store
            .write_capital(strategy_id, s.available_cash, new_locked, new_cooldown)
            .await?;

        if exit_value > Decimal::ZERO {
            let available_at = Utc::now() + Duration::hours(s.cooldown_hours);
            let entry = CooldownEntry::new(strategy_id, exit_value, order_id, available_at);
            self.store.insert_cooldown(&entry).await?;
        }

        info!(
            strategy_id = %strategy_id,
            invested = %invested,
            exit_value = %exit_value,
            order_id = ?order_id,
            "Released position capital"
        );
        Ok(())
    }

    /// Move matured cooldown entries into available cash. Returns the
    /// amount released.
    ///
    /// Entries are marked released before the capital moves; a marked
    /// entry is never counted again, so concurrent or repeated drains
    /// release each entry at most once.
    pub async fn drain_cooldown(&self, strategy_id: Uuid) -> Result<Decimal> {
        let now = Utc::now();
        let due = self.store.due_cooldowns(strategy_id, now).await?;
        if due.is_empty() {
            return Ok(Decimal::ZERO);
        }

        let mut released = Decimal::ZERO;
        for entry in &due {
            if self.store.mark_cooldown_released(entry.id, now).await? {
                released += entry.amount;
            }
        }

        if released > Decimal::ZERO {
            let s = self.load(strategy_id).await?;
            let new_cooldown = (s.cooldown_capital - released).max(Decimal::ZERO);
            let new_available = s.available_cash + released;
            self.store
                .write_capital(strategy_id, new_available, s.locked_capital, new_cooldown)
                .await?;

            info!(
                strategy_id = %strategy_id,
                released = %released,
                entries = due.len(),
                "Drained cooldown capital"
            );
        }

        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use copytrade_core::db::MemoryStore;

    async fn setup(capital: Decimal) -> (CapitalLedger, Arc<MemoryStore>, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let strategy = Strategy::new(
            Uuid::new_v4(),
            "0xsource".to_string(),
            "test".to_string(),
            capital,
        );
        let id = strategy.id;
        store.insert_strategy(&strategy).await.unwrap();
        (CapitalLedger::new(store.clone()), store, id)
    }

    #[tokio::test]
    async fn test_lock_moves_available_to_locked() {
        let (ledger, store, id) = setup(Decimal::new(100, 0)).await;
        let after = ledger.lock(id, Decimal::new(40, 0)).await.unwrap();
        assert_eq!(after, Decimal::new(60, 0));

        let s = store.get_strategy(id).await.unwrap().unwrap();
        assert_eq!(s.available_cash, Decimal::new(60, 0));
        assert_eq!(s.locked_capital, Decimal::new(40, 0));
    }

    #[tokio::test]
    async fn test_lock_insufficient_funds() {
        let (ledger, _, id) = setup(Decimal::new(30, 0)).await;
        let err = ledger.lock(id, Decimal::new(40, 0)).await.unwrap_err();
        assert!(matches!(err, Error::InsufficientFunds { .. }));
    }

    #[tokio::test]
    async fn test_lock_rejects_non_positive_amount() {
        let (ledger, _, id) = setup(Decimal::new(30, 0)).await;
        assert!(ledger.lock(id, Decimal::ZERO).await.is_err());
    }

    #[tokio::test]
    async fn test_lock_unknown_strategy() {
        let (ledger, _, _) = setup(Decimal::new(30, 0)).await;
        let err = ledger
            .lock(Uuid::new_v4(), Decimal::new(10, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StrategyNotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_locks_one_winner() {
        let (ledger, _, id) = setup(Decimal::new(50, 0)).await;
        let amount = Decimal::new(50, 0);

        let a = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.lock(id, amount).await })
        };
        let b = {
            let ledger = ledger.clone();
            tokio::spawn(async move { ledger.lock(id, amount).await })
        };

        let results = [a.await.unwrap(), b.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1, "exactly one lock may win: {:?}", results);
    }

    #[tokio::test]
    async fn test_lock_unlock_round_trip() {
        let (ledger, store, id) = setup(Decimal::new(100, 0)).await;
        ledger.lock(id, Decimal::new(50, 0)).await.unwrap();
        ledger.unlock(id, Decimal::new(50, 0)).await.unwrap();

        let s = store.get_strategy(id).await.unwrap().unwrap();
        assert_eq!(s.available_cash, Decimal::new(100, 0));
        assert_eq!(s.locked_capital, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_duplicate_unlock_cannot_mint_cash() {
        let (ledger, store, id) = setup(Decimal::new(100, 0)).await;
        ledger.lock(id, Decimal::new(50, 0)).await.unwrap();
        ledger.unlock(id, Decimal::new(50, 0)).await.unwrap();
        ledger.unlock(id, Decimal::new(50, 0)).await.unwrap();

        let s = store.get_strategy(id).await.unwrap().unwrap();
        assert_eq!(s.available_cash, Decimal::new(100, 0));
        assert_eq!(s.equity(), Decimal::new(100, 0));
    }

    #[tokio::test]
    async fn test_release_loss_removes_locked_only() {
        let (ledger, store, id) = setup(Decimal::new(100, 0)).await;
        ledger.lock(id, Decimal::new(40, 0)).await.unwrap();
        ledger
            .release(id, Decimal::new(40, 0), Decimal::ZERO, None)
            .await
            .unwrap();

        let s = store.get_strategy(id).await.unwrap().unwrap();
        assert_eq!(s.locked_capital, Decimal::ZERO);
        assert_eq!(s.cooldown_capital, Decimal::ZERO);
        assert_eq!(s.equity(), Decimal::new(60, 0));
        // No cooldown entry for a total loss.
        assert_eq!(
            store.unreleased_cooldown_total(id).await.unwrap(),
            Decimal::ZERO
        );
    }

    #[tokio::test]
    async fn test_release_win_enters_cooldown() {
        let (ledger, store, id) = setup(Decimal::new(100, 0)).await;
        ledger.lock(id, Decimal::new(40, 0)).await.unwrap();
        ledger
            .release(id, Decimal::new(40, 0), Decimal::new(80, 0), None)
            .await
            .unwrap();

        let s = store.get_strategy(id).await.unwrap().unwrap();
        assert_eq!(s.locked_capital, Decimal::ZERO);
        assert_eq!(s.cooldown_capital, Decimal::new(80, 0));
        assert_eq!(s.equity(), Decimal::new(140, 0));
        assert_eq!(
            store.unreleased_cooldown_total(id).await.unwrap(),
            Decimal::new(80, 0)
        );
    }

    #[tokio::test]
    async fn test_drain_moves_matured_entries() {
        let (ledger, store, id) = setup(Decimal::new(100, 0)).await;
        ledger.lock(id, Decimal::new(40, 0)).await.unwrap();
        ledger
            .release(id, Decimal::new(40, 0), Decimal::new(80, 0), None)
            .await
            .unwrap();

        // Backdate the entry so it is due now.
        let due = store
            .due_cooldowns(id, Utc::now() + Duration::hours(48))
            .await
            .unwrap();
        assert_eq!(due.len(), 1);
        let mut entry = due[0].clone();
        entry.available_at = Utc::now() - Duration::hours(1);
        store.insert_cooldown(&entry).await.unwrap();

        let released = ledger.drain_cooldown(id).await.unwrap();
        assert_eq!(released, Decimal::new(80, 0));

        let s = store.get_strategy(id).await.unwrap().unwrap();
        assert_eq!(s.available_cash, Decimal::new(140, 0));
        assert_eq!(s.cooldown_capital, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_drain_is_idempotent() {
        let (ledger, store, id) = setup(Decimal::new(100, 0)).await;
        ledger.lock(id, Decimal::new(40, 0)).await.unwrap();
        ledger
            .release(id, Decimal::new(40, 0), Decimal::new(80, 0), None)
            .await
            .unwrap();
        let due = store
            .due_cooldowns(id, Utc::now() + Duration::hours(48))
            .await
            .unwrap();
        let mut entry = due[0].clone();
        entry.available_at = Utc::now() - Duration::hours(1);
        store.insert_cooldown(&entry).await.unwrap();

        let first = ledger.drain_cooldown(id).await.unwrap();
        let second = ledger.drain_cooldown(id).await.unwrap();
        assert_eq!(first, Decimal::new(80, 0));
        assert_eq!(second, Decimal::ZERO);

        let s = store.get_strategy(id).await.unwrap().unwrap();
        assert_eq!(s.available_cash, Decimal::new(140, 0));
    }
}
