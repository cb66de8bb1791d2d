//! PostgreSQL implementation of the durable store.

use crate::db::{Store, TraceRecord};
use crate::types::{CooldownEntry, CopyOrder, OrderOutcome, OrderSide, OrderStatus, Strategy};
use crate::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Durable store backed by PostgreSQL.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_strategy(r: &sqlx::postgres::PgRow) -> Strategy {
        Strategy {
            id: r.get("id"),
            user_id: r.get("user_id"),
            source_wallet: r.get("source_wallet"),
            name: r.get("name"),
            active: r.get("active"),
            paused: r.get("paused"),
            shadow_mode: r.get("shadow_mode"),
            circuit_breaker_active: r.get("circuit_breaker_active"),
            initial_capital: r.get("initial_capital"),
            available_cash: r.get("available_cash"),
            locked_capital: r.get("locked_capital"),
            cooldown_capital: r.get("cooldown_capital"),
            cooldown_hours: r.get("cooldown_hours"),
            max_position_size: r.get("max_position_size"),
            max_total_exposure: r.get("max_total_exposure"),
            daily_budget: r.get("daily_budget"),
            max_daily_loss: r.get("max_daily_loss"),
            circuit_breaker_pct: r.get("circuit_breaker_pct"),
            stop_loss_pct: r.get("stop_loss_pct"),
            take_profit_pct: r.get("take_profit_pct"),
            daily_spent: r.get("daily_spent"),
            daily_loss: r.get("daily_loss"),
            daily_reset_date: r.get("daily_reset_date"),
            peak_equity: r.get("peak_equity"),
            consecutive_losses: r.get("consecutive_losses"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }
    }

    fn row_to_order(r: &sqlx::postgres::PgRow) -> CopyOrder {
        CopyOrder {
            id: r.get("id"),
            source_trade_id: r.get("source_trade_id"),
            strategy_id: r.get("strategy_id"),
            market_id: r.get("market_id"),
            outcome: r.get("outcome"),
            token_id: r.get("token_id"),
            side: side_from_str(&r.get::<String, _>("side")),
            signal_price: r.get("signal_price"),
            signal_size_usd: r.get("signal_size_usd"),
            executed_price: r.get("executed_price"),
            executed_size_usd: r.get("executed_size_usd"),
            shares_bought: r.get("shares_bought"),
            shares_remaining: r.get("shares_remaining"),
            status: status_from_str(&r.get::<String, _>("status")),
            outcome_result: outcome_from_str(&r.get::<String, _>("outcome_result")),
            realized_pnl: r.get("realized_pnl"),
            risk_check_passed: r.get("risk_check_passed"),
            risk_check_reason: r.get("risk_check_reason"),
            venue_order_id: r.get("venue_order_id"),
            sync_misses: r.get("sync_misses"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }
    }

    fn row_to_cooldown(r: &sqlx::postgres::PgRow) -> CooldownEntry {
        CooldownEntry {
            id: r.get("id"),
            strategy_id: r.get("strategy_id"),
            amount: r.get("amount"),
            order_id: r.get("order_id"),
            available_at: r.get("available_at"),
            released_at: r.get("released_at"),
            created_at: r.get("created_at"),
        }
    }
}

const ORDER_COLUMNS: &str = "id, source_trade_id, strategy_id, market_id, outcome, token_id, \
     side, signal_price, signal_size_usd, executed_price, executed_size_usd, shares_bought, \
     shares_remaining, status, outcome_result, realized_pnl, risk_check_passed, \
     risk_check_reason, venue_order_id, sync_misses, created_at, updated_at";

fn status_to_str(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "pending",
        OrderStatus::Partial => "partial",
        OrderStatus::Filled => "filled",
        OrderStatus::Rejected => "rejected",
        OrderStatus::Cancelled => "cancelled",
        OrderStatus::Lost => "lost",
        OrderStatus::Failed => "failed",
    }
}

fn status_from_str(s: &str) -> OrderStatus {
    match s {
        "pending" => OrderStatus::Pending,
        "partial" => OrderStatus::Partial,
        "filled" => OrderStatus::Filled,
        "rejected" => OrderStatus::Rejected,
        "cancelled" => OrderStatus::Cancelled,
        "lost" => OrderStatus::Lost,
        _ => OrderStatus::Failed,
    }
}

fn outcome_to_str(outcome: OrderOutcome) -> &'static str {
    match outcome {
        OrderOutcome::Open => "open",
        OrderOutcome::Sold => "sold",
        OrderOutcome::Won => "won",
        OrderOutcome::Lost => "lost",
        OrderOutcome::Cancelled => "cancelled",
    }
}

fn outcome_from_str(s: &str) -> OrderOutcome {
    match s {
        "sold" => OrderOutcome::Sold,
        "won" => OrderOutcome::Won,
        "lost" => OrderOutcome::Lost,
        "cancelled" => OrderOutcome::Cancelled,
        _ => OrderOutcome::Open,
    }
}

fn side_to_str(side: OrderSide) -> &'static str {
    match side {
        OrderSide::Buy => "buy",
        OrderSide::Sell => "sell",
    }
}

fn side_from_str(s: &str) -> OrderSide {
    match s {
        "sell" => OrderSide::Sell,
        _ => OrderSide::Buy,
    }
}

#[async_trait::async_trait]
impl Store for PgStore {
    async fn insert_strategy(&self, strategy: &Strategy) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO strategies (
                id, user_id, source_wallet, name, active, paused, shadow_mode,
                circuit_breaker_active, initial_capital, available_cash, locked_capital,
                cooldown_capital, cooldown_hours, max_position_size, max_total_exposure,
                daily_budget, max_daily_loss, circuit_breaker_pct, stop_loss_pct,
                take_profit_pct, daily_spent, daily_loss, daily_reset_date, peak_equity,
                consecutive_losses, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27)
            "#,
        )
        .bind(strategy.id)
        .bind(strategy.user_id)
        .bind(&strategy.source_wallet)
        .bind(&strategy.name)
        .bind(strategy.active)
        .bind(strategy.paused)
        .bind(strategy.shadow_mode)
        .bind(strategy.circuit_breaker_active)
        .bind(strategy.initial_capital)
        .bind(strategy.available_cash)
        .bind(strategy.locked_capital)
        .bind(strategy.cooldown_capital)
        .bind(strategy.cooldown_hours)
        .bind(strategy.max_position_size)
        .bind(strategy.max_total_exposure)
        .bind(strategy.daily_budget)
        .bind(strategy.max_daily_loss)
        .bind(strategy.circuit_breaker_pct)
        .bind(strategy.stop_loss_pct)
        .bind(strategy.take_profit_pct)
        .bind(strategy.daily_spent)
        .bind(strategy.daily_loss)
        .bind(strategy.daily_reset_date)
        .bind(strategy.peak_equity)
        .bind(strategy.consecutive_losses)
        .bind(strategy.created_at)
        .bind(strategy.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_strategy(&self, id: Uuid) -> Result<Option<Strategy>> {
        let row = sqlx::query("SELECT * FROM strategies WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| Self::row_to_strategy(&r)))
    }

    async fn list_active_strategies(&self) -> Result<Vec<Strategy>> {
        let rows = sqlx::query("SELECT * FROM strategies WHERE active = TRUE ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(Self::row_to_strategy).collect())
    }

    async fn cas_capital(
        &self,
        strategy_id: Uuid,
        expected_available: Decimal,
        new_available: Decimal,
        new_locked: Decimal,
    ) -> Result<bool> {
        // The WHERE clause on available_cash is the optimistic-concurrency
        // guard: a concurrent lock that already moved the balance makes
        // this update match zero rows.
        let result = sqlx::query(
            r#"
            UPDATE strategies
            SET available_cash = $3, locked_capital = $4, updated_at = NOW()
            WHERE id = $1 AND available_cash = $2
            "#,
        )
        .bind(strategy_id)
        .bind(expected_available)
        .bind(new_available)
        .bind(new_locked)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn write_capital(
        &self,
        strategy_id: Uuid,
        available: Decimal,
        locked: Decimal,
        cooldown: Decimal,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE strategies
            SET available_cash = $2, locked_capital = $3, cooldown_capital = $4,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(strategy_id)
        .bind(available)
        .bind(locked)
        .bind(cooldown)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn write_risk_counters(&self, strategy: &Strategy) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE strategies
            SET daily_spent = $2, daily_loss = $3, daily_reset_date = $4,
                peak_equity = $5, consecutive_losses = $6, circuit_breaker_active = $7,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(strategy.id)
        .bind(strategy.daily_spent)
        .bind(strategy.daily_loss)
        .bind(strategy.daily_reset_date)
        .bind(strategy.peak_equity)
        .bind(strategy.consecutive_losses)
        .bind(strategy.circuit_breaker_active)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_order(&self, order: &CopyOrder) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, source_trade_id, strategy_id, market_id, outcome, token_id, side,
                signal_price, signal_size_usd, executed_price, executed_size_usd,
                shares_bought, shares_remaining, status, outcome_result, realized_pnl,
                risk_check_passed, risk_check_reason, venue_order_id, sync_misses,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22)
            "#,
        )
        .bind(order.id)
        .bind(&order.source_trade_id)
        .bind(order.strategy_id)
        .bind(&order.market_id)
        .bind(&order.outcome)
        .bind(&order.token_id)
        .bind(side_to_str(order.side))
        .bind(order.signal_price)
        .bind(order.signal_size_usd)
        .bind(order.executed_price)
        .bind(order.executed_size_usd)
        .bind(order.shares_bought)
        .bind(order.shares_remaining)
        .bind(status_to_str(order.status))
        .bind(outcome_to_str(order.outcome_result))
        .bind(order.realized_pnl)
        .bind(order.risk_check_passed)
        .bind(&order.risk_check_reason)
        .bind(&order.venue_order_id)
        .bind(order.sync_misses)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_order(&self, order: &CopyOrder) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE orders SET
                token_id = $2,
                executed_price = $3,
                executed_size_usd = $4,
                shares_bought = $5,
                shares_remaining = $6,
                status = $7,
                outcome_result = $8,
                realized_pnl = $9,
                venue_order_id = $10,
                sync_misses = $11,
                updated_at = $12
            WHERE id = $1
            "#,
        )
        .bind(order.id)
        .bind(&order.token_id)
        .bind(order.executed_price)
        .bind(order.executed_size_usd)
        .bind(order.shares_bought)
        .bind(order.shares_remaining)
        .bind(status_to_str(order.status))
        .bind(outcome_to_str(order.outcome_result))
        .bind(order.realized_pnl)
        .bind(&order.venue_order_id)
        .bind(order.sync_misses)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<CopyOrder>> {
        let row = sqlx::query(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| Self::row_to_order(&r)))
    }

    async fn find_order_by_dedup(
        &self,
        strategy_id: Uuid,
        source_trade_id: &str,
    ) -> Result<Option<CopyOrder>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM orders WHERE strategy_id = $1 AND source_trade_id = $2",
            ORDER_COLUMNS
        ))
        .bind(strategy_id)
        .bind(source_trade_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Self::row_to_order(&r)))
    }

    async fn list_orders_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<CopyOrder>> {
        let names: Vec<String> = statuses
            .iter()
            .map(|s| status_to_str(*s).to_string())
            .collect();
        let rows = sqlx::query(&format!(
            "SELECT {} FROM orders WHERE status = ANY($1) ORDER BY created_at",
            ORDER_COLUMNS
        ))
        .bind(&names)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_order).collect())
    }

    async fn list_open_positions(&self, strategy_id: Option<Uuid>) -> Result<Vec<CopyOrder>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM orders
            WHERE status IN ('filled', 'partial')
              AND outcome_result = 'open'
              AND shares_remaining > 0
              AND ($1::uuid IS NULL OR strategy_id = $1)
            ORDER BY created_at
            "#,
            ORDER_COLUMNS
        ))
        .bind(strategy_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_order).collect())
    }

    async fn list_orders_for_strategy(&self, strategy_id: Uuid) -> Result<Vec<CopyOrder>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM orders WHERE strategy_id = $1 ORDER BY created_at",
            ORDER_COLUMNS
        ))
        .bind(strategy_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_order).collect())
    }

    async fn insert_cooldown(&self, entry: &CooldownEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cooldown_entries (
                id, strategy_id, amount, order_id, available_at, released_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(entry.id)
        .bind(entry.strategy_id)
        .bind(entry.amount)
        .bind(entry.order_id)
        .bind(entry.available_at)
        .bind(entry.released_at)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn due_cooldowns(
        &self,
        strategy_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<CooldownEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, strategy_id, amount, order_id, available_at, released_at, created_at
            FROM cooldown_entries
            WHERE strategy_id = $1 AND available_at <= $2 AND released_at IS NULL
            ORDER BY available_at
            "#,
        )
        .bind(strategy_id)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::row_to_cooldown).collect())
    }

    async fn mark_cooldown_released(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        // released_at IS NULL makes the mark idempotent under retry.
        let result = sqlx::query(
            "UPDATE cooldown_entries SET released_at = $2 WHERE id = $1 AND released_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn unreleased_cooldown_total(&self, strategy_id: Uuid) -> Result<Decimal> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(amount), 0) AS total
            FROM cooldown_entries
            WHERE strategy_id = $1 AND released_at IS NULL
            "#,
        )
        .bind(strategy_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("total"))
    }

    async fn get_token(&self, market_id: &str, outcome: &str) -> Result<Option<String>> {
        let row = sqlx::query(
            "SELECT token_id FROM market_tokens WHERE market_id = $1 AND outcome = $2",
        )
        .bind(market_id)
        .bind(outcome)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("token_id")))
    }

    async fn put_token(&self, market_id: &str, outcome: &str, token_id: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO market_tokens (market_id, outcome, token_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (market_id, outcome) DO UPDATE SET token_id = EXCLUDED.token_id
            "#,
        )
        .bind(market_id)
        .bind(outcome)
        .bind(token_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_trace(&self, record: &TraceRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO execution_logs (
                id, run_id, trace_id, strategy_id, stage, message, elapsed_ms, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.id)
        .bind(record.run_id)
        .bind(record.trace_id)
        .bind(record.strategy_id)
        .bind(&record.stage)
        .bind(&record.message)
        .bind(record.elapsed_ms)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
