use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::{CartStore, OrderStore, TransactionStore, UserStore};
use crate::errors::StoreResult;
use crate::models::order::{NewOrder, NewOrderItem, Order, OrderInsert, ORDER_STATUS_CONFIRMED};
use crate::models::transaction::{NewTransaction, TerminalUpdate, Transaction, TransactionStatus};
use crate::models::user::{CartLine, User};

/// Postgres-backed store for every checkout table.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

#[async_trait]
impl TransactionStore for PgStore {
    async fn insert_initiated(&self, tx: NewTransaction) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            INSERT INTO transactions
                (id, checkout_request_id, merchant_request_id, phone_number, amount, status, user_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (checkout_request_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&tx.checkout_request_id)
        .bind(&tx.merchant_request_id)
        .bind(&tx.phone_number)
        .bind(tx.amount)
        .bind(TransactionStatus::Initiated.as_str())
        .bind(tx.user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>("SELECT * FROM transactions WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn find_by_checkout_request_id(&self, checkout_request_id: &str) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>(
            "SELECT * FROM transactions WHERE checkout_request_id = $1",
        )
        .bind(checkout_request_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_latest_by_merchant_request_id(&self, merchant_request_id: &str) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE merchant_request_id = $1
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(merchant_request_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_latest_initiated_by_phone(&self, phone_number: &str) -> StoreResult<Option<Transaction>> {
        let row = sqlx::query_as::<_, Transaction>(
            r#"
            SELECT * FROM transactions
            WHERE phone_number = $1 AND status = 'initiated'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn transition_if_initiated(&self, id: Uuid, update: &TerminalUpdate) -> StoreResult<Option<Transaction>> {
        let row = match update {
            TerminalUpdate::Completed(settlement) => {
                sqlx::query_as::<_, Transaction>(
                    r#"
                    UPDATE transactions
                    SET status = 'completed',
                        mpesa_receipt = $2,
                        amount = COALESCE($3, amount),
                        phone_number = COALESCE($4, phone_number),
                        transaction_date = $5,
                        result_code = $6,
                        result_desc = $7,
                        updated_at = NOW()
                    WHERE id = $1 AND status = 'initiated'
                    RETURNING *
                    "#,
                )
                .bind(id)
                .bind(&settlement.receipt)
                .bind(settlement.amount)
                .bind(&settlement.phone_number)
                .bind(settlement.transaction_date)
                .bind(settlement.result_code)
                .bind(&settlement.result_desc)
                .fetch_optional(&self.pool)
                .await?
            }
            TerminalUpdate::Failed(failure) => {
                sqlx::query_as::<_, Transaction>(
                    r#"
                    UPDATE transactions
                    SET status = 'failed',
                        result_code = $2,
                        result_desc = $3,
                        updated_at = NOW()
                    WHERE id = $1 AND status = 'initiated'
                    RETURNING *
                    "#,
                )
                .bind(id)
                .bind(failure.result_code)
                .bind(&failure.result_desc)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(row)
    }

    async fn attach_user(&self, id: Uuid, user_id: Uuid) -> StoreResult<()> {
        sqlx::query(
            "UPDATE transactions SET user_id = $2, updated_at = NOW() WHERE id = $1 AND user_id IS NULL",
        )
        .bind(id)
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PgStore {
    async fn find_order_by_transaction(&self, transaction_id: Uuid) -> StoreResult<Option<Order>> {
        let row = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE transaction_id = $1")
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn insert_order(&self, order: NewOrder, items: Vec<NewOrderItem>) -> StoreResult<OrderInsert> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (id, order_number, total_amount, status, user_id, transaction_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (transaction_id) DO NOTHING
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&order.order_number)
        .bind(order.total_amount)
        .bind(ORDER_STATUS_CONFIRMED)
        .bind(order.user_id)
        .bind(order.transaction_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(created) = inserted else {
            tx.rollback().await?;
            let existing = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE transaction_id = $1")
                .bind(order.transaction_id)
                .fetch_one(&self.pool)
                .await?;
            return Ok(OrderInsert::AlreadyExists(existing));
        };

        for item in &items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, product_name, quantity, unit_price, subtotal)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(created.id)
            .bind(&item.product_name)
            .bind(item.quantity)
            .bind(item.unit_price)
            .bind(item.subtotal)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(OrderInsert::Created(created))
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, User>(
            "SELECT id, email, full_name, phone_number FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    async fn find_user_by_phone(&self, phone_number: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, User>(
            "SELECT id, email, full_name, phone_number FROM users WHERE phone_number = $1 LIMIT 1",
        )
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn cart_snapshot(&self, user_id: Uuid) -> StoreResult<Vec<CartLine>> {
        let rows = sqlx::query_as::<_, CartLine>(
            r#"
            SELECT p.name AS name, ci.quantity AS quantity, p.price AS price
            FROM cart_items ci
            JOIN products p ON p.id = ci.product_id
            WHERE ci.user_id = $1
            ORDER BY ci.created_at
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
