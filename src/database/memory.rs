use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{CartStore, OrderStore, TransactionStore, UserStore};
use crate::errors::{StoreError, StoreResult};
use crate::models::order::{NewOrder, NewOrderItem, Order, OrderInsert, OrderItem, ORDER_STATUS_CONFIRMED};
use crate::models::transaction::{NewTransaction, TerminalUpdate, Transaction, TransactionStatus};
use crate::models::user::{CartLine, User};

#[derive(Default)]
struct Tables {
    transactions: Vec<Transaction>,
    orders: Vec<Order>,
    order_items: Vec<OrderItem>,
    users: HashMap<Uuid, User>,
    carts: HashMap<Uuid, Vec<CartLine>>,
}

/// Failure switches for exercising degraded paths.
#[derive(Default)]
pub struct FaultInjection {
    pub fail_transaction_inserts: AtomicBool,
    pub fail_transaction_lookups: AtomicBool,
    pub fail_cart_clear: AtomicBool,
}

/// In-memory store with the same constraints as the SQL schema.
///
/// A single `RwLock` guards every table, so each trait call is atomic in the
/// way the corresponding SQL statement is. Used by tests and by
/// `DATABASE_URL=memory` for local runs.
#[derive(Default, Clone)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    faults: Arc<FaultInjection>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn faults(&self) -> &FaultInjection {
        &self.faults
    }

    pub async fn seed_user(&self, user: User) {
        self.tables.write().await.users.insert(user.id, user);
    }

    pub async fn seed_cart(&self, user_id: Uuid, lines: Vec<CartLine>) {
        self.tables.write().await.carts.insert(user_id, lines);
    }

    pub async fn transactions(&self) -> Vec<Transaction> {
        self.tables.read().await.transactions.clone()
    }

    pub async fn orders(&self) -> Vec<Order> {
        self.tables.read().await.orders.clone()
    }

    pub async fn order_items(&self, order_id: Uuid) -> Vec<OrderItem> {
        self.tables
            .read()
            .await
            .order_items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect()
    }

    pub async fn cart_len(&self, user_id: Uuid) -> usize {
        self.tables.read().await.carts.get(&user_id).map_or(0, Vec::len)
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> StoreResult<()> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{} failed (injected)", what)));
        }
        Ok(())
    }
}

fn latest<'a>(rows: impl Iterator<Item = &'a Transaction>) -> Option<Transaction> {
    rows.max_by_key(|tx| tx.created_at).cloned()
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert_initiated(&self, tx: NewTransaction) -> StoreResult<Option<Transaction>> {
        self.check(&self.faults.fail_transaction_inserts, "transaction insert")?;

        let mut tables = self.tables.write().await;
        if tables
            .transactions
            .iter()
            .any(|existing| existing.checkout_request_id == tx.checkout_request_id)
        {
            return Ok(None);
        }

        let row = Transaction::from_new(tx, Utc::now());
        tables.transactions.push(row.clone());
        Ok(Some(row))
    }

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Transaction>> {
        self.check(&self.faults.fail_transaction_lookups, "transaction lookup")?;
        let tables = self.tables.read().await;
        Ok(tables.transactions.iter().find(|tx| tx.id == id).cloned())
    }

    async fn find_by_checkout_request_id(&self, checkout_request_id: &str) -> StoreResult<Option<Transaction>> {
        self.check(&self.faults.fail_transaction_lookups, "transaction lookup")?;
        let tables = self.tables.read().await;
        Ok(tables
            .transactions
            .iter()
            .find(|tx| tx.checkout_request_id == checkout_request_id)
            .cloned())
    }

    async fn find_latest_by_merchant_request_id(&self, merchant_request_id: &str) -> StoreResult<Option<Transaction>> {
        self.check(&self.faults.fail_transaction_lookups, "transaction lookup")?;
        let tables = self.tables.read().await;
        Ok(latest(tables.transactions.iter().filter(|tx| {
            tx.merchant_request_id.as_deref() == Some(merchant_request_id)
        })))
    }

    async fn find_latest_initiated_by_phone(&self, phone_number: &str) -> StoreResult<Option<Transaction>> {
        self.check(&self.faults.fail_transaction_lookups, "transaction lookup")?;
        let tables = self.tables.read().await;
        Ok(latest(tables.transactions.iter().filter(|tx| {
            tx.phone_number == phone_number && tx.status == TransactionStatus::Initiated
        })))
    }

    async fn transition_if_initiated(&self, id: Uuid, update: &TerminalUpdate) -> StoreResult<Option<Transaction>> {
        let mut tables = self.tables.write().await;
        let Some(row) = tables
            .transactions
            .iter_mut()
            .find(|tx| tx.id == id && tx.status == TransactionStatus::Initiated)
        else {
            return Ok(None);
        };

        row.apply(update, Utc::now());
        Ok(Some(row.clone()))
    }

    async fn attach_user(&self, id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(row) = tables
            .transactions
            .iter_mut()
            .find(|tx| tx.id == id && tx.user_id.is_none())
        {
            row.user_id = Some(user_id);
            row.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn find_order_by_transaction(&self, transaction_id: Uuid) -> StoreResult<Option<Order>> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .iter()
            .find(|order| order.transaction_id == transaction_id)
            .cloned())
    }

    async fn insert_order(&self, order: NewOrder, items: Vec<NewOrderItem>) -> StoreResult<OrderInsert> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables
            .orders
            .iter()
            .find(|o| o.transaction_id == order.transaction_id)
        {
            return Ok(OrderInsert::AlreadyExists(existing.clone()));
        }
        if tables.orders.iter().any(|o| o.order_number == order.order_number) {
            return Err(StoreError::Unavailable(format!(
                "duplicate order_number {}",
                order.order_number
            )));
        }

        let now = Utc::now();
        let created = Order {
            id: Uuid::new_v4(),
            order_number: order.order_number,
            total_amount: order.total_amount,
            status: ORDER_STATUS_CONFIRMED.to_string(),
            user_id: order.user_id,
            transaction_id: order.transaction_id,
            created_at: now,
        };

        tables.order_items.extend(items.into_iter().map(|item| OrderItem {
            id: Uuid::new_v4(),
            order_id: created.id,
            product_name: item.product_name,
            quantity: item.quantity,
            unit_price: item.unit_price,
            subtotal: item.subtotal,
            created_at: now,
        }));
        tables.orders.push(created.clone());

        Ok(OrderInsert::Created(created))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_phone(&self, phone_number: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|user| user.phone_number.as_deref() == Some(phone_number))
            .cloned())
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn cart_snapshot(&self, user_id: Uuid) -> StoreResult<Vec<CartLine>> {
        Ok(self
            .tables
            .read()
            .await
            .carts
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<u64> {
        self.check(&self.faults.fail_cart_clear, "cart clear")?;
        let removed = self.tables.write().await.carts.remove(&user_id);
        Ok(removed.map_or(0, |lines| lines.len() as u64))
    }
}
