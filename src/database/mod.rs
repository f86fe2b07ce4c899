pub mod connection;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::StoreResult;
use crate::models::order::{NewOrder, NewOrderItem, Order, OrderInsert};
use crate::models::transaction::{NewTransaction, TerminalUpdate, Transaction};
use crate::models::user::{CartLine, User};

/// Durable record of payment attempts.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Inserts an `initiated` row. `None` means the correlation id was already recorded.
    async fn insert_initiated(&self, tx: NewTransaction) -> StoreResult<Option<Transaction>>;

    async fn find_by_id(&self, id: Uuid) -> StoreResult<Option<Transaction>>;

    async fn find_by_checkout_request_id(&self, checkout_request_id: &str) -> StoreResult<Option<Transaction>>;

    async fn find_latest_by_merchant_request_id(&self, merchant_request_id: &str) -> StoreResult<Option<Transaction>>;

    async fn find_latest_initiated_by_phone(&self, phone_number: &str) -> StoreResult<Option<Transaction>>;

    /// Compare-and-set from `initiated` to a terminal state.
    ///
    /// Returns the updated row, or `None` when the row was no longer `initiated`.
    async fn transition_if_initiated(&self, id: Uuid, update: &TerminalUpdate) -> StoreResult<Option<Transaction>>;

    /// Backfills `user_id` only where it is still null.
    async fn attach_user(&self, id: Uuid, user_id: Uuid) -> StoreResult<()>;

    async fn ping(&self) -> StoreResult<()>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn find_order_by_transaction(&self, transaction_id: Uuid) -> StoreResult<Option<Order>>;

    /// Writes the order and its items atomically; a `transaction_id` conflict yields the existing order.
    async fn insert_order(&self, order: NewOrder, items: Vec<NewOrderItem>) -> StoreResult<OrderInsert>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> StoreResult<Option<User>>;

    async fn find_user_by_phone(&self, phone_number: &str) -> StoreResult<Option<User>>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn cart_snapshot(&self, user_id: Uuid) -> StoreResult<Vec<CartLine>>;

    /// Returns the number of rows removed.
    async fn clear_cart(&self, user_id: Uuid) -> StoreResult<u64>;
}

/// Handles to every table the checkout services touch.
#[derive(Clone)]
pub struct Stores {
    pub transactions: Arc<dyn TransactionStore>,
    pub orders: Arc<dyn OrderStore>,
    pub users: Arc<dyn UserStore>,
    pub carts: Arc<dyn CartStore>,
}

impl Stores {
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: TransactionStore + OrderStore + UserStore + CartStore + 'static,
    {
        Stores {
            transactions: store.clone(),
            orders: store.clone(),
            users: store.clone(),
            carts: store,
        }
    }
}
