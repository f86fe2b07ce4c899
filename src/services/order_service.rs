// services/order_service.rs
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::notifier::{Notification, NotificationDispatcher, OrderDetails, OrderLine};
use crate::database::Stores;
use crate::errors::{AppError, Result};
use crate::models::order::{CartItemInput, NewOrder, NewOrderItem, Order, OrderInsert, OrderSummary};
use crate::models::transaction::{Transaction, TransactionStatus};
use crate::utils::amount::parse_kes_amount;

const BASE36: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ORDER_SUFFIX_LEN: usize = 9;

/// `{prefix}-{unix millis}-{9 random base36 chars}`.
pub fn generate_order_number(prefix: &str) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..ORDER_SUFFIX_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{}-{}-{}", prefix, Utc::now().timestamp_millis(), suffix)
}

/// Negative quantities bill as zero.
fn billable_quantity(item: &CartItemInput) -> i32 {
    item.quantity.max(0)
}

/// Prices each cart line; unparseable prices count as zero.
///
/// A line whose subtotal, or whose contribution to the total, would overflow
/// is also counted as zero.
pub fn price_cart(items: &[CartItemInput]) -> (Decimal, Vec<NewOrderItem>) {
    let mut total = Decimal::ZERO;
    let mut lines = Vec::with_capacity(items.len());

    for item in items {
        let quantity = billable_quantity(item);
        let unit_price = parse_kes_amount(&item.price);
        let product_name = item.display_name();

        let subtotal = match unit_price
            .checked_mul(Decimal::from(quantity))
            .and_then(|subtotal| total.checked_add(subtotal).map(|sum| (subtotal, sum)))
        {
            Some((subtotal, sum)) => {
                total = sum;
                subtotal
            }
            None => {
                warn!(
                    product = %product_name,
                    unit_price = %unit_price,
                    quantity,
                    "Cart line overflows the order total, counting it as zero"
                );
                Decimal::ZERO
            }
        };

        lines.push(NewOrderItem {
            product_name,
            quantity,
            unit_price,
            subtotal,
        });
    }

    (total, lines)
}

#[derive(Debug, Clone)]
pub struct OrderCreation {
    pub summary: OrderSummary,
    /// False when an order for the transaction already existed.
    pub created: bool,
}

/// Turns a completed transaction plus the checkout cart into exactly one order.
#[derive(Clone)]
pub struct OrderMaterializer {
    stores: Stores,
    dispatcher: NotificationDispatcher,
    order_number_prefix: String,
}

impl OrderMaterializer {
    pub fn new(stores: Stores, dispatcher: NotificationDispatcher, order_number_prefix: impl Into<String>) -> Self {
        OrderMaterializer {
            stores,
            dispatcher,
            order_number_prefix: order_number_prefix.into(),
        }
    }

    pub async fn create_order(
        &self,
        transaction_id: Uuid,
        user_id: Uuid,
        cart_items: &[CartItemInput],
    ) -> Result<OrderCreation> {
        let tx = self
            .stores
            .transactions
            .find_by_id(transaction_id)
            .await?
            .ok_or(AppError::TransactionNotFound)?;

        if tx.status != TransactionStatus::Completed {
            return Err(AppError::TransactionNotReady(tx.status.as_str().to_string()));
        }

        // Fast path; the unique constraint on transaction_id is the real guard.
        if let Some(existing) = self.stores.orders.find_order_by_transaction(tx.id).await? {
            info!(order_number = %existing.order_number, transaction_id = %tx.id, "Order already exists");
            return Ok(OrderCreation {
                summary: summary(&existing, &tx),
                created: false,
            });
        }

        let (total_amount, items) = price_cart(cart_items);
        let new_order = NewOrder {
            order_number: generate_order_number(&self.order_number_prefix),
            total_amount,
            user_id,
            transaction_id: tx.id,
        };

        let order = match self.stores.orders.insert_order(new_order, items).await? {
            OrderInsert::Created(order) => order,
            OrderInsert::AlreadyExists(existing) => {
                info!(
                    order_number = %existing.order_number,
                    transaction_id = %tx.id,
                    "Concurrent order creation lost the race, returning existing order"
                );
                return Ok(OrderCreation {
                    summary: summary(&existing, &tx),
                    created: false,
                });
            }
        };

        info!(
            order_number = %order.order_number,
            total = %order.total_amount,
            transaction_id = %tx.id,
            "📦 Order created"
        );

        self.after_creation(&order, cart_items).await;

        Ok(OrderCreation {
            summary: summary(&order, &tx),
            created: true,
        })
    }

    async fn after_creation(&self, order: &Order, cart_items: &[CartItemInput]) {
        match self.stores.carts.clear_cart(order.user_id).await {
            Ok(removed) => info!(user_id = %order.user_id, removed, "🛒 Cart cleared"),
            Err(e) => error!(user_id = %order.user_id, error = %e, "Failed to clear cart after order"),
        }

        let user = match self.stores.users.find_user_by_id(order.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(user_id = %order.user_id, "Order owner not found, skipping confirmation");
                return;
            }
            Err(e) => {
                error!(user_id = %order.user_id, error = %e, "Failed to load order owner");
                return;
            }
        };

        let items = cart_items
            .iter()
            .map(|item| OrderLine {
                name: item.display_name(),
                quantity: billable_quantity(item),
                price: parse_kes_amount(&item.price),
            })
            .collect();

        let details = OrderDetails {
            customer_name: user.full_name.clone(),
            order_number: order.order_number.clone(),
            amount: order.total_amount,
            items,
        };
        self.dispatcher
            .dispatch(Notification::OrderConfirmation { user, details });
    }
}

fn summary(order: &Order, tx: &Transaction) -> OrderSummary {
    OrderSummary {
        id: order.id,
        order_number: order.order_number.clone(),
        total_amount: order.total_amount,
        status: order.status.clone(),
        mpesa_receipt: tx.mpesa_receipt.clone(),
    }
}
