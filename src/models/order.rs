// models/order.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const ORDER_STATUS_CONFIRMED: &str = "confirmed";

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub status: String,
    pub user_id: Uuid,
    pub transaction_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_name: String,
    pub quantity: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub unit_price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub subtotal: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub order_number: String,
    pub total_amount: Decimal,
    pub user_id: Uuid,
    pub transaction_id: Uuid,
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub subtotal: Decimal,
}

/// Result of an order insert guarded by the `transaction_id` uniqueness constraint.
#[derive(Debug, Clone)]
pub enum OrderInsert {
    Created(Order),
    AlreadyExists(Order),
}

/// Cart line as sent by the storefront at checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct CartItemInput {
    pub name: Option<String>,
    pub title: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
    #[serde(default)]
    pub price: serde_json::Value,
}

fn default_quantity() -> i32 {
    1
}

impl CartItemInput {
    pub fn display_name(&self) -> String {
        self.title
            .clone()
            .or_else(|| self.name.clone())
            .unwrap_or_else(|| "Item".to_string())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub transaction_id: Option<String>,
    pub user_id: Option<String>,
    pub cart_items: Option<Vec<CartItemInput>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub id: Uuid,
    pub order_number: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub status: String,
    pub mpesa_receipt: Option<String>,
}
