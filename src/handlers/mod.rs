pub mod health;
pub mod ipn_handlers;
pub mod order_handlers;
pub mod payment_handlers;
