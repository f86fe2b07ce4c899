pub mod order;
pub mod transaction;
pub mod user;
