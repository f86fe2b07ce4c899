pub mod amount;
pub mod phone;
