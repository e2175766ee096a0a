pub mod health;
pub mod price;
