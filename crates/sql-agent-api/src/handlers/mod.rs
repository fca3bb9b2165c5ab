pub mod health;
pub mod memory;
pub mod query;
