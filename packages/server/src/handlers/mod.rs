pub mod asset;
pub mod health;
