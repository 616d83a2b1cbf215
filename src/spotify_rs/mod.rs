pub mod auth;
pub mod client;
pub mod token_store;
pub mod types;
