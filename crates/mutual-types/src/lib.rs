pub mod api;
pub mod events;
pub mod expiry;
pub mod filter;
pub mod models;
