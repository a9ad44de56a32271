pub mod api;
pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod models;
pub mod observability;
pub mod otp;
pub mod state;
pub mod store;
