pub mod cadence;
pub mod config;
mod config_env;
pub mod confirm;
pub mod dispatch;
pub mod flow;
pub mod intent;
pub mod models;
pub mod query;
pub mod reminder;
pub mod schedule;
pub mod session;
pub mod store;
pub mod timezone;
pub mod transport;
