pub mod cache;
pub mod health;
pub mod metrics;
pub mod rate_limit;
