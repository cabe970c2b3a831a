pub mod config;
pub mod error;

pub use config::{
    AdminConfig, AppConfig, CacheConfig, EndpointLimit, RateLimitConfig, ServerConfig,
    MAX_TTL_SECS,
};
pub use error::{ScholarlyError, ScholarlyResult};
