pub mod loader;
pub mod schema;

pub use loader::{ConfigError, ConfigLoader};
pub use schema::{
    LoginConfig, OutputConfig, RetryConfig, SiteConfig, TallyConfig, TimeoutConfig,
};
