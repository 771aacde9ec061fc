//! HTTP route handlers and scope registrars.

pub mod graphql;
pub mod health;
pub mod metrics;
pub mod proxy;
pub mod status;

pub use graphql::configure_graphql;
pub use health::configure_health;
pub use metrics::configure_metrics;
pub use proxy::{configure_auth_proxy, configure_optional_auth_proxy, configure_required_auth_proxy};
pub use status::configure_status;
