pub mod balancer;
pub mod config;
pub mod metrics;
pub mod proxy;
pub mod router;
pub mod server;
pub mod vars;

pub use config::Config;
