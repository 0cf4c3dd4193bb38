use crate::vars::Condition;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub entrypoints: HashMap<String, Entrypoint>,

    #[serde(default)]
    pub upstreams: HashMap<String, Upstream>,

    /// Evaluated by priority, then in declaration order.
    #[serde(default)]
    pub routes: Vec<Route>,

    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_address")]
    pub address: String,
}

fn default_metrics_address() -> String {
    "0.0.0.0:9090".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entrypoint {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upstream {
    pub servers: Vec<ServerConfig>,

    /// Request timeout in milliseconds (total time for request)
    #[serde(default = "default_request_timeout")]
    pub timeout_ms: u64,
}

fn default_request_timeout() -> u64 {
    30000 // 30 seconds
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Route {
    pub name: String,

    /// Exact hosts or `*.example.com` wildcards; empty matches any host.
    #[serde(default)]
    pub hosts: Vec<String>,

    /// Exact paths, or prefixes when ending in `*`; empty matches any path.
    #[serde(default)]
    pub paths: Vec<String>,

    #[serde(default)]
    pub methods: Vec<String>,

    #[serde(default, alias = "nginxVars")]
    pub vars: Vec<Condition>,

    pub upstream: String,

    #[serde(default)]
    pub priority: i32,
}
