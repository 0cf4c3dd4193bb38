mod matcher;

pub use matcher::{RouteError, RouteMatcher};

use crate::balancer::RoundRobinBalancer;
use crate::config::Config;
use crate::vars::RequestContext;
use std::collections::HashMap;
use std::sync::Arc;

/// One generation of compiled routes. Never mutated after construction;
/// a reload builds a new `Router` and swaps it in whole.
#[derive(Debug, Default)]
pub struct Router {
    routes: Vec<Route>,
}

#[derive(Debug)]
pub struct Route {
    pub name: String,
    pub matcher: RouteMatcher,
    pub upstream: String,
    pub balancer: Arc<RoundRobinBalancer>,
    pub priority: i32,
}

impl Router {
    pub fn from_config(config: &Config) -> Self {
        let balancers: HashMap<&str, Arc<RoundRobinBalancer>> = config
            .upstreams
            .iter()
            .map(|(name, upstream)| {
                (
                    name.as_str(),
                    Arc::new(RoundRobinBalancer::from_upstream(upstream)),
                )
            })
            .collect();

        let mut routes: Vec<Route> = config
            .routes
            .iter()
            .filter_map(|route_config| {
                let built = RouteMatcher::from_route(route_config).and_then(|matcher| {
                    let balancer = balancers
                        .get(route_config.upstream.as_str())
                        .cloned()
                        .ok_or_else(|| RouteError::UnknownUpstream(route_config.upstream.clone()))?;
                    Ok(Route {
                        name: route_config.name.clone(),
                        matcher,
                        upstream: route_config.upstream.clone(),
                        balancer,
                        priority: route_config.priority,
                    })
                });

                match built {
                    Ok(route) => Some(route),
                    Err(e) => {
                        tracing::error!("Rejecting route '{}': {}", route_config.name, e);
                        None
                    }
                }
            })
            .collect();

        // Higher priority first; the sort is stable so declaration order breaks ties
        routes.sort_by(|a, b| b.priority.cmp(&a.priority));

        Self { routes }
    }

    /// First route, in priority order, whose host, path, method and
    /// nginx vars all match.
    pub fn select_route(&self, ctx: &RequestContext<'_>) -> Option<&Route> {
        self.routes.iter().find(|route| route.matcher.matches(ctx))
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
