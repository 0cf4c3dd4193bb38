use crate::config::Upstream;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Rotates through the servers of one upstream.
#[derive(Debug)]
pub struct RoundRobinBalancer {
    servers: Vec<String>,
    counter: AtomicUsize,
    timeout: Duration,
}

impl RoundRobinBalancer {
    pub fn new(servers: Vec<String>, timeout: Duration) -> Self {
        Self {
            servers,
            counter: AtomicUsize::new(0),
            timeout,
        }
    }

    pub fn from_upstream(upstream: &Upstream) -> Self {
        Self::new(
            upstream.servers.iter().map(|s| s.url.clone()).collect(),
            Duration::from_millis(upstream.timeout_ms),
        )
    }

    pub fn next_server(&self) -> Option<&str> {
        if self.servers.is_empty() {
            return None;
        }
        let idx = self.counter.fetch_add(1, Ordering::Relaxed) % self.servers.len();
        Some(&self.servers[idx])
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_balancer(count: usize) -> RoundRobinBalancer {
        let servers = (0..count)
            .map(|i| format!("http://server{}:8080", i))
            .collect();
        RoundRobinBalancer::new(servers, Duration::from_secs(30))
    }

    #[test]
    fn test_round_robin() {
        let balancer = make_balancer(3);

        let picks: Vec<_> = (0..4).map(|_| balancer.next_server().unwrap()).collect();

        assert!(picks[0].contains("server0"));
        assert!(picks[1].contains("server1"));
        assert!(picks[2].contains("server2"));
        assert!(picks[3].contains("server0")); // wraps around
    }

    #[test]
    fn test_empty_upstream() {
        let balancer = make_balancer(0);
        assert!(balancer.next_server().is_none());
    }
}
