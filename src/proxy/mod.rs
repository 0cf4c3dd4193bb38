mod handler;

pub use handler::{ProxyBody, ProxyHandler, ROUTE_NOT_FOUND};
