//! Network adapters for the trading backend.

mod endpoints;
mod rest;
mod stream;

pub use endpoints::{BackendEndpoints, EndpointError, DEFAULT_FEED_PORT, FEED_PATH};
pub use rest::HttpBackend;
pub use stream::WsTransport;
