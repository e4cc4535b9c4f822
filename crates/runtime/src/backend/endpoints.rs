use reqwest::Url;
use thiserror::Error;

pub const FEED_PATH: &str = "/live-trading/ws/live-feed";
pub const DEFAULT_FEED_PORT: u16 = 8000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("backend origin {0} has no host")]
    MissingHost(String),
    #[error("unsupported backend origin scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("invalid url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Where the REST API and the quote feed live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendEndpoints {
    rest_base: Url,
    feed_url: Url,
}

impl BackendEndpoints {
    /// Derives both endpoints from the backend origin.
    ///
    /// Over TLS the feed shares the origin's authority (`wss://host[:port]`);
    /// in plain HTTP it listens on its own port of the same host.
    pub fn from_origin(
        origin: &Url,
        api_base_path: &str,
        feed_port: u16,
    ) -> Result<Self, EndpointError> {
        let host = origin
            .host_str()
            .ok_or_else(|| EndpointError::MissingHost(origin.to_string()))?;

        let feed = match origin.scheme() {
            "https" => match origin.port() {
                Some(port) => format!("wss://{host}:{port}{FEED_PATH}"),
                None => format!("wss://{host}{FEED_PATH}"),
            },
            "http" => format!("ws://{host}:{feed_port}{FEED_PATH}"),
            other => return Err(EndpointError::UnsupportedScheme(other.to_string())),
        };

        let mut rest_base = origin.clone();
        rest_base.set_path(&format!("{}/", api_base_path.trim_end_matches('/')));
        rest_base.set_query(None);
        rest_base.set_fragment(None);

        Ok(Self {
            rest_base,
            feed_url: parse(&feed)?,
        })
    }

    pub fn rest_base(&self) -> &Url {
        &self.rest_base
    }

    pub fn feed_url(&self) -> &Url {
        &self.feed_url
    }

    /// Resolves `path` (no leading slash) under the REST base.
    pub fn rest_url(&self, path: &str) -> Result<Url, EndpointError> {
        self.rest_base
            .join(path)
            .map_err(|err| EndpointError::InvalidUrl {
                url: format!("{}{path}", self.rest_base),
                reason: err.to_string(),
            })
    }
}

fn parse(url: &str) -> Result<Url, EndpointError> {
    Url::parse(url).map_err(|err| EndpointError::InvalidUrl {
        url: url.to_string(),
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use reqwest::Url;

    use super::{BackendEndpoints, EndpointError};

    fn endpoints(origin: &str, base: &str) -> Result<BackendEndpoints, EndpointError> {
        BackendEndpoints::from_origin(&Url::parse(origin).unwrap(), base, 8000)
    }

    #[test]
    fn secure_origin_keeps_its_authority_for_the_feed() {
        let endpoints = endpoints("https://desk.example.com", "/api").unwrap();

        assert_eq!(
            endpoints.feed_url().as_str(),
            "wss://desk.example.com/live-trading/ws/live-feed"
        );
        assert_eq!(
            endpoints.rest_url("live-trading/status").unwrap().as_str(),
            "https://desk.example.com/api/live-trading/status"
        );
    }

    #[test]
    fn secure_origin_with_port_keeps_the_port() {
        let endpoints = endpoints("https://desk.example.com:8443", "/api").unwrap();

        assert_eq!(
            endpoints.feed_url().as_str(),
            "wss://desk.example.com:8443/live-trading/ws/live-feed"
        );
    }

    #[test]
    fn plain_origin_uses_the_feed_port() {
        let endpoints = endpoints("http://localhost:3000", "/api/").unwrap();

        assert_eq!(
            endpoints.feed_url().as_str(),
            "ws://localhost:8000/live-trading/ws/live-feed"
        );
        assert_eq!(
            endpoints.rest_url("market/market-status").unwrap().as_str(),
            "http://localhost:3000/api/market/market-status"
        );
    }

    #[test]
    fn empty_base_path_serves_from_root() {
        let endpoints = endpoints("http://127.0.0.1:9000", "").unwrap();

        assert_eq!(
            endpoints.rest_url("live-trading/risk").unwrap().as_str(),
            "http://127.0.0.1:9000/live-trading/risk"
        );
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert_eq!(
            endpoints("ftp://desk.example.com", "/api"),
            Err(EndpointError::UnsupportedScheme("ftp".into()))
        );
    }
}
