//! Channel endpoint resolution.
//!
//! The manager never reads the hosting environment itself. It asks an
//! [`EndpointResolver`] for an [`Endpoint`] on every `connect()`, so tests
//! can pin a fixed address and hosts can derive one from the page origin.

use gait_settings::EndpointSettings;

use crate::error::{LiveError, Result};

/// Where the push channel lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    /// Use the TLS variant of the scheme (`wss`).
    pub secure: bool,
    /// Host with optional port.
    pub host: String,
    /// Absolute channel path.
    pub path: String,
}

impl Endpoint {
    /// Build an endpoint, normalizing `path` to start with `/`.
    pub fn new(secure: bool, host: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            secure,
            host: host.into(),
            path: normalize_path(path.into()),
        }
    }

    /// Derive an endpoint from a page origin such as `https://example.com:8443`.
    ///
    /// The channel is secure exactly when the page was served over `https`.
    pub fn from_origin(origin: &str, path: impl Into<String>) -> Result<Self> {
        let (secure, rest) = if let Some(rest) = origin.strip_prefix("https://") {
            (true, rest)
        } else if let Some(rest) = origin.strip_prefix("http://") {
            (false, rest)
        } else {
            return Err(LiveError::InvalidEndpoint(format!(
                "unsupported origin scheme: {origin}"
            )));
        };

        let host = rest.split('/').next().unwrap_or_default();
        if host.is_empty() {
            return Err(LiveError::InvalidEndpoint(format!(
                "origin has no host: {origin}"
            )));
        }
        Ok(Self::new(secure, host, path))
    }

    /// `ws` or `wss`.
    pub fn scheme(&self) -> &'static str {
        if self.secure { "wss" } else { "ws" }
    }

    /// Full channel URL.
    pub fn url(&self) -> String {
        format!("{}://{}{}", self.scheme(), self.host, self.path)
    }
}

impl From<&EndpointSettings> for Endpoint {
    fn from(settings: &EndpointSettings) -> Self {
        Self::new(settings.secure, settings.host.clone(), settings.path.clone())
    }
}

fn normalize_path(path: String) -> String {
    if path.starts_with('/') {
        path
    } else {
        format!("/{path}")
    }
}

/// Supplies the endpoint for each connection attempt.
pub trait EndpointResolver: Send + 'static {
    /// Resolve the endpoint to connect to now.
    fn resolve(&self) -> Endpoint;
}

impl EndpointResolver for Endpoint {
    fn resolve(&self) -> Endpoint {
        self.clone()
    }
}

impl<F> EndpointResolver for F
where
    F: Fn() -> Endpoint + Send + 'static,
{
    fn resolve(&self) -> Endpoint {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn plain_url() {
        let endpoint = Endpoint::new(false, "localhost:8080", "/ws/dashboard");
        assert_eq!(endpoint.url(), "ws://localhost:8080/ws/dashboard");
    }

    #[test]
    fn secure_url() {
        let endpoint = Endpoint::new(true, "git.example.com", "/ws/dashboard");
        assert_eq!(endpoint.url(), "wss://git.example.com/ws/dashboard");
    }

    #[test]
    fn path_gets_leading_slash() {
        let endpoint = Endpoint::new(false, "h", "ws/dashboard");
        assert_eq!(endpoint.path, "/ws/dashboard");
    }

    #[test]
    fn https_origin_is_secure() {
        let endpoint = Endpoint::from_origin("https://example.com:8443", "/ws/dashboard").unwrap();
        assert!(endpoint.secure);
        assert_eq!(endpoint.host, "example.com:8443");
        assert_eq!(endpoint.url(), "wss://example.com:8443/ws/dashboard");
    }

    #[test]
    fn http_origin_with_trailing_path_is_plain() {
        let endpoint = Endpoint::from_origin("http://localhost:3000/repos", "/ws/dashboard").unwrap();
        assert!(!endpoint.secure);
        assert_eq!(endpoint.host, "localhost:3000");
    }

    #[test]
    fn unsupported_origin_rejected() {
        assert_matches!(
            Endpoint::from_origin("file:///index.html", "/ws"),
            Err(LiveError::InvalidEndpoint(_))
        );
        assert_matches!(
            Endpoint::from_origin("https://", "/ws"),
            Err(LiveError::InvalidEndpoint(_))
        );
    }

    #[test]
    fn from_settings() {
        let endpoint = Endpoint::from(&EndpointSettings::default());
        assert_eq!(endpoint.url(), "ws://localhost:8080/ws/dashboard");
    }

    #[test]
    fn closure_resolver() {
        let resolver = || Endpoint::new(true, "a", "/b");
        assert_eq!(resolver.resolve().url(), "wss://a/b");
    }
}
