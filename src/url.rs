//! RTSP URLs

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

/// Default port for `rtsp://` and `rtspu://` URLs
pub const DEFAULT_RTSP_PORT: u16 = 554;

/// Default port for `rtsps://` URLs
pub const DEFAULT_RTSPS_PORT: u16 = 322;

/// Error returned when a URL is not a usable RTSP URL
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("invalid URL: {0}")]
    Parse(#[from] url::ParseError),
    #[error("unsupported scheme: {0}")]
    Scheme(String),
    #[error("URL has no host")]
    MissingHost,
}

/// A parsed `rtsp://`, `rtsps://` or `rtspu://` URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtspUrl {
    inner: Url,
}

impl RtspUrl {
    /// Parse an RTSP URL
    pub fn parse(input: &str) -> Result<Self, UrlError> {
        let inner = Url::parse(input)?;

        match inner.scheme() {
            "rtsp" | "rtsps" | "rtspu" => {}
            other => return Err(UrlError::Scheme(other.to_string())),
        }

        match inner.host_str() {
            Some(host) if !host.is_empty() => {}
            _ => return Err(UrlError::MissingHost),
        }

        Ok(Self { inner })
    }

    /// URL scheme
    pub fn scheme(&self) -> &str {
        self.inner.scheme()
    }

    /// Host name, lower-cased
    pub fn host(&self) -> String {
        self.inner
            .host_str()
            .map(|h| h.to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Explicit port, or the scheme's default
    pub fn port(&self) -> u16 {
        self.inner.port().unwrap_or(match self.scheme() {
            "rtsps" => DEFAULT_RTSPS_PORT,
            _ => DEFAULT_RTSP_PORT,
        })
    }

    /// Absolute path, `/` when the URL has none
    pub fn abspath(&self) -> &str {
        match self.inner.path() {
            "" => "/",
            path => path,
        }
    }

    /// Query string without the leading `?`
    pub fn query(&self) -> Option<&str> {
        self.inner.query()
    }

    /// Canonical form: scheme, lower-cased host, explicit port, path and
    /// query. The fragment is dropped.
    pub fn canonical(&self) -> String {
        let mut out = format!(
            "{}://{}:{}{}",
            self.scheme(),
            self.host(),
            self.port(),
            self.abspath()
        );
        if let Some(query) = self.query() {
            out.push('?');
            out.push_str(query);
        }
        out
    }

    /// The URL as given
    pub fn as_str(&self) -> &str {
        self.inner.as_str()
    }
}

impl FromStr for RtspUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for RtspUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.inner.as_str())
    }
}
