//! Classification of forwarding destinations and binding them to a transport.

use crate::net::{ConnectError, Session, TransportFactory};
use regex::Regex;
use std::{fmt, num::ParseIntError, str::FromStr, sync::LazyLock};
use thiserror::Error;
use tracing::debug;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?|wss?)://.+").expect("URL pattern compiles"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
    Ws,
    Wss,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
            Scheme::Ws => "ws",
            Scheme::Wss => "wss",
        }
    }

    pub fn is_secure(&self) -> bool {
        matches!(self, Scheme::Https | Scheme::Wss)
    }

    /// The websocket scheme used to reach a peer addressed with this scheme.
    pub fn websocket(&self) -> Scheme {
        if self.is_secure() {
            Scheme::Wss
        } else {
            Scheme::Ws
        }
    }

    fn from_captured(scheme: &str) -> Self {
        match scheme {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            "ws" => Scheme::Ws,
            _ => Scheme::Wss,
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a forwarding hop sends its output.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    /// Reached through a websocket session using the full URI.
    Url { scheme: Scheme, uri: String },
    /// Reached through a raw TCP session.
    HostPort { host: String, port: u16 },
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Destination::Url { uri, .. } => f.write_str(uri),
            Destination::HostPort { host, port } => write!(f, "{host}:{port}"),
        }
    }
}

impl FromStr for Destination {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        classify(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressError {
    #[error("'{0}' is neither a URL nor a host:port address")]
    Unrecognized(String),

    #[error("invalid port in '{address}': {source}")]
    InvalidPort {
        address: String,
        source: ParseIntError,
    },
}

/// Anything matching `^(https?|wss?)://.+` is a URL; everything else must be
/// `host:port`. Segments after the port are ignored.
pub fn classify(address: &str) -> Result<Destination, AddressError> {
    let address = address.trim();
    if let Some(captures) = URL_PATTERN.captures(address) {
        return Ok(Destination::Url {
            scheme: Scheme::from_captured(&captures[1]),
            uri: address.to_owned(),
        });
    }

    let segments: Vec<&str> = address.split(':').collect();
    match segments.as_slice() {
        [host, port, ..] if !host.is_empty() => {
            let port = port.parse().map_err(|source| AddressError::InvalidPort {
                address: address.to_owned(),
                source,
            })?;
            Ok(Destination::HostPort {
                host: (*host).to_owned(),
                port,
            })
        }
        _ => Err(AddressError::Unrecognized(address.to_owned())),
    }
}

/// Opens the session matching the destination's variant. Connection setup
/// happens here, once per destination.
pub async fn bind<T>(destination: &Destination, transport: &T) -> Result<Session, ConnectError>
where
    T: TransportFactory + ?Sized,
{
    debug!(%destination, "binding forwarding session");
    match destination {
        Destination::Url { uri, .. } => transport.open_url_session(uri).await,
        Destination::HostPort { host, port } => transport.open_address_session(host, *port).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::testing::{Opened, RecordingTransport};

    #[test]
    fn url_schemes_classify_as_url() {
        for (address, scheme) in [
            ("http://a/b", Scheme::Http),
            ("https://a:8443", Scheme::Https),
            ("ws://relay", Scheme::Ws),
            ("wss://relay.example.com/path", Scheme::Wss),
        ] {
            assert_eq!(
                classify(address).unwrap(),
                Destination::Url {
                    scheme,
                    uri: address.to_owned()
                }
            );
        }
    }

    #[test]
    fn host_port_classification() {
        assert_eq!(
            classify("host1:7000").unwrap(),
            Destination::HostPort {
                host: "host1".into(),
                port: 7000
            }
        );
        assert_eq!(classify("host1:7000").unwrap().to_string(), "host1:7000");
    }

    #[test]
    fn bad_addresses_are_rejected() {
        assert!(matches!(
            classify("host:nonnumeric"),
            Err(AddressError::InvalidPort { .. })
        ));
        assert!(matches!(
            classify("host:70000"),
            Err(AddressError::InvalidPort { .. })
        ));
        assert!(matches!(classify("justahost"), Err(AddressError::Unrecognized(_))));
        assert!(matches!(classify(":7000"), Err(AddressError::Unrecognized(_))));
        // Unknown schemes fall through to host:port parsing.
        assert!(matches!(
            classify("ftp://files"),
            Err(AddressError::InvalidPort { .. })
        ));
        assert!(classify("ws://").is_err());
    }

    #[test]
    fn secure_schemes_map_to_wss() {
        assert_eq!(Scheme::Https.websocket(), Scheme::Wss);
        assert_eq!(Scheme::Http.websocket(), Scheme::Ws);
        assert_eq!(Scheme::Ws.websocket(), Scheme::Ws);
    }

    #[tokio::test]
    async fn bind_uses_url_opener_for_urls() {
        let transport = RecordingTransport::default();
        let destination = classify("wss://relay.example.com/path").unwrap();
        let session = bind(&destination, &transport).await.unwrap();
        assert_eq!(session.destination(), "wss://relay.example.com/path");
        assert_eq!(
            transport.opened(),
            vec![Opened::Url("wss://relay.example.com/path".into())]
        );
    }

    #[tokio::test]
    async fn bind_uses_address_opener_for_host_port() {
        let transport = RecordingTransport::default();
        bind(&classify("host1:7000").unwrap(), &transport)
            .await
            .unwrap();
        assert_eq!(
            transport.opened(),
            vec![Opened::Address("host1".into(), 7000)]
        );
    }

    #[tokio::test]
    async fn bind_propagates_connection_failures() {
        let transport = RecordingTransport::refusing();
        let err = bind(&classify("host1:7000").unwrap(), &transport)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ConnectError::Refused { .. }));
    }
}
