use crate::error::{TransportError, TransportResult};
use std::fmt;

const SCHEME: &str = "tcp://";

/// A `tcp://host:port` address. `*` as host means every interface when
/// binding and the loopback interface when connecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn parse(endpoint: &str) -> TransportResult<Self> {
        let invalid = |reason: &str| TransportError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        };

        let rest = endpoint
            .strip_prefix(SCHEME)
            .ok_or_else(|| invalid("expected tcp://host:port"))?;
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = port.parse::<u16>().map_err(|_| invalid("bad port"))?;

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn bind_addr(&self) -> String {
        let host = if self.host == "*" { "0.0.0.0" } else { &self.host };
        format!("{}:{}", host, self.port)
    }

    pub fn connect_addr(&self) -> String {
        let host = if self.host == "*" { "127.0.0.1" } else { &self.host };
        format!("{}:{}", host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}:{}", SCHEME, self.host, self.port)
    }
}
