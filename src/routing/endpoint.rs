//! Peer address matching.
//!
//! # Responsibilities
//! - Parse `addr`, `cidr` and `domain` endpoint specifications with an
//!   optional `:<min-max>` port range
//! - Match a candidate peer address against an endpoint
//!
//! # Design Decisions
//! - A bare address is a host prefix (`/32` or `/128`)
//! - An omitted port range means every port (1-65535)
//! - Port 0 in a match means "don't care" and only the address is checked

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

/// Lowest port of an unrestricted range.
pub const MIN_PORT: u16 = 1;
/// Highest port of an unrestricted range.
pub const MAX_PORT: u16 = u16::MAX;

/// Error type for endpoint parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid endpoint address \"{0}\"")]
    Address(String),
    #[error("invalid endpoint port range \"{0}\"")]
    PortRange(String),
    #[error("invalid endpoint domain \"{0}\"")]
    Domain(String),
}

/// Split an optional `:<min-max>` suffix off an endpoint specification.
fn split_port_range(spec: &str) -> Result<(&str, u16, u16), EndpointError> {
    let spec = spec.trim();
    let Some(stripped) = spec.strip_suffix('>') else {
        return Ok((spec, MIN_PORT, MAX_PORT));
    };
    let Some(idx) = stripped.rfind(":<") else {
        return Err(EndpointError::PortRange(spec.to_string()));
    };

    let (addr, range) = (&stripped[..idx], &stripped[idx + 2..]);
    let (min, max) = range
        .split_once('-')
        .ok_or_else(|| EndpointError::PortRange(spec.to_string()))?;
    let min: u16 = min
        .trim()
        .parse()
        .map_err(|_| EndpointError::PortRange(spec.to_string()))?;
    let max: u16 = max
        .trim()
        .parse()
        .map_err(|_| EndpointError::PortRange(spec.to_string()))?;
    if min > max {
        return Err(EndpointError::PortRange(spec.to_string()));
    }

    Ok((addr, min, max))
}

fn port_in_range(port: u16, min: u16, max: u16) -> bool {
    port == 0 || (min..=max).contains(&port)
}

fn fmt_port_range(f: &mut fmt::Formatter<'_>, min: u16, max: u16) -> fmt::Result {
    if min == MIN_PORT && max == MAX_PORT {
        Ok(())
    } else {
        write!(f, ":<{}-{}>", min, max)
    }
}

/// An IP prefix plus an inclusive port range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub net: IpNet,
    pub min_port: u16,
    pub max_port: u16,
}

impl Endpoint {
    /// Parse `addr`, `addr/prefix`, optionally followed by `:<min-max>`.
    pub fn parse(spec: &str) -> Result<Self, EndpointError> {
        let (addr, min_port, max_port) = split_port_range(spec)?;

        let net = if addr.contains('/') {
            IpNet::from_str(addr).map_err(|_| EndpointError::Address(addr.to_string()))?
        } else {
            let ip: IpAddr = addr
                .parse()
                .map_err(|_| EndpointError::Address(addr.to_string()))?;
            IpNet::from(ip)
        };

        Ok(Self {
            net,
            min_port,
            max_port,
        })
    }

    /// True if `ip` is inside the prefix and `port` is 0 or within the range.
    ///
    /// IPv4-mapped IPv6 peers (`::ffff:a.b.c.d`) match as their IPv4 form.
    pub fn matches(&self, ip: IpAddr, port: u16) -> bool {
        let inside = self.net.contains(&ip) || self.net.contains(&ip.to_canonical());
        inside && port_in_range(port, self.min_port, self.max_port)
    }

    /// True if `ip` is inside the prefix, regardless of port.
    pub fn contains(&self, ip: IpAddr) -> bool {
        self.matches(ip, 0)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.net)?;
        fmt_port_range(f, self.min_port, self.max_port)
    }
}

/// A domain name plus an inclusive port range, resolved in the background.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DomainEndpoint {
    pub domain: String,
    pub min_port: u16,
    pub max_port: u16,
}

impl DomainEndpoint {
    /// Parse `domain`, optionally followed by `:<min-max>`.
    pub fn parse(spec: &str) -> Result<Self, EndpointError> {
        let (domain, min_port, max_port) = split_port_range(spec)?;
        let domain = domain.trim_end_matches('.').to_ascii_lowercase();

        let valid = !domain.is_empty()
            && domain.len() <= 253
            && domain.parse::<IpAddr>().is_err()
            && domain.split('.').all(|label| {
                !label.is_empty()
                    && label.len() <= 63
                    && !label.starts_with('-')
                    && !label.ends_with('-')
                    && label
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            });
        if !valid {
            return Err(EndpointError::Domain(spec.to_string()));
        }

        Ok(Self {
            domain,
            min_port,
            max_port,
        })
    }

    /// True if `ip` is one of `resolved` and `port` is 0 or within the range.
    pub fn matches(&self, resolved: &[IpAddr], ip: IpAddr, port: u16) -> bool {
        let ip = ip.to_canonical();
        resolved.iter().any(|r| r.to_canonical() == ip)
            && port_in_range(port, self.min_port, self.max_port)
    }
}

impl fmt::Display for DomainEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.domain)?;
        fmt_port_range(f, self.min_port, self.max_port)
    }
}
