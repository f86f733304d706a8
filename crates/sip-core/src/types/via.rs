use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::types::uri::{find_param, header_params, Param};

/// Branch prefix marking RFC 3261 compliant transaction ids
pub const BRANCH_MAGIC_COOKIE: &str = "z9hG4bK";

/// A single `Via` hop
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Via {
    pub transport: String,
    pub host: String,
    pub port: Option<u16>,
    pub params: Vec<Param>,
}

impl Via {
    pub fn udp(host: impl Into<String>, port: u16, branch: impl Into<String>) -> Self {
        Via {
            transport: "UDP".to_string(),
            host: host.into(),
            port: Some(port),
            params: vec![Param::new("branch", Some(branch.into())), Param::new("rport", None)],
        }
    }

    pub fn branch(&self) -> Option<&str> {
        find_param(&self.params, "branch")
    }
}

impl fmt::Display for Via {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SIP/2.0/{} {}", self.transport, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        Ok(())
    }
}

impl FromStr for Via {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ParseError::header("Via", s);
        let s = s.trim();
        let (protocol, rest) = s.split_once(char::is_whitespace).ok_or_else(bad)?;
        let mut parts = protocol.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some("2.0"), Some(transport)) if name.eq_ignore_ascii_case("SIP") => {
                let rest = rest.trim_start();
                let (sent_by, params) = match rest.find(';') {
                    Some(i) => (&rest[..i], header_params(&rest[i..])),
                    None => (rest, Vec::new()),
                };
                let sent_by = sent_by.trim();
                let (host, port) = match sent_by.rsplit_once(':') {
                    Some((h, p)) if !h.ends_with(':') && !h.is_empty() => {
                        (h, Some(p.parse::<u16>().map_err(|_| bad())?))
                    }
                    _ => (sent_by, None),
                };
                if host.is_empty() {
                    return Err(bad());
                }
                Ok(Via {
                    transport: transport.to_ascii_uppercase(),
                    host: host.trim_matches(|c| c == '[' || c == ']').to_string(),
                    port,
                    params,
                })
            }
            _ => Err(bad()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_branch_and_port() {
        let via: Via = "SIP/2.0/UDP 192.0.2.4:5062;branch=z9hG4bK776asdhds;rport"
            .parse()
            .unwrap();
        assert_eq!(via.transport, "UDP");
        assert_eq!(via.host, "192.0.2.4");
        assert_eq!(via.port, Some(5062));
        assert_eq!(via.branch(), Some("z9hG4bK776asdhds"));
    }

    #[test]
    fn display_matches_wire_form() {
        let via = Via::udp("10.1.1.1", 5060, "z9hG4bKabc");
        assert_eq!(via.to_string(), "SIP/2.0/UDP 10.1.1.1:5060;branch=z9hG4bKabc;rport");
    }

    #[test]
    fn rejects_bad_protocol() {
        assert!("HTTP/1.1 host".parse::<Via>().is_err());
        assert!("SIP/2.0/UDP".parse::<Via>().is_err());
    }
}
