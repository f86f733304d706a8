//! SIP URI (`sip:` / `sips:`) parsing and formatting.

use std::fmt;
use std::str::FromStr;

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_till1, take_while, take_while1},
    character::complete::{char, digit1},
    combinator::{all_consuming, map, map_res, opt},
    multi::many0,
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// A `;name[=value]` parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub value: Option<String>,
}

impl Param {
    pub fn new(name: impl Into<String>, value: Option<String>) -> Self {
        Param {
            name: name.into(),
            value,
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(v) => write!(f, ";{}={}", self.name, v),
            None => write!(f, ";{}", self.name),
        }
    }
}

/// Case-insensitive lookup of a parameter value
pub fn find_param<'a>(params: &'a [Param], name: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .and_then(|p| p.value.as_deref())
}

/// A SIP or SIPS URI
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SipUri {
    pub secure: bool,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub params: Vec<Param>,
    pub headers: Option<String>,
}

impl SipUri {
    pub fn new(user: Option<&str>, host: impl Into<String>, port: Option<u16>) -> Self {
        SipUri {
            secure: false,
            user: user.map(str::to_string),
            host: host.into(),
            port,
            params: Vec::new(),
            headers: None,
        }
    }

    /// `host[:port]` as written in the URI
    pub fn host_port(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        find_param(&self.params, name)
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.secure { "sips:" } else { "sip:" })?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        if self.host.contains(':') {
            write!(f, "[{}]", self.host)?;
        } else {
            f.write_str(&self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        if let Some(headers) = &self.headers {
            write!(f, "?{}", headers)?;
        }
        Ok(())
    }
}

impl FromStr for SipUri {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        all_consuming(sip_uri)(s.trim())
            .map(|(_, uri)| uri)
            .map_err(|_| ParseError::InvalidUri { uri: s.to_string() })
    }
}

fn is_param_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "-_.!~*'()%[]/:&+$".contains(c)
}

fn is_host_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_'
}

pub(crate) fn uri_param(input: &str) -> IResult<&str, Param> {
    map(
        preceded(
            char(';'),
            pair(
                take_while1(is_param_char),
                opt(preceded(char('='), take_while(|c: char| is_param_char(c) || c == '"'))),
            ),
        ),
        |(name, value): (&str, Option<&str>)| Param::new(name, value.map(str::to_string)),
    )(input)
}

fn host(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('['), take_till1(|c| c == ']'), char(']')),
        take_while1(is_host_char),
    ))(input)
}

/// Parse a SIP URI, stopping at the first character that cannot belong to it
pub(crate) fn sip_uri(input: &str) -> IResult<&str, SipUri> {
    let (input, scheme) = alt((tag_no_case("sips:"), tag_no_case("sip:")))(input)?;
    let (input, user) = opt(terminated(
        take_till1(|c: char| c == '@' || c == '>' || c.is_whitespace()),
        char('@'),
    ))(input)?;
    let (input, host) = host(input)?;
    let (input, port) = opt(preceded(char(':'), map_res(digit1, str::parse::<u16>)))(input)?;
    let (input, params) = many0(uri_param)(input)?;
    let (input, headers) = opt(preceded(
        char('?'),
        take_while(|c: char| c != '>' && !c.is_whitespace()),
    ))(input)?;

    Ok((
        input,
        SipUri {
            secure: scheme.eq_ignore_ascii_case("sips:"),
            user: user.map(str::to_string),
            host: host.to_string(),
            port,
            params,
            headers: headers.map(str::to_string),
        },
    ))
}

/// Parse a run of header parameters (`;tag=x;expires=60`)
pub(crate) fn header_params(input: &str) -> Vec<Param> {
    let trimmed = input.trim();
    if let Ok((_, params)) = all_consuming(many0(preceded(
        take_while(|c: char| c == ' ' || c == '\t'),
        uri_param,
    )))(trimmed)
    {
        return params;
    }
    // Quoted or otherwise unusual values fall back to a plain split
    trimmed
        .split(';')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| match p.split_once('=') {
            Some((n, v)) => Param::new(n.trim(), Some(v.trim().to_string())),
            None => Param::new(p, None),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_uri() {
        let uri: SipUri = "sip:alice@192.0.2.10:5070;transport=udp;lr".parse().unwrap();
        assert_eq!(uri.user.as_deref(), Some("alice"));
        assert_eq!(uri.host, "192.0.2.10");
        assert_eq!(uri.port, Some(5070));
        assert_eq!(uri.param("transport"), Some("udp"));
        assert_eq!(uri.params.len(), 2);
        assert_eq!(uri.to_string(), "sip:alice@192.0.2.10:5070;transport=udp;lr");
    }

    #[test]
    fn parses_hostonly_and_ipv6() {
        let uri: SipUri = "sips:example.com".parse().unwrap();
        assert!(uri.secure);
        assert_eq!(uri.user, None);
        assert_eq!(uri.port, None);

        let uri: SipUri = "sip:*97@[2001:db8::1]:5060".parse().unwrap();
        assert_eq!(uri.user.as_deref(), Some("*97"));
        assert_eq!(uri.host, "2001:db8::1");
        assert_eq!(uri.to_string(), "sip:*97@[2001:db8::1]:5060");
    }

    #[test]
    fn rejects_other_schemes() {
        assert!("tel:+15551234".parse::<SipUri>().is_err());
        assert!("sip:".parse::<SipUri>().is_err());
    }

    #[test]
    fn header_param_list() {
        let params = header_params(";tag=abc ; expires=60;lr");
        assert_eq!(find_param(&params, "TAG"), Some("abc"));
        assert_eq!(find_param(&params, "expires"), Some("60"));
        assert_eq!(params[2], Param::new("lr", None));
    }
}
