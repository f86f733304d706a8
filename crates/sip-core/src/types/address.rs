use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::types::uri::{find_param, header_params, Param, SipUri};

/// `From`/`To`/`Contact`/`Refer-To` value: optional display name, URI and
/// header parameters such as `tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameAddr {
    pub display_name: Option<String>,
    pub uri: SipUri,
    pub params: Vec<Param>,
}

impl NameAddr {
    pub fn new(uri: SipUri) -> Self {
        NameAddr {
            display_name: None,
            uri,
            params: Vec::new(),
        }
    }

    pub fn tag(&self) -> Option<&str> {
        find_param(&self.params, "tag")
    }

    /// Replace any existing tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.params.retain(|p| !p.name.eq_ignore_ascii_case("tag"));
        self.params.push(Param::new("tag", Some(tag.into())));
        self
    }

    /// User part of the URI, which is the dialed number for a `To`
    pub fn user(&self) -> Option<&str> {
        self.uri.user.as_deref()
    }
}

impl fmt::Display for NameAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            write!(f, "\"{}\" ", name)?;
        }
        write!(f, "<{}>", self.uri)?;
        for param in &self.params {
            write!(f, "{}", param)?;
        }
        Ok(())
    }
}

impl FromStr for NameAddr {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(open) = s.find('<') {
            let close = s[open..]
                .find('>')
                .map(|i| open + i)
                .ok_or_else(|| ParseError::InvalidUri { uri: s.to_string() })?;
            let display = s[..open].trim().trim_matches('"').trim();
            Ok(NameAddr {
                display_name: (!display.is_empty()).then(|| display.to_string()),
                uri: s[open + 1..close].parse()?,
                params: header_params(&s[close + 1..]),
            })
        } else {
            // addr-spec form: everything after the first ';' is a header param
            let (uri, params) = match s.find(';') {
                Some(i) => (&s[..i], header_params(&s[i..])),
                None => (s, Vec::new()),
            };
            Ok(NameAddr {
                display_name: None,
                uri: uri.parse()?,
                params,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracketed_with_display_and_tag() {
        let addr: NameAddr = "\"Front Desk\" <sip:1001@pbx.example.com>;tag=8f2a".parse().unwrap();
        assert_eq!(addr.display_name.as_deref(), Some("Front Desk"));
        assert_eq!(addr.user(), Some("1001"));
        assert_eq!(addr.tag(), Some("8f2a"));
    }

    #[test]
    fn addr_spec_params_belong_to_header() {
        let addr: NameAddr = "sip:*97@10.0.0.1;tag=xyz".parse().unwrap();
        assert_eq!(addr.user(), Some("*97"));
        assert!(addr.uri.params.is_empty());
        assert_eq!(addr.tag(), Some("xyz"));
    }

    #[test]
    fn with_tag_replaces() {
        let addr: NameAddr = "<sip:0@pbx>;tag=a".parse().unwrap();
        let addr = addr.with_tag("b");
        assert_eq!(addr.tag(), Some("b"));
        assert_eq!(addr.to_string(), "<sip:0@pbx>;tag=b");
    }

    #[test]
    fn unterminated_bracket_fails() {
        assert!("<sip:0@pbx".parse::<NameAddr>().is_err());
    }
}
