use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::types::method::Method;

/// `CSeq: <number> <method>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CSeq {
    pub seq: u32,
    pub method: Method,
}

impl CSeq {
    pub fn new(seq: u32, method: Method) -> Self {
        CSeq { seq, method }
    }
}

impl fmt::Display for CSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.seq, self.method)
    }
}

impl FromStr for CSeq {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let seq = parts
            .next()
            .and_then(|n| n.parse::<u32>().ok())
            .ok_or_else(|| ParseError::header("CSeq", s))?;
        let method = parts
            .next()
            .ok_or_else(|| ParseError::header("CSeq", s))?
            .parse::<Method>()
            .map_err(|_| ParseError::header("CSeq", s))?;
        if parts.next().is_some() {
            return Err(ParseError::header("CSeq", s));
        }
        Ok(CSeq { seq, method })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_display() {
        let cseq: CSeq = "314159 INVITE".parse().unwrap();
        assert_eq!(cseq, CSeq::new(314159, Method::Invite));
        assert_eq!(cseq.to_string(), "314159 INVITE");
        assert!("x BYE".parse::<CSeq>().is_err());
        assert!("1".parse::<CSeq>().is_err());
        assert!("1 BYE extra".parse::<CSeq>().is_err());
    }
}
