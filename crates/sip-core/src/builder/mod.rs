//! Builders for outgoing requests and responses, plus identifier helpers.

mod request;
mod response;

pub use request::SimpleRequestBuilder;
pub use response::SimpleResponseBuilder;

use uuid::Uuid;

use crate::types::via::BRANCH_MAGIC_COOKIE;

/// Fresh RFC 3261 branch parameter
pub fn new_branch() -> String {
    format!("{}{}", BRANCH_MAGIC_COOKIE, Uuid::new_v4().simple())
}

/// Fresh From/To tag
pub fn new_tag() -> String {
    let id = Uuid::new_v4().simple().to_string();
    id[..12].to_string()
}

/// Fresh Call-ID scoped to `host`
pub fn new_call_id(host: &str) -> String {
    format!("{}@{}", Uuid::new_v4().simple(), host)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_are_unique_and_well_formed() {
        let a = new_branch();
        assert!(a.starts_with("z9hG4bK"));
        assert_ne!(a, new_branch());
        assert_eq!(new_tag().len(), 12);
        assert!(new_call_id("pbx.local").ends_with("@pbx.local"));
    }
}
