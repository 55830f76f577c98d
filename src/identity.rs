use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

const ID_LEN: usize = 12;

/// Stable per-session instance identity.
///
/// Always twelve lowercase hex digits, so the derived `Ord` (string order)
/// is the same as numeric order. The fight tie-break relies on that.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    pub fn derive(session: &str) -> Self {
        let digest = Sha256::digest(session.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
        InstanceId(hex[..ID_LEN].to_string())
    }

    /// Accepts a name read back from the shared medium.
    pub fn parse(raw: &str) -> Option<Self> {
        let ok = raw.len() == ID_LEN && raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        ok.then(|| InstanceId(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_stable() {
        let a = InstanceId::derive("/home/me/projects/site");
        assert_eq!(a, InstanceId::derive("/home/me/projects/site"));
        assert_ne!(a, InstanceId::derive("/home/me/projects/api"));
        assert_eq!(a.as_str().len(), 12);
    }

    #[test]
    fn known_digest_prefix() {
        // sha256("abc") = ba7816bf8f01cfea...
        assert_eq!(InstanceId::derive("abc").as_str(), "ba7816bf8f01");
    }

    #[test]
    fn parse_rejects_foreign_names() {
        assert!(InstanceId::parse("ba7816bf8f01").is_some());
        assert!(InstanceId::parse("BA7816BF8F01").is_none());
        assert!(InstanceId::parse("ba7816bf8f").is_none());
        assert!(InstanceId::parse("ba7816bf8f0z").is_none());
    }

    #[test]
    fn order_matches_numeric_order() {
        let small = InstanceId::parse("00000000000f").unwrap();
        let big = InstanceId::parse("0000000000f0").unwrap();
        assert!(small < big);
    }
}
