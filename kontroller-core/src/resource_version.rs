use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// A point in the remote change history
///
/// The API hands these out as opaque strings, but for the kinds we watch they are
/// integers that only ever grow within one source, so they are kept as a `u64` and
/// compared numerically. The default (`0`) sorts before every real token.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceVersion(u64);

impl ResourceVersion {
    /// Wrap a raw token
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// The raw token
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for ResourceVersion {
    fn from(version: u64) -> Self {
        Self(version)
    }
}

impl FromStr for ResourceVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| Error::InvalidResourceVersion(s.to_string()))
    }
}

impl TryFrom<String> for ResourceVersion {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<ResourceVersion> for String {
    fn from(rv: ResourceVersion) -> Self {
        rv.to_string()
    }
}

impl fmt::Display for ResourceVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::ResourceVersion;
    use crate::Error;

    #[test]
    fn parses_decimal_tokens() {
        assert_eq!("42".parse::<ResourceVersion>().unwrap(), ResourceVersion::new(42));
        assert_eq!(" 7 ".parse::<ResourceVersion>().unwrap(), ResourceVersion::new(7));
    }

    #[test]
    fn empty_token_is_the_origin() {
        assert_eq!("".parse::<ResourceVersion>().unwrap(), ResourceVersion::default());
    }

    #[test]
    fn rejects_non_numeric_tokens() {
        let err = "abc".parse::<ResourceVersion>().unwrap_err();
        assert!(matches!(err, Error::InvalidResourceVersion(s) if s == "abc"));
    }

    #[test]
    fn orders_numerically_not_lexically() {
        let nine: ResourceVersion = "9".parse().unwrap();
        let ten: ResourceVersion = "10".parse().unwrap();
        assert!(nine < ten);
    }

    #[test]
    fn serializes_as_a_string() {
        let rv = ResourceVersion::new(1234);
        assert_eq!(serde_json::to_value(rv).unwrap(), serde_json::json!("1234"));
        let back: ResourceVersion = serde_json::from_value(serde_json::json!("1234")).unwrap();
        assert_eq!(back, rv);
    }
}
