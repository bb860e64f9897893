use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Identifier attached to a published event and echoed back by clients as
/// `Last-Event-ID` when they reconnect.
///
/// Ids are canonically non-negative integers, but any token is accepted.
/// Numeric ids compare numerically, tokens compare lexicographically, and
/// every numeric id sorts before every token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventId {
    Numeric(u64),
    Token(String),
}

impl EventId {
    /// Parse a textual id. Anything that is a plain base-10 `u64` becomes
    /// [`EventId::Numeric`] so that `"5"` from a header matches id `5`.
    ///
    /// # Examples
    /// ```
    /// use relay_common::EventId;
    /// assert_eq!(EventId::parse("42"), EventId::Numeric(42));
    /// assert_eq!(EventId::parse("abc"), EventId::Token("abc".into()));
    /// ```
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(n) = trimmed.parse() {
                return Self::Numeric(n);
            }
        }
        Self::Token(raw.to_string())
    }

    /// Whether the id counts as "set". Zero and the empty token do not:
    /// such messages are still delivered live but never kept for replay.
    pub fn is_set(&self) -> bool {
        match self {
            Self::Numeric(n) => *n != 0,
            Self::Token(t) => !t.is_empty(),
        }
    }
}

impl Ord for EventId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.cmp(b),
            (Self::Token(a), Self::Token(b)) => a.cmp(b),
            (Self::Numeric(_), Self::Token(_)) => Ordering::Less,
            (Self::Token(_), Self::Numeric(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for EventId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Token(t) => f.write_str(t),
        }
    }
}

impl From<u64> for EventId {
    fn from(n: u64) -> Self {
        Self::Numeric(n)
    }
}

impl From<&str> for EventId {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Numeric(n) => serializer.serialize_u64(*n),
            Self::Token(t) => serializer.serialize_str(t),
        }
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            // Negative or fractional numbers are kept as opaque tokens.
            OtherNumber(serde_json::Number),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Self::Numeric(n),
            Raw::OtherNumber(n) => Self::Token(n.to_string()),
            Raw::Text(t) => Self::parse(&t),
        })
    }
}
