//! Engine-native keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A key in a table.
///
/// Keys order by kind first (`Int < Text < Bytes`) and then by value,
/// which is the order enumerations return them in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Key {
    /// Signed integer key.
    Int(i64),
    /// UTF-8 string key.
    Text(String),
    /// Binary key, compared bytewise.
    Bytes(Vec<u8>),
}

impl Key {
    /// Returns the string content if this is a text key.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Key::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(n) => write!(f, "{n}"),
            Key::Text(s) => write!(f, "{s:?}"),
            Key::Bytes(b) => {
                f.write_str("0x")?;
                for byte in b {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

impl From<i64> for Key {
    fn from(n: i64) -> Self {
        Key::Int(n)
    }
}

impl From<i32> for Key {
    fn from(n: i32) -> Self {
        Key::Int(i64::from(n))
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Text(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Text(s)
    }
}

impl From<Vec<u8>> for Key {
    fn from(b: Vec<u8>) -> Self {
        Key::Bytes(b)
    }
}

impl From<&[u8]> for Key {
    fn from(b: &[u8]) -> Self {
        Key::Bytes(b.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_order_by_kind_then_value() {
        let mut keys = vec![
            Key::from(b"a".as_slice()),
            Key::from("b"),
            Key::from(10),
            Key::from("a"),
            Key::from(-3),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                Key::Int(-3),
                Key::Int(10),
                Key::Text("a".into()),
                Key::Text("b".into()),
                Key::Bytes(b"a".to_vec()),
            ]
        );
    }

    #[test]
    fn display_forms() {
        assert_eq!(Key::from(42).to_string(), "42");
        assert_eq!(Key::from("k").to_string(), "\"k\"");
        assert_eq!(Key::from(vec![0xab, 0x01]).to_string(), "0xab01");
    }

    #[test]
    fn as_text_only_for_text() {
        assert_eq!(Key::from("x").as_text(), Some("x"));
        assert_eq!(Key::from(1).as_text(), None);
    }
}
