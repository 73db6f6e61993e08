//! Key/value side-channel propagated alongside the trace identity.
//!
//! Baggage entries are visible to every downstream span of a transaction and
//! are carried on the wire as a comma-separated `key=value` list with
//! percent-encoded keys and values.

use std::fmt;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Characters escaped when serializing baggage keys and values.
const FRAGMENT: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b';').add(b',').add(b'=');

/// An ordered string-to-string mapping propagated with the trace context.
///
/// Insertion order is preserved; inserting an existing key replaces its value
/// in place.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Baggage {
    entries: Vec<(String, String)>,
}

impl Baggage {
    /// Create an empty baggage.
    pub fn new() -> Self {
        Baggage::default()
    }

    /// Look up the value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Insert a key/value pair, replacing any existing value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Iterate over entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to the `baggage` header value.
    pub fn to_header(&self) -> String {
        self.entries
            .iter()
            .map(|(k, v)| {
                format!(
                    "{}={}",
                    utf8_percent_encode(k.trim(), FRAGMENT),
                    utf8_percent_encode(v.trim(), FRAGMENT),
                )
            })
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse a `baggage` header value.
    ///
    /// Malformed entries (missing `=`, empty key, invalid UTF-8 after
    /// percent-decoding) are skipped; any `;properties` suffix on an entry is
    /// ignored. Parsing never fails.
    pub fn from_header(header: &str) -> Baggage {
        let mut baggage = Baggage::new();
        for member in header.split(',') {
            let member = member.split(';').next().unwrap_or("");
            let Some((key, value)) = member.split_once('=') else {
                continue;
            };
            let (key, value) = (
                percent_decode_str(key.trim()).decode_utf8(),
                percent_decode_str(value.trim()).decode_utf8(),
            );
            match (key, value) {
                (Ok(key), Ok(value)) if !key.trim().is_empty() => {
                    baggage.insert(key.trim(), value.trim());
                }
                _ => {
                    tracing::warn!(member, "skipping malformed baggage entry");
                }
            }
        }
        baggage
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Baggage {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut baggage = Baggage::new();
        for (k, v) in iter {
            baggage.insert(k, v);
        }
        baggage
    }
}

impl fmt::Display for Baggage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_replaces_in_place() {
        let mut baggage = Baggage::new();
        baggage.insert("user_id", "1");
        baggage.insert("session.id", "abc");
        baggage.insert("user_id", "2");

        assert_eq!(baggage.len(), 2);
        assert_eq!(baggage.get("user_id"), Some("2"));
        let keys: Vec<_> = baggage.iter().map(|(k, _)| k.to_owned()).collect();
        assert_eq!(keys, vec!["user_id", "session.id"]);
    }

    #[test]
    fn header_round_trip() {
        let baggage: Baggage = [
            ("user_id", "u-123"),
            ("session.id", "abc"),
            ("note", "two words"),
        ]
        .into_iter()
        .collect();

        let parsed = Baggage::from_header(&baggage.to_header());
        assert_eq!(parsed, baggage);
    }

    #[test]
    fn escapes_delimiters() {
        let baggage: Baggage = [("k", "a,b=c;d")].into_iter().collect();
        let header = baggage.to_header();
        assert_eq!(header, "k=a%2Cb%3Dc%3Bd");
        assert_eq!(Baggage::from_header(&header).get("k"), Some("a,b=c;d"));
    }

    #[rustfmt::skip]
    fn tolerant_parse_data() -> Vec<(&'static str, Vec<(&'static str, &'static str)>)> {
        vec![
            ("key1=val1,key2=val2", vec![("key1", "val1"), ("key2", "val2")]),
            ("key1 =   val1,  key2 =val2   ", vec![("key1", "val1"), ("key2", "val2")]),
            ("key1=val1,malformed", vec![("key1", "val1")]),
            ("=nokey,key2=val2", vec![("key2", "val2")]),
            ("key1=val1;metadata=x,key2=val2", vec![("key1", "val1"), ("key2", "val2")]),
            ("key1=val1,,key2=val2", vec![("key1", "val1"), ("key2", "val2")]),
            ("", vec![]),
            ("key=%ZZ", vec![("key", "%ZZ")]),
        ]
    }

    #[test]
    fn tolerant_parse() {
        for (header, expected) in tolerant_parse_data() {
            let expected: Baggage = expected.into_iter().collect();
            assert_eq!(Baggage::from_header(header), expected, "header: {header:?}");
        }
    }
}
