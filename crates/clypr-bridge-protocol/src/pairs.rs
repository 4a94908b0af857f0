//! Lenient decoding helpers for backend fields.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

/// A key/value list as the backend may send it.
#[derive(Deserialize)]
#[serde(untagged)]
enum PairsRepr {
    /// `[["key", "value"], ...]`
    Tuples(Vec<(String, String)>),
    /// `[{"key": "...", "value": "..."}, ...]`
    Entries(Vec<Entry>),
    /// `{"key": "value", ...}`
    Map(BTreeMap<String, String>),
    /// `null`
    Null(()),
}

#[derive(Deserialize)]
struct Entry {
    key: String,
    value: String,
}

/// Decode an ordered key/value list from any of the accepted shapes.
pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match PairsRepr::deserialize(deserializer)? {
        PairsRepr::Tuples(pairs) => pairs,
        PairsRepr::Entries(entries) => entries.into_iter().map(|e| (e.key, e.value)).collect(),
        PairsRepr::Map(map) => map.into_iter().collect(),
        PairsRepr::Null(()) => Vec::new(),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NatRepr {
    Number(u64),
    Text(String),
}

impl NatRepr {
    fn into_nat<T, E>(self) -> Result<T, E>
    where
        T: TryFrom<u64>,
        T::Error: std::fmt::Display,
        E: serde::de::Error,
    {
        let n = match self {
            Self::Number(n) => n,
            Self::Text(s) => s.trim().replace('_', "").parse().map_err(E::custom)?,
        };
        T::try_from(n).map_err(E::custom)
    }
}

/// Decode a candid `Nat` that may arrive as a JSON number or a decimal string.
pub(crate) fn nat<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
    T::Error: std::fmt::Display,
{
    NatRepr::deserialize(deserializer)?.into_nat()
}

/// [`nat`] for optional fields; `null` decodes to `None`.
pub(crate) fn opt_nat<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
    T::Error: std::fmt::Display,
{
    Option::<NatRepr>::deserialize(deserializer)?
        .map(NatRepr::into_nat)
        .transpose()
}

#[derive(Deserialize)]
#[serde(untagged)]
enum IdRepr {
    Number(i64),
    Text(String),
}

/// Decode an optional identifier that may be numeric (Telegram chat ids) or text.
pub(crate) fn opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        Option::<IdRepr>::deserialize(deserializer)?.map(|id| match id {
            IdRepr::Number(n) => n.to_string(),
            IdRepr::Text(s) => s,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Holder {
        #[serde(default, deserialize_with = "deserialize")]
        pairs: Vec<(String, String)>,
        #[serde(default, deserialize_with = "nat")]
        n: u64,
        #[serde(default, deserialize_with = "opt_nat")]
        small: Option<u8>,
    }

    fn pairs_of(json: &str) -> Vec<(String, String)> {
        serde_json::from_str::<Holder>(json).unwrap().pairs
    }

    #[test]
    fn pairs_accept_tuples_entries_and_maps() {
        let expected = vec![("a".to_string(), "1".to_string())];
        assert_eq!(pairs_of(r#"{"pairs": [["a", "1"]]}"#), expected);
        assert_eq!(pairs_of(r#"{"pairs": [{"key": "a", "value": "1"}]}"#), expected);
        assert_eq!(pairs_of(r#"{"pairs": {"a": "1"}}"#), expected);
        assert!(pairs_of(r#"{"pairs": null}"#).is_empty());
        assert!(pairs_of("{}").is_empty());
    }

    #[test]
    fn nat_accepts_numbers_and_strings() {
        let h: Holder = serde_json::from_str(r#"{"n": 42}"#).unwrap();
        assert_eq!(h.n, 42);
        let h: Holder = serde_json::from_str(r#"{"n": "1_700_000_000_000_000_000"}"#).unwrap();
        assert_eq!(h.n, 1_700_000_000_000_000_000);
        assert!(serde_json::from_str::<Holder>(r#"{"n": "soon"}"#).is_err());
    }

    #[test]
    fn opt_nat_handles_null_strings_and_range() {
        let h: Holder = serde_json::from_str(r#"{"small": "7"}"#).unwrap();
        assert_eq!(h.small, Some(7));
        let h: Holder = serde_json::from_str(r#"{"small": null}"#).unwrap();
        assert_eq!(h.small, None);
        let h: Holder = serde_json::from_str("{}").unwrap();
        assert_eq!(h.small, None);
        assert!(serde_json::from_str::<Holder>(r#"{"small": 300}"#).is_err());
    }
}
