use std::{collections::HashSet, fmt};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{
    de::{self, DeserializeOwned, Visitor},
    Deserialize, Deserializer, Serialize,
};
use uuid::Uuid;

use crate::error::FoodError;

lazy_static! {
    static ref UPC_RE: Regex = Regex::new(r"^[0-9]+$").unwrap();
}

/// Universal product code kept as the exact digit string the client sent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Upc(String);

impl Upc {
    pub fn parse(raw: &str) -> Result<Self, FoodError> {
        let s = raw.trim();
        if !UPC_RE.is_match(s) {
            return Err(FoodError::validation("UPC must contain digits only (0-9)"));
        }
        Ok(Self(s.to_owned()))
    }

    /// Rebuilds a UPC read back from storage, where it was validated on the way in.
    pub(crate) fn from_stored(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Upc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Only JSON strings are accepted: a numeric UPC has already lost its leading zeros.
impl<'de> Deserialize<'de> for Upc {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        struct UpcVisitor;

        impl<'de> Visitor<'de> for UpcVisitor {
            type Value = Upc;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a UPC as a quoted string of digits")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Upc, E> {
                Upc::parse(v).map_err(E::custom)
            }
        }

        d.deserialize_str(UpcVisitor)
    }
}

/// A field of a partial update: left out, explicitly `null`, or given a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Patch<T> {
    Absent,
    Null,
    Value(T),
}

impl<T> Default for Patch<T> {
    fn default() -> Self {
        Patch::Absent
    }
}

// Missing keys never reach this impl; they fall back to `Default` (Absent).
impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(d).map(|v| v.map_or(Patch::Null, Patch::Value))
    }
}

/// Trimmed, non-empty strings, unique ignoring case, first spelling kept.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct StringList(Vec<String>);

impl StringList {
    pub fn normalized<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for item in items {
            let s = item.as_ref().trim();
            if s.is_empty() || !seen.insert(s.to_lowercase()) {
                continue;
            }
            out.push(s.to_owned());
        }
        Self(out)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl<'de> Deserialize<'de> for StringList {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum OneOrMany {
            One(String),
            Many(Vec<String>),
        }

        Ok(match OneOrMany::deserialize(d)? {
            OneOrMany::One(s) => StringList::normalized([s]),
            OneOrMany::Many(v) => StringList::normalized(v),
        })
    }
}

/// Case-insensitive union keeping the order of `existing` followed by new entries.
pub fn union_ci(existing: &[String], incoming: &[String]) -> Vec<String> {
    StringList::normalized(existing.iter().chain(incoming)).into_vec()
}

/// Path ids arrive as text so that a malformed id is reported like any other bad input.
pub fn parse_id(raw: &str) -> Result<Uuid, FoodError> {
    Uuid::parse_str(raw.trim()).map_err(|_| FoodError::validation(format!("invalid id: {raw}")))
}

/// Decodes a raw JSON body so that any shape problem is reported as a validation error.
pub fn from_json<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, FoodError> {
    serde_json::from_value(value).map_err(|e| FoodError::validation(e.to_string()))
}
