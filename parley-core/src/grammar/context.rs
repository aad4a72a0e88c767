//! Serialized shape of a context document.
//!
//! ```json
//! { "context": {
//!     "name": "lights",
//!     "expressions": { "changeColor": ["(turn, make) the lights $color:color"] },
//!     "slots": { "color": { "blue": ["azure"], "red": [] } } } }
//! ```
//!
//! JSON objects keep their document order: intents and slot values are
//! declared in the order they are written, which drives tie-breaking.

use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ParleyError, Result};

/// Top-level context document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextDocument {
    pub context: ContextBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextBody {
    #[serde(default)]
    pub name: String,
    /// Intent name → expression sources.
    pub expressions: OrderedMap<Vec<String>>,
    /// Slot type name → values.
    #[serde(default)]
    pub slots: OrderedMap<SlotValues>,
}

/// Values of one slot type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotValues {
    /// Each value is its own only surface form.
    List(Vec<String>),
    /// Canonical value → additional surface forms.
    Synonyms(OrderedMap<Vec<String>>),
}

impl SlotValues {
    /// Flatten into `(canonical, synonyms)` pairs in declaration order.
    pub fn entries(&self) -> Vec<(&str, &[String])> {
        match self {
            SlotValues::List(values) => values.iter().map(|v| (v.as_str(), &[][..])).collect(),
            SlotValues::Synonyms(map) => map
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_slice()))
                .collect(),
        }
    }
}

impl ContextDocument {
    /// Parse a UTF-8 JSON context blob.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| ParleyError::MalformedContext(format!("invalid context document: {e}")))
    }
}

/// A string-keyed map that preserves document order and rejects duplicate keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedMap<T>(pub Vec<(String, T)>);

impl<T> OrderedMap<T> {
    pub fn iter(&self) -> impl Iterator<Item = (&String, &T)> {
        self.0.iter().map(|(k, v)| (k, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<T> Default for OrderedMap<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T: Serialize> Serialize for OrderedMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for OrderedMap<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedVisitor<T> {
            type Value = OrderedMap<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries: Vec<(String, T)> = Vec::new();
                while let Some((key, value)) = access.next_entry::<String, T>()? {
                    if entries.iter().any(|(k, _)| *k == key) {
                        return Err(serde::de::Error::custom(format!("duplicate key `{key}`")));
                    }
                    entries.push((key, value));
                }
                Ok(OrderedMap(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}
