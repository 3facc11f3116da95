use std::fmt;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// An entity type that repositories store and the cache can snapshot.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Type name used as the cache namespace, e.g. `"Customer"`.
    fn entity_type() -> &'static str;
}

/// One component of a primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Int(i64),
    Text(String),
}

impl KeyValue {
    /// Converts a JSON scalar into a key component.
    ///
    /// Integers and strings are accepted; anything else is not a usable key.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::Text(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for KeyValue {
    fn from(value: i32) -> Self {
        Self::Int(value.into())
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Uuid> for KeyValue {
    fn from(value: Uuid) -> Self {
        Self::Text(value.to_string())
    }
}

/// Primary-key identity of an entity; composite keys hold several components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(Vec<KeyValue>);

impl EntityId {
    /// Separator between components of a composite key.
    pub const SEPARATOR: char = ',';

    pub fn new(values: Vec<KeyValue>) -> Self {
        Self(values)
    }

    pub fn values(&self) -> &[KeyValue] {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", Self::SEPARATOR)?;
            }
            write!(f, "{value}")?;
        }
        Ok(())
    }
}

macro_rules! impl_from_for_entity_id {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for EntityId {
                fn from(value: $ty) -> Self {
                    Self(vec![value.into()])
                }
            }
        )*
    };
}

impl_from_for_entity_id!(KeyValue, i64, i32, &str, String, Uuid);

impl From<Vec<KeyValue>> for EntityId {
    fn from(values: Vec<KeyValue>) -> Self {
        Self(values)
    }
}
