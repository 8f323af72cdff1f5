use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value stored in a session.
///
/// Session data is persisted as MessagePack, so values are restricted to the types that
/// survive a round trip through it unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SessionValue {
    /// The absence of a value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed integer.
    Integer(i64),
    /// An unsigned integer too large for [`SessionValue::Integer`].
    /// Smaller unsigned integers decode as `Integer`.
    UInteger(u64),
    /// A floating point number.
    Float(f64),
    /// A UTF-8 string.
    String(String),
    /// An ordered list of values.
    List(Vec<SessionValue>),
    /// A map from string keys to values.
    Map(BTreeMap<String, SessionValue>),
}

impl SessionValue {
    /// Returns true if this is [`SessionValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the integer, if this is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the integer, if this is a non-negative one.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Self::Integer(value) => u64::try_from(*value).ok(),
            Self::UInteger(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the number as float, if this is an integer or a float.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(value) => Some(*value as f64),
            Self::UInteger(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Returns the string slice, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the list elements, if this is a list.
    pub fn as_list(&self) -> Option<&[SessionValue]> {
        match self {
            Self::List(values) => Some(values),
            _ => None,
        }
    }

    /// Returns the map, if this is a map.
    pub fn as_map(&self) -> Option<&BTreeMap<String, SessionValue>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl Default for SessionValue {
    fn default() -> Self {
        Self::Null
    }
}

impl From<()> for SessionValue {
    fn from((): ()) -> Self {
        Self::Null
    }
}

impl From<bool> for SessionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! from_integer {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for SessionValue {
                fn from(value: $ty) -> Self {
                    Self::Integer(value.into())
                }
            }
        )*
    };
}

from_integer!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for SessionValue {
    fn from(value: u64) -> Self {
        i64::try_from(value).map_or(Self::UInteger(value), Self::Integer)
    }
}

impl From<f64> for SessionValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for SessionValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for SessionValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl<T: Into<SessionValue>> From<Vec<T>> for SessionValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<SessionValue>> From<Option<T>> for SessionValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl From<BTreeMap<String, SessionValue>> for SessionValue {
    fn from(map: BTreeMap<String, SessionValue>) -> Self {
        Self::Map(map)
    }
}
