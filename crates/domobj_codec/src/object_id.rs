//! Object identity.

use crate::error::{CodecError, CodecResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of a mapped class.
///
/// Class ids are the names under which classes are registered in the
/// mapping configuration. They are cheap to clone and compare.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassId(String);

impl ClassId {
    /// Creates a class id from a name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the class name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({})", self.0)
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ClassId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ClassId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// The storage-level key of a persistent object.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum StorageKey {
    /// A globally unique key.
    Guid(Uuid),
    /// An integer key.
    Integer(i64),
    /// A textual key.
    Text(String),
}

impl StorageKey {
    /// Creates a new random GUID key.
    #[must_use]
    pub fn new_guid() -> Self {
        Self::Guid(Uuid::new_v4())
    }

    /// Name of the key kind as used in the textual object id form.
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Guid(_) => "Guid",
            Self::Integer(_) => "Int64",
            Self::Text(_) => "String",
        }
    }

    fn parse(kind: &str, value: &str) -> Result<Self, String> {
        match kind {
            "Guid" => Uuid::parse_str(value)
                .map(Self::Guid)
                .map_err(|e| e.to_string()),
            "Int64" => value
                .parse::<i64>()
                .map(Self::Integer)
                .map_err(|e| e.to_string()),
            "String" => Ok(Self::Text(value.to_string())),
            other => Err(format!("unknown key kind '{other}'")),
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guid(g) => write!(f, "{g}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Unique identifier of a persistent domain object.
///
/// An object id combines the class the object belongs to with its storage
/// key. Two ids are equal iff both parts are equal. Object ids are immutable
/// and are used as map keys throughout the transaction core.
///
/// The textual form is `Class|value|Kind`, e.g.
/// `Order|5682f032-2f0b-494b-a31c-c97f02b89c36|Guid`.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId {
    class_id: ClassId,
    value: StorageKey,
}

impl ObjectId {
    /// Creates an object id.
    #[must_use]
    pub fn new(class_id: impl Into<ClassId>, value: StorageKey) -> Self {
        Self {
            class_id: class_id.into(),
            value,
        }
    }

    /// Creates an object id with a fresh GUID key.
    #[must_use]
    pub fn new_guid(class_id: impl Into<ClassId>) -> Self {
        Self::new(class_id, StorageKey::new_guid())
    }

    /// Returns the class the object belongs to.
    #[inline]
    #[must_use]
    pub fn class_id(&self) -> &ClassId {
        &self.class_id
    }

    /// Returns the storage key.
    #[inline]
    #[must_use]
    pub fn value(&self) -> &StorageKey {
        &self.value
    }

    /// Parses the textual `Class|value|Kind` form.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidObjectId`] when the input is malformed.
    pub fn parse(text: &str) -> CodecResult<Self> {
        let first = text
            .find('|')
            .ok_or_else(|| CodecError::invalid_object_id(text, "missing class delimiter"))?;
        let last = text
            .rfind('|')
            .filter(|&last| last > first)
            .ok_or_else(|| CodecError::invalid_object_id(text, "missing key kind delimiter"))?;

        let class = &text[..first];
        if class.is_empty() {
            return Err(CodecError::invalid_object_id(text, "class id is empty"));
        }
        let value = &text[first + 1..last];
        let kind = &text[last + 1..];
        let key = StorageKey::parse(kind, value)
            .map_err(|message| CodecError::invalid_object_id(text, message))?;
        Ok(Self::new(class, key))
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({self})")
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.class_id,
            self.value,
            self.value.kind_name()
        )
    }
}

impl FromStr for ObjectId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_value() {
        let a = ObjectId::new("Order", StorageKey::Integer(1));
        let b = ObjectId::new("Order", StorageKey::Integer(1));
        let c = ObjectId::new("OrderItem", StorageKey::Integer(1));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn new_guid_is_unique() {
        assert_ne!(ObjectId::new_guid("Order"), ObjectId::new_guid("Order"));
    }

    #[test]
    fn display_and_parse() {
        let id = ObjectId::new("Order", StorageKey::Integer(42));
        assert_eq!(id.to_string(), "Order|42|Int64");
        assert_eq!(ObjectId::parse("Order|42|Int64").unwrap(), id);

        let guid = ObjectId::new_guid("Customer");
        assert_eq!(guid.to_string().parse::<ObjectId>().unwrap(), guid);
    }

    #[test]
    fn text_keys_may_contain_delimiters() {
        let id = ObjectId::new("Official", StorageKey::Text("a|b".to_string()));
        assert_eq!(ObjectId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert!(ObjectId::parse("Order").is_err());
        assert!(ObjectId::parse("Order|1").is_err());
        assert!(ObjectId::parse("|1|Int64").is_err());
        assert!(ObjectId::parse("Order|x|Int64").is_err());
        assert!(ObjectId::parse("Order|1|Decimal").is_err());
    }
}
