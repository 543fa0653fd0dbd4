use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::{DssError, DssResult};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Id(pub [u8; 16]);

impl Id {
    pub fn new() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    pub fn from_uuid_str(value: &str) -> DssResult<Self> {
        let uuid = Uuid::parse_str(value)
            .map_err(|err| DssError::bad_request(format!("invalid uuid '{value}': {err}")))?;
        Ok(Self(*uuid.as_bytes()))
    }

    pub fn to_uuid_string(self) -> String {
        Uuid::from_bytes(self.0).to_string()
    }

    pub fn as_uuid(self) -> Uuid {
        Uuid::from_bytes(self.0)
    }

    pub fn as_bytes(self) -> [u8; 16] {
        self.0
    }

    pub fn as_vec(self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uuid = Uuid::from_bytes(self.0);
        write!(f, "{uuid}")
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_uuid_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Uuid::parse_str(&value)
            .map(|uuid| Id::from_bytes(*uuid.as_bytes()))
            .map_err(|_| serde::de::Error::custom("invalid Id string"))
    }
}

/// Identifier of an operational intent, constraint or service area.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct EntityId(pub Id);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubscriptionId(pub Id);

macro_rules! id_wrapper {
    ($name:ident) => {
        impl $name {
            pub fn new() -> Self {
                Self(Id::new())
            }

            pub fn parse(value: &str) -> DssResult<Self> {
                Ok(Self(Id::from_uuid_str(value)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                self.0.serialize(serializer)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                Ok(Self(Id::deserialize(deserializer)?))
            }
        }
    };
}

id_wrapper!(EntityId);
id_wrapper!(SubscriptionId);

/// Identity of the operator that owns a record, as asserted by the auth layer.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManagerId(pub String);

impl ManagerId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ManagerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityId, Id};

    #[test]
    fn id_roundtrips_uuid() {
        let id = Id::new();
        let parsed = Id::from_uuid_str(&id.to_uuid_string()).expect("uuid parse");
        assert_eq!(parsed, id);
    }

    #[test]
    fn rejects_invalid_strings() {
        assert!(Id::from_uuid_str("not-a-uuid").is_err());
        assert!(EntityId::parse("1234").is_err());
    }

    #[test]
    fn wrapper_serializes_as_plain_uuid() {
        let id = EntityId::new();
        let encoded = serde_json::to_string(&id).expect("encode");
        assert_eq!(encoded, format!("\"{id}\""));
        let decoded: EntityId = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, id);
    }
}
