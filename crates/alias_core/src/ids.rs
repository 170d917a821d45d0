use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::{AliasError, AliasResult};

/// 128-bit identifier. Fresh ids are ULIDs so they sort by creation time;
/// the canonical text form is the hyphenated uuid.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Id(pub [u8; 16]);

impl Id {
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_bytes())
    }

    pub fn parse(value: &str) -> AliasResult<Self> {
        if let Ok(uuid) = Uuid::parse_str(value) {
            return Ok(Self(*uuid.as_bytes()));
        }
        let ulid = ulid::Ulid::from_string(value)
            .map_err(|err| AliasError::invalid(format!("invalid id '{value}': {err}")))?;
        Ok(Self(ulid.to_bytes()))
    }

    pub fn to_uuid_string(self) -> String {
        Uuid::from_bytes(self.0).to_string()
    }

    pub fn to_ulid_string(self) -> String {
        ulid::Ulid::from_bytes(self.0).to_string()
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

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let buf: [u8; 16] = bytes.try_into().ok()?;
        Some(Self(buf))
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Uuid::from_bytes(self.0))
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
        Id::parse(&value).map_err(serde::de::Error::custom)
    }
}

/// Store-assigned identifier of an alias record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct AliasId(pub Id);

impl AliasId {
    pub fn new() -> Self {
        Self(Id::new())
    }
}

impl Default for AliasId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AliasId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Serialize for AliasId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for AliasId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Self(Id::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::{AliasId, Id};

    #[test]
    fn id_parses_uuid_and_ulid_forms() {
        let id = Id::new();
        let from_uuid = Id::parse(&id.to_uuid_string()).expect("uuid parse");
        let from_ulid = Id::parse(&id.to_ulid_string()).expect("ulid parse");
        assert_eq!(from_uuid, id);
        assert_eq!(from_ulid, id);
    }

    #[test]
    fn id_rejects_invalid_strings() {
        assert!(Id::parse("not-an-id").is_err());
        assert!(Id::from_slice(&[0u8; 4]).is_none());
    }

    #[test]
    fn alias_id_serializes_as_uuid_string() {
        let id = AliasId::new();
        let encoded = serde_json::to_string(&id).expect("encode");
        assert_eq!(encoded, format!("\"{}\"", id.0.to_uuid_string()));
        let decoded: AliasId = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, id);
    }
}
