//! `shard.realm.num` entity identifiers

use std::fmt;
use std::str::FromStr;

use super::LedgerError;

/// A ledger entity address in `shard.realm.num` form
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct EntityId {
    /// Shard number
    pub shard: u64,
    /// Realm number
    pub realm: u64,
    /// Entity number within the realm
    pub num: u64,
}

impl EntityId {
    /// Create an entity id
    pub const fn new(shard: u64, realm: u64, num: u64) -> Self {
        EntityId { shard, realm, num }
    }

    /// Bytes used in canonical transaction encodings
    pub fn to_le_bytes(&self) -> [u8; 24] {
        let mut out = [0u8; 24];
        out[..8].copy_from_slice(&self.shard.to_le_bytes());
        out[8..16].copy_from_slice(&self.realm.to_le_bytes());
        out[16..].copy_from_slice(&self.num.to_le_bytes());
        out
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.shard, self.realm, self.num)
    }
}

impl FromStr for EntityId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LedgerError::InvalidEntityId(s.to_string());

        let mut parts = s.trim().split('.');
        let mut next = || -> Result<u64, LedgerError> {
            parts
                .next()
                .filter(|p| !p.is_empty())
                .ok_or_else(invalid)?
                .parse()
                .map_err(|_| invalid())
        };

        let id = EntityId::new(next()?, next()?, next()?);
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(id)
    }
}

macro_rules! entity_kind {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub EntityId);

        impl $name {
            /// Create from components
            pub const fn new(shard: u64, realm: u64, num: u64) -> Self {
                $name(EntityId::new(shard, realm, num))
            }

            /// Underlying entity id
            pub fn entity(&self) -> EntityId {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl FromStr for $name {
            type Err = LedgerError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.parse().map($name)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.collect_str(&self.0)
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

entity_kind!(
    /// A ledger account (payer of operator transactions)
    AccountId
);
entity_kind!(
    /// A consensus topic
    TopicId
);
entity_kind!(
    /// A file on the file service
    FileId
);
entity_kind!(
    /// A deployed contract instance
    ContractId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_topic_id() {
        let topic: TopicId = "0.0.4992822".parse().unwrap();
        assert_eq!(topic, TopicId::new(0, 0, 4992822));
        assert_eq!(topic.to_string(), "0.0.4992822");
    }

    #[test]
    fn test_parse_rejects_bad_forms() {
        for bad in ["", "0.0", "0.0.1.2", "a.b.c", "0..1", "-1.0.1", "0.0.1 2"] {
            assert!(bad.parse::<EntityId>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_serde_as_string() {
        let account = AccountId::new(0, 0, 2);
        let json = serde_json::to_string(&account).unwrap();
        assert_eq!(json, "\"0.0.2\"");
        let back: AccountId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, account);
        assert!(serde_json::from_str::<AccountId>("\"nope\"").is_err());
    }
}
