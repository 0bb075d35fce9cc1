//! 20-byte account addresses

use std::fmt;
use std::str::FromStr;

use crate::ledger::EntityId;

use super::WalletError;

/// An EVM account or contract address
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// Long-zero address of a ledger entity: shard (4 bytes), realm (8), num (8)
    pub fn from_entity(id: EntityId) -> Self {
        let mut out = [0u8; 20];
        out[..4].copy_from_slice(&(id.shard as u32).to_be_bytes());
        out[4..12].copy_from_slice(&id.realm.to_be_bytes());
        out[12..].copy_from_slice(&id.num.to_be_bytes());
        Address(out)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || WalletError::InvalidAddress(s.to_string());
        let digits = s
            .trim()
            .strip_prefix("0x")
            .or_else(|| s.trim().strip_prefix("0X"))
            .ok_or_else(invalid)?;
        let bytes = hex::decode(digits).map_err(|_| invalid())?;
        let arr: [u8; 20] = bytes.as_slice().try_into().map_err(|_| invalid())?;
        Ok(Address(arr))
    }
}

impl serde::Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let addr: Address = "0x00000000000000000000000000000000004C5748".parse().unwrap();
        assert_eq!(addr.to_string(), "0x00000000000000000000000000000000004c5748");
    }

    #[test]
    fn test_rejects_bad_addresses() {
        for bad in ["", "0x", "00000000000000000000000000000000004c5748", "0x1234", "0xzz00000000000000000000000000000000004c57"] {
            assert!(bad.parse::<Address>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_long_zero_form() {
        let addr = Address::from_entity(EntityId::new(0, 0, 4_994_888));
        assert_eq!(addr.to_string(), "0x00000000000000000000000000000000004c3748");
    }
}
