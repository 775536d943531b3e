// Path: crates/types/src/ids.rs

//! Opaque identifier newtypes used across the CSP.
//!
//! String-backed identifiers (`OrgAddress`, `MemberId`, `CensusId`, `GroupId`,
//! `BundleId`) are owned by the admin backend and treated as opaque here.
//! Byte-backed identifiers (`ProcessId`, `TokenId`, `JobId`) serialize as
//! lowercase hex so they survive JSON and URL transport unchanged.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Serialize, Deserialize, Clone, PartialEq, Eq, PartialOrd, Ord, Debug, Default, Hash,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// The on-chain address of an organization, used to scope members,
    /// censuses, and hashed contact data to their owning organization.
    OrgAddress
);
string_id!(
    /// The internal, stable identifier of an organization member.
    MemberId
);
string_id!(
    /// The identifier of a census.
    CensusId
);
string_id!(
    /// The identifier of a member group within an organization.
    GroupId
);
string_id!(
    /// The identifier of a process bundle.
    BundleId
);

/// The identifier of a voting process on the external chain.
///
/// Process identifiers are raw bytes; they are concatenated with the
/// voter-chosen payload when building the message the CSP signs.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
pub struct ProcessId(pub Vec<u8>);

impl ProcessId {
    /// Returns the raw process identifier bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&[u8]> for ProcessId {
    fn from(b: &[u8]) -> Self {
        Self(b.to_vec())
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

impl fmt::Debug for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProcessId({})", hex::encode(&self.0))
    }
}

impl FromStr for ProcessId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(hex::decode(s.trim_start_matches("0x"))?))
    }
}

impl Serialize for ProcessId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for ProcessId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

macro_rules! bytes16_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash)]
        pub struct $name(pub [u8; 16]);

        impl $name {
            /// Returns the raw identifier bytes.
            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; 16]> for $name {
            fn from(b: [u8; 16]) -> Self {
                Self(b)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), hex::encode(self.0))
            }
        }

        impl FromStr for $name {
            type Err = hex::FromHexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = hex::decode(s)?;
                let arr: [u8; 16] = raw
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&hex::encode(self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

bytes16_id!(
    /// An opaque 128-bit authentication token handle.
    TokenId
);
bytes16_id!(
    /// The identifier of a background job.
    JobId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn process_id_hex_roundtrip() {
        let id = ProcessId(vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(id.to_string(), "deadbeef");
        assert_eq!("deadbeef".parse::<ProcessId>().unwrap(), id);
        assert_eq!("0xdeadbeef".parse::<ProcessId>().unwrap(), id);

        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"deadbeef\"");
        assert_eq!(serde_json::from_str::<ProcessId>(&json).unwrap(), id);
    }

    #[test]
    fn token_id_rejects_wrong_length() {
        assert!("deadbeef".parse::<TokenId>().is_err());
        let id = TokenId([7u8; 16]);
        assert_eq!(id.to_string().parse::<TokenId>().unwrap(), id);
    }

    #[test]
    fn string_ids_are_transparent_in_json() {
        let org = OrgAddress::from("0x1234");
        assert_eq!(serde_json::to_string(&org).unwrap(), "\"0x1234\"");
    }
}
