use crate::Error;
use std::fmt;
use std::str::FromStr;

/// A stable identifier for one device of one account.
///
/// The canonical string form is `"<owner>.<device>"` and doubles as the
/// store key for session records.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProtocolAddress {
    owner: String,
    device_id: u32,
}

impl ProtocolAddress {
    /// Creates an address, rejecting owners that would collide with the
    /// device separator in the encoded form.
    pub fn new(owner: impl Into<String>, device_id: u32) -> Result<Self, Error> {
        let owner = owner.into();
        if owner.is_empty() {
            return Err(Error::InvalidAddress("empty owner".to_string()));
        }
        if owner.contains('.') {
            return Err(Error::InvalidAddress(
                "owner contains the device separator".to_string(),
            ));
        }

        Ok(Self { owner, device_id })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }
}

impl fmt::Display for ProtocolAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.owner, self.device_id)
    }
}

impl FromStr for ProtocolAddress {
    type Err = Error;

    /// Parses the canonical `"<owner>.<device>"` form.
    ///
    /// Segments past the second are ignored; some historical encodings
    /// appended extra data after the device index.
    fn from_str(encoded: &str) -> Result<Self, Error> {
        let mut parts = encoded.splitn(3, '.');
        let owner = parts
            .next()
            .filter(|owner| !owner.is_empty())
            .ok_or_else(|| Error::InvalidAddress(encoded.to_string()))?;
        let device_id = parts
            .next()
            .and_then(|device| device.parse::<u32>().ok())
            .ok_or_else(|| Error::InvalidAddress(encoded.to_string()))?;

        Self::new(owner, device_id)
    }
}

/// Identifies one sender-key chain: a group plus the sending device.
///
/// The store key form is `"<groupId>::<owner>.<device>"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SenderKeyName {
    group_id: String,
    sender: ProtocolAddress,
}

impl SenderKeyName {
    pub fn new(group_id: impl Into<String>, sender: ProtocolAddress) -> Result<Self, Error> {
        let group_id = group_id.into();
        if group_id.is_empty() {
            return Err(Error::InvalidAddress("empty group id".to_string()));
        }

        Ok(Self { group_id, sender })
    }

    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn sender(&self) -> &ProtocolAddress {
        &self.sender
    }
}

impl fmt::Display for SenderKeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.group_id, self.sender)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_round_trip() {
        let address = ProtocolAddress::new("alice", 1).unwrap();
        assert_eq!(address.to_string(), "alice.1");

        let parsed: ProtocolAddress = "alice.1".parse().unwrap();
        assert_eq!(parsed, address);
    }

    #[test]
    fn test_device_serializes_without_leading_zeros() {
        let address = ProtocolAddress::new("bob", 7).unwrap();
        assert_eq!(address.to_string(), "bob.7");

        // Historical encodings with leading zeros still parse to the same value.
        let parsed: ProtocolAddress = "bob.07".parse().unwrap();
        assert_eq!(parsed, address);
    }

    #[test]
    fn test_rejects_bad_owner() {
        assert!(ProtocolAddress::new("", 1).is_err());
        assert!(ProtocolAddress::new("a.b", 1).is_err());
    }

    #[test]
    fn test_rejects_missing_or_bad_device() {
        assert!("alice".parse::<ProtocolAddress>().is_err());
        assert!("alice.".parse::<ProtocolAddress>().is_err());
        assert!("alice.one".parse::<ProtocolAddress>().is_err());
        assert!(".1".parse::<ProtocolAddress>().is_err());
    }

    #[test]
    fn test_trailing_segment_ignored() {
        let parsed: ProtocolAddress = "alice.1.extra".parse().unwrap();
        assert_eq!(parsed.owner(), "alice");
        assert_eq!(parsed.device_id(), 1);
    }

    #[test]
    fn test_sender_key_name_encoding() {
        let sender = ProtocolAddress::new("carol", 2).unwrap();
        let name = SenderKeyName::new("team", sender).unwrap();
        assert_eq!(name.to_string(), "team::carol.2");
    }

    #[test]
    fn test_sender_key_name_rejects_empty_group() {
        let sender = ProtocolAddress::new("carol", 2).unwrap();
        assert!(SenderKeyName::new("", sender).is_err());
    }
}
