use crate::{Error, IdentityKey, X25519PublicKey};
use ed25519_dalek::Signature;
use ed25519_dalek::ed25519::SignatureBytes;

/// Wire format version carried in the first byte of every message.
pub const MESSAGE_VERSION: u8 = 1;

const SIGNAL_HEADER_LEN: usize = 1 + 32 + 4 + 4;
const PRE_KEY_HEADER_LEN: usize = 1 + 4 + 1 + 4 + 4 + 32 + 64;
const SENDER_KEY_HEADER_LEN: usize = 1 + 4 + 4;
const SIGNATURE_LEN: usize = 64;

fn check_version(bytes: &[u8], what: &str) -> Result<(), Error> {
    match bytes.first() {
        Some(&MESSAGE_VERSION) => Ok(()),
        Some(version) => Err(Error::MalformedMessage(format!(
            "unsupported {what} version {version}"
        ))),
        None => Err(Error::MalformedMessage(format!("empty {what}"))),
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[..4]);
    u32::from_be_bytes(buf)
}

fn read_key(bytes: &[u8]) -> [u8; 32] {
    let mut buf = [0u8; 32];
    buf.copy_from_slice(&bytes[..32]);
    buf
}

/// Discriminant for the two pairwise output shapes plus the group messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CiphertextMessageType {
    /// An ordinary ratchet message; requires an established session.
    Whisper = 2,
    /// Carries enough agreement material for the receiver to bootstrap.
    PreKey = 3,
    /// A signed group message on a sender-key chain.
    SenderKey = 4,
    /// Out-of-band material installing a sender-key chain.
    SenderKeyDistribution = 5,
}

/// An ordinary double-ratchet message.
///
/// Layout: version, ratchet public key, counter, previous chain length,
/// AEAD ciphertext. The header doubles as associated data, so any
/// tampering with it fails authentication.
#[derive(Clone, Debug)]
pub struct SignalMessage {
    pub ratchet_key: X25519PublicKey,
    pub counter: u32,
    pub previous_counter: u32,
    pub ciphertext: Vec<u8>,
}

impl SignalMessage {
    pub(crate) fn header_bytes(&self) -> [u8; SIGNAL_HEADER_LEN] {
        let mut bytes = [0u8; SIGNAL_HEADER_LEN];
        bytes[0] = MESSAGE_VERSION;
        bytes[1..33].copy_from_slice(self.ratchet_key.as_bytes());
        bytes[33..37].copy_from_slice(&self.counter.to_be_bytes());
        bytes[37..41].copy_from_slice(&self.previous_counter.to_be_bytes());

        bytes
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SIGNAL_HEADER_LEN + self.ciphertext.len());
        bytes.extend_from_slice(&self.header_bytes());
        bytes.extend_from_slice(&self.ciphertext);

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        check_version(bytes, "message")?;
        if bytes.len() < SIGNAL_HEADER_LEN {
            return Err(Error::MalformedMessage("truncated message".to_string()));
        }

        Ok(Self {
            ratchet_key: X25519PublicKey::from(read_key(&bytes[1..33])),
            counter: read_u32(&bytes[33..37]),
            previous_counter: read_u32(&bytes[37..41]),
            ciphertext: bytes[SIGNAL_HEADER_LEN..].to_vec(),
        })
    }
}

/// A ratchet message prefixed with the agreement material a receiver needs
/// to reconstruct the session from scratch.
#[derive(Clone, Debug)]
pub struct PreKeySignalMessage {
    pub registration_id: u32,
    pub pre_key_id: Option<u32>,
    pub signed_pre_key_id: u32,
    pub base_key: X25519PublicKey,
    pub identity_key: IdentityKey,
    pub message: SignalMessage,
}

impl PreKeySignalMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let message = self.message.to_bytes();
        let mut bytes = Vec::with_capacity(PRE_KEY_HEADER_LEN + message.len());

        bytes.push(MESSAGE_VERSION);
        bytes.extend_from_slice(&self.registration_id.to_be_bytes());
        bytes.push(u8::from(self.pre_key_id.is_some()));
        bytes.extend_from_slice(&self.pre_key_id.unwrap_or_default().to_be_bytes());
        bytes.extend_from_slice(&self.signed_pre_key_id.to_be_bytes());
        bytes.extend_from_slice(self.base_key.as_bytes());
        bytes.extend_from_slice(&self.identity_key.to_bytes());
        bytes.extend_from_slice(&message);

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        check_version(bytes, "pre-key message")?;
        if bytes.len() < PRE_KEY_HEADER_LEN {
            return Err(Error::MalformedMessage(
                "truncated pre-key message".to_string(),
            ));
        }

        let registration_id = read_u32(&bytes[1..5]);
        let pre_key_id = match bytes[5] {
            0 => None,
            1 => Some(read_u32(&bytes[6..10])),
            flag => {
                return Err(Error::MalformedMessage(format!(
                    "invalid pre-key flag {flag}"
                )));
            }
        };
        let signed_pre_key_id = read_u32(&bytes[10..14]);
        let base_key = X25519PublicKey::from(read_key(&bytes[14..46]));

        let mut identity_bytes = [0u8; 64];
        identity_bytes.copy_from_slice(&bytes[46..110]);
        let identity_key = IdentityKey::from_bytes(&identity_bytes)
            .map_err(|_| Error::MalformedMessage("invalid identity key".to_string()))?;

        Ok(Self {
            registration_id,
            pre_key_id,
            signed_pre_key_id,
            base_key,
            identity_key,
            message: SignalMessage::from_bytes(&bytes[PRE_KEY_HEADER_LEN..])?,
        })
    }
}

/// One message on a group sender-key chain, signed by the chain's
/// dedicated signing key. The signature covers everything before it.
#[derive(Clone)]
pub struct SenderKeyMessage {
    pub chain_id: u32,
    pub iteration: u32,
    pub ciphertext: Vec<u8>,
    pub signature: Signature,
}

impl SenderKeyMessage {
    /// The signed portion: version, chain id, iteration, ciphertext.
    pub(crate) fn signed_payload(
        chain_id: u32,
        iteration: u32,
        ciphertext: &[u8],
    ) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SENDER_KEY_HEADER_LEN + ciphertext.len());
        bytes.push(MESSAGE_VERSION);
        bytes.extend_from_slice(&chain_id.to_be_bytes());
        bytes.extend_from_slice(&iteration.to_be_bytes());
        bytes.extend_from_slice(ciphertext);

        bytes
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Self::signed_payload(self.chain_id, self.iteration, &self.ciphertext);
        bytes.extend_from_slice(&self.signature.to_bytes());

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        check_version(bytes, "sender-key message")?;
        if bytes.len() < SENDER_KEY_HEADER_LEN + SIGNATURE_LEN {
            return Err(Error::MalformedMessage(
                "truncated sender-key message".to_string(),
            ));
        }

        let signature_offset = bytes.len() - SIGNATURE_LEN;
        let mut signature_bytes = [0u8; SIGNATURE_LEN];
        signature_bytes.copy_from_slice(&bytes[signature_offset..]);

        Ok(Self {
            chain_id: read_u32(&bytes[1..5]),
            iteration: read_u32(&bytes[5..9]),
            ciphertext: bytes[SENDER_KEY_HEADER_LEN..signature_offset].to_vec(),
            signature: Signature::from_bytes(&SignatureBytes::from(signature_bytes)),
        })
    }
}

/// Bootstraps a sender-key chain on receivers, delivered out of band.
///
/// Structural validity is all this codec checks; authenticity of the
/// distribution channel is the caller's responsibility.
#[derive(Clone)]
pub struct SenderKeyDistributionMessage {
    pub chain_id: u32,
    pub iteration: u32,
    pub chain_key: [u8; 32],
    pub signing_key: ed25519_dalek::VerifyingKey,
}

impl SenderKeyDistributionMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(SENDER_KEY_HEADER_LEN + 64);
        bytes.push(MESSAGE_VERSION);
        bytes.extend_from_slice(&self.chain_id.to_be_bytes());
        bytes.extend_from_slice(&self.iteration.to_be_bytes());
        bytes.extend_from_slice(&self.chain_key);
        bytes.extend_from_slice(self.signing_key.as_bytes());

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        check_version(bytes, "distribution message")?;
        if bytes.len() < SENDER_KEY_HEADER_LEN + 64 {
            return Err(Error::MalformedMessage(
                "truncated distribution message".to_string(),
            ));
        }

        let signing_key =
            ed25519_dalek::VerifyingKey::from_bytes(&read_key(&bytes[41..73])).map_err(|_| {
                Error::MalformedMessage("invalid sender signing key".to_string())
            })?;

        Ok(Self {
            chain_id: read_u32(&bytes[1..5]),
            iteration: read_u32(&bytes[5..9]),
            chain_key: read_key(&bytes[9..41]),
            signing_key,
        })
    }
}

/// Output of a pairwise encrypt call: the message type tells the receiver
/// whether bootstrap material is embedded; encryption strength is identical
/// either way.
#[derive(Clone, Debug)]
pub enum CiphertextMessage {
    Whisper(SignalMessage),
    PreKey(PreKeySignalMessage),
}

impl CiphertextMessage {
    pub fn message_type(&self) -> CiphertextMessageType {
        match self {
            Self::Whisper(_) => CiphertextMessageType::Whisper,
            Self::PreKey(_) => CiphertextMessageType::PreKey,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Whisper(message) => message.to_bytes(),
            Self::PreKey(message) => message.to_bytes(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IdentityKeyPair;

    #[test]
    fn test_signal_message_round_trip() {
        let original = SignalMessage {
            ratchet_key: X25519PublicKey::from([5u8; 32]),
            counter: 42,
            previous_counter: 17,
            ciphertext: vec![1, 2, 3, 4],
        };

        let parsed = SignalMessage::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(parsed.ratchet_key, original.ratchet_key);
        assert_eq!(parsed.counter, 42);
        assert_eq!(parsed.previous_counter, 17);
        assert_eq!(parsed.ciphertext, original.ciphertext);
    }

    #[test]
    fn test_pre_key_message_round_trip() {
        let identity = IdentityKeyPair::generate().unwrap().public();
        let original = PreKeySignalMessage {
            registration_id: 999,
            pre_key_id: Some(3),
            signed_pre_key_id: 11,
            base_key: X25519PublicKey::from([9u8; 32]),
            identity_key: identity,
            message: SignalMessage {
                ratchet_key: X25519PublicKey::from([5u8; 32]),
                counter: 0,
                previous_counter: 0,
                ciphertext: vec![7, 7, 7],
            },
        };

        let parsed = PreKeySignalMessage::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(parsed.registration_id, 999);
        assert_eq!(parsed.pre_key_id, Some(3));
        assert_eq!(parsed.signed_pre_key_id, 11);
        assert_eq!(parsed.base_key, original.base_key);
        assert_eq!(parsed.identity_key, identity);
        assert_eq!(parsed.message.ciphertext, vec![7, 7, 7]);
    }

    #[test]
    fn test_pre_key_message_without_one_time_id() {
        let identity = IdentityKeyPair::generate().unwrap().public();
        let original = PreKeySignalMessage {
            registration_id: 1,
            pre_key_id: None,
            signed_pre_key_id: 2,
            base_key: X25519PublicKey::from([1u8; 32]),
            identity_key: identity,
            message: SignalMessage {
                ratchet_key: X25519PublicKey::from([2u8; 32]),
                counter: 0,
                previous_counter: 0,
                ciphertext: vec![],
            },
        };

        let parsed = PreKeySignalMessage::from_bytes(&original.to_bytes()).unwrap();
        assert_eq!(parsed.pre_key_id, None);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let mut bytes = SignalMessage {
            ratchet_key: X25519PublicKey::from([0u8; 32]),
            counter: 0,
            previous_counter: 0,
            ciphertext: vec![],
        }
        .to_bytes();
        bytes[0] = 0xFF;

        assert!(matches!(
            SignalMessage::from_bytes(&bytes),
            Err(Error::MalformedMessage(_))
        ));
    }

    #[test]
    fn test_rejects_truncated_input() {
        assert!(SignalMessage::from_bytes(&[MESSAGE_VERSION, 1, 2]).is_err());
        assert!(PreKeySignalMessage::from_bytes(&[MESSAGE_VERSION]).is_err());
        assert!(SenderKeyMessage::from_bytes(&[MESSAGE_VERSION; 20]).is_err());
        assert!(SenderKeyDistributionMessage::from_bytes(&[MESSAGE_VERSION; 10]).is_err());
    }
}
