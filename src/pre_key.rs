use crate::{Error, IdentityKey, IdentityKeyPair, X25519PublicKey, X25519Secret, generate_random_seed};
use ed25519_dalek::Signature;
use ed25519_dalek::ed25519::SignatureBytes;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A one-time agreement key pair tagged with a small integer id.
///
/// Created in batches, consumed exactly once during initial session
/// establishment (inside pre-key-message decrypt), then removed from the
/// store.
#[derive(Clone)]
pub struct PreKeyRecord {
    key: X25519Secret,
    id: u32,
}

impl PreKeyRecord {
    pub fn generate(id: u32) -> Result<Self, Error> {
        Ok(Self {
            key: X25519Secret::from(generate_random_seed()?),
            id,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn public_key(&self) -> X25519PublicKey {
        self.key.public_key()
    }

    pub(crate) fn dh(&self, public_key: &X25519PublicKey) -> [u8; 32] {
        self.key.dh(public_key).to_bytes()
    }

    /// 4-byte id followed by the 32-byte secret.
    pub fn to_bytes(&self) -> [u8; 36] {
        let mut bytes = [0u8; 36];
        bytes[0..4].copy_from_slice(&self.id.to_be_bytes());
        bytes[4..36].copy_from_slice(self.key.as_bytes());

        bytes
    }
}

impl From<[u8; 36]> for PreKeyRecord {
    fn from(bytes: [u8; 36]) -> Self {
        let mut id_bytes = [0u8; 4];
        id_bytes.copy_from_slice(&bytes[0..4]);

        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&bytes[4..36]);

        Self {
            key: X25519Secret::from(key_bytes),
            id: u32::from_be_bytes(id_bytes),
        }
    }
}

/// A medium-lived agreement key pair, signed by the identity key.
///
/// Rotation cadence is policy external to this crate; the creation
/// timestamp travels with the record so callers can enforce it.
#[derive(Clone)]
pub struct SignedPreKeyRecord {
    key: X25519Secret,
    id: u32,
    signature: Signature,
    created_at: SystemTime,
}

impl SignedPreKeyRecord {
    pub fn generate(id: u32, identity: &IdentityKeyPair) -> Result<Self, Error> {
        let key = X25519Secret::from(generate_random_seed()?);
        let signature = identity.sign(key.public_key().as_bytes());

        Ok(Self {
            key,
            id,
            signature,
            created_at: SystemTime::now(),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn public_key(&self) -> X25519PublicKey {
        self.key.public_key()
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }

    pub fn created_at(&self) -> SystemTime {
        self.created_at
    }

    pub(crate) fn key_pair(&self) -> X25519Secret {
        self.key.clone()
    }

    pub(crate) fn dh(&self, public_key: &X25519PublicKey) -> [u8; 32] {
        self.key.dh(public_key).to_bytes()
    }

    /// 4-byte id, 8-byte creation timestamp, 32-byte secret, 64-byte signature.
    pub fn to_bytes(&self) -> [u8; 108] {
        let mut bytes = [0u8; 108];
        bytes[0..4].copy_from_slice(&self.id.to_be_bytes());

        let timestamp = self
            .created_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        bytes[4..12].copy_from_slice(&timestamp.to_be_bytes());
        bytes[12..44].copy_from_slice(self.key.as_bytes());
        bytes[44..108].copy_from_slice(&self.signature.to_bytes());

        bytes
    }
}

impl From<[u8; 108]> for SignedPreKeyRecord {
    fn from(bytes: [u8; 108]) -> Self {
        let mut id_bytes = [0u8; 4];
        id_bytes.copy_from_slice(&bytes[0..4]);

        let mut timestamp_bytes = [0u8; 8];
        timestamp_bytes.copy_from_slice(&bytes[4..12]);
        let created_at =
            UNIX_EPOCH + Duration::from_secs(u64::from_be_bytes(timestamp_bytes));

        let mut key_bytes = [0u8; 32];
        key_bytes.copy_from_slice(&bytes[12..44]);

        let mut signature_bytes = [0u8; 64];
        signature_bytes.copy_from_slice(&bytes[44..108]);

        Self {
            key: X25519Secret::from(key_bytes),
            id: u32::from_be_bytes(id_bytes),
            signature: Signature::from_bytes(&SignatureBytes::from(signature_bytes)),
            created_at,
        }
    }
}

/// The public material a peer publishes so others can initiate a session
/// without interaction. Transient; never stored.
#[derive(Clone)]
pub struct PreKeyBundle {
    registration_id: u32,
    identity: IdentityKey,
    signed_pre_key_id: u32,
    signed_pre_key: X25519PublicKey,
    signed_pre_key_signature: Signature,
    pre_key: Option<(u32, X25519PublicKey)>,
}

impl PreKeyBundle {
    pub fn new(
        registration_id: u32,
        identity: IdentityKey,
        signed_pre_key: &SignedPreKeyRecord,
        pre_key: Option<&PreKeyRecord>,
    ) -> Self {
        Self {
            registration_id,
            identity,
            signed_pre_key_id: signed_pre_key.id(),
            signed_pre_key: signed_pre_key.public_key(),
            signed_pre_key_signature: signed_pre_key.signature(),
            pre_key: pre_key.map(|key| (key.id(), key.public_key())),
        }
    }

    /// Builds a bundle from raw wire material.
    pub fn from_parts(
        registration_id: u32,
        identity: &[u8; 64],
        signed_pre_key_id: u32,
        signed_pre_key: [u8; 32],
        signed_pre_key_signature: [u8; 64],
        pre_key: Option<(u32, [u8; 32])>,
    ) -> Result<Self, Error> {
        Ok(Self {
            registration_id,
            identity: IdentityKey::from_bytes(identity)?,
            signed_pre_key_id,
            signed_pre_key: X25519PublicKey::from(signed_pre_key),
            signed_pre_key_signature: Signature::from_bytes(&SignatureBytes::from(
                signed_pre_key_signature,
            )),
            pre_key: pre_key.map(|(id, key)| (id, X25519PublicKey::from(key))),
        })
    }

    /// Confirms the signed pre-key was created by the owner of the identity
    /// key. Invalid bundles must be rejected before any store write.
    pub fn verify(&self) -> Result<(), Error> {
        self.identity
            .verify(self.signed_pre_key.as_bytes(), &self.signed_pre_key_signature)
            .map_err(|_| Error::InvalidSignature)
    }

    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }

    pub fn identity(&self) -> &IdentityKey {
        &self.identity
    }

    pub fn signed_pre_key_id(&self) -> u32 {
        self.signed_pre_key_id
    }

    pub fn signed_pre_key(&self) -> X25519PublicKey {
        self.signed_pre_key
    }

    pub fn pre_key(&self) -> Option<(u32, X25519PublicKey)> {
        self.pre_key
    }
}
