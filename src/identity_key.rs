use crate::{Error, X25519PublicKey, X25519Secret};
use ed25519_dalek::{SecretKey, Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::TryRngCore;
use rand::rngs::OsRng;

/// Fills a 32-byte seed from the operating system RNG.
pub fn generate_random_seed() -> Result<[u8; 32], Error> {
    let mut seed = [0u8; 32];
    OsRng.try_fill_bytes(&mut seed).map_err(|_| Error::Random)?;
    Ok(seed)
}

/// Public half of a device identity: one X25519 key for agreement and one
/// Ed25519 key for signatures, serialized together as 64 bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IdentityKey {
    dh_key: X25519PublicKey,
    signing_key: VerifyingKey,
}

impl IdentityKey {
    pub fn new(dh_key: X25519PublicKey, signing_key: VerifyingKey) -> Self {
        Self {
            dh_key,
            signing_key,
        }
    }

    pub fn dh_key(&self) -> X25519PublicKey {
        self.dh_key
    }

    pub fn signing_key(&self) -> VerifyingKey {
        self.signing_key
    }

    pub fn verify(&self, message: &[u8], signature: &Signature) -> Result<(), Error> {
        self.signing_key
            .verify(message, signature)
            .map_err(|_| Error::InvalidSignature)
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[0..32].copy_from_slice(self.dh_key.as_bytes());
        bytes[32..64].copy_from_slice(self.signing_key.as_bytes());

        bytes
    }

    pub fn from_bytes(bytes: &[u8; 64]) -> Result<Self, Error> {
        let mut dh_bytes = [0u8; 32];
        dh_bytes.copy_from_slice(&bytes[0..32]);

        let mut signing_bytes = [0u8; 32];
        signing_bytes.copy_from_slice(&bytes[32..64]);
        let signing_key = VerifyingKey::from_bytes(&signing_bytes)
            .map_err(|err| Error::Crypto(err.to_string()))?;

        Ok(Self {
            dh_key: X25519PublicKey::from(dh_bytes),
            signing_key,
        })
    }
}

/// A device's long-term identity key pair.
///
/// A single seed drives both the Ed25519 signing key and the X25519
/// agreement key, so the pair serializes to 64 bytes and the two public
/// halves always travel together.
#[derive(Clone)]
pub struct IdentityKeyPair {
    signing_key: SigningKey,
    dh_key: X25519Secret,
}

impl IdentityKeyPair {
    pub fn generate() -> Result<Self, Error> {
        let seed = generate_random_seed()?;
        Ok(Self::from_seed(seed))
    }

    fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&SecretKey::from(seed)),
            dh_key: X25519Secret::from(seed),
        }
    }

    pub fn public(&self) -> IdentityKey {
        IdentityKey::new(self.dh_key.public_key(), self.signing_key.verifying_key())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }

    pub(crate) fn dh(&self, public_key: &X25519PublicKey) -> [u8; 32] {
        self.dh_key.dh(public_key).to_bytes()
    }

    pub fn to_bytes(&self) -> [u8; 64] {
        let mut bytes = [0u8; 64];
        bytes[0..32].copy_from_slice(self.signing_key.as_bytes().as_slice());
        bytes[32..64].copy_from_slice(self.dh_key.as_bytes());

        bytes
    }

    pub fn from_bytes(bytes: &[u8; 64]) -> Self {
        let mut signing_bytes = [0u8; 32];
        signing_bytes.copy_from_slice(&bytes[0..32]);

        let mut dh_bytes = [0u8; 32];
        dh_bytes.copy_from_slice(&bytes[32..64]);

        Self {
            signing_key: SigningKey::from_bytes(&SecretKey::from(signing_bytes)),
            dh_key: X25519Secret::from(dh_bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let pair = IdentityKeyPair::generate().unwrap();
        let message = b"attested material";

        let signature = pair.sign(message);
        assert!(pair.public().verify(message, &signature).is_ok());
        assert!(pair.public().verify(b"other material", &signature).is_err());
    }

    #[test]
    fn test_diffie_hellman_agreement() {
        let alice = IdentityKeyPair::generate().unwrap();
        let bob = IdentityKeyPair::generate().unwrap();

        let alice_shared = alice.dh(&bob.public().dh_key());
        let bob_shared = bob.dh(&alice.public().dh_key());

        assert_eq!(alice_shared, bob_shared);
    }

    #[test]
    fn test_pair_serialization_round_trip() {
        let pair = IdentityKeyPair::generate().unwrap();
        let restored = IdentityKeyPair::from_bytes(&pair.to_bytes());

        assert_eq!(pair.public(), restored.public());
    }

    #[test]
    fn test_public_serialization_round_trip() {
        let public = IdentityKeyPair::generate().unwrap().public();
        let restored = IdentityKey::from_bytes(&public.to_bytes()).unwrap();

        assert_eq!(public, restored);
    }
}
