use crate::Error;
use aes_gcm_siv::aead::{Aead, Payload};
use aes_gcm_siv::{Aes256GcmSiv, KeyInit, Nonce};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

const NONCE_SIZE: usize = 12;

/// Ratchet chain for deriving message keys.
///
/// Each step yields a one-use message key and irreversibly replaces the
/// chain key; the index only ever increases.
#[derive(Clone, Default)]
pub(crate) struct Chain {
    pub(crate) chain_key: [u8; 32],
    index: u32,
}

impl Chain {
    pub(crate) fn new(chain_key: [u8; 32]) -> Self {
        Self {
            chain_key,
            index: 0,
        }
    }

    /// Restores a chain at a given position, for deserialization and for
    /// installing a sender-key chain mid-stream.
    pub(crate) fn from_parts(chain_key: [u8; 32], index: u32) -> Self {
        Self { chain_key, index }
    }

    /// Advances the chain and returns a message key.
    pub(crate) fn next(&mut self) -> [u8; 32] {
        type HmacSha256 = Hmac<Sha256>;

        let mut chain_mac = <HmacSha256 as Mac>::new_from_slice(&self.chain_key)
            .expect("HMAC initialization failed");
        chain_mac.update(&[0x01]);
        let chain_result = chain_mac.finalize().into_bytes();

        let mut message_mac = <HmacSha256 as Mac>::new_from_slice(&self.chain_key)
            .expect("HMAC initialization failed");
        message_mac.update(&[0x02]);
        let message_result = message_mac.finalize().into_bytes();

        self.chain_key.copy_from_slice(&chain_result);
        self.index += 1;

        let mut message_key = [0u8; 32];
        message_key.copy_from_slice(&message_result);
        message_key
    }

    pub(crate) fn index(&self) -> u32 {
        self.index
    }
}

impl Drop for Chain {
    fn drop(&mut self) {
        self.chain_key.zeroize();
    }
}

/// AEAD key material expanded from one message key.
pub(crate) struct MessageKeys {
    key: [u8; 32],
    nonce: [u8; NONCE_SIZE],
}

impl Drop for MessageKeys {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

/// Expands a 32-byte message key into an AEAD key and nonce.
///
/// The nonce is derived, not random: a message key is used exactly once, so
/// (key, nonce) pairs never repeat and both ends derive the same pair.
pub(crate) fn derive_message_keys(message_key: &[u8; 32]) -> MessageKeys {
    let hkdf = Hkdf::<Sha256>::new(None, message_key);

    let mut derived = [0u8; 32 + NONCE_SIZE];
    hkdf.expand(b"Vesper-E2E-Keys", &mut derived)
        .expect("HKDF expansion failed");

    let mut key = [0u8; 32];
    key.copy_from_slice(&derived[..32]);
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&derived[32..]);
    derived.zeroize();

    MessageKeys { key, nonce }
}

/// Seals one payload under a derived message key.
pub(crate) fn seal(keys: &MessageKeys, plaintext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, Error> {
    let key = aes_gcm_siv::Key::<Aes256GcmSiv>::from_slice(&keys.key);
    let cipher = Aes256GcmSiv::new(key);
    let nonce = Nonce::from_slice(&keys.nonce);

    cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad: associated_data,
            },
        )
        .map_err(|_| Error::Crypto("message encryption failed".to_string()))
}

/// Opens one payload; a tag mismatch surfaces as [`Error::Mac`].
pub(crate) fn open(keys: &MessageKeys, ciphertext: &[u8], associated_data: &[u8]) -> Result<Vec<u8>, Error> {
    let key = aes_gcm_siv::Key::<Aes256GcmSiv>::from_slice(&keys.key);
    let cipher = Aes256GcmSiv::new(key);
    let nonce = Nonce::from_slice(&keys.nonce);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: ciphertext,
                aad: associated_data,
            },
        )
        .map_err(|_| Error::Mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_is_deterministic() {
        let seed = [7u8; 32];
        let mut a = Chain::new(seed);
        let mut b = Chain::new(seed);

        for _ in 0..10 {
            assert_eq!(a.next(), b.next());
        }
        assert_eq!(a.index(), 10);
    }

    #[test]
    fn test_chain_keys_do_not_repeat() {
        let mut chain = Chain::new([1u8; 32]);
        let first = chain.next();
        let second = chain.next();
        assert_ne!(first, second);
    }

    #[test]
    fn test_chain_restores_at_position() {
        let mut chain = Chain::new([9u8; 32]);
        chain.next();
        chain.next();

        let restored = Chain::from_parts(chain.chain_key, chain.index());
        assert_eq!(restored.index(), 2);

        let mut a = chain;
        let mut b = restored;
        assert_eq!(a.next(), b.next());
    }

    #[test]
    fn test_seal_open_round_trip() {
        let keys = derive_message_keys(&[3u8; 32]);
        let sealed = seal(&keys, b"payload", b"aad").unwrap();

        let keys = derive_message_keys(&[3u8; 32]);
        let opened = open(&keys, &sealed, b"aad").unwrap();
        assert_eq!(opened, b"payload");
    }

    #[test]
    fn test_open_rejects_wrong_aad() {
        let keys = derive_message_keys(&[3u8; 32]);
        let sealed = seal(&keys, b"payload", b"aad").unwrap();

        let keys = derive_message_keys(&[3u8; 32]);
        assert_eq!(open(&keys, &sealed, b"other").unwrap_err(), Error::Mac);
    }

    #[test]
    fn test_open_rejects_tampered_ciphertext() {
        let keys = derive_message_keys(&[3u8; 32]);
        let mut sealed = seal(&keys, b"payload", b"aad").unwrap();
        sealed[0] ^= 0x01;

        let keys = derive_message_keys(&[3u8; 32]);
        assert_eq!(open(&keys, &sealed, b"aad").unwrap_err(), Error::Mac);
    }
}
