use crate::chain::Chain;
use crate::proto;
use crate::{
    Error, IdentityKey, SessionConfig, X25519PublicKey, X25519Secret, generate_random_seed,
};
use hkdf::Hkdf;
use sha2::Sha256;
use std::collections::VecDeque;
use zeroize::Zeroize;

/// A receiving chain keyed by the remote ratchet public key that created it.
#[derive(Clone)]
pub(crate) struct ReceiverChain {
    pub(crate) ratchet_key: [u8; 32],
    pub(crate) chain: Chain,
}

/// Bootstrap material repeated in every outgoing message until the first
/// incoming message confirms the session.
#[derive(Clone)]
pub(crate) struct PendingPreKey {
    pub(crate) pre_key_id: Option<u32>,
    pub(crate) signed_pre_key_id: u32,
    pub(crate) base_key: X25519PublicKey,
}

#[derive(Clone)]
struct SkippedKey {
    ratchet_key: [u8; 32],
    counter: u32,
    message_key: [u8; 32],
}

impl Drop for SkippedKey {
    fn drop(&mut self) {
        self.message_key.zeroize();
    }
}

/// Message keys derived ahead of their message, waiting for late arrivals.
///
/// Bounded; when full, the oldest entry is dropped and its message becomes
/// permanently undecryptable.
#[derive(Clone, Default)]
pub(crate) struct SkippedKeyCache {
    keys: VecDeque<SkippedKey>,
}

impl SkippedKeyCache {
    fn insert(&mut self, ratchet_key: [u8; 32], counter: u32, message_key: [u8; 32], max: usize) {
        if self.keys.len() >= max
            && let Some(evicted) = self.keys.pop_front()
        {
            tracing::warn!(
                counter = evicted.counter,
                "skipped-key cache full, dropping oldest entry"
            );
        }
        self.keys.push_back(SkippedKey {
            ratchet_key,
            counter,
            message_key,
        });
    }

    pub(crate) fn take(&mut self, ratchet_key: &[u8; 32], counter: u32) -> Option<[u8; 32]> {
        let position = self
            .keys
            .iter()
            .position(|key| key.counter == counter && &key.ratchet_key == ratchet_key)?;

        self.keys.remove(position).map(|key| key.message_key)
    }

    pub(crate) fn len(&self) -> usize {
        self.keys.len()
    }
}

/// One fully-initialized double-ratchet session.
///
/// A record holds several of these; only the front one sends, but any of
/// them may still decrypt.
#[derive(Clone)]
pub(crate) struct SessionState {
    pub(crate) root_key: [u8; 32],
    pub(crate) sender_ratchet_key: X25519Secret,
    pub(crate) sending_chain: Chain,
    pub(crate) previous_counter: u32,
    /// Front is the chain currently receiving; the rest are retired.
    pub(crate) receiver_chains: Vec<ReceiverChain>,
    pub(crate) remote_identity: IdentityKey,
    pub(crate) remote_registration_id: u32,
    /// Set on both sides so simultaneous initiations can be matched up.
    pub(crate) alice_base_key: Option<[u8; 32]>,
    pub(crate) pending_pre_key: Option<PendingPreKey>,
    pub(crate) skipped_keys: SkippedKeyCache,
}

impl SessionState {
    /// Builds the initiator's state: the first ratchet step happens
    /// immediately, so the session can send before any reply.
    pub(crate) fn new_initiator(
        shared_secret: [u8; 32],
        their_ratchet_key: &X25519PublicKey,
        remote_identity: IdentityKey,
        remote_registration_id: u32,
        pending: PendingPreKey,
    ) -> Result<Self, Error> {
        let ratchet_key = X25519Secret::from(generate_random_seed()?);
        let dh = ratchet_key.dh(their_ratchet_key).to_bytes();
        let (root_key, chain_key) = kdf_root(&shared_secret, dh);
        let alice_base_key = Some(pending.base_key.to_bytes());

        Ok(Self {
            root_key,
            sender_ratchet_key: ratchet_key,
            sending_chain: Chain::new(chain_key),
            previous_counter: 0,
            receiver_chains: Vec::new(),
            remote_identity,
            remote_registration_id,
            alice_base_key,
            pending_pre_key: Some(pending),
            skipped_keys: SkippedKeyCache::default(),
        })
    }

    /// Builds the responder's state. The signed pre-key doubles as the first
    /// ratchet key pair; chains grow when the first message is decrypted.
    pub(crate) fn new_responder(
        shared_secret: [u8; 32],
        ratchet_key: X25519Secret,
        remote_identity: IdentityKey,
        remote_registration_id: u32,
        alice_base_key: [u8; 32],
    ) -> Self {
        Self {
            root_key: shared_secret,
            sender_ratchet_key: ratchet_key,
            sending_chain: Chain::default(),
            previous_counter: 0,
            receiver_chains: Vec::new(),
            remote_identity,
            remote_registration_id,
            alice_base_key: Some(alice_base_key),
            pending_pre_key: None,
            skipped_keys: SkippedKeyCache::default(),
        }
    }

    /// A session is confirmed once a message from the peer has been
    /// decrypted and the bootstrap material dropped.
    pub(crate) fn is_confirmed(&self) -> bool {
        self.pending_pre_key.is_none()
    }

    pub(crate) fn sender_ratchet_public(&self) -> X25519PublicKey {
        self.sender_ratchet_key.public_key()
    }

    pub(crate) fn receiver_chain_index(&self, ratchet_key: &[u8; 32]) -> Option<usize> {
        self.receiver_chains
            .iter()
            .position(|chain| &chain.ratchet_key == ratchet_key)
    }

    /// Performs one DH ratchet step against a newly seen remote ratchet key:
    /// a receiving chain for their key, then a fresh sending pair and chain.
    pub(crate) fn dh_ratchet(
        &mut self,
        their_ratchet_key: &X25519PublicKey,
        config: &SessionConfig,
    ) -> Result<(), Error> {
        let receive_dh = self.sender_ratchet_key.dh(their_ratchet_key).to_bytes();
        let (root_key, receive_chain_key) = kdf_root(&self.root_key, receive_dh);
        self.receiver_chains.insert(
            0,
            ReceiverChain {
                ratchet_key: their_ratchet_key.to_bytes(),
                chain: Chain::new(receive_chain_key),
            },
        );
        if self.receiver_chains.len() > config.max_receiver_chains {
            self.receiver_chains.truncate(config.max_receiver_chains);
        }

        let ratchet_key = X25519Secret::from(generate_random_seed()?);
        let send_dh = ratchet_key.dh(their_ratchet_key).to_bytes();
        let (root_key, send_chain_key) = kdf_root(&root_key, send_dh);

        self.previous_counter = self.sending_chain.index();
        self.root_key = root_key;
        self.sender_ratchet_key = ratchet_key;
        self.sending_chain = Chain::new(send_chain_key);

        Ok(())
    }

    /// Advances one receiving chain to `until`, caching every skipped
    /// message key on the way.
    pub(crate) fn skip_message_keys(
        &mut self,
        chain_index: usize,
        until: u32,
        config: &SessionConfig,
    ) -> Result<(), Error> {
        let current = self.receiver_chains[chain_index].chain.index();
        if until.saturating_sub(current) as usize > config.max_skipped_message_keys {
            return Err(Error::SkipLimitExceeded {
                counter: until,
                current,
                max_skip: config.max_skipped_message_keys as u32,
            });
        }

        while self.receiver_chains[chain_index].chain.index() < until {
            let counter = self.receiver_chains[chain_index].chain.index();
            let ratchet_key = self.receiver_chains[chain_index].ratchet_key;
            let message_key = self.receiver_chains[chain_index].chain.next();
            self.skipped_keys.insert(
                ratchet_key,
                counter,
                message_key,
                config.max_skipped_message_keys,
            );
        }

        Ok(())
    }

    pub(crate) fn to_proto(&self) -> proto::SessionStateProto {
        proto::SessionStateProto {
            root_key: self.root_key.to_vec(),
            sender_ratchet_key: self.sender_ratchet_key.to_bytes().to_vec(),
            sender_chain: Some(proto::ChainProto {
                chain_key: self.sending_chain.chain_key.to_vec(),
                index: self.sending_chain.index(),
            }),
            previous_counter: self.previous_counter,
            receiver_chains: self
                .receiver_chains
                .iter()
                .map(|chain| proto::ReceiverChainProto {
                    ratchet_key: chain.ratchet_key.to_vec(),
                    chain: Some(proto::ChainProto {
                        chain_key: chain.chain.chain_key.to_vec(),
                        index: chain.chain.index(),
                    }),
                })
                .collect(),
            remote_identity: self.remote_identity.to_bytes().to_vec(),
            remote_registration_id: self.remote_registration_id,
            alice_base_key: self
                .alice_base_key
                .map(|key| key.to_vec())
                .unwrap_or_default(),
            pending_pre_key: self.pending_pre_key.as_ref().map(|pending| {
                proto::PendingPreKeyProto {
                    pre_key_id: pending.pre_key_id,
                    signed_pre_key_id: pending.signed_pre_key_id,
                    base_key: pending.base_key.to_bytes().to_vec(),
                }
            }),
            skipped_keys: self
                .skipped_keys
                .keys
                .iter()
                .map(|key| proto::SkippedKeyProto {
                    ratchet_key: key.ratchet_key.to_vec(),
                    counter: key.counter,
                    message_key: key.message_key.to_vec(),
                })
                .collect(),
        }
    }

    pub(crate) fn from_proto(state: proto::SessionStateProto) -> Result<Self, Error> {
        let sender_chain = state
            .sender_chain
            .ok_or_else(|| Error::MalformedRecord("missing sender chain".to_string()))?;

        let mut receiver_chains = Vec::with_capacity(state.receiver_chains.len());
        for chain in state.receiver_chains {
            let inner = chain
                .chain
                .ok_or_else(|| Error::MalformedRecord("missing receiver chain".to_string()))?;
            receiver_chains.push(ReceiverChain {
                ratchet_key: read_32(&chain.ratchet_key, "receiver ratchet key")?,
                chain: Chain::from_parts(read_32(&inner.chain_key, "receiver chain key")?, inner.index),
            });
        }

        let mut skipped_keys = SkippedKeyCache::default();
        for key in state.skipped_keys {
            skipped_keys.keys.push_back(SkippedKey {
                ratchet_key: read_32(&key.ratchet_key, "skipped ratchet key")?,
                counter: key.counter,
                message_key: read_32(&key.message_key, "skipped message key")?,
            });
        }

        let remote_identity: [u8; 64] = state
            .remote_identity
            .as_slice()
            .try_into()
            .map_err(|_| Error::MalformedRecord("bad remote identity length".to_string()))?;

        let alice_base_key = if state.alice_base_key.is_empty() {
            None
        } else {
            Some(read_32(&state.alice_base_key, "base key")?)
        };

        let pending_pre_key = match state.pending_pre_key {
            Some(pending) => Some(PendingPreKey {
                pre_key_id: pending.pre_key_id,
                signed_pre_key_id: pending.signed_pre_key_id,
                base_key: X25519PublicKey::from(read_32(&pending.base_key, "pending base key")?),
            }),
            None => None,
        };

        Ok(Self {
            root_key: read_32(&state.root_key, "root key")?,
            sender_ratchet_key: X25519Secret::from(read_32(
                &state.sender_ratchet_key,
                "sender ratchet key",
            )?),
            sending_chain: Chain::from_parts(
                read_32(&sender_chain.chain_key, "sender chain key")?,
                sender_chain.index,
            ),
            previous_counter: state.previous_counter,
            receiver_chains,
            remote_identity: IdentityKey::from_bytes(&remote_identity)
                .map_err(|_| Error::MalformedRecord("bad remote identity".to_string()))?,
            remote_registration_id: state.remote_registration_id,
            alice_base_key,
            pending_pre_key,
            skipped_keys,
        })
    }
}

impl Drop for SessionState {
    fn drop(&mut self) {
        self.root_key.zeroize();
    }
}

fn read_32(bytes: &[u8], what: &str) -> Result<[u8; 32], Error> {
    bytes
        .try_into()
        .map_err(|_| Error::MalformedRecord(format!("bad {what} length")))
}

/// One root-KDF step: the old root key salts an HKDF over the DH output,
/// yielding the next root key and a chain key.
fn kdf_root(root_key: &[u8; 32], mut dh_output: [u8; 32]) -> ([u8; 32], [u8; 32]) {
    let hkdf = Hkdf::<Sha256>::new(Some(root_key), &dh_output);
    dh_output.zeroize();

    let mut derived = [0u8; 64];
    hkdf.expand(b"Vesper-E2E-Ratchet", &mut derived)
        .expect("HKDF expansion failed");

    let mut next_root = [0u8; 32];
    next_root.copy_from_slice(&derived[..32]);
    let mut chain_key = [0u8; 32];
    chain_key.copy_from_slice(&derived[32..]);
    derived.zeroize();

    (next_root, chain_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::IdentityKeyPair;

    fn fresh_state() -> SessionState {
        let remote = IdentityKeyPair::generate().unwrap().public();
        let their_ratchet = X25519Secret::from(generate_random_seed().unwrap());
        SessionState::new_initiator(
            [3u8; 32],
            &their_ratchet.public_key(),
            remote,
            1,
            PendingPreKey {
                pre_key_id: Some(1),
                signed_pre_key_id: 1,
                base_key: X25519PublicKey::from([4u8; 32]),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_ratchet_step_retires_current_chain() {
        let config = SessionConfig::default();
        let mut state = fresh_state();

        let first = X25519Secret::from(generate_random_seed().unwrap()).public_key();
        let second = X25519Secret::from(generate_random_seed().unwrap()).public_key();

        state.dh_ratchet(&first, &config).unwrap();
        state.dh_ratchet(&second, &config).unwrap();

        assert_eq!(state.receiver_chains.len(), 2);
        assert_eq!(state.receiver_chains[0].ratchet_key, second.to_bytes());
        assert_eq!(state.receiver_chain_index(&first.to_bytes()), Some(1));
    }

    #[test]
    fn test_retired_chains_are_bounded() {
        let config = SessionConfig {
            max_receiver_chains: 2,
            ..SessionConfig::default()
        };
        let mut state = fresh_state();

        for _ in 0..5 {
            let key = X25519Secret::from(generate_random_seed().unwrap()).public_key();
            state.dh_ratchet(&key, &config).unwrap();
        }

        assert_eq!(state.receiver_chains.len(), 2);
    }

    #[test]
    fn test_skipping_caches_keys_and_respects_bound() {
        let config = SessionConfig::default();
        let mut state = fresh_state();
        let key = X25519Secret::from(generate_random_seed().unwrap()).public_key();
        state.dh_ratchet(&key, &config).unwrap();

        state.skip_message_keys(0, 10, &config).unwrap();
        assert_eq!(state.skipped_keys.len(), 10);
        assert!(state.skipped_keys.take(&key.to_bytes(), 3).is_some());
        assert!(state.skipped_keys.take(&key.to_bytes(), 3).is_none());

        let err = state.skip_message_keys(0, 50_000, &config).unwrap_err();
        assert!(matches!(err, Error::SkipLimitExceeded { .. }));
    }

    #[test]
    fn test_cache_evicts_oldest_when_full() {
        let mut cache = SkippedKeyCache::default();
        for counter in 0..4 {
            cache.insert([1u8; 32], counter, [9u8; 32], 3);
        }

        assert_eq!(cache.len(), 3);
        assert!(cache.take(&[1u8; 32], 0).is_none());
        assert!(cache.take(&[1u8; 32], 3).is_some());
    }

    #[test]
    fn test_state_proto_round_trip() {
        let config = SessionConfig::default();
        let mut state = fresh_state();
        let key = X25519Secret::from(generate_random_seed().unwrap()).public_key();
        state.dh_ratchet(&key, &config).unwrap();
        state.skip_message_keys(0, 2, &config).unwrap();

        let restored = SessionState::from_proto(state.to_proto()).unwrap();
        assert_eq!(restored.root_key, state.root_key);
        assert_eq!(restored.previous_counter, state.previous_counter);
        assert_eq!(restored.receiver_chains.len(), 1);
        assert_eq!(restored.skipped_keys.len(), 2);
        assert_eq!(restored.remote_identity, state.remote_identity);
        assert!(!restored.is_confirmed());
    }
}
