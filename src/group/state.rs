use crate::chain::Chain;
use crate::proto;
use crate::{Error, SessionConfig};
use ed25519_dalek::{SecretKey, SigningKey, VerifyingKey};
use prost::Message;
use std::collections::VecDeque;
use zeroize::Zeroize;

const RECORD_VERSION: u8 = 1;

#[derive(Clone)]
struct SkippedSenderKey {
    iteration: u32,
    message_key: [u8; 32],
}

impl Drop for SkippedSenderKey {
    fn drop(&mut self) {
        self.message_key.zeroize();
    }
}

/// One sender-key chain plus its signing key.
///
/// The sender holds the private signing half; receivers install only the
/// public half from a distribution message.
#[derive(Clone)]
pub(crate) struct SenderKeyState {
    pub(crate) chain_id: u32,
    pub(crate) chain: Chain,
    pub(crate) signing_public: VerifyingKey,
    pub(crate) signing_private: Option<SigningKey>,
    skipped: VecDeque<SkippedSenderKey>,
}

impl SenderKeyState {
    pub(crate) fn new(
        chain_id: u32,
        chain: Chain,
        signing_public: VerifyingKey,
        signing_private: Option<SigningKey>,
    ) -> Self {
        Self {
            chain_id,
            chain,
            signing_public,
            signing_private,
            skipped: VecDeque::new(),
        }
    }

    /// Advances the chain to `until`, caching skipped message keys.
    pub(crate) fn skip_message_keys(
        &mut self,
        until: u32,
        config: &SessionConfig,
    ) -> Result<(), Error> {
        let current = self.chain.index();
        if until.saturating_sub(current) as usize > config.max_skipped_message_keys {
            return Err(Error::SkipLimitExceeded {
                counter: until,
                current,
                max_skip: config.max_skipped_message_keys as u32,
            });
        }

        while self.chain.index() < until {
            let iteration = self.chain.index();
            let message_key = self.chain.next();
            if self.skipped.len() >= config.max_skipped_message_keys
                && let Some(evicted) = self.skipped.pop_front()
            {
                tracing::warn!(
                    iteration = evicted.iteration,
                    "sender-key skipped cache full, dropping oldest entry"
                );
            }
            self.skipped.push_back(SkippedSenderKey {
                iteration,
                message_key,
            });
        }

        Ok(())
    }

    pub(crate) fn take_skipped(&mut self, iteration: u32) -> Option<[u8; 32]> {
        let position = self
            .skipped
            .iter()
            .position(|key| key.iteration == iteration)?;

        self.skipped.remove(position).map(|key| key.message_key)
    }

    fn to_proto(&self) -> proto::SenderKeyStateProto {
        proto::SenderKeyStateProto {
            chain_id: self.chain_id,
            chain: Some(proto::ChainProto {
                chain_key: self.chain.chain_key.to_vec(),
                index: self.chain.index(),
            }),
            signing_public: self.signing_public.as_bytes().to_vec(),
            signing_private: self
                .signing_private
                .as_ref()
                .map(|key| key.to_bytes().to_vec())
                .unwrap_or_default(),
            skipped_keys: self
                .skipped
                .iter()
                .map(|key| proto::SkippedSenderKeyProto {
                    iteration: key.iteration,
                    message_key: key.message_key.to_vec(),
                })
                .collect(),
        }
    }

    fn from_proto(state: proto::SenderKeyStateProto) -> Result<Self, Error> {
        let chain = state
            .chain
            .ok_or_else(|| Error::MalformedRecord("missing sender-key chain".to_string()))?;

        let signing_public_bytes: [u8; 32] = state
            .signing_public
            .as_slice()
            .try_into()
            .map_err(|_| Error::MalformedRecord("bad signing key length".to_string()))?;
        let signing_public = VerifyingKey::from_bytes(&signing_public_bytes)
            .map_err(|_| Error::MalformedRecord("bad signing key".to_string()))?;

        let signing_private = if state.signing_private.is_empty() {
            None
        } else {
            let seed: [u8; 32] = state
                .signing_private
                .as_slice()
                .try_into()
                .map_err(|_| Error::MalformedRecord("bad signing seed length".to_string()))?;
            Some(SigningKey::from_bytes(&SecretKey::from(seed)))
        };

        let mut skipped = VecDeque::with_capacity(state.skipped_keys.len());
        for key in state.skipped_keys {
            skipped.push_back(SkippedSenderKey {
                iteration: key.iteration,
                message_key: key
                    .message_key
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::MalformedRecord("bad message key length".to_string()))?,
            });
        }

        let chain_key: [u8; 32] = chain
            .chain_key
            .as_slice()
            .try_into()
            .map_err(|_| Error::MalformedRecord("bad chain key length".to_string()))?;

        Ok(Self {
            chain_id: state.chain_id,
            chain: Chain::from_parts(chain_key, chain.index),
            signing_public,
            signing_private,
            skipped,
        })
    }
}

/// All sender-key chains known for one (group, sender) pair, most recent
/// first.
#[derive(Clone, Default)]
pub struct SenderKeyRecord {
    pub(crate) states: Vec<SenderKeyState>,
}

impl SenderKeyRecord {
    pub fn new_empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// The state this device can sign with, if it ever created one.
    pub(crate) fn state_for_sending(&mut self) -> Option<&mut SenderKeyState> {
        self.states
            .iter_mut()
            .find(|state| state.signing_private.is_some())
    }

    pub(crate) fn state_mut_by_chain_id(&mut self, chain_id: u32) -> Option<&mut SenderKeyState> {
        self.states
            .iter_mut()
            .find(|state| state.chain_id == chain_id)
    }

    pub(crate) fn push_state(&mut self, state: SenderKeyState, config: &SessionConfig) {
        self.states.insert(0, state);
        if self.states.len() > config.max_sender_key_states {
            tracing::warn!("sender-key history full, dropping oldest chain");
            self.states.truncate(config.max_sender_key_states);
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let record = proto::SenderKeyRecordProto {
            states: self.states.iter().map(SenderKeyState::to_proto).collect(),
        };

        let mut bytes = Vec::with_capacity(1 + record.encoded_len());
        bytes.push(RECORD_VERSION);
        bytes.extend_from_slice(&record.encode_to_vec());

        bytes
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.is_empty() {
            return Ok(Self::new_empty());
        }
        if bytes[0] != RECORD_VERSION {
            return Err(Error::MalformedRecord(
                "unrecognized sender-key record format".to_string(),
            ));
        }

        let record = proto::SenderKeyRecordProto::decode(&bytes[1..])
            .map_err(|err| Error::MalformedRecord(err.to_string()))?;

        let mut states = Vec::with_capacity(record.states.len());
        for state in record.states {
            states.push(SenderKeyState::from_proto(state)?);
        }

        Ok(Self { states })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate_random_seed;

    fn sender_state(chain_id: u32) -> SenderKeyState {
        let signing = SigningKey::from_bytes(&SecretKey::from(generate_random_seed().unwrap()));
        SenderKeyState::new(
            chain_id,
            Chain::new(generate_random_seed().unwrap()),
            signing.verifying_key(),
            Some(signing),
        )
    }

    #[test]
    fn test_record_round_trip() {
        let config = SessionConfig::default();
        let mut record = SenderKeyRecord::new_empty();
        let mut state = sender_state(11);
        state.skip_message_keys(3, &config).unwrap();
        record.push_state(state, &config);

        let restored = SenderKeyRecord::deserialize(&record.serialize()).unwrap();
        assert_eq!(restored.states.len(), 1);
        assert_eq!(restored.states[0].chain_id, 11);
        assert_eq!(restored.states[0].chain.index(), 3);
        assert!(restored.states[0].signing_private.is_some());
    }

    #[test]
    fn test_receiver_state_has_no_signing_seed() {
        let config = SessionConfig::default();
        let original = sender_state(1);
        let mut record = SenderKeyRecord::new_empty();
        record.push_state(
            SenderKeyState::new(1, original.chain.clone(), original.signing_public, None),
            &config,
        );

        let restored = SenderKeyRecord::deserialize(&record.serialize()).unwrap();
        assert!(restored.states[0].signing_private.is_none());
    }

    #[test]
    fn test_history_is_bounded() {
        let config = SessionConfig {
            max_sender_key_states: 2,
            ..SessionConfig::default()
        };
        let mut record = SenderKeyRecord::new_empty();
        for chain_id in 0..4 {
            record.push_state(sender_state(chain_id), &config);
        }

        assert_eq!(record.states.len(), 2);
        assert_eq!(record.states[0].chain_id, 3);
    }

    #[test]
    fn test_skipped_keys_are_recoverable_once() {
        let config = SessionConfig::default();
        let mut state = sender_state(1);
        state.skip_message_keys(5, &config).unwrap();

        assert!(state.take_skipped(2).is_some());
        assert!(state.take_skipped(2).is_none());
    }

    #[test]
    fn test_garbage_is_malformed() {
        assert!(matches!(
            SenderKeyRecord::deserialize(b"\x7fgarbage"),
            Err(Error::MalformedRecord(_))
        ));
    }
}
