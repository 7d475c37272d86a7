use crate::chain::{derive_message_keys, open, seal};
use crate::session::builder::process_pre_key_message;
use crate::session::record::SessionRecord;
use crate::session::state::SessionState;
use crate::store::ProtocolStore;
use crate::{
    CiphertextMessage, Error, IdentityKeyPair, PreKeySignalMessage, ProtocolAddress,
    SessionConfig, SignalMessage,
};

/// Encrypts and decrypts on an established pairwise session.
///
/// Every successful operation persists the updated record before returning;
/// a failed decrypt leaves the stored record untouched.
pub struct SessionCipher<'a, S: ProtocolStore> {
    store: &'a mut S,
    remote_address: ProtocolAddress,
    config: SessionConfig,
}

impl<'a, S: ProtocolStore> SessionCipher<'a, S> {
    pub fn new(store: &'a mut S, remote_address: ProtocolAddress, config: SessionConfig) -> Self {
        Self {
            store,
            remote_address,
            config,
        }
    }

    /// Encrypts one message on the open session.
    ///
    /// While the session is unconfirmed the output embeds the bootstrap
    /// material; after the first successful decrypt it shrinks to an
    /// ordinary message.
    pub async fn encrypt(&mut self, plaintext: &[u8]) -> Result<CiphertextMessage, Error> {
        let bytes = self
            .store
            .load_session(&self.remote_address)
            .await?
            .ok_or_else(|| Error::NoSession(self.remote_address.to_string()))?;
        let mut record = SessionRecord::deserialize(&bytes)?;
        let our_identity = self.store.our_identity().await?;

        let (message, pending) = {
            let state = record
                .open_state_mut()
                .ok_or_else(|| Error::NoSession(self.remote_address.to_string()))?;

            let mut message = SignalMessage {
                ratchet_key: state.sender_ratchet_public(),
                counter: state.sending_chain.index(),
                previous_counter: state.previous_counter,
                ciphertext: Vec::new(),
            };

            let mut associated_data = Vec::with_capacity(64 + 64 + 41);
            associated_data.extend_from_slice(&our_identity.public().to_bytes());
            associated_data.extend_from_slice(&state.remote_identity.to_bytes());
            associated_data.extend_from_slice(&message.header_bytes());

            let message_key = state.sending_chain.next();
            let keys = derive_message_keys(&message_key);
            message.ciphertext = seal(&keys, plaintext, &associated_data)?;

            (message, state.pending_pre_key.clone())
        };

        let result = match pending {
            Some(pending) => CiphertextMessage::PreKey(PreKeySignalMessage {
                registration_id: self.store.our_registration_id().await?,
                pre_key_id: pending.pre_key_id,
                signed_pre_key_id: pending.signed_pre_key_id,
                base_key: pending.base_key,
                identity_key: our_identity.public(),
                message,
            }),
            None => CiphertextMessage::Whisper(message),
        };

        self.store
            .store_session(&self.remote_address, &record.serialize())
            .await?;

        Ok(result)
    }

    /// Decrypts a message that carries its own session bootstrap.
    ///
    /// Establishes (or finds) the matching state, decrypts, and only then
    /// consumes the named one-time pre-key and persists the record. A decrypt
    /// failure leaves the store exactly as it was.
    pub async fn decrypt_pre_key_message(
        &mut self,
        message: &PreKeySignalMessage,
    ) -> Result<Vec<u8>, Error> {
        let mut record = match self.store.load_session(&self.remote_address).await? {
            Some(bytes) => SessionRecord::deserialize(&bytes)?,
            None => SessionRecord::new_empty(),
        };

        let consumed_pre_key = process_pre_key_message(
            &*self.store,
            &self.remote_address,
            &self.config,
            &mut record,
            message,
        )
        .await?;

        let our_identity = self.store.our_identity().await?;
        let plaintext = {
            let state = record
                .open_state_mut()
                .ok_or_else(|| Error::NoSession(self.remote_address.to_string()))?;
            decrypt_with_state(state, &message.message, &our_identity, &self.config)?
        };

        if let Some(id) = consumed_pre_key {
            self.store.remove_pre_key(id).await?;
        }
        self.store
            .store_session(&self.remote_address, &record.serialize())
            .await?;

        Ok(plaintext)
    }

    /// Decrypts an ordinary message, trying the open state first and then
    /// every archived state. The state that succeeds becomes the open one.
    pub async fn decrypt_message(&mut self, message: &SignalMessage) -> Result<Vec<u8>, Error> {
        let bytes = self
            .store
            .load_session(&self.remote_address)
            .await?
            .ok_or_else(|| Error::NoSession(self.remote_address.to_string()))?;
        let mut record = SessionRecord::deserialize(&bytes)?;
        let our_identity = self.store.our_identity().await?;

        let mut last_error = Error::NoSession(self.remote_address.to_string());
        for index in 0..record.states.len() {
            // Work on a copy so a failed attempt cannot corrupt the state.
            let mut candidate = record.states[index].clone();
            match decrypt_with_state(&mut candidate, message, &our_identity, &self.config) {
                Ok(plaintext) => {
                    record.states[index] = candidate;
                    record.promote(index);
                    self.store
                        .store_session(&self.remote_address, &record.serialize())
                        .await?;
                    return Ok(plaintext);
                }
                Err(error) => last_error = error,
            }
        }

        Err(last_error)
    }

    /// Whether an established session exists for this address. Unreadable
    /// record bytes count as no session rather than an error.
    pub async fn has_open_session(&self) -> Result<bool, Error> {
        match self.store.load_session(&self.remote_address).await? {
            Some(bytes) => Ok(SessionRecord::deserialize(&bytes)
                .map(|record| record.has_open_session())
                .unwrap_or(false)),
            None => Ok(false),
        }
    }
}

/// Runs the receiving half of the ratchet on one state.
///
/// Order of attempts: cached skipped key, then an existing chain for the
/// message's ratchet key, then a DH ratchet step for a new key. The first
/// successful decrypt confirms an unconfirmed session.
fn decrypt_with_state(
    state: &mut SessionState,
    message: &SignalMessage,
    our_identity: &IdentityKeyPair,
    config: &SessionConfig,
) -> Result<Vec<u8>, Error> {
    let mut associated_data = Vec::with_capacity(64 + 64 + 41);
    associated_data.extend_from_slice(&state.remote_identity.to_bytes());
    associated_data.extend_from_slice(&our_identity.public().to_bytes());
    associated_data.extend_from_slice(&message.header_bytes());

    let ratchet_bytes = message.ratchet_key.to_bytes();

    if let Some(message_key) = state.skipped_keys.take(&ratchet_bytes, message.counter) {
        let keys = derive_message_keys(&message_key);
        let plaintext = open(&keys, &message.ciphertext, &associated_data)?;
        state.pending_pre_key = None;
        return Ok(plaintext);
    }

    let chain_index = match state.receiver_chain_index(&ratchet_bytes) {
        Some(index) => index,
        None => {
            // Unknown ratchet key: finish the current chain, then step.
            if !state.receiver_chains.is_empty() {
                state.skip_message_keys(0, message.previous_counter, config)?;
            }
            state.dh_ratchet(&message.ratchet_key, config)?;
            0
        }
    };

    let current = state.receiver_chains[chain_index].chain.index();
    if message.counter < current {
        return Err(Error::StaleCounter {
            counter: message.counter,
            current,
        });
    }
    if message.counter > current {
        state.skip_message_keys(chain_index, message.counter, config)?;
    }

    let message_key = state.receiver_chains[chain_index].chain.next();
    let keys = derive_message_keys(&message_key);
    let plaintext = open(&keys, &message.ciphertext, &associated_data)?;
    state.pending_pre_key = None;

    Ok(plaintext)
}
