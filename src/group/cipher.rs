use crate::chain::{derive_message_keys, open, seal};
use crate::group::state::SenderKeyRecord;
use crate::message::{MESSAGE_VERSION, SenderKeyMessage};
use crate::store::ProtocolStore;
use crate::{Error, SenderKeyName, SessionConfig};
use ed25519_dalek::{Signer, Verifier};

/// Encrypts and decrypts on one group sender-key chain.
///
/// The name binds the cipher to a single (group, sender) pair; decryption
/// verifies the chain's signature before touching any key material.
pub struct GroupCipher<'a, S: ProtocolStore> {
    store: &'a mut S,
    name: SenderKeyName,
    config: SessionConfig,
}

impl<'a, S: ProtocolStore> GroupCipher<'a, S> {
    pub fn new(store: &'a mut S, name: SenderKeyName, config: SessionConfig) -> Self {
        Self {
            store,
            name,
            config,
        }
    }

    /// Encrypts one message on this device's sending chain for the group.
    pub async fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let bytes = self
            .store
            .load_sender_key(&self.name)
            .await?
            .ok_or_else(|| Error::NoSenderKey(self.name.to_string()))?;
        let mut record = SenderKeyRecord::deserialize(&bytes)?;

        let message = {
            let state = record
                .state_for_sending()
                .ok_or_else(|| Error::NoSenderKey(self.name.to_string()))?;
            let signer = state
                .signing_private
                .clone()
                .ok_or_else(|| Error::NoSenderKey(self.name.to_string()))?;

            let iteration = state.chain.index();
            let associated_data = header_bytes(state.chain_id, iteration);

            let message_key = state.chain.next();
            let keys = derive_message_keys(&message_key);
            let ciphertext = seal(&keys, plaintext, &associated_data)?;

            let body = SenderKeyMessage::signed_payload(state.chain_id, iteration, &ciphertext);
            SenderKeyMessage {
                chain_id: state.chain_id,
                iteration,
                ciphertext,
                signature: signer.sign(&body),
            }
        };

        self.store
            .store_sender_key(&self.name, &record.serialize())
            .await?;

        Ok(message.to_bytes())
    }

    /// Decrypts one group message from the sender this cipher is bound to.
    ///
    /// The record is persisted only after a successful decrypt; a forged or
    /// stale message leaves stored state untouched.
    pub async fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        let bytes = self
            .store
            .load_sender_key(&self.name)
            .await?
            .ok_or_else(|| Error::NoSenderKey(self.name.to_string()))?;
        let mut record = SenderKeyRecord::deserialize(&bytes)?;

        let message = SenderKeyMessage::from_bytes(ciphertext)?;

        let plaintext = {
            let state = record
                .state_mut_by_chain_id(message.chain_id)
                .ok_or_else(|| Error::NoSenderKey(self.name.to_string()))?;

            let body =
                SenderKeyMessage::signed_payload(message.chain_id, message.iteration, &message.ciphertext);
            state
                .signing_public
                .verify(&body, &message.signature)
                .map_err(|_| Error::Mac)?;

            let associated_data = header_bytes(message.chain_id, message.iteration);

            if let Some(message_key) = state.take_skipped(message.iteration) {
                let keys = derive_message_keys(&message_key);
                open(&keys, &message.ciphertext, &associated_data)?
            } else {
                let current = state.chain.index();
                if message.iteration < current {
                    return Err(Error::StaleCounter {
                        counter: message.iteration,
                        current,
                    });
                }
                if message.iteration > current {
                    state.skip_message_keys(message.iteration, &self.config)?;
                }

                let message_key = state.chain.next();
                let keys = derive_message_keys(&message_key);
                open(&keys, &message.ciphertext, &associated_data)?
            }
        };

        self.store
            .store_sender_key(&self.name, &record.serialize())
            .await?;

        Ok(plaintext)
    }
}

fn header_bytes(chain_id: u32, iteration: u32) -> [u8; 9] {
    let mut bytes = [0u8; 9];
    bytes[0] = MESSAGE_VERSION;
    bytes[1..5].copy_from_slice(&chain_id.to_be_bytes());
    bytes[5..9].copy_from_slice(&iteration.to_be_bytes());

    bytes
}
