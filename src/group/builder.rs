use crate::chain::Chain;
use crate::group::state::{SenderKeyRecord, SenderKeyState};
use crate::store::ProtocolStore;
use crate::{
    Error, SenderKeyDistributionMessage, SenderKeyName, SessionConfig, generate_random_seed,
};
use ed25519_dalek::{SecretKey, SigningKey};
use rand::TryRngCore;
use rand::rngs::OsRng;

/// Creates and installs group sender-key sessions.
pub struct GroupSessionBuilder<'a, S: ProtocolStore> {
    store: &'a mut S,
    config: SessionConfig,
}

impl<'a, S: ProtocolStore> GroupSessionBuilder<'a, S> {
    pub fn new(store: &'a mut S, config: SessionConfig) -> Self {
        Self { store, config }
    }

    /// Creates (or re-describes) this device's sending chain for a group and
    /// returns the distribution message members need to read from it.
    ///
    /// Calling this again does not rotate the chain: the returned message
    /// describes the chain at its current iteration, so late joiners cannot
    /// read history.
    pub async fn create(
        &mut self,
        name: &SenderKeyName,
    ) -> Result<SenderKeyDistributionMessage, Error> {
        let mut record = match self.store.load_sender_key(name).await? {
            Some(bytes) => SenderKeyRecord::deserialize(&bytes)?,
            None => SenderKeyRecord::new_empty(),
        };

        if let Some(state) = record.state_for_sending() {
            return Ok(SenderKeyDistributionMessage {
                chain_id: state.chain_id,
                iteration: state.chain.index(),
                chain_key: state.chain.chain_key,
                signing_key: state.signing_public,
            });
        }

        let chain_id = OsRng.try_next_u32().map_err(|_| Error::Random)?;
        let chain = Chain::new(generate_random_seed()?);
        let signing_key = SigningKey::from_bytes(&SecretKey::from(generate_random_seed()?));

        let distribution = SenderKeyDistributionMessage {
            chain_id,
            iteration: 0,
            chain_key: chain.chain_key,
            signing_key: signing_key.verifying_key(),
        };

        record.push_state(
            SenderKeyState::new(chain_id, chain, signing_key.verifying_key(), Some(signing_key)),
            &self.config,
        );
        self.store
            .store_sender_key(name, &record.serialize())
            .await?;

        Ok(distribution)
    }

    /// Installs a sender's chain from a distribution message so this device
    /// can decrypt their group messages.
    ///
    /// Reprocessing a message for a known chain id resets that chain to the
    /// described position; a new chain id is stacked on top of older ones so
    /// in-flight messages on a previous chain still decrypt.
    pub async fn process(
        &mut self,
        name: &SenderKeyName,
        message: &SenderKeyDistributionMessage,
    ) -> Result<(), Error> {
        let mut record = match self.store.load_sender_key(name).await? {
            Some(bytes) => SenderKeyRecord::deserialize(&bytes)?,
            None => SenderKeyRecord::new_empty(),
        };

        let chain = Chain::from_parts(message.chain_key, message.iteration);
        match record.state_mut_by_chain_id(message.chain_id) {
            Some(state) => {
                state.chain = chain;
                state.signing_public = message.signing_key;
            }
            None => {
                record.push_state(
                    SenderKeyState::new(message.chain_id, chain, message.signing_key, None),
                    &self.config,
                );
            }
        }

        self.store.store_sender_key(name, &record.serialize()).await
    }
}
