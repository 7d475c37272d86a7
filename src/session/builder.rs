use crate::session::record::SessionRecord;
use crate::session::state::{PendingPreKey, SessionState};
use crate::store::{Direction, ProtocolStore};
use crate::{
    Error, PreKeyBundle, PreKeySignalMessage, ProtocolAddress, SessionConfig, X25519Secret,
    generate_random_seed, x3dh,
};

/// Establishes outgoing sessions from published pre-key bundles.
pub struct SessionBuilder<'a, S: ProtocolStore> {
    store: &'a mut S,
    remote_address: ProtocolAddress,
    config: SessionConfig,
}

impl<'a, S: ProtocolStore> SessionBuilder<'a, S> {
    pub fn new(store: &'a mut S, remote_address: ProtocolAddress, config: SessionConfig) -> Self {
        Self {
            store,
            remote_address,
            config,
        }
    }

    /// Runs the initiator side of the agreement and installs a fresh session
    /// state in front of any existing ones.
    ///
    /// Nothing is written to the store until the bundle's signature and the
    /// identity trust check have both passed. Re-processing a bundle for a
    /// peer whose session is already confirmed is a no-op.
    pub async fn process_pre_key_bundle(&mut self, bundle: &PreKeyBundle) -> Result<(), Error> {
        bundle.verify()?;

        if !self
            .store
            .is_trusted_identity(&self.remote_address, bundle.identity(), Direction::Sending)
            .await?
        {
            return Err(Error::UntrustedIdentity(self.remote_address.to_string()));
        }

        let mut record = match self.store.load_session(&self.remote_address).await? {
            Some(bytes) => SessionRecord::deserialize(&bytes)?,
            None => SessionRecord::new_empty(),
        };

        if let Some(state) = record.open_state_mut()
            && state.is_confirmed()
            && state.remote_identity == *bundle.identity()
        {
            return Ok(());
        }

        let our_identity = self.store.our_identity().await?;
        let base_key = X25519Secret::from(generate_random_seed()?);
        let shared_secret =
            x3dh::initiate(&our_identity, &base_key, bundle, &self.config.protocol_info)?;

        let pending = PendingPreKey {
            pre_key_id: bundle.pre_key().map(|(id, _)| id),
            signed_pre_key_id: bundle.signed_pre_key_id(),
            base_key: base_key.public_key(),
        };
        let state = SessionState::new_initiator(
            shared_secret,
            &bundle.signed_pre_key(),
            *bundle.identity(),
            bundle.registration_id(),
            pending,
        )?;

        record.push_state(state, &self.config);
        self.store
            .store_session(&self.remote_address, &record.serialize())
            .await
    }
}

/// Responder side of session establishment, driven by an incoming pre-key
/// message.
///
/// If a state built from the same initiator base key already exists, that
/// state is promoted and reused; a retransmission must not fork the session.
/// Returns the one-time pre-key id to consume once the embedded message
/// actually decrypts.
pub(crate) async fn process_pre_key_message<S: ProtocolStore>(
    store: &S,
    address: &ProtocolAddress,
    config: &SessionConfig,
    record: &mut SessionRecord,
    message: &PreKeySignalMessage,
) -> Result<Option<u32>, Error> {
    if let Some(index) = record.state_index_with_base_key(message.base_key.as_bytes()) {
        record.promote(index);
        return Ok(None);
    }

    if !store
        .is_trusted_identity(address, &message.identity_key, Direction::Receiving)
        .await?
    {
        return Err(Error::UntrustedIdentity(address.to_string()));
    }

    let signed_pre_key = store
        .load_signed_pre_key(message.signed_pre_key_id)
        .await?
        .ok_or_else(|| {
            Error::PreKey(format!(
                "signed pre-key {} not found",
                message.signed_pre_key_id
            ))
        })?;

    let one_time_pre_key = match message.pre_key_id {
        Some(id) => Some(store.load_pre_key(id).await?.ok_or_else(|| {
            Error::PreKey(format!("one-time pre-key {id} not found (already consumed?)"))
        })?),
        None => None,
    };

    let our_identity = store.our_identity().await?;
    let shared_secret = x3dh::respond(
        &our_identity,
        &signed_pre_key,
        one_time_pre_key.as_ref(),
        &message.identity_key,
        &message.base_key,
        &config.protocol_info,
    )?;

    let state = SessionState::new_responder(
        shared_secret,
        signed_pre_key.key_pair(),
        message.identity_key,
        message.registration_id,
        message.base_key.to_bytes(),
    );
    record.push_state(state, config);

    Ok(message.pre_key_id)
}
