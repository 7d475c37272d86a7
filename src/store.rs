use crate::{
    Error, IdentityKey, IdentityKeyPair, PreKeyRecord, ProtocolAddress, SenderKeyName,
    SignedPreKeyRecord,
};
use async_trait::async_trait;
use std::collections::HashMap;

/// Which way a session operation is about to use an identity key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Sending,
    Receiving,
}

/// Identity material and trust decisions.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn our_identity(&self) -> Result<IdentityKeyPair, Error>;

    async fn our_registration_id(&self) -> Result<u32, Error>;

    /// Whether `identity` may be used for `address`. Returning `false` aborts
    /// the operation before anything is written.
    async fn is_trusted_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
        direction: Direction,
    ) -> Result<bool, Error>;
}

/// Lookup and consumption of published pre-keys.
#[async_trait]
pub trait PreKeyStore: Send + Sync {
    async fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>, Error>;

    /// Removes a one-time pre-key after it has been consumed by a successful
    /// decrypt.
    async fn remove_pre_key(&mut self, id: u32) -> Result<(), Error>;

    async fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>, Error>;
}

/// Persistence for serialized pairwise session records.
///
/// Records are opaque bytes to the store; all interpretation, including
/// tolerance of legacy formats, happens in the protocol layer.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_session(&self, address: &ProtocolAddress) -> Result<Option<Vec<u8>>, Error>;

    async fn store_session(
        &mut self,
        address: &ProtocolAddress,
        record: &[u8],
    ) -> Result<(), Error>;
}

/// Persistence for serialized sender-key records.
#[async_trait]
pub trait SenderKeyStore: Send + Sync {
    async fn load_sender_key(&self, name: &SenderKeyName) -> Result<Option<Vec<u8>>, Error>;

    async fn store_sender_key(
        &mut self,
        name: &SenderKeyName,
        record: &[u8],
    ) -> Result<(), Error>;
}

/// Everything the session and group machinery needs from the caller.
pub trait ProtocolStore: IdentityStore + PreKeyStore + SessionStore + SenderKeyStore {}

impl<S: IdentityStore + PreKeyStore + SessionStore + SenderKeyStore> ProtocolStore for S {}

/// A HashMap-backed store for tests and short-lived processes.
///
/// Trusts an identity on first use, then pins it: a later, different key for
/// the same address fails the trust check until replaced via
/// [`InMemoryStore::set_identity`].
pub struct InMemoryStore {
    identity: IdentityKeyPair,
    registration_id: u32,
    known_identities: HashMap<String, IdentityKey>,
    pre_keys: HashMap<u32, PreKeyRecord>,
    signed_pre_keys: HashMap<u32, SignedPreKeyRecord>,
    sessions: HashMap<String, Vec<u8>>,
    sender_keys: HashMap<String, Vec<u8>>,
    session_writes: usize,
}

impl InMemoryStore {
    pub fn new(identity: IdentityKeyPair, registration_id: u32) -> Self {
        Self {
            identity,
            registration_id,
            known_identities: HashMap::new(),
            pre_keys: HashMap::new(),
            signed_pre_keys: HashMap::new(),
            sessions: HashMap::new(),
            sender_keys: HashMap::new(),
            session_writes: 0,
        }
    }

    pub fn add_pre_key(&mut self, record: PreKeyRecord) {
        self.pre_keys.insert(record.id(), record);
    }

    pub fn add_signed_pre_key(&mut self, record: SignedPreKeyRecord) {
        self.signed_pre_keys.insert(record.id(), record);
    }

    /// Pins (or re-pins) the identity trusted for an address.
    pub fn set_identity(&mut self, address: &ProtocolAddress, identity: IdentityKey) {
        self.known_identities.insert(address.to_string(), identity);
    }

    /// Injects raw record bytes, as a migration from another store would.
    pub fn put_session(&mut self, address: &ProtocolAddress, record: Vec<u8>) {
        self.sessions.insert(address.to_string(), record);
    }

    pub fn contains_pre_key(&self, id: u32) -> bool {
        self.pre_keys.contains_key(&id)
    }

    /// Number of session-record writes performed so far.
    pub fn session_writes(&self) -> usize {
        self.session_writes
    }
}

#[async_trait]
impl IdentityStore for InMemoryStore {
    async fn our_identity(&self) -> Result<IdentityKeyPair, Error> {
        Ok(self.identity.clone())
    }

    async fn our_registration_id(&self) -> Result<u32, Error> {
        Ok(self.registration_id)
    }

    async fn is_trusted_identity(
        &self,
        address: &ProtocolAddress,
        identity: &IdentityKey,
        _direction: Direction,
    ) -> Result<bool, Error> {
        match self.known_identities.get(&address.to_string()) {
            Some(known) => Ok(known == identity),
            None => Ok(true),
        }
    }
}

#[async_trait]
impl PreKeyStore for InMemoryStore {
    async fn load_pre_key(&self, id: u32) -> Result<Option<PreKeyRecord>, Error> {
        Ok(self.pre_keys.get(&id).cloned())
    }

    async fn remove_pre_key(&mut self, id: u32) -> Result<(), Error> {
        self.pre_keys.remove(&id);
        Ok(())
    }

    async fn load_signed_pre_key(&self, id: u32) -> Result<Option<SignedPreKeyRecord>, Error> {
        Ok(self.signed_pre_keys.get(&id).cloned())
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    async fn load_session(&self, address: &ProtocolAddress) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.sessions.get(&address.to_string()).cloned())
    }

    async fn store_session(
        &mut self,
        address: &ProtocolAddress,
        record: &[u8],
    ) -> Result<(), Error> {
        self.session_writes += 1;
        self.sessions.insert(address.to_string(), record.to_vec());
        Ok(())
    }
}

#[async_trait]
impl SenderKeyStore for InMemoryStore {
    async fn load_sender_key(&self, name: &SenderKeyName) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.sender_keys.get(&name.to_string()).cloned())
    }

    async fn store_sender_key(
        &mut self,
        name: &SenderKeyName,
        record: &[u8],
    ) -> Result<(), Error> {
        self.sender_keys.insert(name.to_string(), record.to_vec());
        Ok(())
    }
}
