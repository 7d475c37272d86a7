use crate::proto;
use crate::session::state::SessionState;
use crate::{Error, SessionConfig};
use prost::Message;

/// Leading byte of the canonical serialized record format.
const RECORD_VERSION: u8 = 1;

/// Older stores serialized `Uint8Array`s through JSON as
/// `{"type":"Buffer","data":[...]}`; the payload inside is a record in some
/// other recognized format.
#[derive(serde::Deserialize)]
struct BufferShape {
    #[serde(rename = "type")]
    kind: String,
    data: Vec<u8>,
}

/// Every pairwise session ever established with one address, most recent
/// first.
///
/// Only the front state encrypts; decryption may fall back to any state, and
/// a state that decrypts is promoted to the front.
#[derive(Clone, Default)]
pub struct SessionRecord {
    pub(crate) states: Vec<SessionState>,
}

impl SessionRecord {
    pub fn new_empty() -> Self {
        Self::default()
    }

    pub fn has_open_session(&self) -> bool {
        !self.states.is_empty()
    }

    pub(crate) fn open_state_mut(&mut self) -> Option<&mut SessionState> {
        self.states.first_mut()
    }

    /// Finds the state established from a given initiator base key, so a
    /// retransmitted or racing pre-key message reuses it instead of forking.
    pub(crate) fn state_index_with_base_key(&self, base_key: &[u8; 32]) -> Option<usize> {
        self.states
            .iter()
            .position(|state| state.alice_base_key.as_ref() == Some(base_key))
    }

    pub(crate) fn promote(&mut self, index: usize) {
        if index > 0 {
            let state = self.states.remove(index);
            self.states.insert(0, state);
        }
    }

    /// Installs a new front state; older states stay around to absorb
    /// messages from racing or superseded sessions, up to the bound.
    pub(crate) fn push_state(&mut self, state: SessionState, config: &SessionConfig) {
        self.states.insert(0, state);
        if self.states.len() > config.max_archived_sessions {
            tracing::warn!("session history full, dropping oldest state");
            self.states.truncate(config.max_archived_sessions);
        }
    }

    pub fn serialize(&self) -> Vec<u8> {
        let record = proto::SessionRecordProto {
            states: self.states.iter().map(SessionState::to_proto).collect(),
        };

        let mut bytes = Vec::with_capacity(1 + record.encoded_len());
        bytes.push(RECORD_VERSION);
        bytes.extend_from_slice(&record.encode_to_vec());

        bytes
    }

    /// Parses stored record bytes, tolerating the shapes older deployments
    /// left behind.
    ///
    /// Unrecognized legacy session payloads resolve to an empty record: the
    /// old ratchet material is unusable anyway, and an empty record lets the
    /// next pre-key message rebuild the session instead of wedging it.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.is_empty() {
            return Ok(Self::new_empty());
        }

        if bytes[0] == RECORD_VERSION {
            let record = proto::SessionRecordProto::decode(&bytes[1..])
                .map_err(|err| Error::MalformedRecord(err.to_string()))?;

            let mut states = Vec::with_capacity(record.states.len());
            for state in record.states {
                states.push(SessionState::from_proto(state)?);
            }
            return Ok(Self { states });
        }

        Self::from_legacy_json(bytes)
    }

    fn from_legacy_json(bytes: &[u8]) -> Result<Self, Error> {
        if let Ok(buffer) = serde_json::from_slice::<BufferShape>(bytes)
            && buffer.kind == "Buffer"
        {
            // One level of wrapping is all that was ever produced, but the
            // dispatch is recursive so nested wrappers also resolve.
            return Self::deserialize(&buffer.data);
        }

        match serde_json::from_slice::<serde_json::Value>(bytes) {
            Ok(serde_json::Value::Object(object))
                if object.contains_key("_sessions")
                    || object.contains_key("sessions")
                    || object.contains_key("registrationId") =>
            {
                tracing::warn!("discarding legacy session record; sessions will re-establish");
                Ok(Self::new_empty())
            }
            _ => Err(Error::MalformedRecord(
                "unrecognized record format".to_string(),
            )),
        }
    }
}
