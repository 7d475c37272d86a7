/// Policy constants the protocol itself cannot derive.
///
/// The defaults are conservative; deployments that need a different skip
/// window or history depth override them instead of patching constants.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Upper bound on message keys derived ahead of (or retained behind) the
    /// current chain position to tolerate out-of-order delivery.
    pub max_skipped_message_keys: usize,
    /// How many historical session states a record keeps to absorb races.
    pub max_archived_sessions: usize,
    /// How many retired receiving chains a single session state keeps.
    pub max_receiver_chains: usize,
    /// How many historical sender-key chains a record keeps per sender.
    pub max_sender_key_states: usize,
    /// Application-specific info fed into the X3DH key derivation.
    pub protocol_info: Vec<u8>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_skipped_message_keys: 2000,
            max_archived_sessions: 5,
            max_receiver_chains: 5,
            max_sender_key_states: 5,
            protocol_info: b"Vesper-E2E-v1".to_vec(),
        }
    }
}
