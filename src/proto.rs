//! Canonical serialized forms of session and sender-key records.
//!
//! Conversions to and from the in-memory types live next to those types;
//! these structs only describe the bytes.

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct ChainProto {
    #[prost(bytes = "vec", tag = "1")]
    pub chain_key: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub index: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct ReceiverChainProto {
    #[prost(bytes = "vec", tag = "1")]
    pub ratchet_key: Vec<u8>,
    #[prost(message, optional, tag = "2")]
    pub chain: Option<ChainProto>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct SkippedKeyProto {
    #[prost(bytes = "vec", tag = "1")]
    pub ratchet_key: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub counter: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub message_key: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct PendingPreKeyProto {
    #[prost(uint32, optional, tag = "1")]
    pub pre_key_id: Option<u32>,
    #[prost(uint32, tag = "2")]
    pub signed_pre_key_id: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub base_key: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct SessionStateProto {
    #[prost(bytes = "vec", tag = "1")]
    pub root_key: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub sender_ratchet_key: Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub sender_chain: Option<ChainProto>,
    #[prost(uint32, tag = "4")]
    pub previous_counter: u32,
    #[prost(message, repeated, tag = "5")]
    pub receiver_chains: Vec<ReceiverChainProto>,
    #[prost(bytes = "vec", tag = "6")]
    pub remote_identity: Vec<u8>,
    #[prost(uint32, tag = "7")]
    pub remote_registration_id: u32,
    #[prost(bytes = "vec", tag = "8")]
    pub alice_base_key: Vec<u8>,
    #[prost(message, optional, tag = "9")]
    pub pending_pre_key: Option<PendingPreKeyProto>,
    #[prost(message, repeated, tag = "10")]
    pub skipped_keys: Vec<SkippedKeyProto>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct SessionRecordProto {
    /// Most recent state first.
    #[prost(message, repeated, tag = "1")]
    pub states: Vec<SessionStateProto>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct SkippedSenderKeyProto {
    #[prost(uint32, tag = "1")]
    pub iteration: u32,
    #[prost(bytes = "vec", tag = "2")]
    pub message_key: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct SenderKeyStateProto {
    #[prost(uint32, tag = "1")]
    pub chain_id: u32,
    #[prost(message, optional, tag = "2")]
    pub chain: Option<ChainProto>,
    #[prost(bytes = "vec", tag = "3")]
    pub signing_public: Vec<u8>,
    /// Empty on receiver-side states.
    #[prost(bytes = "vec", tag = "4")]
    pub signing_private: Vec<u8>,
    #[prost(message, repeated, tag = "5")]
    pub skipped_keys: Vec<SkippedSenderKeyProto>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub(crate) struct SenderKeyRecordProto {
    #[prost(message, repeated, tag = "1")]
    pub states: Vec<SenderKeyStateProto>,
}
