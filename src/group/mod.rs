mod builder;
mod cipher;
mod state;

pub use builder::GroupSessionBuilder;
pub use cipher::GroupCipher;
pub use state::SenderKeyRecord;
