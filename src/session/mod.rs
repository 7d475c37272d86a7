mod builder;
mod cipher;
mod record;
mod state;

pub use builder::SessionBuilder;
pub use cipher::SessionCipher;
pub use record::SessionRecord;
