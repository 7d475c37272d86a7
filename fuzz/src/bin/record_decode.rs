#[macro_use]
extern crate afl;
use vesper::{SenderKeyRecord, SessionRecord};

fn main() {
    fuzz!(|data: &[u8]| {
        if let Ok(record) = SessionRecord::deserialize(data) {
            let _ = record.serialize();
        }
        if let Ok(record) = SenderKeyRecord::deserialize(data) {
            let _ = record.serialize();
        }
    });
}
