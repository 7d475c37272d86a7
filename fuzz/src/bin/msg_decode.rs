#[macro_use]
extern crate afl;
use vesper::{PreKeySignalMessage, SenderKeyDistributionMessage, SenderKeyMessage, SignalMessage};

fn main() {
    fuzz!(|data: &[u8]| {
        let _ = SignalMessage::from_bytes(data);
        let _ = PreKeySignalMessage::from_bytes(data);
        let _ = SenderKeyMessage::from_bytes(data);
        let _ = SenderKeyDistributionMessage::from_bytes(data);
    });
}
