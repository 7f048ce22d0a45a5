//! Sensor-node side: a single outbound UART relay carrying the node's own
//! formatted orientation.
//!
//! No scanning and no pool; the relay only remembers how many observers
//! (normally the hub) are connected and pushes its buffer on each poll.

use crate::ble::{LinkHandle, RelaySink};
use crate::buffer::DataBuffer;
use crate::quaternion::Quaternion;

#[derive(Default)]
pub struct PeripheralRelay {
    buffer: DataBuffer,
    observers: usize,
}

impl PeripheralRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connect(&mut self, handle: LinkHandle) {
        self.observers += 1;
        info!("Relay: central connected (handle {})", handle.0);
    }

    pub fn on_disconnect(&mut self, handle: LinkHandle, reason: u8) {
        self.observers = self.observers.saturating_sub(1);
        info!("Relay: handle {} disconnected, reason = {=u8:#x}", handle.0, reason);
    }

    pub fn is_connected(&self) -> bool {
        self.observers > 0
    }

    /// Render `q` into the outbound buffer.
    pub fn update(&mut self, q: &Quaternion) {
        q.write_ascii(&mut self.buffer);
    }

    pub fn buffer(&self) -> &DataBuffer {
        &self.buffer
    }

    /// Push the buffer to the connected central; a no-op when nobody is
    /// connected.  Returns whether anything was sent.
    pub fn publish(&self, sink: &mut impl RelaySink) -> bool {
        if !self.is_connected() {
            return false;
        }
        match sink.send(self.buffer.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                debug!("Relay: send failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BleError, Error};
    use std::vec::Vec;

    #[derive(Default)]
    struct Sink {
        sent: Vec<Vec<u8>>,
        fail: bool,
    }

    impl RelaySink for Sink {
        fn send(&mut self, data: &[u8]) -> Result<(), Error> {
            if self.fail {
                return Err(Error::Ble(BleError::NotifyFailed));
            }
            self.sent.push(data.to_vec());
            Ok(())
        }
    }

    #[test]
    fn publishes_only_while_connected() {
        let mut relay = PeripheralRelay::new();
        let mut sink = Sink::default();
        relay.update(&Quaternion::IDENTITY);
        assert!(!relay.publish(&mut sink));

        relay.on_connect(LinkHandle(0));
        assert!(relay.publish(&mut sink));
        assert_eq!(sink.sent[0], b"1.00000000,0.00000000,0.00000000,0.00000000,");

        relay.on_disconnect(LinkHandle(0), 0x13);
        assert!(!relay.publish(&mut sink));
        assert_eq!(sink.sent.len(), 1);
    }

    #[test]
    fn send_failure_is_contained() {
        let mut relay = PeripheralRelay::new();
        relay.on_connect(LinkHandle(0));
        let mut sink = Sink {
            fail: true,
            ..Default::default()
        };
        assert!(!relay.publish(&mut sink));
    }
}
