//! Hub context - owns the pool, the scanner and the channel bindings and
//! dispatches link events one at a time.
//!
//! Sensor channel `i` is bound to pool slot `i` for every peer channel; the
//! last channel carries the hub's own (locally measured) data.  Binding is
//! by allocation order only, so a node that reconnects may land on a
//! different channel.

use crate::ble::pool::ConnectionPool;
use crate::ble::scanner::ScanController;
use crate::ble::subscriptions::SubscriptionTracker;
use crate::ble::{uart_client, LinkEvent, LinkHandle, RadioControl};
use crate::buffer::DataBuffer;
use crate::config::{DeviceConfig, Role};
use crate::error::Error;

pub struct Hub<const N: usize> {
    pool: ConnectionPool<N>,
    scanner: ScanController,
    subscriptions: SubscriptionTracker,
    local: DataBuffer,
    sensor_count: usize,
}

impl<const N: usize> Hub<N> {
    pub fn new(config: &DeviceConfig) -> Result<Self, Error> {
        config.validate()?;
        if config.role != Role::Central || config.required_peer_links() > N {
            return Err(Error::InvalidConfig);
        }
        Ok(Self {
            pool: ConnectionPool::new(),
            scanner: ScanController::new(ScanController::default_params()),
            subscriptions: SubscriptionTracker::new(config.sensor_count()),
            local: DataBuffer::new(),
            sensor_count: config.sensor_count(),
        })
    }

    /// Begin looking for sensor nodes.
    pub fn start(&mut self, radio: &mut impl RadioControl) {
        info!("Hub started: {} sensor channels, pool of {}", self.sensor_count, N);
        self.scanner.resume(radio);
    }

    pub fn handle_event(&mut self, event: LinkEvent, radio: &mut impl RadioControl) {
        match event {
            LinkEvent::AdvertisementSeen(report) => {
                self.scanner.on_advertisement(&report, radio);
            }
            LinkEvent::Connected {
                handle,
                generation,
                name,
            } => {
                if self
                    .scanner
                    .on_connected(&mut self.pool, handle, generation, &name, radio)
                    .is_ok()
                {
                    uart_client::start_discovery(&mut self.pool, handle, radio);
                }
            }
            LinkEvent::ConnectFailed => self.scanner.on_connect_failed(radio),
            LinkEvent::Disconnected {
                handle,
                generation,
                reason,
            } => {
                self.scanner
                    .on_disconnected(&mut self.pool, handle, generation, reason, radio);
            }
            LinkEvent::DiscoveryComplete {
                handle,
                generation,
                found,
            } => {
                if !self.is_current(handle, generation) {
                    return;
                }
                if uart_client::on_discovery_complete(&mut self.pool, handle, found, radio) {
                    info!("Continue scanning for more peripherals");
                    self.scanner.resume(radio);
                }
            }
            LinkEvent::Data {
                handle,
                generation,
                fragment,
            } => {
                if self.is_current(handle, generation) {
                    uart_client::relay(&mut self.pool, handle, [fragment.as_slice()]);
                }
            }
            LinkEvent::SubscriptionChanged {
                channel,
                handle,
                enabled,
            } => {
                let _ = self.subscriptions.on_change(channel, handle, enabled);
            }
            LinkEvent::ObserverDisconnected { handle, reason } => {
                info!("Observer {} disconnected, reason = {=u8:#x}", handle.0, reason);
                self.subscriptions.clear();
            }
        }
    }

    /// Events from a link the pool no longer holds are dropped.
    fn is_current(&self, handle: LinkHandle, generation: u32) -> bool {
        let current = self.pool.find_link(handle, generation).is_some();
        if !current {
            debug!("event for stale link {} (generation {}) dropped", handle.0, generation);
        }
        current
    }

    /// Buffer published on the hub's own channel.
    pub fn local_buffer_mut(&mut self) -> &mut DataBuffer {
        &mut self.local
    }

    pub fn local_channel(&self) -> usize {
        self.sensor_count - 1
    }

    /// Exactly `sensor_count - 1` peer links must be up; one more or one
    /// less suppresses publishing.
    pub fn quorum_met(&self) -> bool {
        self.scanner.connected_links() == self.sensor_count - 1
    }

    /// Current bytes bound to `channel`.
    pub fn channel_data(&self, channel: usize) -> Option<&[u8]> {
        if channel == self.local_channel() {
            Some(self.local.as_bytes())
        } else if channel < self.local_channel() {
            self.pool.slot(channel).map(|s| s.data.as_bytes())
        } else {
            None
        }
    }

    /// Publish every channel's buffer once the quorum is met.
    ///
    /// Returns how many channels were pushed successfully; a failing
    /// channel is logged and skipped.
    pub fn notify_new_values(&mut self, radio: &mut impl RadioControl) -> usize {
        if !self.quorum_met() {
            return 0;
        }
        let mut sent = 0;
        for channel in 0..self.sensor_count {
            let data = self.channel_data(channel).unwrap_or(&[]);
            match radio.publish_notification(channel, data) {
                Ok(()) => sent += 1,
                Err(e) => debug!("notify on sensor {} failed: {}", channel, e),
            }
        }
        sent
    }

    pub fn pool(&self) -> &ConnectionPool<N> {
        &self.pool
    }

    pub fn scanner(&self) -> &ScanController {
        &self.scanner
    }

    pub fn subscriptions(&self) -> &SubscriptionTracker {
        &self.subscriptions
    }
}
