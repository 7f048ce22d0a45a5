//! Scan / connect controller.
//!
//! Scans for sensor nodes advertising the relay service, connects to each
//! one reported and binds successful links to a pool slot.  Scanning is
//! resumed after every handoff and after every disconnect, so the hub keeps
//! trying to fill its remaining capacity.
//!
//! ```text
//!   Idle ──start──▶ Scanning ──adv──▶ Connecting ──result──▶ Idle
//!     ▲                                                     │
//!     └──────────────── resume (handoff / disconnect) ◀──────┘
//! ```

use crate::ble::pool::ConnectionPool;
use crate::ble::{AdvReport, LinkHandle, PeerName, RadioControl, ScanParams, RELAY_SERVICE_UUID};
use crate::config::{BLE_MAX_CONNECTIONS, BLE_SCAN_ACTIVE, BLE_SCAN_INTERVAL, BLE_SCAN_WINDOW};
use crate::error::Error;
use heapless::Vec;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ScanState {
    Idle,
    Scanning,
    /// A connect request is outstanding; advertisements are ignored.
    Connecting,
}

pub struct ScanController {
    state: ScanState,
    params: ScanParams,
    /// Links reported up by the stack and not yet reported down,
    /// including ones rejected for lack of a slot.
    connected_links: usize,
    /// Links counted above that hold no slot, as `(handle, generation)`.
    rejected: Vec<(LinkHandle, u32), BLE_MAX_CONNECTIONS>,
}

impl ScanController {
    pub fn new(params: ScanParams) -> Self {
        Self {
            state: ScanState::Idle,
            params,
            connected_links: 0,
            rejected: Vec::new(),
        }
    }

    /// Passive scan filtered on the relay service, never times out.
    pub fn default_params() -> ScanParams {
        ScanParams {
            interval: BLE_SCAN_INTERVAL,
            window: BLE_SCAN_WINDOW,
            active: BLE_SCAN_ACTIVE,
            service: RELAY_SERVICE_UUID,
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn params(&self) -> &ScanParams {
        &self.params
    }

    pub fn connected_links(&self) -> usize {
        self.connected_links
    }

    /// Start scanning unless a scan or a connect is already running.
    pub fn resume(&mut self, radio: &mut impl RadioControl) {
        if self.state == ScanState::Idle {
            debug!("scan: (re)starting");
            radio.start_scan(&self.params);
            self.state = ScanState::Scanning;
        }
    }

    pub fn stop(&mut self, radio: &mut impl RadioControl) {
        if self.state == ScanState::Scanning {
            radio.stop_scan();
            self.state = ScanState::Idle;
        }
    }

    /// Request a connection to a matching advertiser.
    pub fn on_advertisement(&mut self, report: &AdvReport, radio: &mut impl RadioControl) -> bool {
        if self.state != ScanState::Scanning {
            debug!("scan: advertisement ignored in state {}", self.state);
            return false;
        }
        info!("scan: connecting to {} (RSSI {})", report.name.as_str(), report.rssi);
        match radio.connect(report) {
            Ok(()) => {
                self.state = ScanState::Connecting;
                true
            }
            Err(e) => {
                warn!("scan: connect request refused: {}", e);
                self.state = ScanState::Idle;
                self.resume(radio);
                false
            }
        }
    }

    pub fn on_connect_failed(&mut self, radio: &mut impl RadioControl) {
        warn!("scan: connect attempt failed");
        if self.state == ScanState::Connecting {
            self.state = ScanState::Idle;
        }
        self.resume(radio);
    }

    /// Bind a freshly connected link to a slot.
    ///
    /// When the pool is full the link is torn down on the spot and
    /// `Err(PoolExhausted)` returned; nothing else happens for it.
    pub fn on_connected<const N: usize>(
        &mut self,
        pool: &mut ConnectionPool<N>,
        handle: LinkHandle,
        generation: u32,
        name: &PeerName,
        radio: &mut impl RadioControl,
    ) -> Result<usize, Error> {
        if self.state == ScanState::Connecting {
            self.state = ScanState::Idle;
        }
        self.forget_handle(pool, handle);
        self.connected_links += 1;

        match pool.allocate(handle) {
            Ok(index) => {
                if let Some(slot) = pool.slot_mut(index) {
                    slot.name = name.clone();
                    slot.generation = generation;
                }
                info!("Connected to {} (handle {}, slot {})", name.as_str(), handle.0, index);
                Ok(index)
            }
            Err(e) => {
                warn!("pool: no free slot for handle {}, disconnecting", handle.0);
                if self.rejected.push((handle, generation)).is_err() {
                    warn!("scan: too many rejected links, handle {} untracked", handle.0);
                }
                radio.disconnect(handle);
                Err(e)
            }
        }
    }

    /// The stack only reuses a handle after its disconnect, so anything
    /// still bound to `handle` is a link whose disconnect is late.  Its
    /// own `Disconnected` is ignored when it arrives.
    fn forget_handle<const N: usize>(&mut self, pool: &mut ConnectionPool<N>, handle: LinkHandle) {
        if let Some(stale) = pool.release(handle) {
            warn!("pool: handle {} still bound to slot {}, recycling", handle.0, stale);
            self.connected_links = self.connected_links.saturating_sub(1);
        }
        let before = self.rejected.len();
        self.rejected.retain(|(h, _)| *h != handle);
        self.connected_links = self
            .connected_links
            .saturating_sub(before - self.rejected.len());
    }

    /// Release the slot (if any) and keep looking for peers.
    ///
    /// Disconnects for a link that was already recycled are dropped
    /// without touching the pool or the link count.
    pub fn on_disconnected<const N: usize>(
        &mut self,
        pool: &mut ConnectionPool<N>,
        handle: LinkHandle,
        generation: u32,
        reason: u8,
        radio: &mut impl RadioControl,
    ) -> Option<usize> {
        let released = match pool.find_link(handle, generation) {
            Some(index) => {
                pool.release(handle);
                self.connected_links = self.connected_links.saturating_sub(1);
                info!(
                    "handle {} (slot {}) disconnected, reason = {=u8:#x}",
                    handle.0,
                    index,
                    reason
                );
                Some(index)
            }
            None => {
                if let Some(pos) = self.rejected.iter().position(|l| *l == (handle, generation)) {
                    self.rejected.swap_remove(pos);
                    self.connected_links = self.connected_links.saturating_sub(1);
                    debug!("rejected link on handle {} closed", handle.0);
                } else {
                    debug!("disconnect for unknown link {} (generation {})", handle.0, generation);
                }
                None
            }
        };

        self.resume(radio);
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::mock::{report, Call, MockRadio};

    fn scanning(radio: &mut MockRadio) -> ScanController {
        let mut scan = ScanController::new(ScanController::default_params());
        scan.resume(radio);
        scan
    }

    #[test]
    fn default_params_filter_on_relay_service() {
        let p = ScanController::default_params();
        assert_eq!(p.interval, 160);
        assert_eq!(p.window, 80);
        assert!(!p.active);
        assert_eq!(p.service, RELAY_SERVICE_UUID);
    }

    #[test]
    fn advertisement_triggers_connect_once() {
        let mut radio = MockRadio::default();
        let mut scan = scanning(&mut radio);
        assert!(scan.on_advertisement(&report(1), &mut radio));
        assert!(!scan.on_advertisement(&report(2), &mut radio));
        assert_eq!(radio.take(), [Call::StartScan, Call::Connect(report(1).address)]);
        assert_eq!(scan.state(), ScanState::Connecting);
    }

    #[test]
    fn idle_controller_ignores_advertisements() {
        let mut radio = MockRadio::default();
        let mut scan = ScanController::new(ScanController::default_params());
        assert!(!scan.on_advertisement(&report(1), &mut radio));
        assert!(radio.calls.is_empty());
    }

    #[test]
    fn failed_connect_restarts_scan() {
        let mut radio = MockRadio::default();
        let mut scan = scanning(&mut radio);
        scan.on_advertisement(&report(1), &mut radio);
        radio.take();
        scan.on_connect_failed(&mut radio);
        assert_eq!(radio.take(), [Call::StartScan]);
        assert_eq!(scan.state(), ScanState::Scanning);
    }

    #[test]
    fn full_pool_disconnects_new_link() {
        let mut radio = MockRadio::default();
        let mut pool = ConnectionPool::<1>::new();
        let mut scan = scanning(&mut radio);
        let name = PeerName::new();

        assert_eq!(scan.on_connected(&mut pool, LinkHandle(0), 1, &name, &mut radio), Ok(0));
        radio.take();
        assert_eq!(
            scan.on_connected(&mut pool, LinkHandle(1), 2, &name, &mut radio),
            Err(Error::PoolExhausted)
        );
        assert_eq!(radio.take(), [Call::Disconnect(LinkHandle(1))]);
        assert_eq!(pool.find(LinkHandle(0)), Some(0));
        assert_eq!(scan.connected_links(), 2);

        // The rejected link still counts until the stack reports it gone.
        assert_eq!(scan.on_disconnected(&mut pool, LinkHandle(1), 2, 0x16, &mut radio), None);
        assert_eq!(scan.connected_links(), 1);
        assert_eq!(pool.find(LinkHandle(0)), Some(0));
    }

    #[test]
    fn reused_handle_recycles_stale_slot() {
        let mut radio = MockRadio::default();
        let mut pool = ConnectionPool::<2>::new();
        let mut scan = scanning(&mut radio);
        let name = PeerName::new();

        scan.on_connected(&mut pool, LinkHandle(1), 1, &name, &mut radio).unwrap();
        pool.by_handle_mut(LinkHandle(1)).unwrap().data.overwrite(b"old");
        // Handle reported up again before its disconnect arrived.
        assert_eq!(scan.on_connected(&mut pool, LinkHandle(1), 2, &name, &mut radio), Ok(0));
        assert_eq!(scan.connected_links(), 1);
        assert_eq!(pool.occupied_count(), 1);
        assert_eq!(pool.slot(0).unwrap().generation, 2);
        assert!(pool.slot(0).unwrap().data.is_empty());

        // The late disconnect of the first link leaves the new one bound.
        assert_eq!(scan.on_disconnected(&mut pool, LinkHandle(1), 1, 0x08, &mut radio), None);
        assert_eq!(pool.find_link(LinkHandle(1), 2), Some(0));
        assert_eq!(scan.connected_links(), 1);

        assert_eq!(scan.on_disconnected(&mut pool, LinkHandle(1), 2, 0x08, &mut radio), Some(0));
        assert_eq!(scan.connected_links(), 0);
        assert_eq!(pool.occupied_count(), 0);
    }

    #[test]
    fn refused_connect_request_restarts_scan() {
        let mut radio = MockRadio {
            refuse_connect: true,
            ..Default::default()
        };
        let mut scan = scanning(&mut radio);
        assert!(!scan.on_advertisement(&report(1), &mut radio));
        assert_eq!(
            radio.take(),
            [Call::StartScan, Call::Connect(report(1).address), Call::StartScan]
        );
        assert_eq!(scan.state(), ScanState::Scanning);
    }

    #[test]
    fn disconnect_of_unknown_handle_still_resumes_scan() {
        let mut radio = MockRadio::default();
        let mut pool = ConnectionPool::<2>::new();
        let mut scan = ScanController::new(ScanController::default_params());
        assert_eq!(scan.on_disconnected(&mut pool, LinkHandle(9), 1, 0x13, &mut radio), None);
        assert_eq!(radio.take(), [Call::StartScan]);
        assert_eq!(scan.connected_links(), 0);
    }

    #[test]
    fn peer_name_is_recorded() {
        let mut radio = MockRadio::default();
        let mut pool = ConnectionPool::<2>::new();
        let mut scan = scanning(&mut radio);
        let mut name = PeerName::new();
        name.push_str("wrist-left").unwrap();
        let idx = scan.on_connected(&mut pool, LinkHandle(4), 1, &name, &mut radio).unwrap();
        assert_eq!(pool.slot(idx).unwrap().name.as_str(), "wrist-left");
    }

    #[test]
    fn stop_only_touches_active_scan() {
        let mut radio = MockRadio::default();
        let mut scan = scanning(&mut radio);
        scan.stop(&mut radio);
        scan.stop(&mut radio);
        assert_eq!(radio.take(), [Call::StartScan, Call::StopScan]);
    }
}
