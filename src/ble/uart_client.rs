//! Relay (UART) client - discovery / subscribe workflow and data relay.
//!
//! After a link is bound to a slot this module:
//! 1. Requests discovery of the relay service on the peer.
//! 2. On success enables notifications on its TX characteristic and marks
//!    the slot `Subscribed`.
//! 3. On failure asks the stack to disconnect; the slot is released later
//!    by the regular disconnect path, never from here.
//! 4. Copies every received payload into the slot's buffer, overwriting
//!    what was there.  There is no queue and no backpressure: payloads the
//!    aggregator does not pick up in time are lost.

use crate::ble::pool::{ConnectionPool, SlotState};
use crate::ble::{LinkHandle, RadioControl};

/// Start the workflow for a newly allocated slot.
pub fn start_discovery<const N: usize>(
    pool: &mut ConnectionPool<N>,
    handle: LinkHandle,
    radio: &mut impl RadioControl,
) {
    if pool.set_state(handle, SlotState::Discovering).is_err() {
        debug!("discovery: handle {} not in pool", handle.0);
        return;
    }
    info!("Discovering relay service on handle {}", handle.0);
    radio.discover_service(handle);
}

/// Continue the workflow once discovery has answered.
///
/// Returns `true` when the slot ended up `Subscribed`.
pub fn on_discovery_complete<const N: usize>(
    pool: &mut ConnectionPool<N>,
    handle: LinkHandle,
    found: bool,
    radio: &mut impl RadioControl,
) -> bool {
    let Some(slot) = pool.by_handle_mut(handle) else {
        debug!("discovery result for unknown handle {}", handle.0);
        return false;
    };
    if slot.state != SlotState::Discovering {
        warn!("discovery result for slot {} in state {}", slot.index(), slot.state);
        return false;
    }

    if found {
        info!("Relay service found on {}, enabling TX notifications", slot.name.as_str());
        radio.enable_notifications(handle);
        slot.state = SlotState::Subscribed;
        true
    } else {
        warn!("Relay service missing on {}, disconnecting", slot.name.as_str());
        slot.state = SlotState::Releasing;
        radio.disconnect(handle);
        false
    }
}

/// Drain `fragments` for `handle` into its slot buffer.
///
/// Each fragment replaces the previous one and is truncated to the usable
/// buffer length.  Returns the number of bytes left in the buffer, or
/// `None` when the handle has no slot.
pub fn relay<'a, const N: usize>(
    pool: &mut ConnectionPool<N>,
    handle: LinkHandle,
    fragments: impl IntoIterator<Item = &'a [u8]>,
) -> Option<usize> {
    let Some(slot) = pool.by_handle_mut(handle) else {
        debug!("data for unknown handle {} dropped", handle.0);
        return None;
    };

    let mut kept = slot.data.len();
    for fragment in fragments {
        kept = slot.data.overwrite(fragment);
        if kept < fragment.len() {
            debug!("slot {}: fragment truncated {} -> {}", slot.index(), fragment.len(), kept);
        }
    }
    Some(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::mock::{Call, MockRadio};

    fn pool_with(handle: LinkHandle) -> ConnectionPool<4> {
        let mut pool = ConnectionPool::new();
        pool.allocate(handle).unwrap();
        pool
    }

    #[test]
    fn discovery_success_subscribes() {
        let h = LinkHandle(2);
        let mut radio = MockRadio::default();
        let mut pool = pool_with(h);

        start_discovery(&mut pool, h, &mut radio);
        assert_eq!(pool.slot(0).unwrap().state, SlotState::Discovering);
        assert!(on_discovery_complete(&mut pool, h, true, &mut radio));

        assert_eq!(pool.slot(0).unwrap().state, SlotState::Subscribed);
        assert_eq!(radio.take(), [Call::Discover(h), Call::EnableNotifications(h)]);
    }

    #[test]
    fn discovery_failure_disconnects_but_keeps_slot() {
        let h = LinkHandle(2);
        let mut radio = MockRadio::default();
        let mut pool = pool_with(h);

        start_discovery(&mut pool, h, &mut radio);
        assert!(!on_discovery_complete(&mut pool, h, false, &mut radio));

        // Released only when the stack confirms the disconnect.
        assert_eq!(pool.find(h), Some(0));
        assert_eq!(pool.slot(0).unwrap().state, SlotState::Releasing);
        assert_eq!(radio.take(), [Call::Discover(h), Call::Disconnect(h)]);
    }

    #[test]
    fn late_discovery_result_is_ignored() {
        let h = LinkHandle(2);
        let mut radio = MockRadio::default();
        let mut pool = pool_with(h);
        assert!(!on_discovery_complete(&mut pool, h, true, &mut radio));
        assert!(!on_discovery_complete(&mut pool, LinkHandle(8), true, &mut radio));
        assert!(radio.calls.is_empty());
    }

    #[test]
    fn relay_overwrites_with_latest_fragment() {
        let h = LinkHandle(1);
        let mut pool = pool_with(h);
        let kept = relay(&mut pool, h, [&b"0.1,0.2"[..], &b"0.3,0.4,0.5"[..]]);
        assert_eq!(kept, Some(11));
        assert_eq!(pool.slot(0).unwrap().data.as_bytes(), b"0.3,0.4,0.5");
    }

    #[test]
    fn relay_truncates_oversized_fragment() {
        let h = LinkHandle(1);
        let mut pool = pool_with(h);
        let big = [0x5A; 60];
        assert_eq!(relay(&mut pool, h, [&big[..]]), Some(47));
        assert_eq!(pool.slot(0).unwrap().data.to_array()[47], 0);
    }

    #[test]
    fn relay_drops_unknown_handle() {
        let mut pool = pool_with(LinkHandle(1));
        assert_eq!(relay(&mut pool, LinkHandle(3), [&b"x"[..]]), None);
        assert!(pool.slot(0).unwrap().data.is_empty());
    }
}
