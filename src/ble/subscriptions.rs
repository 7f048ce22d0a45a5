//! Per-channel notification subscription state (CCCD bookkeeping).
//!
//! Purely observational: the aggregator publishes regardless of what is
//! recorded here; the stack itself skips observers that are not
//! subscribed.

use crate::ble::LinkHandle;
use crate::config::MAX_SENSOR_CHANNELS;
use crate::error::Error;

#[derive(Clone, Debug, Default)]
pub struct SubscriptionTracker {
    enabled: [bool; MAX_SENSOR_CHANNELS],
    channels: usize,
}

impl SubscriptionTracker {
    /// Track `channels` sensor channels (clamped to the service size).
    pub fn new(channels: usize) -> Self {
        Self {
            enabled: [false; MAX_SENSOR_CHANNELS],
            channels: channels.min(MAX_SENSOR_CHANNELS),
        }
    }

    /// Record a CCCD write from an observer.
    pub fn on_change(&mut self, channel: usize, handle: LinkHandle, enabled: bool) -> Result<(), Error> {
        if channel >= self.channels {
            warn!("CCCD update for unknown sensor channel {}", channel);
            return Err(Error::UnknownChannel);
        }
        self.enabled[channel] = enabled;
        if enabled {
            info!("Sensor {} 'Notify' enabled (handle {})", channel, handle.0);
        } else {
            info!("Sensor {} 'Notify' disabled (handle {})", channel, handle.0);
        }
        Ok(())
    }

    pub fn is_enabled(&self, channel: usize) -> bool {
        channel < self.channels && self.enabled[channel]
    }

    pub fn enabled_count(&self) -> usize {
        self.enabled[..self.channels].iter().filter(|e| **e).count()
    }

    /// Forget everything an observer set (its link went away).
    pub fn clear(&mut self) {
        self.enabled = [false; MAX_SENSOR_CHANNELS];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_enable_and_disable() {
        let mut subs = SubscriptionTracker::new(4);
        subs.on_change(2, LinkHandle(0), true).unwrap();
        assert!(subs.is_enabled(2));
        assert_eq!(subs.enabled_count(), 1);
        subs.on_change(2, LinkHandle(0), false).unwrap();
        assert!(!subs.is_enabled(2));
    }

    #[test]
    fn rejects_channel_out_of_range() {
        let mut subs = SubscriptionTracker::new(2);
        assert_eq!(subs.on_change(2, LinkHandle(0), true), Err(Error::UnknownChannel));
        assert!(!subs.is_enabled(2));
    }

    #[test]
    fn clear_resets_all_channels() {
        let mut subs = SubscriptionTracker::new(3);
        for ch in 0..3 {
            subs.on_change(ch, LinkHandle(1), true).unwrap();
        }
        subs.clear();
        assert_eq!(subs.enabled_count(), 0);
    }
}
