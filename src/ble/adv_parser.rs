//! Advertising data: scan filter / name extraction for the hub and
//! payload assembly for advertisers.

use crate::ble::PeerName;
use heapless::Vec;

/// Legacy advertising payload limit.
pub const ADV_PAYLOAD_LEN: usize = 31;

pub type AdvPayload = Vec<u8, ADV_PAYLOAD_LEN>;

const AD_FLAGS: u8 = 0x01;
const AD_UUID128_INCOMPLETE: u8 = 0x06;
const AD_UUID128_COMPLETE: u8 = 0x07;
const AD_SHORT_NAME: u8 = 0x08;
const AD_COMPLETE_NAME: u8 = 0x09;
const AD_TX_POWER: u8 = 0x0A;

/// LE General Discoverable, BR/EDR not supported.
const FLAGS_LE_ONLY_GENERAL_DISC: u8 = 0x06;

/// Iterate `(ad_type, payload)` pairs, stopping at the first malformed one.
fn ad_structures(data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut i = 0;
    core::iter::from_fn(move || {
        let len = *data.get(i)? as usize;
        if len == 0 || i + len >= data.len() {
            return None;
        }
        let item = (data[i + 1], &data[i + 2..i + 1 + len]);
        i += len + 1;
        Some(item)
    })
}

/// Check if raw advertisement data lists the 128-bit `service` UUID
/// (given in display order).
pub fn contains_service_uuid128(data: &[u8], service: &[u8; 16]) -> bool {
    let mut le = *service;
    le.reverse();

    ad_structures(data)
        .filter(|(t, _)| *t == AD_UUID128_INCOMPLETE || *t == AD_UUID128_COMPLETE)
        .any(|(_, uuids)| uuids.chunks_exact(16).any(|chunk| chunk == le))
}

/// Extract complete/shortened local name from advertisement data.
///
/// The name is UTF-8; decoding stops at the first invalid sequence and at
/// the last whole character that fits.  Empty when the advertiser sent
/// none.
pub fn extract_device_name(data: &[u8]) -> PeerName {
    let mut name = PeerName::new();
    if let Some((_, bytes)) =
        ad_structures(data).find(|(t, _)| *t == AD_SHORT_NAME || *t == AD_COMPLETE_NAME)
    {
        let text = match core::str::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => core::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
        };
        for c in text.chars() {
            if name.push(c).is_err() {
                break;
            }
        }
    }
    name
}

/// Advertising packet plus scan response.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvertisingData {
    pub adv: AdvPayload,
    pub scan_response: AdvPayload,
}

fn push_ad(buf: &mut AdvPayload, ad_type: u8, payload: &[u8]) -> bool {
    if buf.len() + 2 + payload.len() > ADV_PAYLOAD_LEN {
        return false;
    }
    let _ = buf.push(payload.len() as u8 + 1);
    let _ = buf.push(ad_type);
    let _ = buf.extend_from_slice(payload);
    true
}

/// Flags, TX power, the 128-bit `service` and as much of `name` as fits
/// go into the advertisement; the complete name goes into the scan
/// response.  The service must be in the primary packet since the hub
/// scans passively.
pub fn build_advertising_data(name: &str, service: &[u8; 16], tx_power: i8) -> AdvertisingData {
    let mut le = *service;
    le.reverse();

    let mut adv = AdvPayload::new();
    push_ad(&mut adv, AD_FLAGS, &[FLAGS_LE_ONLY_GENERAL_DISC]);
    push_ad(&mut adv, AD_TX_POWER, &[tx_power as u8]);
    push_ad(&mut adv, AD_UUID128_COMPLETE, &le);

    let name = name.as_bytes();
    let room = ADV_PAYLOAD_LEN.saturating_sub(adv.len() + 2);
    if room > 0 {
        let (t, n) = if name.len() <= room {
            (AD_COMPLETE_NAME, name.len())
        } else {
            (AD_SHORT_NAME, room)
        };
        if n > 0 {
            push_ad(&mut adv, t, &name[..n]);
        }
    }

    let mut scan_response = AdvPayload::new();
    let n = name.len().min(ADV_PAYLOAD_LEN - 2);
    push_ad(&mut scan_response, AD_COMPLETE_NAME, &name[..n]);

    AdvertisingData { adv, scan_response }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::{QUATERNION_SERVICE_UUID, RELAY_SERVICE_UUID};

    fn uuid_ad(ad_type: u8, uuid: &[u8; 16]) -> std::vec::Vec<u8> {
        let mut v = std::vec![17, ad_type];
        v.extend(uuid.iter().rev());
        v
    }

    #[test]
    fn detects_relay_service_uuid() {
        let mut ad = std::vec![0x02, 0x01, 0x06];
        ad.extend(uuid_ad(AD_UUID128_COMPLETE, &RELAY_SERVICE_UUID));
        assert!(contains_service_uuid128(&ad, &RELAY_SERVICE_UUID));
        assert!(!contains_service_uuid128(&ad, &QUATERNION_SERVICE_UUID));
    }

    #[test]
    fn incomplete_uuid_list_is_checked() {
        let ad = uuid_ad(AD_UUID128_INCOMPLETE, &RELAY_SERVICE_UUID);
        assert!(contains_service_uuid128(&ad, &RELAY_SERVICE_UUID));
    }

    #[test]
    fn big_endian_uuid_does_not_match() {
        let mut ad = std::vec![17, AD_UUID128_COMPLETE];
        ad.extend(RELAY_SERVICE_UUID);
        assert!(!contains_service_uuid128(&ad, &RELAY_SERVICE_UUID));
    }

    #[test]
    fn malformed_lengths_are_rejected() {
        assert!(!contains_service_uuid128(&[], &RELAY_SERVICE_UUID));
        assert!(!contains_service_uuid128(&[0x00], &RELAY_SERVICE_UUID));
        assert!(!contains_service_uuid128(&[0x11, 0x07, 0x9e], &RELAY_SERVICE_UUID));
    }

    #[test]
    fn extract_complete_local_name() {
        let ad = [0x05, 0x09, b'K', b'n', b'e', b'e'];
        assert_eq!(extract_device_name(&ad).as_str(), "Knee");
    }

    #[test]
    fn missing_name_is_empty() {
        let ad = [0x02, 0x01, 0x06];
        assert!(extract_device_name(&ad).is_empty());
    }

    #[test]
    fn name_truncated_to_peer_name_capacity() {
        let mut ad = [b'X'; 30];
        ad[0] = 29;
        ad[1] = AD_COMPLETE_NAME;
        assert_eq!(extract_device_name(&ad).len(), 19);
    }

    #[test]
    fn utf8_name_is_preserved() {
        let mut ad = std::vec![0x09, AD_COMPLETE_NAME];
        ad.extend("Knöchel".as_bytes());
        assert_eq!(extract_device_name(&ad).as_str(), "Knöchel");
    }

    #[test]
    fn name_cut_inside_a_character_keeps_valid_prefix() {
        // "Kn" followed by the first byte of 'ö'.
        let ad = [0x04, AD_SHORT_NAME, b'K', b'n', 0xC3];
        assert_eq!(extract_device_name(&ad).as_str(), "Kn");
    }

    #[test]
    fn capacity_truncation_stops_on_character_boundary() {
        let mut ad = std::vec![21, AD_COMPLETE_NAME];
        ad.extend([b'a'; 18]);
        ad.extend("ö".as_bytes());
        let name = extract_device_name(&ad);
        assert_eq!(name.as_str(), "aaaaaaaaaaaaaaaaaa");
    }

    #[test]
    fn built_advertisement_passes_own_filter() {
        let data = build_advertising_data("QuatNode", &RELAY_SERVICE_UUID, 4);
        assert!(data.adv.len() <= ADV_PAYLOAD_LEN);
        assert!(contains_service_uuid128(&data.adv, &RELAY_SERVICE_UUID));
        // 3 + 3 + 18 bytes leave 5 characters for a shortened name.
        assert_eq!(extract_device_name(&data.adv).as_str(), "QuatN");
        assert_eq!(extract_device_name(&data.scan_response).as_str(), "QuatNode");
    }

    #[test]
    fn short_name_fits_as_complete_name() {
        let data = build_advertising_data("Hub", &QUATERNION_SERVICE_UUID, 0);
        let tail = &data.adv[data.adv.len() - 5..];
        assert_eq!(tail, &[4, AD_COMPLETE_NAME, b'H', b'u', b'b']);
    }
}
