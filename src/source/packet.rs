//! Heart Rate Measurement payload decoding.
//!
//! Layout of a measurement notification:
//!
//! ```text
//! byte 0      flags
//!               bit0  heart rate is u16 LE (else u8)
//!               bit3  energy expended u16 LE follows heart rate
//!               bit4  RR intervals follow, u16 LE each, 1/1024 s units
//! byte 1..    heart rate, [energy expended], [RR ...]
//! ```
//!
//! Decoding is best-effort: a field the payload is too short for becomes
//! `None` (or is left out) and parsing continues with whatever remains.

const FLAG_HR_U16: u8 = 0x01;
const FLAG_ENERGY_EXPENDED: u8 = 0x08;
const FLAG_RR_PRESENT: u8 = 0x10;

/// Decoded contents of one measurement notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Measurement {
    pub heart_rate_bpm: Option<u16>,
    /// RR intervals converted to ms, in payload order
    pub rr_intervals_ms: Vec<u32>,
}

/// Decode a measurement payload.
pub fn decode_measurement(payload: &[u8]) -> Measurement {
    let Some(&flags) = payload.first() else {
        return Measurement::default();
    };

    let mut index = 1;

    let heart_rate_bpm = if flags & FLAG_HR_U16 != 0 {
        read_u16_le(payload, index).map(|hr| {
            index += 2;
            hr
        })
    } else {
        payload.get(index).map(|&hr| {
            index += 1;
            u16::from(hr)
        })
    };

    if flags & FLAG_ENERGY_EXPENDED != 0 && payload.len() >= index + 2 {
        index += 2;
    }

    let mut rr_intervals_ms = Vec::new();
    if flags & FLAG_RR_PRESENT != 0 {
        while let Some(raw) = read_u16_le(payload, index) {
            rr_intervals_ms.push(rr_to_ms(raw));
            index += 2;
        }
    }

    Measurement {
        heart_rate_bpm,
        rr_intervals_ms,
    }
}

/// Convert an RR field (1/1024 s) to ms, rounding to nearest.
pub fn rr_to_ms(raw: u16) -> u32 {
    (u32::from(raw) * 1000 + 512) / 1024
}

fn read_u16_le(payload: &[u8], index: usize) -> Option<u16> {
    match payload.get(index..index + 2) {
        Some(&[lo, hi]) => Some(u16::from_le_bytes([lo, hi])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_u8_heart_rate_with_single_rr() {
        let m = decode_measurement(&[0x10, 0x4B, 0xE8, 0x03]);
        assert_eq!(m.heart_rate_bpm, Some(75));
        assert_eq!(m.rr_intervals_ms, vec![977]);
    }

    #[test]
    fn test_empty_payload() {
        let m = decode_measurement(&[]);
        assert_eq!(m.heart_rate_bpm, None);
        assert!(m.rr_intervals_ms.is_empty());
    }

    #[test]
    fn test_u16_heart_rate() {
        let m = decode_measurement(&[0x01, 0x2C, 0x01]);
        assert_eq!(m.heart_rate_bpm, Some(300));
        assert!(m.rr_intervals_ms.is_empty());
    }

    #[test]
    fn test_truncated_u16_heart_rate_is_none() {
        let m = decode_measurement(&[0x01, 0x48]);
        assert_eq!(m.heart_rate_bpm, None);
    }

    #[test]
    fn test_energy_expended_is_skipped() {
        // flags: EE + RR, hr=60, ee=0x1234, rr=1024 (1 s)
        let m = decode_measurement(&[0x18, 60, 0x34, 0x12, 0x00, 0x04]);
        assert_eq!(m.heart_rate_bpm, Some(60));
        assert_eq!(m.rr_intervals_ms, vec![1000]);
    }

    #[test]
    fn test_multiple_rr_and_trailing_odd_byte() {
        // rr 512 -> 500 ms, rr 820 -> 800.78 -> 801 ms, then a dangling byte
        let m = decode_measurement(&[0x10, 72, 0x00, 0x02, 0x34, 0x03, 0xFF]);
        assert_eq!(m.rr_intervals_ms, vec![500, 801]);
    }

    #[test]
    fn test_rr_ignored_without_flag() {
        let m = decode_measurement(&[0x00, 80, 0xE8, 0x03]);
        assert_eq!(m.heart_rate_bpm, Some(80));
        assert!(m.rr_intervals_ms.is_empty());
    }

    #[test]
    fn test_flags_only_payload() {
        let m = decode_measurement(&[0x10]);
        assert_eq!(m, Measurement::default());
    }
}
