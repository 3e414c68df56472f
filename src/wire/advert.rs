//! Manufacturer advertisement record: the 16-byte manufacturer-specific
//! advertisement field, parsed into the session key, firmware version,
//! identity fields, and two packed production dates.

use crate::error::Error;

/// A `u16`-packed day/month/year triple ([Vol 3] has no equivalent; this is
/// BlueFrog-specific). May be invalid (month 0 or 13, day 0, etc.) — the
/// no validation is performed on the unpacked fields.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PackedDate {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

impl PackedDate {
    /// Unpacks a little-endian `u16`: day = bits 0..4, month = bits 5..8,
    /// year = bits 9..15 + 1990.
    #[must_use]
    pub fn unpack(raw: u16) -> Self {
        Self {
            year: ((raw & 0xFE00) >> 9) + 1990,
            month: ((raw & 0x01E0) >> 5) as u8,
            day: (raw & 0x001F) as u8,
        }
    }
}

/// The 16-byte manufacturer-specific advertisement record.
/// Produced once at connect; immutable for the session.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ManufacturerRecord {
    /// Per-session obfuscation key (byte 0).
    pub key: u8,
    pub bf_major: u8,
    pub bf_minor: u8,
    pub article_number: u16,
    pub machine_number: u16,
    pub serial_number: u16,
    pub production_date: PackedDate,
    pub uchi_production_date: PackedDate,
    pub status_bits: u8,
}

impl ManufacturerRecord {
    /// Minimum length of the manufacturer-data field this record needs.
    pub const LEN: usize = 16;

    /// Parses the 16-byte manufacturer-data field. Any other length is a
    /// session-invalid failure.
    pub fn parse(data: &[u8]) -> crate::Result<Self> {
        if data.len() < Self::LEN {
            return Err(Error::SessionInvalid(format!(
                "manufacturer data too short: {} bytes, need {}",
                data.len(),
                Self::LEN
            )));
        }
        let u16_le = |off: usize| u16::from(data[off]) | (u16::from(data[off + 1]) << 8);
        Ok(Self {
            key: data[0],
            bf_major: data[1],
            bf_minor: data[2],
            article_number: u16_le(4),
            machine_number: u16_le(6),
            serial_number: u16_le(8),
            production_date: PackedDate::unpack(u16_le(10)),
            uchi_production_date: PackedDate::unpack(u16_le(12)),
            status_bits: data[15],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_spec_example() {
        let data = [
            0x2A, 0x01, 0x02, 0x00, 0xE8, 0x03, 0x01, 0x00, 0x39, 0x30, 0x61, 0x2B, 0x00, 0x00,
            0x00, 0x00,
        ];
        let rec = ManufacturerRecord::parse(&data).unwrap();
        assert_eq!(rec.key, 0x2A);
        assert_eq!(rec.bf_major, 1);
        assert_eq!(rec.bf_minor, 2);
        assert_eq!(rec.article_number, 1000);
        assert_eq!(rec.machine_number, 1);
        assert_eq!(rec.serial_number, 12345);
        assert_eq!(
            rec.production_date,
            PackedDate {
                year: 2011,
                month: 11,
                day: 1
            }
        );
    }

    #[test]
    fn too_short_is_session_invalid() {
        assert!(matches!(
            ManufacturerRecord::parse(&[0; 8]),
            Err(Error::SessionInvalid(_))
        ));
    }

    #[test]
    fn empty_is_session_invalid() {
        assert!(ManufacturerRecord::parse(&[]).is_err());
    }
}
