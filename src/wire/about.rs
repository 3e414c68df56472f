//! About characteristic decoder: copies non-zero bytes from two fixed
//! ranges into printable-ASCII strings, eliding zero bytes rather than
//! stopping at the first one.

use crate::error::Error;

/// BlueFrog firmware range, inclusive.
const BLUEFROG_RANGE: (usize, usize) = (27, 34);
/// Machine firmware range, inclusive.
const MACHINE_RANGE: (usize, usize) = (35, 50);

/// Firmware version strings extracted from the About characteristic.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AboutRecord {
    pub bluefrog_version: String,
    pub machine_version: String,
}

impl AboutRecord {
    /// Parses the About characteristic payload.
    pub fn parse(data: &[u8]) -> crate::Result<Self> {
        if data.len() <= MACHINE_RANGE.1 {
            return Err(Error::FrameMalformed(format!(
                "about payload too short: {} bytes, need {}",
                data.len(),
                MACHINE_RANGE.1 + 1
            )));
        }
        Ok(Self {
            bluefrog_version: extract(data, BLUEFROG_RANGE),
            machine_version: extract(data, MACHINE_RANGE),
        })
    }
}

/// Copies non-zero bytes in `range` (inclusive) into an ASCII string,
/// eliding zero bytes wherever they appear.
fn extract(data: &[u8], range: (usize, usize)) -> String {
    data[range.0..=range.1]
        .iter()
        .filter(|&&b| b != 0)
        .map(|&b| b as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elides_interior_zero_bytes() {
        let mut data = vec![0u8; 51];
        let bf = b"1.2.3";
        data[27..27 + bf.len()].copy_from_slice(bf);
        data[29] = 0; // hole in the middle, should be elided not truncating
        let rec = AboutRecord::parse(&data).unwrap();
        assert_eq!(rec.bluefrog_version, "1..3");
    }

    #[test]
    fn too_short_is_malformed() {
        assert!(AboutRecord::parse(&[0; 10]).is_err());
    }
}
