//! Command buffer builders: pure functions of catalog/product data that
//! produce a [`Write`] describing what to send, separate from how it gets
//! encoded and written — that happens once [`crate::session::Session`]
//! knows the live session key.

use crate::hex;
use crate::uuid::CharacteristicId;
use crate::wire::stats::StatisticsMode;

/// An encoded write ready to hand to [`crate::adapter::Adapter::write_characteristic`].
///
/// Carries the characteristic and the *decoded* payload plus the two
/// encoding flags; encoding itself (stamping the key and running the codec)
/// happens once the session knows the current key, not at build time.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Write {
    pub characteristic: CharacteristicId,
    pub payload: Vec<u8>,
    /// Whether byte 0 of `payload` is overwritten with the session key
    /// before encoding.
    pub stamp_key: bool,
    /// Whether the last byte of `payload` is also overwritten with the
    /// session key before encoding.
    pub override_last: bool,
}

impl Write {
    const fn new(characteristic: CharacteristicId, payload: Vec<u8>) -> Self {
        Self {
            characteristic,
            payload,
            stamp_key: true,
            override_last: false,
        }
    }

    const fn with_override_last(mut self) -> Self {
        self.override_last = true;
        self
    }

    /// Stamps the key byte(s) and runs the codec, returning the bytes to
    /// write to the wire, given the session's current key.
    #[must_use]
    pub fn encode(&self, key: u8) -> Vec<u8> {
        let mut payload = self.payload.clone();
        if self.stamp_key {
            if let Some(first) = payload.first_mut() {
                *first = key;
            }
        }
        if self.override_last {
            if let Some(last) = payload.last_mut() {
                *last = key;
            }
        }
        bluefrog_codec::enc_dec(&payload, key)
    }
}

/// "Stay in BLE" heartbeat command, reissued on every heartbeat tick.
#[must_use]
pub fn heartbeat() -> Write {
    Write::new(CharacteristicId::PMode, vec![0x00, 0x7F, 0x80])
}

/// Graceful shutdown command.
#[must_use]
pub fn shutdown() -> Write {
    Write::new(CharacteristicId::PMode, vec![0x00, 0x46, 0x02])
}

/// Session disconnect hint, written before tearing down the connection.
#[must_use]
pub fn disconnect_hint() -> Write {
    Write::new(CharacteristicId::PMode, vec![0x00, 0x7F, 0x81])
}

/// Locks the machine's own UI.
#[must_use]
pub fn lock_ui() -> Write {
    Write::new(CharacteristicId::BaristaMode, vec![0x00, 0x01])
}

/// Unlocks the machine's own UI.
#[must_use]
pub fn unlock_ui() -> Write {
    Write::new(CharacteristicId::BaristaMode, vec![0x00, 0x00])
}

/// The default, unparameterised coffee request.
pub const DEFAULT_COFFEE_HEX: &str = "00030004280000020001000000000000";

/// An alternative default-coffee payload seen in some machine firmware
/// revisions, differing only in its trailing byte. Kept for documentation
/// and testing; never issued automatically.
pub const DEFAULT_COFFEE_HEX_ALT: &str = "0003000428000002000100000000002A";

/// Builds the default coffee command. No final-byte key override.
pub fn default_coffee() -> crate::Result<Write> {
    let payload = hex::from_hex(DEFAULT_COFFEE_HEX)?;
    Ok(Write::new(CharacteristicId::StartProduct, payload))
}

/// Builds a parametrised product command: a 17-slot buffer, slot 0 the
/// product code, each present option rendered into its `F<n>` slot, and the
/// last-byte key override enabled.
pub fn product(product: &crate::catalog::Product) -> crate::Result<Write> {
    const SLOTS: usize = 17;
    let mut slots = vec![0u8; SLOTS];
    let code = hex::from_hex(&pad_hex_byte(&product.code))?;
    slots[0] = code.first().copied().unwrap_or(0);

    if let Some(option) = &product.strength {
        write_items_option(&mut slots, option)?;
    }
    if let Some(option) = &product.temperature {
        write_items_option(&mut slots, option)?;
    }
    if let Some(option) = product.water_amount {
        write_min_max_option(&mut slots, option);
    }
    if let Some(option) = product.milk_foam_amount {
        write_min_max_option(&mut slots, option);
    }

    let mut payload = Vec::with_capacity(SLOTS + 1);
    payload.push(0x00);
    payload.extend(slots);
    Ok(Write::new(CharacteristicId::StartProduct, payload).with_override_last())
}

fn write_items_option(slots: &mut [u8], option: &crate::catalog::ItemsOption) -> crate::Result<()> {
    let Some(slot) = option.slot() else {
        return Ok(());
    };
    let Some(byte) = option.default_byte() else {
        return Ok(());
    };
    if slot < slots.len() {
        slots[slot] = byte;
    }
    Ok(())
}

fn write_min_max_option(slots: &mut [u8], option: crate::catalog::MinMaxOption) {
    if option.slot < slots.len() {
        slots[option.slot] = option.encoded_byte();
    }
}

/// Pads a single product-code hex byte (e.g. `"4"` or `"04"`) to two digits.
fn pad_hex_byte(code: &str) -> String {
    if code.len() == 1 {
        format!("0{code}")
    } else {
        code.to_owned()
    }
}

/// Statistics request payload: `[0x00, mode_hi, mode_lo, x, y]`.
#[must_use]
pub fn statistics_request(mode: StatisticsMode) -> Write {
    let word = mode.request_word();
    let (x, y) = mode.selector();
    let payload = vec![0x00, (word >> 8) as u8, (word & 0xFF) as u8, x, y];
    Write::new(CharacteristicId::StatisticsCommand, payload).with_override_last()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ItemsOption;

    #[test]
    fn heartbeat_payload_matches_spec() {
        assert_eq!(heartbeat().payload, vec![0x00, 0x7F, 0x80]);
        assert!(heartbeat().stamp_key);
        assert!(!heartbeat().override_last);
    }

    #[test]
    fn default_coffee_decodes_to_sixteen_bytes() {
        let w = default_coffee().unwrap();
        assert_eq!(w.payload.len(), 16);
        assert!(!w.override_last);
    }

    #[test]
    fn statistics_request_selects_all_for_product_counters() {
        let w = statistics_request(StatisticsMode::ProductCounters);
        assert_eq!(w.payload, vec![0x00, 0x00, 0x01, 0xFF, 0xFF]);
        assert!(w.override_last);
    }

    #[test]
    fn product_command_renders_code_and_strength() {
        let strength = ItemsOption {
            argument: "F2".into(),
            default: "03".into(),
            items: vec![],
        };
        let p = crate::catalog::Product::new_for_test("04", Some(strength), None, None, None);
        let w = product(&p).unwrap();
        // before encoding: [00, 04, 03, 00, ... 00]
        assert_eq!(w.payload[0], 0x00);
        assert_eq!(w.payload[1], 0x04);
        assert_eq!(w.payload[2], 0x03);
        assert!(w.payload[3..].iter().all(|&b| b == 0));
        assert!(w.override_last);
    }
}
