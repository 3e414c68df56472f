//! Statistics command/data decoders.

use bluefrog_codec::enc_dec;

/// Decoded prefix that signals "data ready" on the Statistics-Command
/// characteristic.
const READY_PREFIX: u8 = 0x0E;

/// Which statistics category is being requested/decoded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatisticsMode {
    /// Per-product usage counters; request word `0x0001`.
    ProductCounters,
    /// Maintenance counters (2 bytes/value); request word `0x0004`.
    MaintenanceCounter,
    /// Maintenance percentages (1 byte/value); request word `0x0008`.
    MaintenancePercent,
}

impl StatisticsMode {
    /// The 16-bit request word written to the Statistics-Command
    /// characteristic.
    #[must_use]
    pub const fn request_word(self) -> u16 {
        match self {
            Self::ProductCounters => 0x0001,
            Self::MaintenanceCounter => 0x0004,
            Self::MaintenancePercent => 0x0008,
        }
    }

    /// Width in bytes of one packed value for this mode.
    #[must_use]
    const fn value_width(self) -> usize {
        match self {
            Self::ProductCounters => 3,
            Self::MaintenanceCounter => 2,
            Self::MaintenancePercent => 1,
        }
    }

    /// The trailing (x, y) selector bytes of the 5-byte request payload.
    #[must_use]
    pub const fn selector(self) -> (u8, u8) {
        match self {
            Self::ProductCounters => (0xFF, 0xFF),
            Self::MaintenanceCounter | Self::MaintenancePercent => (0x01, 0x00),
        }
    }
}

/// Result of decoding a Statistics-Command response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StatisticsReadiness {
    Ready,
    NotReady,
}

/// Decodes a Statistics-Command response frame.
#[must_use]
pub fn decode_readiness(raw: &[u8], key: u8) -> StatisticsReadiness {
    let decoded = enc_dec(raw, key);
    match decoded.first() {
        Some(&READY_PREFIX) => StatisticsReadiness::Ready,
        _ => StatisticsReadiness::NotReady,
    }
}

/// Normalises a raw packed statistics value: both the 2-byte `0xFFFF`
/// sentinel and its 3-byte widening `0xFFFFFF` mean "no data".
fn normalise(value: u32) -> u32 {
    if value == 0xFFFF || value == 0x00FF_FFFF {
        0
    } else {
        value
    }
}

/// Reads the `slot`-th big-endian value of `width` bytes out of `data`,
/// returning 0 if the slot falls past the end of the buffer.
fn read_slot(data: &[u8], slot: usize, width: usize) -> u32 {
    let start = slot * width;
    let end = start + width;
    if end > data.len() {
        return 0;
    }
    data[start..end]
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

/// Decoded statistics buffer, indexable by slot per `mode`'s packing.
#[derive(Clone, Debug)]
pub struct StatisticsData {
    decoded: Vec<u8>,
    mode: StatisticsMode,
}

impl StatisticsData {
    /// Decodes a Statistics-Data characteristic payload for the given mode
    /// (the mode the most recent command established).
    #[must_use]
    pub fn decode(raw: &[u8], key: u8, mode: StatisticsMode) -> Self {
        Self {
            decoded: enc_dec(raw, key),
            mode,
        }
    }

    /// Reads slot `i`, normalising the "no data" sentinel.
    #[must_use]
    pub fn slot(&self, i: usize) -> u32 {
        normalise(read_slot(&self.decoded, i, self.mode.value_width()))
    }

    /// For [`StatisticsMode::ProductCounters`]: slot 0 is the total product
    /// count.
    #[must_use]
    pub fn total_products(&self) -> u32 {
        self.slot(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_prefix_is_recognised() {
        let key = 0x07;
        assert_eq!(
            decode_readiness(&enc_dec(&[READY_PREFIX, 0, 0], key), key),
            StatisticsReadiness::Ready
        );
        assert_eq!(
            decode_readiness(&enc_dec(&[0x00, 0x01, 0], key), key),
            StatisticsReadiness::NotReady
        );
    }

    #[test]
    fn reads_past_end_yield_zero() {
        let key = 0x03;
        let data = StatisticsData::decode(&enc_dec(&[0, 1, 2], key), key, StatisticsMode::MaintenancePercent);
        assert_eq!(data.slot(10), 0);
    }

    #[test]
    fn ffff_sentinel_normalises_to_zero() {
        let key = 0x09;
        let raw = enc_dec(&[0xFF, 0xFF, 0xFF], key);
        let data = StatisticsData::decode(&raw, key, StatisticsMode::ProductCounters);
        assert_eq!(data.slot(0), 0);
    }

    #[test]
    fn product_counter_slot_reads_big_endian() {
        let key = 0x09;
        // slot 0 = 0x000005 (5 products total), slot 1 = 0x000012
        let raw = enc_dec(&[0x00, 0x00, 0x05, 0x00, 0x00, 0x12], key);
        let data = StatisticsData::decode(&raw, key, StatisticsMode::ProductCounters);
        assert_eq!(data.total_products(), 5);
        assert_eq!(data.slot(1), 0x12);
    }
}
