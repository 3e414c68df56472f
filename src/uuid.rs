//! Fixed 128-bit characteristic and service identifiers.
//!
//! All fourteen identifiers (two services, twelve characteristics) share the
//! suffix `ab2e-2548-c435-08c300000710` and differ only in their first 32
//! bits, so [`Uuid`] is a plain fixed-width wrapper rather than a general
//! 16-/32-bit SIG UUID parser.

use std::fmt::{self, Debug, Display, Formatter};

const SUFFIX: u128 = 0xab2e_2548_c435_08c3_0000_0710;

/// A 128-bit GATT UUID, always one of the fixed constants below.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[repr(transparent)]
pub struct Uuid(u128);

impl Uuid {
    /// Builds the fixed-suffix UUID from its first 32 bits.
    #[must_use]
    const fn from_group1(group1: u32) -> Self {
        Self(((group1 as u128) << 96) | SUFFIX)
    }

    /// Returns the raw 128-bit value.
    #[must_use]
    pub const fn as_u128(self) -> u128 {
        self.0
    }
}

impl Debug for Uuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let v = self.0;
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:04x}-{:012x}",
            (v >> 96) as u32,
            (v >> 80) as u16,
            (v >> 64) as u16,
            (v >> 48) as u16,
            v & ((1 << 48) - 1),
        )
    }
}

impl Display for Uuid {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(self, f)
    }
}

impl From<Uuid> for u128 {
    #[inline]
    fn from(u: Uuid) -> Self {
        u.0
    }
}

impl From<Uuid> for uuid::Uuid {
    #[inline]
    fn from(u: Uuid) -> Self {
        uuid::Uuid::from_u128(u.0)
    }
}

impl From<uuid::Uuid> for Uuid {
    #[inline]
    fn from(u: uuid::Uuid) -> Self {
        Self(u.as_u128())
    }
}

/// The "default" BlueFrog GATT service.
pub const DEFAULT_SERVICE: Uuid = Uuid::from_group1(0x5a40_1523);
/// The Nordic-style UART passthrough service.
pub const UART_SERVICE: Uuid = Uuid::from_group1(0x5a40_1623);

/// Characteristic identifiers used by the protocol layer.
#[derive(
    Clone, Copy, Debug, Eq, PartialEq, Hash, enum_iterator::Sequence, strum::Display,
)]
pub enum CharacteristicId {
    /// BlueFrog/machine firmware version strings.
    About,
    /// Alert bit-field, decoded through the codec.
    MachineStatus,
    /// UI lock/unlock.
    BaristaMode,
    /// Progress of the in-flight product.
    ProductProgress,
    /// Power-mode / heartbeat / shutdown commands.
    PMode,
    /// Read-back of the current power mode.
    PModeRead,
    /// Product-start command.
    StartProduct,
    /// Statistics request command and poll-for-ready.
    StatisticsCommand,
    /// Statistics result buffer.
    StatisticsData,
    /// Firmware/product update channel (not driven by this crate).
    UpdateProduct,
    /// UART passthrough, receive direction.
    UartRx,
    /// UART passthrough, transmit direction.
    UartTx,
}

impl CharacteristicId {
    /// Returns the fixed 128-bit UUID for this characteristic.
    #[must_use]
    pub const fn uuid(self) -> Uuid {
        match self {
            Self::About => Uuid::from_group1(0x5a40_1531),
            Self::MachineStatus => Uuid::from_group1(0x5a40_1524),
            Self::BaristaMode => Uuid::from_group1(0x5a40_1530),
            Self::ProductProgress => Uuid::from_group1(0x5a40_1527),
            Self::PMode => Uuid::from_group1(0x5a40_1529),
            Self::PModeRead => Uuid::from_group1(0x5a40_1538),
            Self::StartProduct => Uuid::from_group1(0x5a40_1525),
            Self::StatisticsCommand => Uuid::from_group1(0x5a40_1533),
            Self::StatisticsData => Uuid::from_group1(0x5a40_1534),
            Self::UpdateProduct => Uuid::from_group1(0x5a40_1528),
            Self::UartRx => Uuid::from_group1(0x5a40_1624),
            Self::UartTx => Uuid::from_group1(0x5a40_1625),
        }
    }

    /// Returns the service this characteristic belongs to.
    #[must_use]
    pub const fn service(self) -> Uuid {
        match self {
            Self::UartRx | Self::UartTx => UART_SERVICE,
            _ => DEFAULT_SERVICE,
        }
    }

    /// Looks up the characteristic matching a UUID, if any.
    #[must_use]
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        enum_iterator::all::<Self>().find(|c| c.uuid() == uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_characteristics_have_distinct_uuids() {
        let all: Vec<_> = enum_iterator::all::<CharacteristicId>().collect();
        let mut uuids: Vec<_> = all.iter().map(|c| c.uuid()).collect();
        uuids.sort();
        uuids.dedup();
        assert_eq!(uuids.len(), all.len());
    }

    #[test]
    fn round_trips_through_from_uuid() {
        for c in enum_iterator::all::<CharacteristicId>() {
            assert_eq!(CharacteristicId::from_uuid(c.uuid()), Some(c));
        }
    }

    #[test]
    fn default_service_matches_spec() {
        assert_eq!(
            format!("{DEFAULT_SERVICE:?}"),
            "5a401523-ab2e-2548-c435-08c300000710"
        );
        assert_eq!(
            format!("{:?}", CharacteristicId::About.uuid()),
            "5a401531-ab2e-2548-c435-08c300000710"
        );
    }
}
