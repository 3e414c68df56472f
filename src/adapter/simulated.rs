//! In-process BLE simulation of a single BlueFrog peripheral, used by the
//! session integration tests: answers GATT reads/writes the way a real
//! machine firmware would, so `Session` can be driven and asserted against
//! without a real radio.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};

use regex::Regex;
use tokio_util::sync::CancellationToken;

use super::{Adapter, AdapterEvent, Handle as HandleTrait};
use crate::error::Error;
use crate::uuid::{CharacteristicId, Uuid};
use crate::SyncMutex;

/// Number of Statistics-Command reads the simulated machine takes before
/// reporting ready, to exercise the poll loop.
const READY_AFTER_READS: u32 = 3;

#[derive(Debug)]
pub struct SimulatedHandle {
    events: SyncMutex<VecDeque<AdapterEvent>>,
}

impl HandleTrait for SimulatedHandle {
    fn poll_events(&self) -> Vec<AdapterEvent> {
        self.events.lock().drain(..).collect()
    }
}

/// A single simulated BlueFrog machine: fixed key and article number,
/// records every write it receives, and answers statistics-readiness reads
/// after a fixed number of attempts.
#[derive(Debug)]
pub struct SimulatedAdapter {
    key: u8,
    article_number: u16,
    stats_reads: AtomicU32,
    writes: SyncMutex<Vec<(Uuid, Vec<u8>)>>,
}

impl SimulatedAdapter {
    /// Builds a simulated machine with the given session key and catalog
    /// article number.
    #[must_use]
    pub fn new(key: u8, article_number: u16) -> Self {
        Self {
            key,
            article_number,
            stats_reads: AtomicU32::new(0),
            writes: SyncMutex::new(Vec::new()),
        }
    }

    /// The writes this simulated machine has received, in order.
    #[must_use]
    pub fn writes(&self) -> Vec<(Uuid, Vec<u8>)> {
        self.writes.lock().clone()
    }

    /// Number of stay-in-BLE heartbeat writes observed so far.
    #[must_use]
    pub fn heartbeat_count(&self) -> usize {
        self.writes
            .lock()
            .iter()
            .filter(|(uuid, payload)| {
                *uuid == CharacteristicId::PMode.uuid()
                    && bluefrog_codec::enc_dec(payload, self.key) == [self.key, 0x7F, 0x80]
            })
            .count()
    }

    fn manufacturer_record_bytes(&self) -> Vec<u8> {
        let article = self.article_number.to_le_bytes();
        vec![
            self.key, 0x01, 0x02, 0x00, article[0], article[1], 0x01, 0x00, 0x39, 0x30, 0x61,
            0x2B, 0x00, 0x00, 0x00, 0x00,
        ]
    }

    fn about_bytes(&self) -> Vec<u8> {
        let mut data = vec![0u8; 51];
        data[27..27 + 3].copy_from_slice(b"1.0");
        data[35..35 + 3].copy_from_slice(b"2.0");
        data
    }

    fn machine_status_bytes(&self) -> Vec<u8> {
        bluefrog_codec::enc_dec(&[self.key, 0x00, 0x00], self.key)
    }

    fn statistics_command_bytes(&self) -> Vec<u8> {
        let attempt = self.stats_reads.fetch_add(1, Ordering::Relaxed) + 1;
        let prefix = if attempt >= READY_AFTER_READS { 0x0E } else { 0x00 };
        bluefrog_codec::enc_dec(&[prefix, 0x00, 0x00], self.key)
    }

    fn statistics_data_bytes(&self) -> Vec<u8> {
        // 5 product slots, 3 bytes each: slot 0 = total (5), slot 4
        // (product code 0x04) = 2.
        let mut raw = vec![0u8; 5 * 3];
        raw[2] = 5;
        raw[14] = 2;
        bluefrog_codec::enc_dec(&raw, self.key)
    }
}

impl Adapter for SimulatedAdapter {
    type Handle = SimulatedHandle;

    fn scan(
        &self,
        name_pattern: &Regex,
        cancel: &CancellationToken,
    ) -> crate::Result<Option<(String, String)>> {
        const SIMULATED_NAME: &str = "BlueFrog-SIM";
        if cancel.is_cancelled() {
            return Ok(None);
        }
        if name_pattern.is_match(SIMULATED_NAME) {
            Ok(Some((SIMULATED_NAME.to_owned(), "sim-address".to_owned())))
        } else {
            Ok(None)
        }
    }

    fn connect(&self, _address: &str) -> crate::Result<Self::Handle> {
        Ok(SimulatedHandle {
            events: SyncMutex::new(VecDeque::new()),
        })
    }

    fn read_characteristic(&self, _handle: &Self::Handle, uuid: Uuid) -> crate::Result<Vec<u8>> {
        match CharacteristicId::from_uuid(uuid) {
            Some(CharacteristicId::About) => Ok(self.about_bytes()),
            Some(CharacteristicId::MachineStatus) => Ok(self.machine_status_bytes()),
            Some(CharacteristicId::StatisticsCommand) => Ok(self.statistics_command_bytes()),
            Some(CharacteristicId::StatisticsData) => Ok(self.statistics_data_bytes()),
            _ => Err(Error::Transport(format!("unsimulated read of {uuid:?}"))),
        }
    }

    fn write_characteristic(
        &self,
        _handle: &Self::Handle,
        uuid: Uuid,
        data: &[u8],
    ) -> crate::Result<()> {
        self.writes.lock().push((uuid, data.to_vec()));
        Ok(())
    }

    fn subscribe(&self, _handle: &Self::Handle, _uuid: Uuid) -> crate::Result<()> {
        Ok(())
    }

    fn manufacturer_data(&self, _handle: &Self::Handle) -> Vec<u8> {
        self.manufacturer_record_bytes()
    }

    fn disconnect(&self, _handle: &Self::Handle) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_matches_simulated_name() {
        let adapter = SimulatedAdapter::new(0x2A, 1000);
        let cancel = CancellationToken::new();
        let found = adapter
            .scan(&Regex::new("BlueFrog.*").unwrap(), &cancel)
            .unwrap();
        assert_eq!(found, Some(("BlueFrog-SIM".into(), "sim-address".into())));
    }

    #[test]
    fn scan_respects_cancellation() {
        let adapter = SimulatedAdapter::new(0x2A, 1000);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            adapter.scan(&Regex::new(".*").unwrap(), &cancel).unwrap(),
            None
        );
    }

    #[test]
    fn statistics_command_reports_ready_after_fixed_attempts() {
        let adapter = SimulatedAdapter::new(0x11, 1000);
        let handle = adapter.connect("x").unwrap();
        let mut ready_at = None;
        for attempt in 1..=READY_AFTER_READS + 1 {
            let raw = adapter
                .read_characteristic(&handle, CharacteristicId::StatisticsCommand.uuid())
                .unwrap();
            let decoded = bluefrog_codec::enc_dec(&raw, 0x11);
            if decoded[0] == 0x0E {
                ready_at = Some(attempt);
                break;
            }
        }
        assert_eq!(ready_at, Some(READY_AFTER_READS));
    }
}
