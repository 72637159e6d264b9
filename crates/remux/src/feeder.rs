//! Packet realignment and transfer chunking.
//!
//! The feeder sits between the capture producer and the remux engine. Input
//! regions arrive with arbitrary boundaries; the engine only ever sees whole
//! transfer units that start on a packet boundary. Bytes that cannot belong to
//! an aligned packet are dropped while resynchronizing.

use tracing::{debug, trace};
use ts::{SYNC_BYTE, SyncScan, scan_for_sync};

#[derive(Debug)]
pub struct Feeder {
    packet_size: usize,
    transfer_unit: usize,
    /// Bytes waiting to complete a transfer unit
    pending: Vec<u8>,
    synced: bool,
    dropped: u64,
}

impl Feeder {
    pub fn new(packet_size: usize, transfer_unit: usize) -> Self {
        Self {
            packet_size,
            transfer_unit,
            pending: Vec::with_capacity(transfer_unit),
            synced: true,
            dropped: 0,
        }
    }

    /// Forward every complete transfer unit that `input` finishes.
    ///
    /// Whatever does not complete a unit stays pending for the next call.
    pub fn push(&mut self, mut input: &[u8], forward: &mut dyn FnMut(&[u8])) {
        while !input.is_empty() {
            if self.pending.is_empty()
                && self.synced
                && input[0] == SYNC_BYTE
                && input.len() >= self.transfer_unit
            {
                let (unit, rest) = input.split_at(self.transfer_unit);
                forward(unit);
                input = rest;
                continue;
            }

            let take = (self.transfer_unit - self.pending.len()).min(input.len());
            self.pending.extend_from_slice(&input[..take]);
            input = &input[take..];

            self.realign();
            if self.pending.len() == self.transfer_unit {
                forward(&self.pending);
                self.pending.clear();
            }
        }
    }

    /// Forward the whole packets still pending; a trailing partial packet is dropped
    pub fn finish(&mut self, forward: &mut dyn FnMut(&[u8])) {
        self.realign();
        if !self.synced {
            self.drop_front(self.pending.len());
            return;
        }
        let whole = self.pending.len() / self.packet_size * self.packet_size;
        if whole > 0 {
            forward(&self.pending[..whole]);
        }
        let partial = self.pending.len() - whole;
        if partial > 0 {
            trace!("Discarding {partial} byte partial packet at end of stream");
            self.dropped += partial as u64;
        }
        self.pending.clear();
    }

    /// Forget pending bytes and assume the next input is aligned
    pub fn reset(&mut self) {
        self.pending.clear();
        self.synced = true;
    }

    pub fn is_synced(&self) -> bool {
        self.synced
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Bytes discarded while realigning
    pub fn dropped_bytes(&self) -> u64 {
        self.dropped
    }

    fn realign(&mut self) {
        let Some(&lead) = self.pending.first() else {
            return;
        };
        if self.synced && lead == SYNC_BYTE {
            return;
        }
        if self.synced {
            debug!("Lost packet alignment, resynchronizing");
            self.synced = false;
        }

        match scan_for_sync(&self.pending, self.packet_size) {
            SyncScan::Found(offset) => {
                self.drop_front(offset);
                self.synced = true;
                debug!(skipped = offset, "Packet alignment recovered");
            }
            SyncScan::NotFound { droppable } => self.drop_front(droppable),
        }
    }

    fn drop_front(&mut self, count: usize) {
        if count == 0 {
            return;
        }
        self.pending.drain(..count);
        self.dropped += count as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TsStreamBuilder;

    const UNIT: usize = 4 * 188;

    fn run(feeder: &mut Feeder, parts: &[&[u8]]) -> Vec<u8> {
        let mut forwarded = Vec::new();
        for part in parts {
            feeder.push(part, &mut |chunk| {
                assert!(chunk.len() <= UNIT);
                assert_eq!(chunk[0], SYNC_BYTE);
                forwarded.extend_from_slice(chunk);
            });
        }
        feeder.finish(&mut |chunk| forwarded.extend_from_slice(chunk));
        forwarded
    }

    #[test]
    fn test_aligned_input_passes_through() {
        let stream = TsStreamBuilder::new().null_packets(20).build();
        let mut feeder = Feeder::new(188, UNIT);
        assert_eq!(run(&mut feeder, &[&stream]), stream);
        assert_eq!(feeder.dropped_bytes(), 0);
    }

    #[test]
    fn test_short_region_is_held() {
        let stream = TsStreamBuilder::new().null_packets(1).build();
        let mut feeder = Feeder::new(188, UNIT);
        let mut calls = 0;
        feeder.push(&stream[..100], &mut |_| calls += 1);
        assert_eq!(calls, 0);
        assert_eq!(feeder.pending_len(), 100);
    }

    #[test]
    fn test_garbage_prefix_is_dropped() {
        let packets = TsStreamBuilder::new().null_packets(30).build();
        let mut stream = vec![0x00; 37];
        stream.extend_from_slice(&packets);

        let mut feeder = Feeder::new(188, UNIT);
        assert_eq!(run(&mut feeder, &[&stream]), packets);
        assert_eq!(feeder.dropped_bytes(), 37);
    }

    #[test]
    fn test_split_points_do_not_matter() {
        let packets = TsStreamBuilder::new().null_packets(25).build();
        let mut stream = vec![0x47, 0x00, 0x12];
        stream.extend_from_slice(&packets);

        let mut whole = Feeder::new(188, UNIT);
        let expected = run(&mut whole, &[&stream]);

        for split in [1, 2, 3, 187, 188, 189, 500, UNIT, UNIT + 1] {
            let parts: Vec<&[u8]> = stream.chunks(split).collect();
            let mut feeder = Feeder::new(188, UNIT);
            assert_eq!(run(&mut feeder, &parts), expected, "split {split}");
            assert_eq!(feeder.dropped_bytes(), whole.dropped_bytes());
        }
    }

    #[test]
    fn test_finish_drops_partial_packet() {
        let stream = TsStreamBuilder::new().null_packets(2).build();
        let mut feeder = Feeder::new(188, UNIT);
        let forwarded = run(&mut feeder, &[&stream[..300]]);
        assert_eq!(forwarded, &stream[..188]);
        assert_eq!(feeder.dropped_bytes(), 112);
    }

    #[test]
    fn test_reset_clears_pending() {
        let mut feeder = Feeder::new(188, UNIT);
        feeder.push(&[0x01, 0x02, 0x03], &mut |_| {});
        assert!(!feeder.is_synced());
        feeder.reset();
        assert!(feeder.is_synced());
        assert_eq!(feeder.pending_len(), 0);
    }
}
