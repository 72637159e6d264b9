//! Packet alignment scanning.
//!
//! A position is accepted as a packet boundary only when three sync bytes sit
//! exactly one packet apart. The scan works over a bounded view: positions whose
//! confirmation bytes fall outside the view are left undecided so a caller can
//! retry them once more data arrives.

use memchr::memchr_iter;

use crate::packet::SYNC_BYTE;

/// Outcome of scanning a view for packet alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncScan {
    /// Offset of the first confirmed packet boundary
    Found(usize),
    /// No boundary could be confirmed; the first `droppable` bytes can never
    /// start one and may be discarded, the rest must be retried with more data
    NotFound { droppable: usize },
}

/// Number of bytes a candidate needs after its own position to be confirmed
#[inline]
pub const fn confirmation_span(packet_size: usize) -> usize {
    packet_size * 2 + 1
}

/// Find the first offset in `view` followed by two more sync bytes at
/// `packet_size` spacing.
pub fn scan_for_sync(view: &[u8], packet_size: usize) -> SyncScan {
    let span = confirmation_span(packet_size);
    if view.len() < span {
        return SyncScan::NotFound { droppable: 0 };
    }
    let last_candidate = view.len() - span;

    for candidate in memchr_iter(SYNC_BYTE, &view[..=last_candidate]) {
        if view[candidate + packet_size] == SYNC_BYTE
            && view[candidate + packet_size * 2] == SYNC_BYTE
        {
            return SyncScan::Found(candidate);
        }
    }

    SyncScan::NotFound {
        droppable: last_candidate + 1,
    }
}

/// Convenience wrapper returning only a confirmed offset
#[inline]
pub fn find_sync(view: &[u8], packet_size: usize) -> Option<usize> {
    match scan_for_sync(view, packet_size) {
        SyncScan::Found(offset) => Some(offset),
        SyncScan::NotFound { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::TS_PACKET_SIZE;

    fn packets(count: usize) -> Vec<u8> {
        let mut data = vec![0u8; count * TS_PACKET_SIZE];
        for chunk in data.chunks_exact_mut(TS_PACKET_SIZE) {
            chunk[0] = SYNC_BYTE;
        }
        data
    }

    #[test]
    fn test_aligned_view() {
        let data = packets(3);
        assert_eq!(scan_for_sync(&data, TS_PACKET_SIZE), SyncScan::Found(0));
    }

    #[test]
    fn test_garbage_prefix() {
        let mut data = vec![0x47, 0x00, 0x47, 0x12, 0x34];
        data.extend(packets(4));
        assert_eq!(find_sync(&data, TS_PACKET_SIZE), Some(5));
    }

    #[test]
    fn test_short_view_is_undecided() {
        let data = packets(2);
        assert_eq!(
            scan_for_sync(&data, TS_PACKET_SIZE),
            SyncScan::NotFound { droppable: 0 }
        );
    }

    #[test]
    fn test_droppable_keeps_undecided_tail() {
        let data = vec![0u8; 1000];
        assert_eq!(
            scan_for_sync(&data, TS_PACKET_SIZE),
            SyncScan::NotFound {
                droppable: 1000 - confirmation_span(TS_PACKET_SIZE) + 1
            }
        );
    }

    #[test]
    fn test_lone_sync_bytes_are_rejected() {
        let mut data = vec![0u8; 600];
        data[10] = SYNC_BYTE;
        data[10 + TS_PACKET_SIZE] = SYNC_BYTE;
        assert_eq!(find_sync(&data, TS_PACKET_SIZE), None);
    }
}
