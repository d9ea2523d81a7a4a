//! Chunk Planner (§4.2): partitions each file into byte ranges whose size
//! adapts to total file size and, optionally, observed throughput.

use crate::types::{Chunk, ChunkState, FileDescriptor};

const MIB: u64 = 1_048_576;
const FIFTY_MIB: u64 = 50 * MIB;
const FIVE_HUNDRED_MIB: u64 = 500 * MIB;
const TWO_GIB: u64 = 2 * 1024 * MIB;

const CHUNK_SIZE_SMALL: u64 = 5 * MIB;
const CHUNK_SIZE_MEDIUM: u64 = 10 * MIB;
const CHUNK_SIZE_LARGE: u64 = 25 * MIB;
const CHUNK_SIZE_HUGE: u64 = 50 * MIB;

const ADAPTIVE_MIN: u64 = MIB;
const ADAPTIVE_MAX: u64 = 50 * MIB;
const LOW_THROUGHPUT_BPS: f64 = 100.0 * 1024.0; // 100 KiB/s
const HIGH_THROUGHPUT_BPS: f64 = 10.0 * 1024.0 * 1024.0; // 10 MiB/s

/// Static sizing tier from the table in §4.2.
fn nominal_chunk_size(total_size: u64) -> u64 {
    if total_size < FIFTY_MIB {
        CHUNK_SIZE_SMALL
    } else if total_size < FIVE_HUNDRED_MIB {
        CHUNK_SIZE_MEDIUM
    } else if total_size < TWO_GIB {
        CHUNK_SIZE_LARGE
    } else {
        CHUNK_SIZE_HUGE
    }
}

/// Splits `[range_start, total_size)` into chunks of `chunk_size`, numbering
/// them starting at `first_index`. The final chunk absorbs the remainder.
fn split_range(
    file_name: &str,
    first_index: usize,
    range_start: u64,
    total_size: u64,
    chunk_size: u64,
) -> Vec<Chunk> {
    if range_start >= total_size {
        return Vec::new();
    }

    let mut chunks = Vec::new();
    let mut start = range_start;
    let mut index = first_index;

    while start < total_size {
        let end = (start + chunk_size - 1).min(total_size - 1);
        chunks.push(Chunk::new(file_name, index, start, end));
        start = end + 1;
        index += 1;
    }

    chunks
}

/// `plan(file) → [Chunk]`, total ordering by `startByte` (§4.2). A zero-byte
/// file yields zero chunks.
pub fn plan(file: &FileDescriptor) -> Vec<Chunk> {
    let total_size = file.total_size.unwrap_or(0);
    if total_size == 0 {
        return Vec::new();
    }

    let chunk_size = nominal_chunk_size(total_size);
    split_range(&file.file_name, 0, 0, total_size, chunk_size)
}

/// Shrinks toward 1 MiB for `throughput_bps < 100 KiB/s` and grows toward
/// 50 MiB for `throughput_bps > 10 MiB/s`, linearly interpolating the
/// nominal chunk size in between (§4.2 adaptive variant).
pub fn adapt_chunk_size(nominal: u64, throughput_bps: f64) -> u64 {
    if throughput_bps <= 0.0 {
        return nominal;
    }
    if throughput_bps < LOW_THROUGHPUT_BPS {
        return ADAPTIVE_MIN;
    }
    if throughput_bps > HIGH_THROUGHPUT_BPS {
        return ADAPTIVE_MAX;
    }

    let t = (throughput_bps - LOW_THROUGHPUT_BPS) / (HIGH_THROUGHPUT_BPS - LOW_THROUGHPUT_BPS);
    let adapted = ADAPTIVE_MIN as f64 + t * (ADAPTIVE_MAX as f64 - ADAPTIVE_MIN as f64);
    adapted.round() as u64
}

/// Re-plans the not-yet-dispatched suffix of `chunks` using a chunk size
/// adapted to `throughput_bps`. In-flight and completed chunks (anything
/// other than `Pending`) are returned untouched, preserving their original
/// ranges — adaptation never splits or merges already-issued ranges (§4.2).
pub fn replan_pending(file: &FileDescriptor, chunks: &[Chunk], throughput_bps: f64) -> Vec<Chunk> {
    let total_size = file.total_size.unwrap_or(0);

    let dispatched: Vec<Chunk> = chunks
        .iter()
        .filter(|c| c.state != ChunkState::Pending)
        .cloned()
        .collect();

    let next_start = dispatched
        .iter()
        .map(|c| c.end_byte + 1)
        .max()
        .unwrap_or(0);

    let nominal = nominal_chunk_size(total_size);
    let adapted_size = adapt_chunk_size(nominal, throughput_bps);

    let mut result = dispatched;
    let first_pending_index = result.len();
    result.extend(split_range(
        &file.file_name,
        first_pending_index,
        next_start,
        total_size,
        adapted_size,
    ));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(size: u64) -> FileDescriptor {
        FileDescriptor {
            url: "https://example.com/model.bin".to_string(),
            file_name: "model.bin".to_string(),
            total_size: Some(size),
        }
    }

    #[test]
    fn zero_byte_file_has_zero_chunks() {
        assert!(plan(&descriptor(0)).is_empty());
    }

    #[test]
    fn chunks_are_contiguous_and_cover_total_size() {
        let file = descriptor(123 * 1024 * 1024); // 123 MiB -> medium tier
        let chunks = plan(&file);

        assert_eq!(chunks[0].start_byte, 0);
        assert_eq!(chunks.last().unwrap().end_byte, file.total_size.unwrap() - 1);

        for pair in chunks.windows(2) {
            assert_eq!(pair[1].start_byte, pair[0].end_byte + 1);
        }

        let total: u64 = chunks.iter().map(|c| c.size()).sum();
        assert_eq!(total, file.total_size.unwrap());
    }

    #[test]
    fn single_chunk_file_covers_whole_range() {
        let file = descriptor(2 * 1024 * 1024); // 2 MiB, under 5 MiB chunk size
        let chunks = plan(&file);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_byte, 0);
        assert_eq!(chunks[0].end_byte, file.total_size.unwrap() - 1);
    }

    #[test]
    fn final_chunk_absorbs_remainder() {
        let file = descriptor(5 * MIB + 7); // not an exact multiple of the 5 MiB tier
        let chunks = plan(&file);
        let last = chunks.last().unwrap();
        assert!(last.size() <= CHUNK_SIZE_SMALL);
        assert_eq!(last.end_byte, file.total_size.unwrap() - 1);
    }

    #[test]
    fn sizing_tiers_match_table() {
        assert_eq!(nominal_chunk_size(10 * MIB), CHUNK_SIZE_SMALL);
        assert_eq!(nominal_chunk_size(100 * MIB), CHUNK_SIZE_MEDIUM);
        assert_eq!(nominal_chunk_size(1024 * MIB), CHUNK_SIZE_LARGE);
        assert_eq!(nominal_chunk_size(3 * 1024 * MIB), CHUNK_SIZE_HUGE);
    }

    #[test]
    fn adaptive_sizing_shrinks_and_grows_at_thresholds() {
        assert_eq!(adapt_chunk_size(CHUNK_SIZE_MEDIUM, 50.0 * 1024.0), ADAPTIVE_MIN);
        assert_eq!(
            adapt_chunk_size(CHUNK_SIZE_MEDIUM, 20.0 * 1024.0 * 1024.0),
            ADAPTIVE_MAX
        );
    }

    #[test]
    fn replan_pending_preserves_dispatched_ranges() {
        let file = descriptor(100 * MIB);
        let mut chunks = plan(&file);
        chunks[0].state = ChunkState::Completed;
        chunks[0].downloaded_bytes = chunks[0].size();
        chunks[1].state = ChunkState::InProgress;

        let replanned = replan_pending(&file, &chunks, 20.0 * 1024.0 * 1024.0);

        // dispatched chunks keep their exact original ranges
        assert_eq!(replanned[0].start_byte, chunks[0].start_byte);
        assert_eq!(replanned[0].end_byte, chunks[0].end_byte);
        assert_eq!(replanned[1].start_byte, chunks[1].start_byte);
        assert_eq!(replanned[1].end_byte, chunks[1].end_byte);

        // the whole file is still covered with no gaps
        for pair in replanned.windows(2) {
            assert_eq!(pair[1].start_byte, pair[0].end_byte + 1);
        }
        let total: u64 = replanned.iter().map(|c| c.size()).sum();
        assert_eq!(total, file.total_size.unwrap());
    }
}
