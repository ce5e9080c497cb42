//! Fuzz testing harnesses for txlog.
//!
//! Each target feeds arbitrary bytes to one decoding path. A target must
//! return normally or report an error; it must never panic or hang.

use txlog_core::channel::InMemoryChannel;
use txlog_core::header::parse_header;
use txlog_core::{
    KernelVersion, LogFileReader, LogHeader, ReaderConfig, VersionAwareLogEntryReader,
    MIN_SEGMENT_BLOCK_SIZE,
};
use txlog_storage::InMemoryBackend;

/// Fuzz target for unframed entry decoding.
///
/// Returns how many entries decoded before the data ended or an error.
pub fn fuzz_entry_reader(data: &[u8]) -> usize {
    let mut channel = InMemoryChannel::from_bytes(0, data.to_vec());
    let mut reader = VersionAwareLogEntryReader::default();
    let mut decoded = 0;
    // Every entry consumes at least two bytes.
    for _ in 0..=data.len() {
        match reader.read_log_entry(&mut channel) {
            Ok(Some(_)) => decoded += 1,
            Ok(None) | Err(_) => break,
        }
    }
    decoded
}

/// Fuzz target for header parsing.
pub fn fuzz_header(data: &[u8]) {
    if let Ok(Some(header)) = parse_header(&mut &data[..]) {
        // Anything parsed must re-encode at its declared size.
        if let Ok(bytes) = header.to_bytes() {
            assert_eq!(bytes.len(), header.header_size());
        }
    }
}

/// Fuzz target for a whole log file, header included.
pub fn fuzz_log_file(data: &[u8]) -> usize {
    let backend = InMemoryBackend::with_data(data.to_vec());
    match LogFileReader::open(backend, "fuzz", ReaderConfig::new().verify_checksum_chain(true)) {
        Ok(Some(reader)) => reader.take(data.len() + 1).filter(Result::is_ok).count(),
        Ok(None) | Err(_) => 0,
    }
}

/// Fuzz target for envelope framing.
///
/// `data` becomes the bytes after a valid envelope-framed header and its
/// padded first segment.
pub fn fuzz_envelope_file(data: &[u8]) -> usize {
    let segment = MIN_SEGMENT_BLOCK_SIZE;
    let header = LogHeader::for_kernel_version(KernelVersion::V5_20, 0, 1)
        .with_segment_block_size(segment);
    let Ok(mut bytes) = header.to_bytes() else {
        return 0;
    };
    bytes.resize(segment as usize, 0);
    bytes.extend_from_slice(data);
    fuzz_log_file(&bytes)
}

/// Flips one bit of `data` at `bit` (wrapping over the data length).
#[must_use]
pub fn flip_bit(data: &[u8], bit: usize) -> Vec<u8> {
    let mut flipped = data.to_vec();
    if !flipped.is_empty() {
        let bit = bit % (flipped.len() * 8);
        flipped[bit / 8] ^= 1 << (bit % 8);
    }
    flipped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::committed_log;
    use std::hash::{DefaultHasher, Hash, Hasher};

    /// Generate pseudo-random data for fuzzing based on a seed.
    fn generate_random_data(seed: u64, len: usize) -> Vec<u8> {
        let mut hasher = DefaultHasher::new();
        let mut result = Vec::with_capacity(len);
        let mut state = seed;

        for _ in 0..len {
            state.hash(&mut hasher);
            state = hasher.finish();
            hasher = DefaultHasher::new();
            result.push((state & 0xFF) as u8);
        }

        result
    }

    #[test]
    fn empty_inputs() {
        assert_eq!(fuzz_entry_reader(&[]), 0);
        fuzz_header(&[]);
        assert_eq!(fuzz_log_file(&[]), 0);
        assert_eq!(fuzz_envelope_file(&[]), 0);
    }

    #[test]
    fn garbage_version_bytes() {
        assert_eq!(fuzz_entry_reader(&[0x7F, 0x01, 0x02]), 0);
        assert_eq!(fuzz_entry_reader(&[0x80, 0x05]), 0);
    }

    #[test]
    fn flip_bit_wraps() {
        assert_eq!(flip_bit(&[0, 0], 9), vec![0, 2]);
        assert_eq!(flip_bit(&[0], 8), vec![1]);
        assert!(flip_bit(&[], 3).is_empty());
    }

    #[test]
    fn fuzz_entry_reader_random_iterations() {
        for seed in 0..1000u64 {
            let len = ((seed % 256) + 1) as usize;
            let data = generate_random_data(seed, len);
            fuzz_entry_reader(&data);
        }
    }

    #[test]
    fn fuzz_header_random_iterations() {
        for seed in 0..1000u64 {
            let mut data = generate_random_data(seed, 128);
            // Steer the format byte toward known formats half the time.
            if seed % 2 == 0 {
                data[0] = 6 + (seed % 5) as u8;
            }
            fuzz_header(&data);
        }
    }

    #[test]
    fn fuzz_envelope_file_random_iterations() {
        for seed in 0..500u64 {
            let len = ((seed % 512) + 1) as usize;
            let data = generate_random_data(seed, len);
            fuzz_envelope_file(&data);
        }
    }

    #[test]
    fn every_single_bit_flip_of_a_real_log() {
        for version in [KernelVersion::V4_0, KernelVersion::V5_0, KernelVersion::V5_20] {
            let data = committed_log(version, 3).unwrap().into_data();
            let clean = fuzz_log_file(&data);
            assert_eq!(clean, 12);
            for bit in 0..data.len() * 8 {
                fuzz_log_file(&flip_bit(&data, bit));
            }
        }
    }
}
