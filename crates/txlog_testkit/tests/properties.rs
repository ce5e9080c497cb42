//! Property tests over the whole format.

use proptest::prelude::*;
use txlog_core::channel::InMemoryChannel;
use txlog_core::header::parse_header;
use txlog_core::{
    LogError, LogFileReader, LogFileWriter, ReaderConfig, VersionAwareLogEntryReader,
};
use txlog_storage::InMemoryBackend;
use txlog_testkit::prelude::*;

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    #[test]
    fn entries_read_back_as_written((_, entries) in versioned_entries_strategy(12)) {
        let encoded = encode_entries(&entries).unwrap();
        let decoded = decode_entries(&encoded.bytes).unwrap();
        prop_assert_eq!(decoded, encoded.expected);
    }

    #[test]
    fn headers_read_back_as_written(header in header_strategy()) {
        let bytes = header.to_bytes().unwrap();
        let mut buf = &bytes[..];
        let parsed = parse_header(&mut buf).unwrap().unwrap();
        prop_assert_eq!(parsed, header);
        prop_assert!(buf.is_empty());
    }

    #[test]
    fn framed_files_read_back_as_written((version, entries) in versioned_entries_strategy(24)) {
        let config = small_segment_config(version);
        let mut writer =
            LogFileWriter::create_with_config(InMemoryBackend::new(), 3, 0, &config).unwrap();
        let mut expected = Vec::new();
        for entry in &entries {
            let checksum = writer.append(entry).unwrap();
            expected.push(entry.clone().with_checksum(checksum));
        }
        let backend = writer.into_inner().unwrap();

        let reader = LogFileReader::open(backend, "prop", ReaderConfig::new())
            .unwrap()
            .unwrap();
        let read = reader
            .map(|r| r.map(|(_, entry)| entry))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        prop_assert_eq!(read, expected);
    }
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    /// A flipped bit in checksummed entries never reads back as the original.
    #[test]
    fn flipped_bits_are_detected(
        (version, entries) in versioned_entries_strategy(4)
            .prop_filter("needs checksums", |(v, _)| v.has_entry_checksums()),
        pick in any::<prop::sample::Index>(),
        bit in 0usize..8,
    ) {
        let encoded = encode_entries(&entries).unwrap();
        let byte = pick.index(encoded.bytes.len());
        let mut damaged = encoded.bytes.clone();
        damaged[byte] ^= 1 << bit;

        // A damaged version byte may name the end marker or a version
        // without checksums; either way the entries read differ.
        if let Ok(decoded) = decode_entries(&damaged) {
            prop_assert_ne!(decoded, encoded.expected, "{} byte {} bit {}", version, byte, bit);
        }
    }

    /// Cutting a log short reads every whole entry and then reports the cut.
    #[test]
    fn truncation_keeps_whole_entries(
        (_, entries) in versioned_entries_strategy(6),
        cut in any::<prop::sample::Index>(),
    ) {
        let encoded = encode_entries(&entries).unwrap();
        let len = cut.index(encoded.bytes.len());
        let whole = encoded.offsets.iter().filter(|&&o| o < len).count();
        let boundary = encoded.offsets.contains(&len);

        let mut channel = InMemoryChannel::from_bytes(0, encoded.bytes[..len].to_vec());
        let mut reader = VersionAwareLogEntryReader::default();
        let mut read = Vec::new();
        let outcome = loop {
            match reader.read_log_entry(&mut channel) {
                Ok(Some(entry)) => read.push(entry),
                Ok(None) => break None,
                Err(e) => break Some(e),
            }
        };
        if boundary || len == 0 {
            prop_assert!(outcome.is_none());
            prop_assert_eq!(read.len(), whole);
        } else {
            let is_read_past_end = matches!(outcome, Some(LogError::ReadPastEnd { .. }));
            prop_assert!(is_read_past_end);
            prop_assert_eq!(read.len(), whole - 1);
        }
        prop_assert_eq!(&read[..], &encoded.expected[..read.len()]);
    }

    #[test]
    fn arbitrary_bytes_never_panic(data in prop::collection::vec(any::<u8>(), 0..512)) {
        fuzz_entry_reader(&data);
        fuzz_header(&data);
        fuzz_log_file(&data);
        fuzz_envelope_file(&data);
    }
}
