//! Whole log files: a header followed by entries.
//!
//! Files with a V10 header frame their entries in envelopes; older formats
//! store entries back to back right after the header. Both readers and
//! writers pick the framing from the header, so callers only deal in
//! entries.

use crate::channel::{PhysicalWriteChannel, ReadAheadChannel, ReadableChannel, WritableChannel};
use crate::config::{ReaderConfig, WriterConfig, MIN_SEGMENT_BLOCK_SIZE};
use crate::entry::{
    CommandReaderFactory, CommitEntry, LogEntry, OpaqueCommandReaderFactory, StartEntry,
    StorageCommand,
};
use crate::envelope::{EnvelopeReadChannel, EnvelopeWriteChannel};
use crate::error::{LogError, LogResult};
use crate::header::{parse_header_from, write_log_header, LogHeader, MAX_HEADER_SIZE};
use crate::reader::VersionAwareLogEntryReader;
use crate::types::LogPosition;
use crate::version::KernelVersion;
use crate::writer::LogEntryWriter;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};
use txlog_storage::StorageBackend;

fn segment_size(header: &LogHeader) -> LogResult<u64> {
    let size = header.segment_block_size;
    if size < MIN_SEGMENT_BLOCK_SIZE || (size as usize) < header.header_size() {
        return Err(LogError::invalid_argument(format!(
            "segment block size {size} is below the minimum of {MIN_SEGMENT_BLOCK_SIZE}"
        )));
    }
    Ok(u64::from(size))
}

/// Entry stream of a file, framed or not.
enum FramedWriteChannel<B: StorageBackend> {
    Plain(PhysicalWriteChannel<B>),
    Envelope(EnvelopeWriteChannel<B>),
}

impl<B: StorageBackend> WritableChannel for FramedWriteChannel<B> {
    fn put_bytes(&mut self, data: &[u8]) -> LogResult<()> {
        match self {
            Self::Plain(ch) => ch.put_bytes(data),
            Self::Envelope(ch) => ch.put_bytes(data),
        }
    }

    fn position(&self) -> LogPosition {
        match self {
            Self::Plain(ch) => ch.position(),
            Self::Envelope(ch) => ch.position(),
        }
    }

    fn begin_checksum(&mut self) {
        match self {
            Self::Plain(ch) => ch.begin_checksum(),
            Self::Envelope(ch) => ch.begin_checksum(),
        }
    }

    fn checksum(&self) -> u32 {
        match self {
            Self::Plain(ch) => ch.checksum(),
            Self::Envelope(ch) => ch.checksum(),
        }
    }

    fn flush(&mut self) -> LogResult<()> {
        match self {
            Self::Plain(ch) => ch.flush(),
            Self::Envelope(ch) => ch.flush(),
        }
    }

    fn begin_entry(&mut self, kernel_version: KernelVersion) -> LogResult<()> {
        match self {
            Self::Plain(ch) => ch.begin_entry(kernel_version),
            Self::Envelope(ch) => ch.begin_entry(kernel_version),
        }
    }

    fn end_entry(&mut self) -> LogResult<()> {
        match self {
            Self::Plain(ch) => ch.end_entry(),
            Self::Envelope(ch) => ch.end_entry(),
        }
    }

    fn abort_entry(&mut self) {
        match self {
            Self::Plain(ch) => ch.abort_entry(),
            Self::Envelope(ch) => ch.abort_entry(),
        }
    }
}

enum FramedReadChannel<B: StorageBackend> {
    Plain(ReadAheadChannel<B>),
    Envelope(EnvelopeReadChannel<B>),
}

impl<B: StorageBackend> FramedReadChannel<B> {
    fn into_inner(self) -> B {
        match self {
            Self::Plain(ch) => ch.into_inner(),
            Self::Envelope(ch) => ch.into_inner(),
        }
    }
}

impl<B: StorageBackend> ReadableChannel for FramedReadChannel<B> {
    fn read_exact(&mut self, dst: &mut [u8]) -> LogResult<()> {
        match self {
            Self::Plain(ch) => ch.read_exact(dst),
            Self::Envelope(ch) => ch.read_exact(dst),
        }
    }

    fn position(&self) -> LogPosition {
        match self {
            Self::Plain(ch) => ch.position(),
            Self::Envelope(ch) => ch.position(),
        }
    }

    fn set_position(&mut self, byte_offset: u64) -> LogResult<()> {
        match self {
            Self::Plain(ch) => ch.set_position(byte_offset),
            Self::Envelope(ch) => ch.set_position(byte_offset),
        }
    }

    fn begin_checksum(&mut self) {
        match self {
            Self::Plain(ch) => ch.begin_checksum(),
            Self::Envelope(ch) => ch.begin_checksum(),
        }
    }

    fn checksum(&self) -> u32 {
        match self {
            Self::Plain(ch) => ch.checksum(),
            Self::Envelope(ch) => ch.checksum(),
        }
    }
}

/// Creates a log file and appends entries to it.
pub struct LogFileWriter<B: StorageBackend> {
    header: LogHeader,
    kernel_version: KernelVersion,
    writer: LogEntryWriter<FramedWriteChannel<B>>,
}

impl<B: StorageBackend> LogFileWriter<B> {
    /// Writes `header` to the empty `backend` and prepares for appends.
    ///
    /// For envelope-framed headers the rest of the first segment is padded
    /// with zeros, so the first envelope starts at the segment boundary.
    ///
    /// # Errors
    ///
    /// Returns an invalid argument error if the backend is not empty or the
    /// header cannot be written, or a storage error.
    pub fn create(backend: B, header: LogHeader, config: &WriterConfig) -> LogResult<Self> {
        let existing = backend.size()?;
        if existing != 0 {
            return Err(LogError::invalid_argument(format!(
                "cannot create a log file over {existing} existing bytes"
            )));
        }
        let mut physical =
            PhysicalWriteChannel::new(backend, header.log_version, config.write_buffer_size)?
                .with_sync_on_flush(config.sync_on_flush);
        write_log_header(&mut physical, &header)?;

        let channel = if header.uses_envelopes() {
            let segment = segment_size(&header)?;
            FramedWriteChannel::Envelope(EnvelopeWriteChannel::new(
                physical,
                segment,
                header.previous_log_file_checksum,
                1,
            )?)
        } else {
            FramedWriteChannel::Plain(physical)
        };

        let kernel_version = header.kernel_version.unwrap_or(config.kernel_version);
        info!(
            log_version = header.log_version,
            format = %header.format,
            %kernel_version,
            segment_block_size = header.segment_block_size,
            "created log file"
        );
        Ok(Self {
            header,
            kernel_version,
            writer: LogEntryWriter::new(channel),
        })
    }

    /// Creates a file with the header `config` implies.
    ///
    /// # Errors
    ///
    /// Returns any error [`Self::create`] returns.
    pub fn create_with_config(
        backend: B,
        log_version: u64,
        last_committed_tx_id: u64,
        config: &WriterConfig,
    ) -> LogResult<Self> {
        let mut header =
            LogHeader::for_kernel_version(config.kernel_version, log_version, last_committed_tx_id);
        if header.uses_envelopes() {
            header = header.with_segment_block_size(config.segment_block_size);
        }
        Self::create(backend, header, config)
    }

    /// Header the file was created with.
    #[must_use]
    pub fn header(&self) -> &LogHeader {
        &self.header
    }

    /// Kernel version new entries for this file should be written with.
    #[must_use]
    pub fn kernel_version(&self) -> KernelVersion {
        self.kernel_version
    }

    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// Returns any error [`LogEntryWriter::write`] returns.
    pub fn append(&mut self, entry: &LogEntry) -> LogResult<Option<u32>> {
        self.writer.write(entry)
    }

    /// Appends a start, its commands and the commit.
    ///
    /// # Errors
    ///
    /// Returns any error [`LogEntryWriter::write_transaction`] returns.
    pub fn append_transaction(
        &mut self,
        start: &StartEntry,
        commands: &[Arc<dyn StorageCommand>],
        commit: &CommitEntry,
    ) -> LogResult<Option<u32>> {
        self.writer.write_transaction(start, commands, commit)
    }

    /// Pushes appended entries to storage, syncing if configured.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn flush(&mut self) -> LogResult<()> {
        self.writer.flush()
    }

    /// Where the next entry (or, when framed, envelope) begins.
    #[must_use]
    pub fn position(&self) -> LogPosition {
        self.writer.channel().position()
    }

    /// Checksum of the last commit, rollback or chunk end appended.
    #[must_use]
    pub fn last_checksum(&self) -> Option<u32> {
        self.writer.last_checksum()
    }

    /// Checksum of the last envelope, for envelope-framed files.
    ///
    /// The next file's header carries it as its previous file checksum.
    #[must_use]
    pub fn last_envelope_checksum(&self) -> Option<u32> {
        match self.writer.channel() {
            FramedWriteChannel::Plain(_) => None,
            FramedWriteChannel::Envelope(ch) => Some(ch.last_envelope_checksum()),
        }
    }

    /// Flushes and returns the backend.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the final flush fails.
    pub fn into_inner(self) -> LogResult<B> {
        match self.writer.into_inner() {
            FramedWriteChannel::Plain(ch) => ch.into_inner(),
            FramedWriteChannel::Envelope(ch) => ch.into_inner(),
        }
    }
}

/// A [`LogFileWriter`] shared by several appending threads.
///
/// Appends are serialized by a mutex, so each transaction lands contiguously.
pub struct SharedLogFileWriter<B: StorageBackend> {
    inner: Arc<Mutex<LogFileWriter<B>>>,
}

impl<B: StorageBackend> Clone for SharedLogFileWriter<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: StorageBackend> SharedLogFileWriter<B> {
    /// Wraps `writer`.
    pub fn new(writer: LogFileWriter<B>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// Returns any error [`LogFileWriter::append`] returns.
    pub fn append(&self, entry: &LogEntry) -> LogResult<Option<u32>> {
        self.inner.lock().append(entry)
    }

    /// Appends a whole transaction without interleaving other appends.
    ///
    /// # Errors
    ///
    /// Returns any error [`LogFileWriter::append_transaction`] returns.
    pub fn append_transaction(
        &self,
        start: &StartEntry,
        commands: &[Arc<dyn StorageCommand>],
        commit: &CommitEntry,
    ) -> LogResult<Option<u32>> {
        self.inner
            .lock()
            .append_transaction(start, commands, commit)
    }

    /// Runs `f` with exclusive access to the writer.
    pub fn with_writer<R>(&self, f: impl FnOnce(&mut LogFileWriter<B>) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Flushes appended entries.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn flush(&self) -> LogResult<()> {
        self.inner.lock().flush()
    }
}

/// Reads the entries of one log file.
///
/// Iterating yields each entry with the position it starts at, and stops
/// after the first error.
pub struct LogFileReader<B: StorageBackend> {
    header: LogHeader,
    channel: FramedReadChannel<B>,
    reader: VersionAwareLogEntryReader,
    finished: bool,
}

impl<B: StorageBackend> LogFileReader<B> {
    /// Opens a log file, keeping command payloads opaque.
    ///
    /// `log_name` identifies the file in errors. Returns `None` for an empty
    /// or pre-allocated file.
    ///
    /// # Errors
    ///
    /// Returns a header error if the header is incomplete or unrecognized,
    /// or a storage error.
    pub fn open(backend: B, log_name: &str, config: ReaderConfig) -> LogResult<Option<Self>> {
        Self::open_with_commands(backend, log_name, config, Arc::new(OpaqueCommandReaderFactory))
    }

    /// Opens a log file, decoding commands with `commands`.
    ///
    /// # Errors
    ///
    /// Returns any error [`Self::open`] returns.
    pub fn open_with_commands(
        backend: B,
        log_name: &str,
        config: ReaderConfig,
        commands: Arc<dyn CommandReaderFactory>,
    ) -> LogResult<Option<Self>> {
        let bytes = backend.read_up_to(0, MAX_HEADER_SIZE)?;
        let Some(header) = parse_header_from(log_name, &mut &bytes[..])? else {
            debug!(file = log_name, "log file is empty or pre-allocated");
            return Ok(None);
        };

        let physical = ReadAheadChannel::new(
            backend,
            header.log_version,
            header.header_size() as u64,
            config.read_ahead_size,
        );
        let channel = if header.uses_envelopes() {
            let segment = segment_size(&header)?;
            FramedReadChannel::Envelope(EnvelopeReadChannel::new(
                physical,
                segment,
                header.previous_log_file_checksum,
            )?)
        } else {
            FramedReadChannel::Plain(physical)
        };

        info!(
            file = log_name,
            log_version = header.log_version,
            format = %header.format,
            last_committed_tx_id = header.last_committed_tx_id,
            "opened log file"
        );
        Ok(Some(Self {
            header,
            channel,
            reader: VersionAwareLogEntryReader::new(commands, config),
            finished: false,
        }))
    }

    /// Header of the file.
    #[must_use]
    pub fn header(&self) -> &LogHeader {
        &self.header
    }

    /// Reads the next entry, or `None` at the end of the file.
    ///
    /// # Errors
    ///
    /// Returns any error [`VersionAwareLogEntryReader::read_log_entry`]
    /// returns.
    pub fn next_entry(&mut self) -> LogResult<Option<LogEntry>> {
        self.reader.read_log_entry(&mut self.channel)
    }

    /// Position of the entry most recently read, or where the file's
    /// entries end.
    #[must_use]
    pub fn last_position(&self) -> LogPosition {
        self.reader.last_position()
    }

    /// Checksum of the last commit, rollback or chunk end read.
    #[must_use]
    pub fn last_checksum(&self) -> Option<u32> {
        self.reader.last_checksum()
    }

    /// Consumes the reader and returns the backend.
    pub fn into_inner(self) -> B {
        self.channel.into_inner()
    }
}

impl<B: StorageBackend> Iterator for LogFileReader<B> {
    type Item = LogResult<(LogPosition, LogEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_entry() {
            Ok(Some(entry)) => Some(Ok((self.last_position(), entry))),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}
