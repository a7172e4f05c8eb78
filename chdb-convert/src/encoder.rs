use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use chdb_verifier::{Layout, MAX_PREFIX, SUFFIX_LEN};
use tracing::{debug, info};

use crate::conversion::parse_line;
use crate::error::Error;
use crate::progress::Progress;

/// Buffer size for reading the text corpus and writing suffix records.
const IO_BUFFER_SIZE: usize = 1 << 20;

/// Streams records into a chdb image.
///
/// Suffixes are appended to the data region as they arrive while the index
/// is built in memory. The index is only written by [`Encoder::finish`], once
/// the total count is known, into the header space reserved by
/// [`Encoder::new`].
pub struct Encoder<W: Write + Seek, P: Progress = ()> {
    sink: BufWriter<W>,
    layout: Layout,
    index: Vec<u32>,
    last_prefix: u32,
    count: u32,
    progress: P,
}

impl<W: Write + Seek, P: Progress> Encoder<W, P> {
    /// Reserves the header region of `sink` and positions it at the start of
    /// the data region.
    pub fn new(mut sink: W, layout: Layout, progress: P) -> Result<Self, Error> {
        debug!(?layout, header_size = layout.header_size(), "reserving index header");
        sink.seek(SeekFrom::Start(layout.header_size()))?;

        let mut index = Vec::with_capacity(layout.index_entries());
        index.push(0);

        Ok(Self {
            sink: BufWriter::with_capacity(IO_BUFFER_SIZE, sink),
            layout,
            index,
            last_prefix: 0,
            count: 0,
            progress,
        })
    }

    /// Number of records pushed so far.
    pub fn record_count(&self) -> u32 {
        self.count
    }

    /// Fills the slots of every prefix in `(last_prefix, prefix]` with the
    /// running count.
    fn catch_up(&mut self, prefix: u32) {
        if prefix == self.last_prefix {
            return;
        }
        let skipped = (prefix - self.last_prefix) as usize;
        self.index.resize(self.index.len() + skipped, self.count);

        if prefix >> 8 != self.last_prefix >> 8 {
            self.progress.advance(prefix);
        }
        self.last_prefix = prefix;
    }

    /// Appends one record. Prefixes must arrive in non-decreasing order.
    pub fn push(&mut self, prefix: u32, suffix: &[u8; SUFFIX_LEN]) -> Result<(), Error> {
        if prefix > MAX_PREFIX {
            return Err(Error::Range { prefix });
        }
        if prefix < self.last_prefix {
            return Err(Error::OrderingViolation { line: 0, previous: self.last_prefix, prefix });
        }

        self.catch_up(prefix);
        self.count = self.count.checked_add(1).ok_or(Error::CountOverflow)?;
        self.sink.write_all(suffix)?;
        Ok(())
    }

    /// Completes the index, writes it over the reserved header and returns
    /// the total record count.
    pub fn finish(mut self) -> Result<u32, Error> {
        self.catch_up(MAX_PREFIX);
        if self.layout == Layout::Standard {
            self.index.push(self.count);
        }
        debug_assert_eq!(self.index.len(), self.layout.index_entries());

        // Slot 0 stores the total; readers treat the first bucket as starting at 0.
        self.index[0] = self.count;

        debug!(entries = self.index.len(), "writing index header");
        self.sink.seek(SeekFrom::Start(0))?;
        for slot in &self.index {
            self.sink.write_all(&slot.to_le_bytes())?;
        }
        self.sink.flush()?;

        self.progress.finish();
        info!(records = self.count, layout = ?self.layout, "database written");
        Ok(self.count)
    }
}

fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && matches!(line[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &line[..end]
}

/// Converts a prefix-sorted text corpus into a chdb image written to `output`.
///
/// Empty lines are skipped. Returns the number of records written.
pub fn encode<R, W, P>(mut input: R, output: W, layout: Layout, progress: P) -> Result<u32, Error>
where
    R: BufRead,
    W: Write + Seek,
    P: Progress,
{
    let mut encoder = Encoder::new(output, layout, progress)?;
    let mut buf = Vec::with_capacity(64);
    let mut line = 0u64;

    loop {
        buf.clear();
        if input.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line += 1;

        let text = trim_line_end(&buf);
        if text.is_empty() {
            continue;
        }

        let record = parse_line(text).map_err(|source| Error::Decode { line, source })?;
        encoder.push(record.prefix, &record.suffix).map_err(|err| match err {
            Error::OrderingViolation { previous, prefix, .. } => {
                Error::OrderingViolation { line, previous, prefix }
            }
            other => other,
        })?;
    }

    debug!(lines = line, records = encoder.record_count(), "input exhausted");
    encoder.finish()
}

/// Converts the corpus at `source_path` into a database at `destination`,
/// which is created or truncated.
pub fn convert_file<P: Progress>(
    source_path: &Path,
    destination: &Path,
    layout: Layout,
    progress: P,
) -> Result<u32, Error> {
    let input = File::open(source_path)
        .map_err(|source| Error::Open { path: source_path.to_path_buf(), source })?;
    let output = File::create(destination)
        .map_err(|source| Error::Create { path: destination.to_path_buf(), source })?;

    debug!(source = %source_path.display(), destination = %destination.display(), "converting");
    encode(BufReader::with_capacity(IO_BUFFER_SIZE, input), output, layout, progress)
}
