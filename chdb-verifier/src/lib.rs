//! Reader for compact hash databases (chdb).
//!
//! A chdb file stores NTLM password hashes split into a 24-bit prefix and a
//! 13-byte suffix. The prefix is never stored: it selects a slot in a dense
//! index table at the start of the file, and that slot gives the position of
//! the first record of the bucket in the data region that follows the table.
//! A lookup is two index reads, one seek and a scan of a bucket that holds a
//! few dozen records at most.
//!
//! # File format
//!
//! - Header: little-endian `u32` index slots, one per prefix in increasing
//!   order. Slot `p` (for `p >= 1`) holds the number of records with a prefix
//!   lower than `p`. Slot 0 holds the total record count.
//! - Data: 13-byte suffixes, bucket after bucket, in the order they were
//!   converted.
//!
//! Two header layouts exist, see [`Layout`]. They can be told apart from the
//! file length alone, so [`CompactHashDb::open`] detects the layout itself.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};

use md4::{Digest, Md4};

/// Environment variable name for specifying the database file used by tests.
pub const CHDB_PATH_ENV: &str = "CHDB_PATH";

/// Returns the database path from the CHDB_PATH environment variable,
/// or falls back to `hibp.chdb` at the workspace root.
pub fn db_path_from_env() -> PathBuf {
    std::env::var_os(CHDB_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..").join("hibp.chdb"))
}

/// Number of distinct prefixes (16^6 = 16,777,216).
pub const PREFIX_COUNT: usize = 1 << 24;

/// Highest valid prefix value.
pub const MAX_PREFIX: u32 = 0x00FF_FFFF;

/// Length of the prefix in hex characters.
pub const PREFIX_HEX_LEN: usize = 6;

/// Length of a stored suffix record in bytes.
pub const SUFFIX_LEN: usize = 13;

/// Length of a full NTLM hash in bytes (3 prefix bytes + 13 suffix bytes).
pub const HASH_LEN: usize = 16;

/// Size of one index slot in bytes.
pub const INDEX_SLOT_SIZE: u64 = 4;

/// Header layout of a chdb file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Layout {
    /// 2^24 + 1 slots. Slot 2^24 holds the total, so every bucket ends at the
    /// next slot.
    #[default]
    Standard,
    /// 2^24 slots, as written by older chdb converters. The bucket of
    /// prefix `0xFFFFFF` ends at the total stored in slot 0.
    Legacy,
}

impl Layout {
    /// Number of `u32` slots in the header.
    pub const fn index_entries(self) -> usize {
        match self {
            Layout::Standard => PREFIX_COUNT + 1,
            Layout::Legacy => PREFIX_COUNT,
        }
    }

    /// Header size in bytes, which is also the offset of the data region.
    pub const fn header_size(self) -> u64 {
        self.index_entries() as u64 * INDEX_SLOT_SIZE
    }

    /// Total file size of a database holding `count` records.
    pub const fn file_size(self, count: u32) -> u64 {
        self.header_size() + count as u64 * SUFFIX_LEN as u64
    }

    /// Guesses the layout from a file length.
    ///
    /// The two header sizes differ by 4 bytes, which is not a multiple of the
    /// record size, so at most one layout can match a given length.
    pub fn detect(file_len: u64) -> Option<Self> {
        [Layout::Standard, Layout::Legacy].into_iter().find(|layout| {
            file_len >= layout.header_size()
                && (file_len - layout.header_size()) % SUFFIX_LEN as u64 == 0
        })
    }
}

// Header sizes are fixed by the file format.
const _: () = assert!(Layout::Standard.header_size() == 4 * (PREFIX_COUNT as u64 + 1));
const _: () = assert!(Layout::Legacy.header_size() == 4 * PREFIX_COUNT as u64);
const _: () = assert!(HASH_LEN == 3 + SUFFIX_LEN);

/// Computes the NTLM hash of a password (MD4 over its UTF-16LE encoding).
pub fn ntlm_hash(password: &str) -> [u8; HASH_LEN] {
    let mut hasher = Md4::new();
    for unit in password.encode_utf16() {
        hasher.update(unit.to_le_bytes());
    }
    hasher.finalize().into()
}

/// Splits a full hash into its index prefix and stored suffix.
#[inline]
pub fn split_hash(hash: &[u8; HASH_LEN]) -> (u32, &[u8]) {
    let prefix = u32::from_be_bytes([0, hash[0], hash[1], hash[2]]);
    (prefix, &hash[3..])
}

/// An open compact hash database.
pub struct CompactHashDb<R> {
    reader: R,
    layout: Layout,
    count: u32,
}

impl CompactHashDb<File> {
    /// Opens the database at `path` and validates its header against the
    /// file length.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        Self::from_reader(File::open(path)?)
    }
}

impl<R: Read + Seek> CompactHashDb<R> {
    /// Wraps any seekable source holding a database image.
    pub fn from_reader(mut reader: R) -> io::Result<Self> {
        let len = reader.seek(SeekFrom::End(0))?;
        let layout = Layout::detect(len).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{len} bytes is not a valid chdb file size"),
            )
        })?;

        let mut db = Self { reader, layout, count: 0 };
        let count = db.read_slot(0)?;
        if layout.file_size(count) != len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("header announces {count} records but the file holds {len} bytes"),
            ));
        }
        db.count = count;
        Ok(db)
    }

    /// Header layout detected when the database was opened.
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Total number of records in the database.
    pub fn record_count(&self) -> u32 {
        self.count
    }

    fn read_slot(&mut self, slot: u32) -> io::Result<u32> {
        self.reader.seek(SeekFrom::Start(u64::from(slot) * INDEX_SLOT_SIZE))?;
        let mut buf = [0u8; 4];
        self.reader.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    /// Returns the record range `[start, end)` of the bucket for `prefix`.
    pub fn bucket_range(&mut self, prefix: u32) -> io::Result<Range<u32>> {
        if prefix > MAX_PREFIX {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("prefix {prefix:#x} does not fit in 24 bits"),
            ));
        }

        // Slot 0 holds the total, the first bucket always starts at record 0.
        let start = match prefix {
            0 => 0,
            _ => self.read_slot(prefix)?,
        };
        let end = match (self.layout, prefix) {
            (Layout::Legacy, MAX_PREFIX) => self.count,
            _ => self.read_slot(prefix + 1)?,
        };

        if start > end || end > self.count {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("corrupt index for prefix {prefix:06X}: {start}..{end}"),
            ));
        }
        Ok(start..end)
    }

    fn read_bucket_bytes(&mut self, prefix: u32) -> io::Result<Vec<u8>> {
        let range = self.bucket_range(prefix)?;
        let offset = self.layout.header_size() + u64::from(range.start) * SUFFIX_LEN as u64;
        self.reader.seek(SeekFrom::Start(offset))?;

        let mut buf = vec![0u8; range.len() * SUFFIX_LEN];
        self.reader.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Returns every suffix stored for `prefix`, in stored order.
    pub fn bucket(&mut self, prefix: u32) -> io::Result<Vec<[u8; SUFFIX_LEN]>> {
        let buf = self.read_bucket_bytes(prefix)?;
        let mut records = vec![[0u8; SUFFIX_LEN]; buf.len() / SUFFIX_LEN];
        for (record, chunk) in records.iter_mut().zip(buf.chunks_exact(SUFFIX_LEN)) {
            record.copy_from_slice(chunk);
        }
        Ok(records)
    }

    /// Checks whether a full 16-byte hash is present.
    ///
    /// Records within a bucket are not guaranteed to be sorted, so the bucket
    /// is scanned linearly.
    pub fn contains(&mut self, hash: &[u8; HASH_LEN]) -> io::Result<bool> {
        let (prefix, suffix) = split_hash(hash);
        let buf = self.read_bucket_bytes(prefix)?;
        Ok(buf.chunks_exact(SUFFIX_LEN).any(|record| record == suffix))
    }

    /// Checks if the given password has been found in a data breach.
    ///
    /// Returns `Ok(true)` if its NTLM hash is in the database, `Ok(false)` if
    /// it is not, or an error if the lookup failed.
    pub fn is_breached(&mut self, password: &str) -> io::Result<bool> {
        self.contains(&ntlm_hash(password))
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use hex_literal::hex;

    use super::*;

    /// Builds a database image from records sorted by prefix, computing the
    /// index with a counting pass.
    fn build_db(records: &[(u32, [u8; SUFFIX_LEN])], layout: Layout) -> Vec<u8> {
        let entries = layout.index_entries();
        let mut idx = vec![0u32; entries];
        for &(prefix, _) in records {
            let slot = prefix as usize + 1;
            if slot < entries {
                idx[slot] += 1;
            }
        }
        for slot in 1..entries {
            idx[slot] += idx[slot - 1];
        }
        idx[0] = records.len() as u32;

        let mut out = Vec::with_capacity(layout.file_size(records.len() as u32) as usize);
        for slot in idx {
            out.extend_from_slice(&slot.to_le_bytes());
        }
        for (_, suffix) in records {
            out.extend_from_slice(suffix);
        }
        out
    }

    fn open(image: Vec<u8>) -> CompactHashDb<Cursor<Vec<u8>>> {
        CompactHashDb::from_reader(Cursor::new(image)).unwrap()
    }

    #[test]
    fn test_layout_sizes() {
        assert_eq!(Layout::Standard.header_size(), 4 * ((1 << 24) + 1));
        assert_eq!(Layout::Legacy.header_size(), 4 * (1 << 24));
        assert_eq!(Layout::Standard.file_size(3), 4 * ((1 << 24) + 1) + 39);
    }

    #[test]
    fn test_layout_detect() {
        assert_eq!(Layout::detect(Layout::Standard.header_size()), Some(Layout::Standard));
        assert_eq!(Layout::detect(Layout::Legacy.header_size()), Some(Layout::Legacy));
        assert_eq!(Layout::detect(Layout::Standard.file_size(1000)), Some(Layout::Standard));
        assert_eq!(Layout::detect(Layout::Legacy.file_size(1000)), Some(Layout::Legacy));
        assert_eq!(Layout::detect(Layout::Legacy.header_size() + 5), None);
        assert_eq!(Layout::detect(1024), None);
    }

    #[test]
    fn test_ntlm_hash() {
        assert_eq!(ntlm_hash("password"), hex!("8846F7EAEE8FB117AD06BDD830B7586C"));
        assert_eq!(ntlm_hash(""), hex!("31D6CFE0D16AE931B73C59D7E0C089C0"));
    }

    #[test]
    fn test_split_hash() {
        let hash = hex!("8846F7EAEE8FB117AD06BDD830B7586C");
        let (prefix, suffix) = split_hash(&hash);
        assert_eq!(prefix, 0x8846F7);
        assert_eq!(suffix, hex!("EAEE8FB117AD06BDD830B7586C"));
    }

    #[test]
    fn test_bucket_ranges_with_gaps() {
        let records = [
            (0x000000, [0xAA; SUFFIX_LEN]),
            (0x000000, [0xBB; SUFFIX_LEN]),
            (0x000002, [0xCC; SUFFIX_LEN]),
        ];
        let mut db = open(build_db(&records, Layout::Standard));

        assert_eq!(db.layout(), Layout::Standard);
        assert_eq!(db.record_count(), 3);
        assert_eq!(db.bucket_range(0).unwrap(), 0..2);
        assert_eq!(db.bucket_range(1).unwrap(), 2..2);
        assert_eq!(db.bucket_range(2).unwrap(), 2..3);
        assert_eq!(db.bucket_range(3).unwrap(), 3..3);
        assert_eq!(db.bucket_range(MAX_PREFIX).unwrap(), 3..3);

        assert_eq!(db.bucket(0).unwrap(), vec![[0xAA; SUFFIX_LEN], [0xBB; SUFFIX_LEN]]);
        assert!(db.bucket(1).unwrap().is_empty());
        assert_eq!(db.bucket(2).unwrap(), vec![[0xCC; SUFFIX_LEN]]);
    }

    #[test]
    fn test_last_bucket_both_layouts() {
        let records = [(0x000010, [0x01; SUFFIX_LEN]), (MAX_PREFIX, [0x02; SUFFIX_LEN])];

        for layout in [Layout::Standard, Layout::Legacy] {
            let mut db = open(build_db(&records, layout));
            assert_eq!(db.layout(), layout);
            assert_eq!(db.bucket_range(MAX_PREFIX).unwrap(), 1..2);
            assert_eq!(db.bucket(MAX_PREFIX).unwrap(), vec![[0x02; SUFFIX_LEN]]);
            assert_eq!(db.bucket(0x10).unwrap(), vec![[0x01; SUFFIX_LEN]]);
        }
    }

    #[test]
    fn test_empty_database() {
        let mut db = open(build_db(&[], Layout::Standard));
        assert_eq!(db.record_count(), 0);
        assert_eq!(db.bucket_range(0).unwrap(), 0..0);
        assert_eq!(db.bucket_range(0x123456).unwrap(), 0..0);
        assert!(!db.contains(&[0u8; HASH_LEN]).unwrap());
    }

    #[test]
    fn test_contains_and_is_breached() {
        let hash = ntlm_hash("password");
        let (prefix, suffix) = split_hash(&hash);
        let mut stored = [0u8; SUFFIX_LEN];
        stored.copy_from_slice(suffix);

        let mut neighbour = stored;
        neighbour[SUFFIX_LEN - 1] ^= 0xFF;

        let records = [(prefix, neighbour), (prefix, stored)];
        let mut db = open(build_db(&records, Layout::Legacy));

        assert!(db.contains(&hash).unwrap());
        assert!(db.is_breached("password").unwrap());
        assert!(!db.is_breached("hAwT?}cuC:r#kW5").unwrap());
    }

    #[test]
    fn test_prefix_out_of_range() {
        let mut db = open(build_db(&[], Layout::Standard));
        let err = db.bucket_range(MAX_PREFIX + 1).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_rejects_bad_file_size() {
        let mut image = build_db(&[], Layout::Standard);
        image.extend_from_slice(&[0u8; 5]);
        let err = CompactHashDb::from_reader(Cursor::new(image)).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_rejects_count_mismatch() {
        let mut image = build_db(&[(0x42, [0x42; SUFFIX_LEN])], Layout::Standard);
        image[..4].copy_from_slice(&7u32.to_le_bytes());
        let err = CompactHashDb::from_reader(Cursor::new(image)).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_rejects_corrupt_slot() {
        let mut image = build_db(&[(0x42, [0x42; SUFFIX_LEN])], Layout::Standard);
        // Slot 0x43 should be 1; point it past the end of the data.
        let offset = 0x43 * INDEX_SLOT_SIZE as usize;
        image[offset..offset + 4].copy_from_slice(&9u32.to_le_bytes());
        let mut db = open(image);
        let err = db.bucket_range(0x42).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_open_from_file() {
        let image = build_db(&[(0xABCDEF, [0x5A; SUFFIX_LEN])], Layout::Standard);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&image).unwrap();
        file.flush().unwrap();

        let mut db = CompactHashDb::open(file.path()).unwrap();
        assert_eq!(db.record_count(), 1);
        assert_eq!(db.bucket(0xABCDEF).unwrap(), vec![[0x5A; SUFFIX_LEN]]);
    }

    #[test]
    #[ignore = "requires chdb database"]
    fn test_breached_password() {
        // "password" -> NTLM: 8846F7EAEE8FB117AD06BDD830B7586C
        let mut db = CompactHashDb::open(db_path_from_env()).unwrap();
        assert!(db.is_breached("password").unwrap());
    }

    #[test]
    #[ignore = "requires chdb database"]
    fn test_non_breached_password() {
        let mut db = CompactHashDb::open(db_path_from_env()).unwrap();
        // "hAwT?}cuC:r#kW5" is a complex random password that shouldn't be in breaches
        assert!(!db.is_breached("hAwT?}cuC:r#kW5").unwrap());
    }
}
