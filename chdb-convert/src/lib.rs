//! Converts a prefix-sorted list of NTLM hashes into a compact hash database
//! (chdb) for use with [chdb-verifier](../chdb_verifier/index.html).
//!
//! # Input
//!
//! One hash per line, as in the Have I Been Pwned NTLM "ordered by hash"
//! download. Columns 0-6 are the 24-bit prefix in hex, columns 6-32 are the
//! 13-byte suffix in hex. Anything after column 32 (usually `:count`) is
//! ignored. Lines must be sorted by prefix; a decreasing prefix aborts the
//! conversion.
//!
//! # Output
//!
//! A dense index of little-endian `u32` slots, one per prefix, followed by the
//! 13-byte suffixes in input order. Slot `p` holds the number of records with a
//! prefix lower than `p`, except slot 0 which holds the total record count.
//! See [`chdb_verifier::Layout`] for the two header layouts.
//!
//! The whole index (about 64 MiB) is kept in memory and written last, after
//! the data region, so the destination must be seekable.
//!
//! # Usage
//!
//! ```sh
//! chdb-convert pwned-passwords-ntlm-ordered-by-hash.txt hibp.chdb
//! ```

pub mod conversion;
pub mod encoder;
pub mod error;
pub mod progress;

pub use chdb_verifier::{Layout, MAX_PREFIX, PREFIX_COUNT, SUFFIX_LEN};
pub use conversion::{DecodeError, LINE_HEX_LEN, Record, hex_to_nibble, parse_line};
pub use encoder::{Encoder, convert_file, encode};
pub use error::Error;
pub use progress::{Progress, prefix_bar};
