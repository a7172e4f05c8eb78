use chdb_verifier::{PREFIX_HEX_LEN, SUFFIX_LEN};

/// Number of hex characters of a line that carry data (6 prefix + 26 suffix).
pub const LINE_HEX_LEN: usize = PREFIX_HEX_LEN + 2 * SUFFIX_LEN;

/// One decoded input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub prefix: u32,
    pub suffix: [u8; SUFFIX_LEN],
}

/// Why a line could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("line holds {len} bytes, expected at least {} hex characters", LINE_HEX_LEN)]
    TooShort { len: usize },

    #[error("invalid hex byte {byte:#04x} at column {column}")]
    InvalidHex { column: usize, byte: u8 },
}

/// Convert hex ASCII character to nibble value (0-15)
#[inline]
pub fn hex_to_nibble(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'A'..=b'F' => Some(c - b'A' + 10),
        b'a'..=b'f' => Some(c - b'a' + 10),
        _ => None,
    }
}

#[inline]
fn nibble_at(line: &[u8], column: usize) -> Result<u8, DecodeError> {
    let byte = line[column];
    hex_to_nibble(byte).ok_or(DecodeError::InvalidHex { column, byte })
}

/// Decode one line into its 24-bit prefix and 13-byte suffix.
///
/// Columns [0, 6) hold the prefix and columns [6, 32) the suffix. Anything
/// after column 32 (a `:count` field, line endings, extra hash digits) is
/// ignored.
pub fn parse_line(line: &[u8]) -> Result<Record, DecodeError> {
    if line.len() < LINE_HEX_LEN {
        return Err(DecodeError::TooShort { len: line.len() });
    }

    let mut prefix = 0u32;
    for column in 0..PREFIX_HEX_LEN {
        prefix = (prefix << 4) | u32::from(nibble_at(line, column)?);
    }

    let mut suffix = [0u8; SUFFIX_LEN];
    for (i, out) in suffix.iter_mut().enumerate() {
        let column = PREFIX_HEX_LEN + 2 * i;
        *out = (nibble_at(line, column)? << 4) | nibble_at(line, column + 1)?;
    }

    Ok(Record { prefix, suffix })
}
