//! Line-by-line comparison of a simulator dump against a golden signature.
//!
//! Both files hold one hexadecimal word per line. Lines are read in lock-step
//! and the first differing pair is reported. Running out of lines on either
//! side ends the comparison successfully: only the words present in both files
//! are checked, the dump length itself is not part of the signature.

use std::{
    fmt,
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
    str::FromStr,
};

use serde::Serialize;

/// Unsigned hexadecimal integer of arbitrary width.
///
/// Stored as lowercase digits without leading zeros, so two values are equal
/// iff they denote the same number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HexValue(String);

impl HexValue {
    fn from_digits(digits: &str) -> Self {
        let trimmed = digits.trim_start_matches('0');
        if trimmed.is_empty() {
            Self("0".into())
        } else {
            Self(trimmed.to_ascii_lowercase())
        }
    }
}

impl From<u64> for HexValue {
    fn from(value: u64) -> Self {
        Self(format!("{value:x}"))
    }
}

impl fmt::Display for HexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.0)
    }
}

impl Serialize for HexValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseHexError;

impl fmt::Display for ParseHexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid hexadecimal literal")
    }
}

impl std::error::Error for ParseHexError {}

impl FromStr for HexValue {
    type Err = ParseHexError;

    /// Accepts surrounding whitespace, an optional `+` sign, an optional
    /// `0x`/`0X` prefix and single underscores between digits or right after
    /// the prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix('+').unwrap_or(s);
        let (body, prefixed) = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(body) => (body, true),
            None => (s, false),
        };
        if body.is_empty() {
            return Err(ParseHexError);
        }

        let mut digits = String::with_capacity(body.len());
        let mut prev_digit = prefixed;
        for c in body.chars() {
            if c.is_ascii_hexdigit() {
                digits.push(c);
                prev_digit = true;
            } else if c == '_' && prev_digit {
                prev_digit = false;
            } else {
                return Err(ParseHexError);
            }
        }
        // trailing underscore
        if !prev_digit {
            return Err(ParseHexError);
        }
        Ok(Self::from_digits(&digits))
    }
}

/// Result of a finished comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    /// Every line present in both files agrees.
    Match,
    /// First disagreement, `line` is 1-indexed.
    Mismatch {
        line: usize,
        reference: HexValue,
        dut: HexValue,
    },
}

impl Comparison {
    #[cfg(test)]
    pub fn is_match(&self) -> bool {
        matches!(self, Comparison::Match)
    }
}

/// Which of the two inputs an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Reference,
    Dump,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Reference => f.write_str("golden reference"),
            Side::Dump => f.write_str("signature dump"),
        }
    }
}

#[derive(Debug)]
pub enum CompareError {
    Open { path: PathBuf, source: io::Error },
    Read { side: Side, line: usize, source: io::Error },
    Malformed { side: Side, line: usize, text: String },
}

impl fmt::Display for CompareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompareError::Open { path, .. } => {
                write!(f, "could not open `{}`", path.display())
            }
            CompareError::Read { side, line, .. } => {
                write!(f, "could not read line {line} of the {side}")
            }
            CompareError::Malformed { side, line, text } => write!(
                f,
                "line {line} of the {side} is not a hexadecimal value: `{}`",
                text.trim_end()
            ),
        }
    }
}

impl std::error::Error for CompareError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CompareError::Open { source, .. } | CompareError::Read { source, .. } => Some(source),
            CompareError::Malformed { .. } => None,
        }
    }
}

fn open(path: &Path) -> Result<BufReader<File>, CompareError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| CompareError::Open {
            path: path.to_path_buf(),
            source,
        })
}

/// Compare the signature file `reference` against the simulator's `dump`.
pub fn compare_dump(reference: &Path, dump: &Path) -> Result<Comparison, CompareError> {
    let reference = open(reference)?;
    let dump = open(dump)?;
    compare_lines(reference, dump)
}

/// Lock-step comparison of two line streams, see [`compare_dump`].
pub fn compare_lines(
    mut reference: impl BufRead,
    mut dut: impl BufRead,
) -> Result<Comparison, CompareError> {
    let mut ref_line = String::new();
    let mut dut_line = String::new();
    let mut line = 0;
    loop {
        line += 1;
        ref_line.clear();
        dut_line.clear();

        let ref_len = reference
            .read_line(&mut ref_line)
            .map_err(|source| CompareError::Read {
                side: Side::Reference,
                line,
                source,
            })?;
        let dut_len = dut
            .read_line(&mut dut_line)
            .map_err(|source| CompareError::Read {
                side: Side::Dump,
                line,
                source,
            })?;
        if ref_len == 0 || dut_len == 0 {
            return Ok(Comparison::Match);
        }

        let parse = |side: Side, text: &str| {
            text.parse::<HexValue>()
                .map_err(|_| CompareError::Malformed {
                    side,
                    line,
                    text: text.to_string(),
                })
        };
        let ref_val = parse(Side::Reference, &ref_line)?;
        let dut_val = parse(Side::Dump, &dut_line)?;

        if ref_val != dut_val {
            return Ok(Comparison::Mismatch {
                line,
                reference: ref_val,
                dut: dut_val,
            });
        }
    }
}
