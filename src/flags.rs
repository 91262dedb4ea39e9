//! The cumulative, non-fatal error bitset described in the device-file
//! reader's error-handling design: every bit is sticky, never cleared, and
//! a non-zero value on a [`crate::device::DeviceRecording`] prevents any
//! export from running.

use std::fmt;

/// One bit per recognized non-fatal condition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ErrorFlags(u8);

impl ErrorFlags {
    /// Input file does not exist.
    pub const FILE_MISSING: ErrorFlags = ErrorFlags(0x01);
    /// Header failed to read, or the file size does not satisfy the
    /// payload-length modulo constraint.
    pub const HEADER_INVALID: ErrorFlags = ErrorFlags(0x02);
    /// A sample row ended before `data_series` samples could be read.
    pub const SHORT_READ: ErrorFlags = ErrorFlags(0x04);
    /// An all-zero terminator row arrived before the expected sample count.
    pub const UNEXPECTED_EOD: ErrorFlags = ErrorFlags(0x08);
    /// Output path already exists and overwrite was not requested.
    pub const OUTPUT_EXISTS: ErrorFlags = ErrorFlags(0x10);
    /// The acquisition timestamp failed to parse; file mtime was substituted.
    pub const TIMESTAMP_BAD: ErrorFlags = ErrorFlags(0x40);
    /// Rhythm data exceeded the 16-bit sample-count field and was truncated.
    pub const SAMPLES_TRUNCATED: ErrorFlags = ErrorFlags(0x80);

    /// The empty set: no conditions observed.
    pub const fn empty() -> Self {
        ErrorFlags(0)
    }

    /// Whether any bit is set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every bit in `other` is set in `self`.
    pub const fn contains(self, other: ErrorFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// The raw bitset value.
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for ErrorFlags {
    type Output = ErrorFlags;
    fn bitor(self, rhs: ErrorFlags) -> ErrorFlags {
        ErrorFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ErrorFlags {
    fn bitor_assign(&mut self, rhs: ErrorFlags) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ErrorFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: &[(ErrorFlags, &str)] = &[
            (ErrorFlags::FILE_MISSING, "FILE_MISSING"),
            (ErrorFlags::HEADER_INVALID, "HEADER_INVALID"),
            (ErrorFlags::SHORT_READ, "SHORT_READ"),
            (ErrorFlags::UNEXPECTED_EOD, "UNEXPECTED_EOD"),
            (ErrorFlags::OUTPUT_EXISTS, "OUTPUT_EXISTS"),
            (ErrorFlags::TIMESTAMP_BAD, "TIMESTAMP_BAD"),
            (ErrorFlags::SAMPLES_TRUNCATED, "SAMPLES_TRUNCATED"),
        ];
        if self.is_empty() {
            return write!(f, "none");
        }
        let mut first = true;
        for (flag, name) in NAMES {
            if self.contains(*flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_is_empty() {
        assert!(ErrorFlags::empty().is_empty());
    }

    #[test]
    fn accumulates_bits() {
        let mut flags = ErrorFlags::empty();
        flags |= ErrorFlags::SHORT_READ;
        flags |= ErrorFlags::TIMESTAMP_BAD;
        assert!(flags.contains(ErrorFlags::SHORT_READ));
        assert!(flags.contains(ErrorFlags::TIMESTAMP_BAD));
        assert!(!flags.contains(ErrorFlags::HEADER_INVALID));
        assert_eq!(flags.bits(), 0x04 | 0x40);
    }

    #[test]
    fn display_lists_set_names() {
        let flags = ErrorFlags::FILE_MISSING | ErrorFlags::OUTPUT_EXISTS;
        assert_eq!(flags.to_string(), "FILE_MISSING|OUTPUT_EXISTS");
    }
}
