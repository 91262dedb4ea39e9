use std::io::Error as IoError;
use thiserror::Error;

/// An ECG90A `Result`, conveniently wrapping [`Ecg90aError`].
pub type Result<T> = std::result::Result<T, Ecg90aError>;

#[derive(Error, Debug)]
/// Hard failures: conditions that abort an operation outright, as opposed
/// to the cumulative, non-fatal [`crate::flags::ErrorFlags`] bitset that
/// `DeviceRecording` accumulates while parsing a device file.
pub enum Ecg90aError {
    #[error("I/O error")]
    Io(#[from] IoError),

    #[error("SCP-ECG section {id} CRC mismatch: expected {expected:#06X}, computed {computed:#06X}")]
    SectionCrcMismatch { id: u16, expected: u16, computed: u16 },

    #[error("Huffman bitstream ended inside a literal escape")]
    MalformedHuffmanStream,
}
