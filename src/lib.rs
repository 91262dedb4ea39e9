#![doc = include_str!("../README.md")]

pub mod bitstream;
pub mod config;
pub mod csv_export;
pub mod device;
pub mod error;
pub mod flags;
pub mod huffman;
pub mod scp;
pub mod second_diff;

pub use config::DeviceConfig;
pub use csv_export::CsvOptions;
pub use device::{DeviceRecording, Row, Sample, Sex};
pub use error::{Ecg90aError, Result};
pub use flags::ErrorFlags;
pub use huffman::HuffmanDecoder;
pub use scp::ScpOptions;
pub use second_diff::SecondDiffReconstructor;
