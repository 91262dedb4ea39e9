//! SCP-ECG (ANSI/AAMI EC71:2001) record builder and reader.

pub mod builder;
pub mod reader;
pub mod tags;

pub use builder::ScpOptions;
pub use reader::{read_parameter, read_section1_tags, read_section_header, ParsedParameter, SectionHeader};
