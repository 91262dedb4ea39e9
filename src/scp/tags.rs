//! Constants from ANSI/AAMI EC71:2001 used by both the builder and the
//! reader helpers: record/section framing sizes, Section #1 patient-data
//! tags, and the Section #3 lead-id numbering table.

/// `u16 crc || u32 size` record preamble, before any section.
pub const RECORD_HEADER_LEN: u32 = 6;
/// `u16 crc || u16 id || u32 length || u8 version || u8 protocol || 6 reserved`.
pub const SECTION_HEADER_LEN: u32 = 16;
/// `u16 id || u32 length || u32 index` per Section #0 pointer entry.
pub const POINTER_FIELD_LEN: u32 = 10;
/// Section #0 always carries at least this many pointer entries (ids 0..11).
pub const MIN_POINTER_FIELDS: u32 = 12;
/// Section/record version and protocol revision this crate writes.
pub const PROTOCOL_VERSION: u8 = 0x14;

// Section #1 — Patient Data — tags.
pub const TAG_PATIENT_LAST_NAME: u8 = 0;
pub const TAG_PATIENT_FIRST_NAME: u8 = 1;
pub const TAG_PATIENT_ID: u8 = 2;
pub const TAG_PATIENT_AGE: u8 = 4;
/// Not present in the retrieved copy of the original `ecg_scp.py`; resolved
/// per AAMI EC71:2001's own tag table (Height=6, Weight=7). See DESIGN.md.
pub const TAG_PATIENT_WEIGHT: u8 = 7;
pub const TAG_PATIENT_SEX: u8 = 8;
pub const TAG_ACQ_DEV_ID: u8 = 14;
pub const TAG_DATE_ACQ: u8 = 25;
pub const TAG_TIME_ACQ: u8 = 26;
pub const TAG_ECG_SEQ_NUM: u8 = 31;
pub const TAG_EOF: u8 = 255;

/// Section #1 — Patient Data — sex codes as written into the SCP-ECG record
/// (distinct from [`crate::device::Sex`], which models the raw device byte).
pub const SCP_SEX_UNKNOWN: u8 = 0;
pub const SCP_SEX_MALE: u8 = 1;
pub const SCP_SEX_FEMALE: u8 = 2;

/// Section #1 — Age/weight units.
pub const UNIT_UNSPECIFIED: u8 = 0;
pub const UNIT_YEARS: u8 = 1;
pub const UNIT_KILOGRAM: u8 = 1;

/// Section #3 — Lead Definition flags.
pub const ALL_SIMULTANEOUS_READ: u8 = 0b100;

/// Section #6 — Rhythm Data encodings.
pub const ENCODING_REAL: u8 = 0;
pub const ENCODING_FIRST_DIFF: u8 = 1;
pub const ENCODING_SECOND_DIFF: u8 = 2;
pub const BIMODAL_COMPRESSION_FALSE: u8 = 0;

/// Amplitude multiplier (nanovolts per unit) this device always reports.
pub const AMPL_NANOVOLT: u16 = 5000;

/// The standard's lead numbering, for the 12 leads the ECG90A reports in
/// `I, II, III, aVR, aVL, aVF, V1..V6` order.
pub const SCP_LEAD_IDS: [u8; 12] = [
    1,  // I
    2,  // II
    61, // III
    62, // aVR
    63, // aVL
    64, // aVF
    3,  // V1
    4,  // V2
    5,  // V3
    6,  // V4
    7,  // V5
    8,  // V6
];
