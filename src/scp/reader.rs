//! Parses SCP-ECG section headers and Section #1 patient-data tags.
//! Tag dispatch returns a typed value rather than an untyped accessor.

use std::io::{Read, Seek, SeekFrom};

use crate::bitstream::crc_hqx;
use crate::error::{Ecg90aError, Result};

use super::tags::*;

/// A parsed Section header, with its payload left unread at
/// `payload_offset` for the caller to consume.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectionHeader {
    pub id: u16,
    pub length: u32,
    pub version: u8,
    pub protocol: u8,
    pub payload_offset: u64,
}

/// Reads and CRC-checks the section starting at `offset`, an absolute
/// byte position in the file counting from the record's own CRC field.
/// The stored CRC covers `length - 2` bytes starting right after it;
/// verifying it requires reading the section's full payload, so this
/// seeks the reader to `offset + SECTION_HEADER_LEN` on success.
pub fn read_section_header<R: Read + Seek>(reader: &mut R, offset: u64) -> Result<SectionHeader> {
    reader.seek(SeekFrom::Start(offset))?;
    let mut header = [0_u8; SECTION_HEADER_LEN as usize];
    reader.read_exact(&mut header)?;

    let stored_crc = u16::from_le_bytes([header[0], header[1]]);
    let id = u16::from_le_bytes([header[2], header[3]]);
    let length = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
    let version = header[8];
    let protocol = header[9];

    let payload_len = length.saturating_sub(SECTION_HEADER_LEN);
    let mut payload = vec![0_u8; payload_len as usize];
    reader.read_exact(&mut payload)?;

    let mut covered = header[2..].to_vec();
    covered.extend_from_slice(&payload);
    let computed = crc_hqx(&covered, 0xFFFF);
    if computed != stored_crc {
        return Err(Ecg90aError::SectionCrcMismatch {
            id,
            expected: stored_crc,
            computed,
        });
    }

    reader.seek(SeekFrom::Start(offset + u64::from(SECTION_HEADER_LEN)))?;
    Ok(SectionHeader {
        id,
        length,
        version,
        protocol,
        payload_offset: offset + u64::from(SECTION_HEADER_LEN),
    })
}

/// `u16 year || u8 month || u8 day`. A month outside 1..=12 or a day
/// outside 1..=31 is logged and reported back as an all-zero date, rather
/// than propagating an impossible calendar date.
pub fn parse_date(bytes: &[u8]) -> Option<(u16, u8, u8)> {
    if bytes.len() < 4 {
        return None;
    }
    let year = u16::from_le_bytes([bytes[0], bytes[1]]);
    let month = bytes[2];
    let day = bytes[3];
    if !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        log::warn!("invalid date: {year:04}-{month:02}-{day:02}");
        return Some((0, 0, 0));
    }
    Some((year, month, day))
}

/// `u8 hour || u8 minute || u8 second`. Out-of-range fields (hour > 23,
/// minute > 59, second > 59) are logged and reported back as all zeros.
pub fn parse_time(bytes: &[u8]) -> Option<(u8, u8, u8)> {
    if bytes.len() < 3 {
        return None;
    }
    let (hour, minute, second) = (bytes[0], bytes[1], bytes[2]);
    if hour > 23 || minute > 59 || second > 59 {
        log::warn!("invalid time: {hour:02}:{minute:02}:{second:02}");
        return Some((0, 0, 0));
    }
    Some((hour, minute, second))
}

/// `u16 value || u8 unit`, shared by the age and weight tags.
pub fn parse_age(bytes: &[u8]) -> Option<(u16, u8)> {
    if bytes.len() < 3 {
        return None;
    }
    Some((u16::from_le_bytes([bytes[0], bytes[1]]), bytes[2]))
}

/// Parses an SCP-ECG machine-identification parameter: institute, department
/// and device numbers, device type, and the NUL-terminated model name, into
/// the human-readable form `Inst. x, Dept. y, Dev. z, Type t, Model "m"`.
pub fn parse_machine_id(bytes: &[u8]) -> String {
    let u16_at = |i: usize| {
        let lo = bytes.get(i).copied().unwrap_or(0);
        let hi = bytes.get(i + 1).copied().unwrap_or(0);
        u16::from_le_bytes([lo, hi])
    };
    let institute_n = u16_at(1);
    let department_n = u16_at(3);
    let device_id = u16_at(5);
    let device_type = bytes.get(7).copied().unwrap_or(0);
    let model = asciiz(bytes.get(8..14).unwrap_or(&[]));
    format!(
        "Inst. {institute_n}, Dept. {department_n}, Dev. {device_id}, Type {device_type}, Model \"{model}\""
    )
}

fn asciiz(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// One decoded Section #1 tagged field. `Unknown` preserves any tag this
/// crate doesn't model, rather than discarding it.
#[derive(Clone, Debug, PartialEq)]
pub enum ParsedParameter {
    LastName(String),
    FirstName(String),
    PatientId(String),
    Age { value: u16, unit: u8 },
    Weight { value: u16, unit: u8 },
    Sex(u8),
    AcqDeviceId(String),
    DateAcq { year: u16, month: u8, day: u8 },
    TimeAcq { hour: u8, minute: u8, second: u8 },
    EcgSeqNum(String),
    Eof,
    Unknown { tag: u8, raw: Vec<u8> },
}

/// Dispatches one Section #1 `(tag, value)` pair to its typed
/// representation. Malformed fixed-size payloads fall back to `Unknown`
/// rather than erroring: a single bad tag shouldn't abort the whole parse.
pub fn read_parameter(tag: u8, value: &[u8]) -> ParsedParameter {
    match tag {
        TAG_PATIENT_LAST_NAME => ParsedParameter::LastName(asciiz(value)),
        TAG_PATIENT_FIRST_NAME => ParsedParameter::FirstName(asciiz(value)),
        TAG_PATIENT_ID => ParsedParameter::PatientId(asciiz(value)),
        TAG_PATIENT_AGE => match parse_age(value) {
            Some((v, unit)) => ParsedParameter::Age { value: v, unit },
            None => ParsedParameter::Unknown { tag, raw: value.to_vec() },
        },
        TAG_PATIENT_WEIGHT => match parse_age(value) {
            Some((v, unit)) => ParsedParameter::Weight { value: v, unit },
            None => ParsedParameter::Unknown { tag, raw: value.to_vec() },
        },
        TAG_PATIENT_SEX => value
            .first()
            .map(|&b| ParsedParameter::Sex(b))
            .unwrap_or(ParsedParameter::Unknown { tag, raw: value.to_vec() }),
        TAG_ACQ_DEV_ID => ParsedParameter::AcqDeviceId(parse_machine_id(value)),
        TAG_DATE_ACQ => match parse_date(value) {
            Some((year, month, day)) => ParsedParameter::DateAcq { year, month, day },
            None => ParsedParameter::Unknown { tag, raw: value.to_vec() },
        },
        TAG_TIME_ACQ => match parse_time(value) {
            Some((hour, minute, second)) => ParsedParameter::TimeAcq { hour, minute, second },
            None => ParsedParameter::Unknown { tag, raw: value.to_vec() },
        },
        TAG_ECG_SEQ_NUM => ParsedParameter::EcgSeqNum(asciiz(value)),
        TAG_EOF => ParsedParameter::Eof,
        _ => ParsedParameter::Unknown { tag, raw: value.to_vec() },
    }
}

/// Walks a Section #1 payload's `tag || u16 length || value` records,
/// stopping at `TAG_EOF` or when the buffer runs out.
pub fn read_section1_tags(payload: &[u8]) -> Vec<ParsedParameter> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos + 3 <= payload.len() {
        let tag = payload[pos];
        let len = u16::from_le_bytes([payload[pos + 1], payload[pos + 2]]) as usize;
        let value_start = pos + 3;
        let value_end = (value_start + len).min(payload.len());
        let value = &payload[value_start..value_end];
        let parsed = read_parameter(tag, value);
        let is_eof = matches!(parsed, ParsedParameter::Eof);
        out.push(parsed);
        if is_eof {
            break;
        }
        pos = value_end;
    }
    out
}
