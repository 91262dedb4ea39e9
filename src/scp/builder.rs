//! Assembles Sections #0, #1, #3 and #6 into a complete SCP-ECG record.
//! Byte-exact with ANSI/AAMI EC71:2001 for the default Huffman table and
//! `ENCODING_REAL` rhythm data.

use std::path::{Path, PathBuf};

use crate::bitstream::{crc_hqx, push_u16, push_u32, push_u8};
use crate::device::{DeviceRecording, Sex};
use crate::flags::ErrorFlags;

use super::tags::*;

/// Samples per lead are capped at `0xFFFF / 2` because the rhythm-data
/// byte-length field for each lead is a 16-bit counter.
const MAX_SAMPLES_PER_LEAD: u64 = 0xFFFF / 2;

/// Options for [`DeviceRecording::export_scp`]. `target` defaults to the
/// input path with `.scp` appended when left `None`.
#[derive(Clone, Debug, Default)]
pub struct ScpOptions {
    pub target: Option<PathBuf>,
    pub overwrite: bool,
    pub xoffset: Option<i32>,
}

fn default_output_path(input: &Path) -> PathBuf {
    let mut s = input.as_os_str().to_owned();
    s.push(".scp");
    PathBuf::from(s)
}

/// `u16 year || u8 month || u8 day`.
fn make_date(year: u16, month: u8, day: u8) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4);
    push_u16(&mut buf, year);
    push_u8(&mut buf, month);
    push_u8(&mut buf, day);
    buf
}

/// `u8 hour || u8 minute || u8 second`.
fn make_time(hour: u8, minute: u8, second: u8) -> Vec<u8> {
    vec![hour, minute, second]
}

/// `u16 value || u8 unit`, used for both age and weight.
fn make_3bytes_intval_unit(value: u16, unit: u8) -> Vec<u8> {
    let mut buf = Vec::with_capacity(3);
    push_u16(&mut buf, value);
    push_u8(&mut buf, unit);
    buf
}

/// Zero-terminated UTF-8 string.
fn make_asciiz(s: &str) -> Vec<u8> {
    let mut buf = s.as_bytes().to_vec();
    buf.push(0);
    buf
}

/// `u8 tag || u16 length || bytes value`.
fn make_tag(tag: u8, value: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(3 + value.len());
    push_u8(&mut buf, tag);
    push_u16(&mut buf, value.len() as u16);
    buf.extend_from_slice(value);
    buf
}

/// `u16 id || u32 length || u32 index`. `length == 0` forces `index = 0`.
fn make_pointer_field(id: u16, length: u32, index: u32) -> Vec<u8> {
    let index = if length == 0 { 0 } else { index };
    let mut buf = Vec::with_capacity(10);
    push_u16(&mut buf, id);
    push_u32(&mut buf, length);
    push_u32(&mut buf, index);
    buf
}

/// 37-byte machine identification block: 8 reserved zero bytes, then the
/// first 5 bytes of `model` plus a terminating NUL, then 23 zero bytes.
fn make_machine_id(model: &str) -> Vec<u8> {
    let mut text: Vec<u8> = model.bytes().take(5).collect();
    text.push(0);
    let mut buf = vec![0_u8; 8];
    buf.extend_from_slice(&text);
    buf.extend_from_slice(&[0_u8; 23]);
    buf
}

/// Prepend the 16-byte section header (with its own CRC) to `payload`,
/// returning the full on-wire section: `crc || id || length || version ||
/// protocol || reserved || payload`.
fn pack_section(id: u16, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(14 + payload.len());
    push_u16(&mut body, id);
    push_u32(&mut body, SECTION_HEADER_LEN + payload.len() as u32);
    push_u8(&mut body, PROTOCOL_VERSION);
    push_u8(&mut body, PROTOCOL_VERSION);
    if id == 0 {
        body.extend_from_slice(b"SCPECG");
    } else {
        body.extend_from_slice(&[0_u8; 6]);
    }
    body.extend_from_slice(payload);

    let crc = crc_hqx(&body, 0xFFFF);
    let mut section = Vec::with_capacity(2 + body.len());
    push_u16(&mut section, crc);
    section.extend_from_slice(&body);
    section
}

fn sex_code(sex: Sex) -> u8 {
    match sex {
        Sex::Male => SCP_SEX_MALE,
        Sex::Female => SCP_SEX_FEMALE,
        Sex::UnknownCode(_) => SCP_SEX_UNKNOWN,
    }
}

/// Parsed `YYYY-MM-DD HH:MM:SS` components, used only by the builder to
/// feed [`make_date`]/[`make_time`].
fn parse_acq_timestamp(timestamp: &str) -> Option<(u16, u8, u8, u8, u8, u8)> {
    let dt = chrono::NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%d %H:%M:%S").ok()?;
    use chrono::{Datelike, Timelike};
    Some((
        dt.year() as u16,
        dt.month() as u8,
        dt.day() as u8,
        dt.hour() as u8,
        dt.minute() as u8,
        dt.second() as u8,
    ))
}

fn build_section1(rec: &DeviceRecording) -> Vec<u8> {
    let (year, month, day, hour, minute, second) =
        parse_acq_timestamp(rec.timestamp()).unwrap_or((0, 0, 0, 0, 0, 0));

    let weight_unit = if rec.patient_weight() == 0 {
        UNIT_UNSPECIFIED
    } else {
        UNIT_KILOGRAM
    };
    let age_unit = if rec.patient_age() == 0 {
        UNIT_UNSPECIFIED
    } else {
        UNIT_YEARS
    };

    let mut s1 = Vec::new();
    s1.extend(make_tag(TAG_PATIENT_ID, &make_asciiz(rec.patient_name())));
    s1.extend(make_tag(TAG_ECG_SEQ_NUM, &make_asciiz(rec.case())));
    s1.extend(make_tag(TAG_PATIENT_LAST_NAME, &make_asciiz(rec.patient_name())));
    s1.extend(make_tag(TAG_PATIENT_SEX, &[sex_code(rec.patient_sex())]));
    s1.extend(make_tag(
        TAG_PATIENT_WEIGHT,
        &make_3bytes_intval_unit(u16::from(rec.patient_weight()), weight_unit),
    ));
    s1.extend(make_tag(
        TAG_PATIENT_AGE,
        &make_3bytes_intval_unit(u16::from(rec.patient_age()), age_unit),
    ));
    s1.extend(make_tag(TAG_DATE_ACQ, &make_date(year, month, day)));
    s1.extend(make_tag(TAG_TIME_ACQ, &make_time(hour, minute, second)));
    s1.extend(make_tag(TAG_ACQ_DEV_ID, &make_machine_id("ECG90A")));
    s1.extend(make_tag(TAG_EOF, &[]));
    s1
}

fn build_section3(total_samples: u64) -> Vec<u8> {
    let leads_number = SCP_LEAD_IDS.len() as u8;
    let flags = ALL_SIMULTANEOUS_READ | (leads_number << 3);

    let mut s3 = Vec::new();
    push_u8(&mut s3, leads_number);
    push_u8(&mut s3, flags);
    for &lead_id in &SCP_LEAD_IDS {
        push_u32(&mut s3, 1); // start_sample
        push_u32(&mut s3, total_samples as u32); // end_sample
        push_u8(&mut s3, lead_id);
    }
    s3
}

/// Builds Section #6, returning the payload and whether truncation
/// occurred (propagated by the caller into [`ErrorFlags::SAMPLES_TRUNCATED`]).
fn build_section6(rec: &DeviceRecording, xoffset: i32) -> (Vec<u8>, bool) {
    let leads_number = SCP_LEAD_IDS.len();
    let sample_interval_us = 1_000_000 / rec.config().sample_rate;

    let mut s6 = Vec::new();
    push_u16(&mut s6, AMPL_NANOVOLT);
    push_u16(&mut s6, sample_interval_us as u16);
    push_u8(&mut s6, ENCODING_REAL);
    push_u8(&mut s6, BIMODAL_COMPRESSION_FALSE);

    let truncated = rec.total_samples() > MAX_SAMPLES_PER_LEAD;
    let samples_per_lead = rec.total_samples().min(MAX_SAMPLES_PER_LEAD);
    let bytes_per_lead = (samples_per_lead * 2) as u16;
    for _ in 0..leads_number {
        push_u16(&mut s6, bytes_per_lead);
    }

    let all_rows: Vec<_> = rec.rows_with(xoffset, 12).collect();
    for lead in 0..leads_number {
        let mut count = 0u64;
        for row in &all_rows {
            if count >= samples_per_lead {
                break;
            }
            let val = row.get(lead).copied().flatten().unwrap_or(0);
            push_u16(&mut s6, val as i16 as u16);
            count += 1;
        }
    }
    (s6, truncated)
}

impl DeviceRecording {
    /// Assemble and write a complete SCP-ECG record for this recording.
    /// Refuses to run while [`DeviceRecording::flags`] is non-zero.
    pub fn export_scp(&self, opts: ScpOptions) -> Option<PathBuf> {
        if !self.flags().is_empty() {
            log::warn!("ECG file header did not parse correctly, refusing SCP-ECG export");
            return None;
        }
        let target = opts
            .target
            .clone()
            .unwrap_or_else(|| default_output_path(self.path()));
        if target.exists() && !opts.overwrite {
            log::warn!("output file {} already exists, will not overwrite", target.display());
            self.set_flags(ErrorFlags::OUTPUT_EXISTS);
            return None;
        }
        let xoffset = opts.xoffset.unwrap_or(crate::device::DEFAULT_XOFFSET);

        let section1 = build_section1(self);
        let section3 = build_section3(self.total_samples());
        let (section6, truncated) = build_section6(self, xoffset);
        if truncated {
            log::warn!(
                "cannot store {} samples in SCP-ECG rhythm data, max is {MAX_SAMPLES_PER_LEAD}",
                self.total_samples()
            );
            self.set_flags(ErrorFlags::SAMPLES_TRUNCATED);
        }

        // Section #0 - Section Pointers. Bug-compatible with the original:
        // the index accumulator advances by the notional length even for
        // sections with an empty payload.
        let mut section0_payload = Vec::new();
        let section0_len = SECTION_HEADER_LEN + POINTER_FIELD_LEN * MIN_POINTER_FIELDS;
        let mut index = RECORD_HEADER_LEN + 1;
        section0_payload.extend(make_pointer_field(0, section0_len, index));
        index += section0_len;

        let payloads: [(u16, &[u8]); 11] = [
            (1, &section1),
            (2, &[]),
            (3, &section3),
            (4, &[]),
            (5, &[]),
            (6, &section6),
            (7, &[]),
            (8, &[]),
            (9, &[]),
            (10, &[]),
            (11, &[]),
        ];
        for (id, payload) in payloads {
            let mut length = payload.len() as u32;
            if length > 0 {
                length += SECTION_HEADER_LEN;
            }
            section0_payload.extend(make_pointer_field(id, length, index));
            index += length;
        }

        let section0 = pack_section(0, &section0_payload);
        let packed_sections: Vec<(u16, Vec<u8>)> = vec![
            (1, pack_section(1, &section1)),
            (3, pack_section(3, &section3)),
            (6, pack_section(6, &section6)),
        ];

        let mut record_size = RECORD_HEADER_LEN + section0.len() as u32;
        for (_, s) in &packed_sections {
            record_size += s.len() as u32;
        }

        let mut body = Vec::new();
        push_u32(&mut body, record_size);
        body.extend_from_slice(&section0);
        for (_, s) in &packed_sections {
            body.extend_from_slice(s);
        }
        let record_crc = crc_hqx(&body, 0xFFFF);

        let mut out = Vec::with_capacity(2 + body.len());
        push_u16(&mut out, record_crc);
        out.extend_from_slice(&body);

        if let Err(e) = std::fs::write(&target, &out) {
            log::error!("failed to write {}: {e}", target.display());
            return None;
        }
        Some(target)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::DeviceConfig;
    use crate::scp::reader::read_section_header;
    use std::io::{Cursor, Write};

    #[test]
    fn machine_id_truncates_model_to_five_bytes_plus_nul() {
        let mut expected = vec![0_u8; 8];
        expected.extend_from_slice(b"ECG90\0");
        expected.extend_from_slice(&[0_u8; 23]);
        assert_eq!(make_machine_id("ECG90A"), expected);
        assert_eq!(make_machine_id("ECG90A").len(), 37);
    }

    fn sample_device_file(samples: u64) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let mut header = vec![0_u8; 43];
        header[0..2].copy_from_slice(b"T1");
        header[10..30].copy_from_slice(b"2020-01-02 03:04:05\0");
        header[32] = b'X';
        header[40] = 1;
        header[41] = 30;
        header[42] = 70;
        f.write_all(&header).unwrap();
        for i in 0..samples {
            for _ in 0..8 {
                f.write_all(&((2048 + (i % 50) as u16).to_le_bytes())).unwrap();
            }
        }
        f.write_all(&[0_u8; 8]).unwrap(); // terminator row
        f.write_all(&[0_u8; 37]).unwrap();
        f.flush().unwrap();
        f
    }

    /// Every declared section round-trips through `read_section_header`
    /// with a matching CRC.
    #[test]
    fn every_section_round_trips_with_valid_crc() {
        let file = sample_device_file(5);
        let rec = DeviceRecording::open(file.path(), DeviceConfig::ecg90a());
        assert!(rec.flags().is_empty());

        let out_path = file.path().with_extension("test.scp");
        let opts = ScpOptions {
            target: Some(out_path.clone()),
            overwrite: true,
            xoffset: None,
        };
        let path = rec.export_scp(opts).expect("export should succeed");
        let bytes = std::fs::read(&path).unwrap();

        // Record CRC covers everything from byte 2 (record_size) onward.
        let stored_record_crc = u16::from_le_bytes([bytes[0], bytes[1]]);
        assert_eq!(crc_hqx(&bytes[2..], 0xFFFF), stored_record_crc);

        let record_size = u32::from_le_bytes(bytes[2..6].try_into().unwrap());
        assert_eq!(record_size as usize, bytes.len() - 2);

        let mut cursor = Cursor::new(&bytes[..]);
        let mut offset = 6u64;
        for _ in 0..3 {
            let header = read_section_header(&mut cursor, offset).unwrap();
            offset += u64::from(header.length);
        }
        let _ = std::fs::remove_file(out_path);
    }

    #[test]
    fn samples_beyond_cap_are_truncated() {
        let file = sample_device_file((MAX_SAMPLES_PER_LEAD + 10) as u64);
        let rec = DeviceRecording::open(file.path(), DeviceConfig::ecg90a());
        assert!(rec.flags().is_empty());

        let out_path = file.path().with_extension("trunc.scp");
        let opts = ScpOptions {
            target: Some(out_path.clone()),
            overwrite: true,
            xoffset: None,
        };
        rec.export_scp(opts).expect("export should succeed");
        assert!(rec.flags().contains(ErrorFlags::SAMPLES_TRUNCATED));
        let _ = std::fs::remove_file(out_path);
    }
}
