//! Device-file reader: opens a Contec ECG90A recording, validates its
//! fixed 43-byte header, and exposes a lazy, restartable iterator over its
//! time-aligned sample rows.

use std::cell::Cell;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use byteorder::{LittleEndian, ReadBytesExt};
use chrono::{DateTime, NaiveDateTime, Utc};

use crate::config::DeviceConfig;
use crate::flags::ErrorFlags;

/// Fixed-length device-file header, in bytes.
const HEADER_LEN: u64 = 43;
/// Fixed-length device-file footer (unparsed, all zeros), in bytes.
const FOOTER_LEN: u64 = 37;
/// Raw 16-bit sample value marking an out-of-scale / invalid reading.
const NULL_VALUE: u16 = 0x6800;
/// Shift applied to real samples to make them zero-centered.
pub const DEFAULT_XOFFSET: i32 = -2048;
/// Default CSV/row column count. With an 8-series device, only the first
/// 10 columns (I, II, III, aVR, aVL, aVF, V1..V4) are ever populated; the
/// remaining requested columns are simply absent from the yielded row.
pub const DEFAULT_COLS: usize = 12;
/// Column labels in fixed output order.
pub const LEAD_NAMES: [&str; 12] = [
    "I", "II", "III", "aVR", "aVL", "aVF", "V1", "V2", "V3", "V4", "V5", "V6",
];

const ACQ_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One sample cell: either a signed reading or an explicit null.
pub type Sample = Option<i32>;

/// One time-aligned row across all reported leads, in `LEAD_NAMES` order,
/// truncated to the requested column count.
pub type Row = Vec<Sample>;

/// Patient sex as recorded by the device: `0` = female, `1` = male,
/// anything else is preserved rather than rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sex {
    Female,
    Male,
    UnknownCode(u8),
}

impl Sex {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Sex::Female,
            1 => Sex::Male,
            other => Sex::UnknownCode(other),
        }
    }

    /// The raw device byte this value was parsed from.
    pub fn raw(self) -> u8 {
        match self {
            Sex::Female => 0,
            Sex::Male => 1,
            Sex::UnknownCode(n) => n,
        }
    }
}

impl std::fmt::Display for Sex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sex::Female => write!(f, "F"),
            Sex::Male => write!(f, "M"),
            Sex::UnknownCode(n) => write!(f, "Unknown code {n}"),
        }
    }
}

/// An opened ECG90A device recording. Construction never fails outright:
/// unusable inputs are recorded in [`DeviceRecording::flags`] instead, and
/// every export method refuses to run while any flag is set.
#[derive(Debug)]
pub struct DeviceRecording {
    path: PathBuf,
    config: DeviceConfig,
    file_size: u64,
    mtime: SystemTime,
    case: String,
    timestamp: String,
    patient_name: String,
    patient_sex: Sex,
    patient_age: u8,
    patient_weight: u8,
    total_samples: u64,
    flags: Cell<ErrorFlags>,
}

impl DeviceRecording {
    /// Open `path` with the given acquisition parameters, validating file
    /// size and the fixed header. See the module docs for the
    /// non-fatal-error policy.
    pub fn open(path: impl AsRef<Path>, config: DeviceConfig) -> Self {
        let path = path.as_ref().to_path_buf();
        let mut flags = ErrorFlags::empty();

        if config.sample_bits % 8 != 0 {
            log::error!("sample_bits {} is not a multiple of 8", config.sample_bits);
            flags |= ErrorFlags::HEADER_INVALID;
        }

        let metadata = match std::fs::metadata(&path) {
            Ok(m) => Some(m),
            Err(_) => {
                log::error!("input file {} does not exist", path.display());
                flags |= ErrorFlags::FILE_MISSING;
                None
            }
        };

        let file_size = metadata.as_ref().map(|m| m.len()).unwrap_or(0);
        let mtime = metadata
            .as_ref()
            .and_then(|m| m.modified().ok())
            .unwrap_or(SystemTime::UNIX_EPOCH);

        let mut total_samples = 0;
        if !flags.contains(ErrorFlags::FILE_MISSING) {
            let payload_len = file_size.saturating_sub(HEADER_LEN + FOOTER_LEN);
            let bytes_per_row = config.bytes_per_row();
            if file_size < HEADER_LEN + FOOTER_LEN || payload_len % bytes_per_row != 0 {
                log::error!(
                    "file size mismatch: ({file_size} - {HEADER_LEN} - {FOOTER_LEN}) is not a multiple of {bytes_per_row}"
                );
                flags |= ErrorFlags::HEADER_INVALID;
            } else {
                total_samples = payload_len / bytes_per_row;
            }
        }

        let (case, raw_timestamp, patient_name, patient_sex, patient_age, patient_weight) =
            if flags.is_empty() {
                match read_header(&path) {
                    Ok(h) => h,
                    Err(_) => {
                        log::error!("error reading file header of {}", path.display());
                        flags |= ErrorFlags::HEADER_INVALID;
                        Default::default()
                    }
                }
            } else {
                Default::default()
            };

        let timestamp = if flags.contains(ErrorFlags::HEADER_INVALID) {
            raw_timestamp
        } else {
            match NaiveDateTime::parse_from_str(&raw_timestamp, ACQ_DATETIME_FORMAT) {
                Ok(_) => raw_timestamp,
                Err(_) => {
                    let fallback = mtime_to_string(mtime);
                    log::warn!(
                        "bad time format: \"{raw_timestamp}\", using file mtime instead: \"{fallback}\""
                    );
                    flags |= ErrorFlags::TIMESTAMP_BAD;
                    fallback
                }
            }
        };

        DeviceRecording {
            path,
            config,
            file_size,
            mtime,
            case,
            timestamp,
            patient_name,
            patient_sex: Sex::from_raw(patient_sex),
            patient_age,
            patient_weight,
            total_samples,
            flags: Cell::new(flags),
        }
    }

    /// The cumulative error bitset. Non-zero prevents any export.
    pub fn flags(&self) -> ErrorFlags {
        self.flags.get()
    }

    pub(crate) fn set_flags(&self, extra: ErrorFlags) {
        self.flags.set(self.flags.get() | extra);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> DeviceConfig {
        self.config
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn case(&self) -> &str {
        &self.case
    }

    /// Acquisition timestamp as `YYYY-MM-DD HH:MM:SS`, either parsed from
    /// the header or substituted from the file's modification time.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn patient_name(&self) -> &str {
        &self.patient_name
    }

    pub fn patient_sex(&self) -> Sex {
        self.patient_sex
    }

    pub fn patient_age(&self) -> u8 {
        self.patient_age
    }

    pub fn patient_weight(&self) -> u8 {
        self.patient_weight
    }

    pub fn total_samples(&self) -> u64 {
        self.total_samples
    }

    pub fn duration_s(&self) -> f64 {
        self.total_samples as f64 / self.config.sample_rate as f64
    }

    /// Start a new row iterator with the device's default x-offset (-2048)
    /// and column count (12). Each call re-opens the file independently.
    pub fn rows(&self) -> RowIter<'_> {
        self.rows_with(DEFAULT_XOFFSET, DEFAULT_COLS)
    }

    /// Start a new row iterator with an explicit x-offset and column count.
    pub fn rows_with(&self, xoffset: i32, cols: usize) -> RowIter<'_> {
        let reader = File::open(&self.path).ok().map(|f| {
            let mut r = BufReader::new(f);
            let _ = r.seek(SeekFrom::Start(HEADER_LEN));
            r
        });
        let done = reader.is_none();
        RowIter {
            owner: self,
            reader,
            xoffset,
            cols,
            read_rows: 0,
            done,
        }
    }
}

fn mtime_to_string(mtime: SystemTime) -> String {
    let secs = mtime
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    DateTime::<Utc>::from_timestamp(secs, 0)
        .unwrap_or_default()
        .naive_utc()
        .format(ACQ_DATETIME_FORMAT)
        .to_string()
}

type RawHeader = (String, String, String, u8, u8, u8);

fn read_header(path: &Path) -> std::io::Result<RawHeader> {
    let mut f = File::open(path)?;
    let case = read_asciiz(&mut f, 8)?;
    skip(&mut f, 2)?;
    let timestamp = read_asciiz(&mut f, 20)?;
    skip(&mut f, 2)?;
    let patient_name = read_asciiz(&mut f, 8)?;
    let patient_sex = f.read_u8()?;
    let patient_age = f.read_u8()?;
    let patient_weight = f.read_u8()?;
    Ok((case, timestamp, patient_name, patient_sex, patient_age, patient_weight))
}

fn skip(f: &mut File, n: usize) -> std::io::Result<()> {
    let mut buf = vec![0_u8; n];
    f.read_exact(&mut buf)
}

fn read_asciiz(f: &mut File, len: usize) -> std::io::Result<String> {
    let mut buf = vec![0_u8; len];
    f.read_exact(&mut buf)?;
    let text = String::from_utf8(buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    Ok(text.split('\0').next().unwrap_or("").to_string())
}

/// Lazy, finite, single-pass, restartable iterator over one device file's
/// sample rows. Owns its own read handle, released when the iterator is
/// exhausted, terminates early, or is dropped.
pub struct RowIter<'a> {
    owner: &'a DeviceRecording,
    reader: Option<BufReader<File>>,
    xoffset: i32,
    cols: usize,
    read_rows: u64,
    done: bool,
}

impl<'a> Iterator for RowIter<'a> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        if self.done {
            return None;
        }
        let reader = self.reader.as_mut()?;
        let data_series = self.owner.config.data_series as usize;

        let mut series = Vec::with_capacity(data_series);
        for _ in 0..data_series {
            match reader.read_u16::<LittleEndian>() {
                Ok(raw) => {
                    if raw == NULL_VALUE {
                        series.push(None);
                    } else {
                        series.push(Some(i32::from(raw) + self.xoffset));
                    }
                }
                Err(_) => {
                    log::debug!(
                        "short read: rows read so far: {}, expected: {}",
                        self.read_rows,
                        self.owner.total_samples()
                    );
                    self.owner.set_flags(ErrorFlags::SHORT_READ);
                    self.done = true;
                    self.reader = None;
                    return None;
                }
            }
        }

        let is_terminator = series
            .iter()
            .all(|cell| *cell == Some(self.xoffset));
        if is_terminator {
            if self.read_rows != self.owner.total_samples() {
                log::warn!(
                    "unexpected end of data: all-zeros row after {} of {} expected rows",
                    self.read_rows,
                    self.owner.total_samples()
                );
                self.owner
                    .set_flags(ErrorFlags::UNEXPECTED_EOD);
            }
            self.done = true;
            self.reader = None;
            return None;
        }

        let (lead_i, lead_avr, lead_avl, lead_avf) = derive_leads(series[0], series[1]);
        let mut row = vec![lead_i, series[0], series[1], lead_avr, lead_avl, lead_avf];
        row.extend_from_slice(&series[2..]);
        row.truncate(self.cols);

        self.read_rows += 1;
        Some(row)
    }
}

/// Einthoven/Goldberger derivation of I, aVR, aVL and aVF from leads II and
/// III. Any missing input makes all four derived leads null, and integer
/// division truncates toward zero, matching the originating device's math.
fn derive_leads(ii: Sample, iii: Sample) -> (Sample, Sample, Sample, Sample) {
    match (ii, iii) {
        (Some(ii), Some(iii)) => (
            Some(ii - iii),
            Some(iii / 2 - ii),
            Some(ii / 2 - iii),
            Some((ii + iii) / 2),
        ),
        _ => (None, None, None, None),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn write_device_file(
        rows: &[[u16; 8]],
        case: &str,
        timestamp: &str,
        name: &str,
        sex: u8,
        age: u8,
        weight: u8,
    ) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let mut header = vec![0_u8; 43];
        header[0..case.len()].copy_from_slice(case.as_bytes());
        header[10..10 + timestamp.len()].copy_from_slice(timestamp.as_bytes());
        header[32..32 + name.len()].copy_from_slice(name.as_bytes());
        header[40] = sex;
        header[41] = age;
        header[42] = weight;
        f.write_all(&header).unwrap();
        for row in rows {
            for val in row {
                f.write_all(&val.to_le_bytes()).unwrap();
            }
        }
        f.write_all(&[0_u8; 37]).unwrap();
        f.flush().unwrap();
        f
    }

    /// Two data rows, then the all-zero footer bytes are read as the
    /// terminating row, with derived leads computed from II/III.
    #[test]
    fn derives_leads_from_a_tiny_synthetic_file() {
        let file = write_device_file(
            &[
                [100 + 2048, 40 + 2048, 0, 0, 0, 0, 0, 0],
                [110 + 2048, 50 + 2048, 0, 0, 0, 0, 0, 0],
            ],
            "T1",
            "2020-01-02 03:04:05",
            "X",
            1,
            30,
            70,
        );
        let rec = DeviceRecording::open(file.path(), DeviceConfig::ecg90a());
        assert!(rec.flags().is_empty(), "flags: {}", rec.flags());
        assert_eq!(rec.patient_sex(), Sex::Male);
        assert_eq!(rec.total_samples(), 2);

        let rows: Vec<Row> = rec.rows_with(DEFAULT_XOFFSET, 6).collect();
        assert_eq!(
            rows,
            vec![
                vec![Some(60), Some(100), Some(40), Some(-30), Some(10), Some(70)],
                vec![Some(70), Some(110), Some(50), Some(-35), Some(15), Some(80)],
            ]
        );
        assert!(rec.flags().is_empty());
    }

    #[test]
    fn file_missing_sets_flag() {
        let rec = DeviceRecording::open("/nonexistent/path/does-not-exist.bin", DeviceConfig::ecg90a());
        assert!(rec.flags().contains(ErrorFlags::FILE_MISSING));
    }

    #[test]
    fn header_size_mismatch_sets_flag() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0_u8; 90]).unwrap(); // not 80 + k*16
        f.flush().unwrap();
        let rec = DeviceRecording::open(f.path(), DeviceConfig::ecg90a());
        assert!(rec.flags().contains(ErrorFlags::HEADER_INVALID));
    }

    /// A file with only the header and footer, no payload, has zero samples.
    #[test]
    fn empty_payload_has_zero_samples() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0_u8; 43 + 37]).unwrap();
        f.flush().unwrap();
        let rec = DeviceRecording::open(f.path(), DeviceConfig::ecg90a());
        assert!(rec.flags().is_empty());
        assert_eq!(rec.total_samples(), 0);
        assert_eq!(rec.rows().count(), 0);
    }

    #[test]
    fn null_sentinel_propagates_to_derived_leads() {
        let file = write_device_file(
            &[[0x6800, 50 + 2048, 0, 0, 0, 0, 0, 0]],
            "T2",
            "2020-01-02 03:04:05",
            "Y",
            0,
            0,
            0,
        );
        let rec = DeviceRecording::open(file.path(), DeviceConfig::ecg90a());
        assert!(rec.flags().is_empty(), "flags: {}", rec.flags());
        let rows: Vec<Row> = rec.rows_with(DEFAULT_XOFFSET, 6).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], None); // I
        assert_eq!(rows[0][1], None); // II (was the null sentinel)
        assert_eq!(rows[0][2], Some(50)); // III
        assert_eq!(rows[0][3], None); // aVR
    }

    #[test]
    fn bad_timestamp_falls_back_to_mtime() {
        let file = write_device_file(
            &[[0, 0, 0, 0, 0, 0, 0, 0]],
            "T3",
            "not-a-timestamp",
            "Z",
            255,
            0,
            0,
        );
        let rec = DeviceRecording::open(file.path(), DeviceConfig::ecg90a());
        assert!(rec.flags().contains(ErrorFlags::TIMESTAMP_BAD));
        assert_eq!(rec.patient_sex(), Sex::UnknownCode(255));
    }
}
