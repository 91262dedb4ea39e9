//! Null/multiplier-aware scalar-to-text formatting and the CSV exporter.

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::device::{DeviceRecording, Sample, DEFAULT_COLS, DEFAULT_XOFFSET};
use crate::flags::ErrorFlags;

/// Nanovolts per raw amplitude unit, matching the SCP-ECG rhythm-data
/// amplitude multiplier this device always reports.
const AMPL_NANOVOLT: f64 = 5000.0;

/// Options for [`DeviceRecording::export_csv`]. `target` defaults to the
/// input path with `.csv` appended when left `None`.
#[derive(Clone, Debug, Default)]
pub struct CsvOptions {
    pub target: Option<PathBuf>,
    pub overwrite: bool,
    pub as_millivolt: bool,
    pub none_as_zero: bool,
    pub xoffset: Option<i32>,
    pub cols: Option<usize>,
}

/// Format one cell the way the CSV exporter does: empty string (or `0` /
/// `0.000000` under `none_as_zero`) for a null sample, `%d` for an integer
/// cell, `%.6f` for a millivolt-scaled cell.
pub fn csv_format(value: Sample, multiplier: Option<f64>, none_as_zero: bool) -> String {
    match value {
        None => {
            if none_as_zero {
                match multiplier {
                    Some(_) => format!("{:.6}", 0.0),
                    None => "0".to_string(),
                }
            } else {
                String::new()
            }
        }
        Some(v) => match multiplier {
            Some(m) => format!("{:.6}", v as f64 * m),
            None => format!("{v}"),
        },
    }
}

impl DeviceRecording {
    /// Export this recording to a CSV file: one line per row, `cols`
    /// comma-separated cells, no header, `\n`-terminated. Refuses to run
    /// while [`DeviceRecording::flags`] is non-zero.
    pub fn export_csv(&self, opts: CsvOptions) -> Option<PathBuf> {
        if !self.flags().is_empty() {
            log::warn!("ECG file header did not parse correctly, refusing CSV export");
            return None;
        }
        let target = opts
            .target
            .clone()
            .unwrap_or_else(|| default_output_path(self.path(), "csv"));
        if target.exists() && !opts.overwrite {
            log::warn!("output file {} already exists, will not overwrite", target.display());
            self.set_flags(ErrorFlags::OUTPUT_EXISTS);
            return None;
        }

        let multiplier = opts.as_millivolt.then_some(AMPL_NANOVOLT / 1_000_000.0);
        let xoffset = opts.xoffset.unwrap_or(DEFAULT_XOFFSET);
        let cols = opts.cols.unwrap_or(DEFAULT_COLS);

        let mut f = match std::fs::File::create(&target) {
            Ok(f) => f,
            Err(e) => {
                log::error!("failed to create {}: {e}", target.display());
                return None;
            }
        };
        for row in self.rows_with(xoffset, cols) {
            let line = row
                .iter()
                .map(|cell| csv_format(*cell, multiplier, opts.none_as_zero))
                .collect::<Vec<_>>()
                .join(",");
            if writeln!(f, "{line}").is_err() {
                log::error!("failed writing {}", target.display());
                return None;
            }
        }
        Some(target)
    }
}

fn default_output_path(input: &Path, ext: &str) -> PathBuf {
    let mut s = input.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::config::DeviceConfig;
    use rstest::rstest;
    use std::io::Write as _;

    #[rstest]
    #[case(Some(42), None, false, "42")]
    #[case(None, None, false, "")]
    #[case(None, None, true, "0")]
    #[case(Some(1), Some(0.005), false, "0.005000")]
    #[case(None, Some(0.005), true, "0.000000")]
    fn formats_cells(
        #[case] value: Sample,
        #[case] multiplier: Option<f64>,
        #[case] none_as_zero: bool,
        #[case] expected: &str,
    ) {
        assert_eq!(csv_format(value, multiplier, none_as_zero), expected);
    }

    /// Integer mode, 6 columns, with derived leads in the output.
    #[test]
    fn exports_expected_csv_in_integer_mode() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        let mut header = vec![0_u8; 43];
        header[0..2].copy_from_slice(b"T1");
        header[10..30].copy_from_slice(b"2020-01-02 03:04:05\0");
        header[32] = b'X';
        header[40] = 1;
        header[41] = 30;
        header[42] = 70;
        f.write_all(&header).unwrap();
        for (a, b) in [(100 + 2048, 40 + 2048), (110 + 2048, 50 + 2048), (0, 0)] {
            f.write_all(&(a as u16).to_le_bytes()).unwrap();
            f.write_all(&(b as u16).to_le_bytes()).unwrap();
            f.write_all(&[0_u8; 12]).unwrap();
        }
        f.write_all(&[0_u8; 37]).unwrap();
        f.flush().unwrap();

        let rec = DeviceRecording::open(f.path(), DeviceConfig::ecg90a());
        assert!(rec.flags().is_empty());

        let out_path = f.path().with_extension("out.csv");
        let opts = CsvOptions {
            target: Some(out_path.clone()),
            overwrite: true,
            cols: Some(6),
            ..Default::default()
        };
        let out = rec.export_csv(opts).expect("export should succeed");
        let contents = std::fs::read_to_string(&out).unwrap();
        assert_eq!(contents, "60,100,40,-30,10,70\n70,110,50,-35,15,80\n");
        let _ = std::fs::remove_file(out_path);
    }

    #[test]
    fn refuses_to_overwrite_existing_output() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&[0_u8; 80]).unwrap();
        f.flush().unwrap();
        let rec = DeviceRecording::open(f.path(), DeviceConfig::ecg90a());

        let existing = tempfile::NamedTempFile::new().unwrap();
        let opts = CsvOptions {
            target: Some(existing.path().to_path_buf()),
            overwrite: false,
            ..Default::default()
        };
        assert!(rec.export_csv(opts).is_none());
        assert!(rec.flags().contains(ErrorFlags::OUTPUT_EXISTS));
    }
}
