//! Checkpoint (`.par`) file reading and writing.
//!
//! Format: one `name=value,mean,std` record per line (bare `name=value` is
//! accepted on read). Order-independent on read, declaration order on write.
//! Lines starting with `#` and blank lines are ignored.

use std::fs;
use std::io::Write;
use std::path::Path;

use myo_types::{MyoError, MyoResult};
use tracing::debug;

use crate::set::ParamSet;

/// One parsed checkpoint record.
#[derive(Debug, Clone, PartialEq)]
struct ParRecord {
    name: String,
    value: f64,
    mean: Option<f64>,
    std: Option<f64>,
}

fn parse_line(path: &Path, line_no: usize, line: &str) -> MyoResult<Option<ParRecord>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }

    let parse_err = |message: String| MyoError::Parse {
        path: path.display().to_string(),
        line: line_no,
        message,
    };

    let (name, rest) = trimmed
        .split_once('=')
        .ok_or_else(|| parse_err("missing '='".to_string()))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(parse_err("empty parameter name".to_string()));
    }

    let mut fields = rest.split(',').map(str::trim);
    let mut next_f64 = |what: &str| -> MyoResult<Option<f64>> {
        match fields.next() {
            None => Ok(None),
            Some(s) => s
                .parse::<f64>()
                .map(Some)
                .map_err(|e| parse_err(format!("bad {what} '{s}': {e}"))),
        }
    };

    let value = next_f64("value")?.ok_or_else(|| parse_err("missing value".to_string()))?;
    let mean = next_f64("mean")?;
    let std = next_f64("std")?;

    Ok(Some(ParRecord {
        name: name.to_string(),
        value,
        mean,
        std,
    }))
}

fn read_records(path: &Path) -> MyoResult<Vec<ParRecord>> {
    let contents = fs::read_to_string(path)?;
    let mut records = Vec::new();
    for (i, line) in contents.lines().enumerate() {
        if let Some(record) = parse_line(path, i + 1, line)? {
            records.push(record);
        }
    }
    Ok(records)
}

impl ParamSet {
    /// Read name/value records from a checkpoint file, overwriting the value
    /// (and mean/std when the record carries them) of every matching
    /// parameter. Unmatched names are skipped, not errors.
    ///
    /// Returns `(imported, skipped)` counts.
    pub fn import(&mut self, path: &Path) -> MyoResult<(usize, usize)> {
        let mut imported = 0;
        let mut skipped = 0;
        for record in read_records(path)? {
            match self.get_mut(&record.name) {
                Some(param) => {
                    param.value = record.value;
                    if let Some(mean) = record.mean {
                        param.init_mean = mean;
                    }
                    if let Some(std) = record.std {
                        param.init_std = std;
                    }
                    imported += 1;
                }
                None => {
                    debug!(name = %record.name, "skipping unknown parameter");
                    skipped += 1;
                }
            }
        }
        Ok((imported, skipped))
    }

    /// Overlay a checkpoint file onto the initial search distribution: each
    /// matching parameter's init mean is set to the file value, and — when
    /// `use_std` and the record carries one — its init std to
    /// `std_factor * file_std + std_offset`.
    ///
    /// Returns `(imported, skipped)` counts.
    pub fn import_mean_std(
        &mut self,
        path: &Path,
        use_std: bool,
        std_factor: f64,
        std_offset: f64,
    ) -> MyoResult<(usize, usize)> {
        let mut imported = 0;
        let mut skipped = 0;
        for record in read_records(path)? {
            match self.get_mut(&record.name) {
                Some(param) => {
                    param.init_mean = record.value;
                    param.value = record.value;
                    if use_std {
                        if let Some(std) = record.std {
                            param.init_std = std_factor * std + std_offset;
                        }
                    }
                    imported += 1;
                }
                None => skipped += 1,
            }
        }
        Ok((imported, skipped))
    }

    /// Write every declared parameter as `name=value,mean,std`, in
    /// declaration order. The output is readable by [`ParamSet::import`].
    pub fn export(&self, path: &Path) -> MyoResult<()> {
        let mut out = fs::File::create(path)?;
        for param in self.iter() {
            writeln!(
                out,
                "{}={},{},{}",
                param.name, param.value, param.init_mean, param.init_std
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_set() -> ParamSet {
        let mut ps = ParamSet::new();
        ps.declare("hip.kp", 1.25, 0.3).unwrap();
        ps.declare("hip.kd", -0.75, 0.1).unwrap();
        ps.declare_fixed("mass", 72.0).unwrap();
        ps.finalize();
        ps
    }

    #[test]
    fn export_import_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("best.par");

        let mut ps = sample_set();
        ps.set_free_values(&[1.5, -0.6]).unwrap();
        ps.export(&path).unwrap();

        let mut restored = sample_set();
        let (imported, skipped) = restored.import(&path).unwrap();
        assert_eq!(imported, 3);
        assert_eq!(skipped, 0);
        for (a, b) in ps.iter().zip(restored.iter()) {
            assert_eq!(a.name, b.name);
            assert_eq!(a.value, b.value);
        }
    }

    #[test]
    fn unmatched_names_are_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foreign.par");
        fs::write(&path, "hip.kp=2.0,2.0,0.5\nno_such_param=1.0\n").unwrap();

        let mut ps = sample_set();
        let (imported, skipped) = ps.import(&path).unwrap();
        assert_eq!(imported, 1);
        assert_eq!(skipped, 1);
        assert_eq!(ps.get("hip.kp").unwrap().value, 2.0);
    }

    #[test]
    fn bare_name_value_records_accepted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("short.par");
        fs::write(&path, "hip.kd=-0.9\n").unwrap();

        let mut ps = sample_set();
        let (imported, _) = ps.import(&path).unwrap();
        assert_eq!(imported, 1);
        let p = ps.get("hip.kd").unwrap();
        assert_eq!(p.value, -0.9);
        // no mean/std in the record: declared values remain
        assert_eq!(p.init_std, 0.1);
    }

    #[test]
    fn comments_and_blank_lines_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("commented.par");
        fs::write(&path, "# checkpoint\n\nhip.kp=3.0\n").unwrap();

        let mut ps = sample_set();
        let (imported, skipped) = ps.import(&path).unwrap();
        assert_eq!((imported, skipped), (1, 0));
    }

    #[test]
    fn malformed_line_is_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.par");
        fs::write(&path, "hip.kp=not_a_number\n").unwrap();

        let mut ps = sample_set();
        let err = ps.import(&path).unwrap_err();
        assert!(matches!(err, MyoError::Parse { line: 1, .. }));
    }

    #[test]
    fn import_mean_std_overlays_distribution() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("init.par");
        fs::write(&path, "hip.kp=2.5,2.4,0.4\nhip.kd=-0.5,-0.5,0.2\n").unwrap();

        let mut ps = sample_set();
        let (imported, skipped) = ps.import_mean_std(&path, true, 2.0, 0.01).unwrap();
        assert_eq!((imported, skipped), (2, 0));

        let kp = ps.get("hip.kp").unwrap();
        assert_eq!(kp.init_mean, 2.5);
        assert_eq!(kp.init_std, 2.0 * 0.4 + 0.01);

        // with use_std = false the declared std survives
        let mut ps2 = sample_set();
        ps2.import_mean_std(&path, false, 1.0, 0.0).unwrap();
        assert_eq!(ps2.get("hip.kp").unwrap().init_std, 0.3);
    }
}
