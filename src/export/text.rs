//! Plain-text tabular metrics writers (`samples.dat`, `rates.dat`).
//! Grounded on `utils/export.rs`/`utils/metrics_export.rs`'s manual
//! `write!`-based CSV idiom (`create_dir_all`, `OpenOptions::append`),
//! adapted from comma-delimited to whitespace-delimited columns per this
//! spec's `.dat` format.

use crate::metrics::TopologySnapshot;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Appends one row of `nthreads rate` to `rates.dat`, writing the `#`
/// header only if the file doesn't exist yet.
pub fn append_rate_sample(dir: &Path, nthreads: usize, rate: f64) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let path = dir.join("rates.dat");
    let is_new = !path.exists();
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    if is_new {
        writeln!(file, "# nthreads rate")?;
    }
    writeln!(file, "{nthreads} {rate:.6}")?;
    Ok(())
}

/// Writes a full snapshot as `samples.dat`: one header line, then one row
/// per arrow (`name shots cpu_time_secs processed last_status`).
pub fn write_samples(dir: &Path, snapshot: &TopologySnapshot) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let path = dir.join("samples.dat");
    let mut file = OpenOptions::new().create(true).write(true).truncate(true).open(&path)?;
    writeln!(file, "# name shots cpu_time_secs processed last_status")?;
    for arrow in &snapshot.arrows {
        writeln!(
            file,
            "{} {} {:.6} {} {:?}",
            arrow.name,
            arrow.shot_count,
            arrow.total_cpu_time.as_secs_f64(),
            arrow.total_processed,
            arrow.last_status
        )?;
    }
    writeln!(
        file,
        "# total_events_processed={} integrated_rate={:.3} instantaneous_rate={:.3}",
        snapshot.total_events_processed, snapshot.integrated_rate, snapshot.instantaneous_rate
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{ArrowSnapshot, LastStatus};
    use std::time::Duration;

    #[test]
    fn writes_header_and_rows() {
        let dir = std::env::temp_dir().join(format!("arrow_engine_test_{}", std::process::id()));
        let snapshot = TopologySnapshot {
            arrows: vec![ArrowSnapshot {
                name: "src".into(),
                thread_count: 1,
                pending: 0,
                shot_count: 3,
                total_cpu_time: Duration::from_millis(10),
                total_processed: 30,
                last_status: LastStatus::KeepGoing,
            }],
            total_events_processed: 30,
            integrated_rate: 100.0,
            instantaneous_rate: 95.0,
        };
        write_samples(&dir, &snapshot).unwrap();
        let contents = fs::read_to_string(dir.join("samples.dat")).unwrap();
        assert!(contents.starts_with("# name"));
        assert!(contents.contains("src 3"));
        fs::remove_dir_all(&dir).ok();
    }
}
