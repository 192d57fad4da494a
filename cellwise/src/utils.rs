//! Misc utilities.

use crate::common::*;

/// Returns the sibling path where a file is staged before being renamed into place.
pub fn staging_path(path: &Path) -> Result<PathBuf> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format_err!("invalid output path '{}'", path.display()))?;
    Ok(path.with_file_name(format!(".{}.tmp", file_name)))
}

/// Writes a file by writing to a staging file and renaming it over the target.
///
/// Readers either see the complete previous content or the complete new one.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let tmp_path = staging_path(path)?;
    let result = write(&tmp_path).and_then(|()| {
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "failed to rename '{}' to '{}'",
                tmp_path.display(),
                path.display()
            )
        })
    });

    if result.is_err() && tmp_path.exists() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// Copies a file to the destination through a staging file.
pub fn copy_atomic(src: &Path, dst: &Path) -> Result<()> {
    write_atomic(dst, |tmp_path| {
        fs::copy(src, tmp_path)
            .with_context(|| format!("failed to copy '{}'", src.display()))?;
        Ok(())
    })
}

/// Returns the file name of an image base path, which names its output files.
pub fn base_name(base_path: &Path) -> Result<&str> {
    base_path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| format_err!("invalid image base path '{}'", base_path.display()))
}

/// Counts events and reports the rate once per interval.
#[derive(Debug)]
pub struct RateCounter {
    count: f64,
    instant: Instant,
    interval: Duration,
}

impl RateCounter {
    pub fn new(interval: Duration) -> Self {
        Self {
            count: 0.0,
            instant: Instant::now(),
            interval,
        }
    }

    pub fn with_second_interval() -> Self {
        Self::new(Duration::from_secs(1))
    }

    pub fn add(&mut self, addition: f64) {
        self.count += addition;
    }

    pub fn rate(&mut self) -> Option<f64> {
        let elapsed = self.instant.elapsed();
        if elapsed >= self.interval {
            let rate = self.count / elapsed.as_secs_f64();
            self.count = 0.0;
            self.instant = Instant::now();
            Some(rate)
        } else {
            None
        }
    }
}
