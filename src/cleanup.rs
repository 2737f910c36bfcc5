// src/cleanup.rs
//
// Log directory retention policy.
//
// When the log directory exceeds a size or file-count threshold, episode
// and event files are deleted oldest-first (by mtime) until only the most
// recent half of the file-count limit remains. Dry-run mode prints the
// deletions without applying them.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use tracing::info;

#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Maximum episode/event log files to keep.
    pub max_files: usize,
    pub log_dir: PathBuf,
    /// Print deletions without applying them.
    pub dry_run: bool,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            max_files: 50,
            log_dir: PathBuf::from("logs"),
            dry_run: false,
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct CleanupReport {
    pub deleted_files: usize,
    pub bytes_freed: u64,
    pub dry_run: bool,
}

/// Total size and count of JSON log files under `log_dir`.
pub fn log_dir_usage(log_dir: &Path) -> Result<(u64, usize)> {
    let mut total_size = 0u64;
    let mut file_count = 0usize;

    if !log_dir.exists() {
        return Ok((0, 0));
    }

    for entry in fs::read_dir(log_dir)
        .with_context(|| format!("failed to read log directory {}", log_dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        if path.extension().map(|e| e == "json").unwrap_or(false) {
            total_size += entry.metadata().map(|m| m.len()).unwrap_or(0);
            file_count += 1;
        }
    }

    Ok((total_size, file_count))
}

/// Delete old episode_*.json / events_*.json files beyond `max_files`,
/// oldest modification time first.
pub fn cleanup_old_logs(config: &CleanupConfig) -> Result<CleanupReport> {
    let mut files = collect_log_files(&config.log_dir)?;

    if files.len() <= config.max_files {
        info!(
            found = files.len(),
            limit = config.max_files,
            "log files within limit, no cleanup needed"
        );
        return Ok(CleanupReport {
            dry_run: config.dry_run,
            ..CleanupReport::default()
        });
    }

    files.sort_by_key(|(_, mtime)| *mtime);
    let to_delete = files.len() - config.max_files;

    let mut report = CleanupReport {
        dry_run: config.dry_run,
        ..CleanupReport::default()
    };

    for (path, _) in files.into_iter().take(to_delete) {
        let size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
        if config.dry_run {
            println!("would delete: {}", path.display());
            report.deleted_files += 1;
            report.bytes_freed += size;
        } else {
            match fs::remove_file(&path) {
                Ok(()) => {
                    report.deleted_files += 1;
                    report.bytes_freed += size;
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "failed to delete log file");
                }
            }
        }
    }

    info!(
        deleted = report.deleted_files,
        freed_mb = report.bytes_freed as f64 / (1024.0 * 1024.0),
        dry_run = report.dry_run,
        "log cleanup finished"
    );
    Ok(report)
}

/// Clean up when the directory exceeds either threshold, retaining the
/// most recent half of the file-count limit.
pub fn auto_cleanup(log_dir: &Path, max_size_mb: f64, max_files: usize) -> Result<CleanupReport> {
    auto_cleanup_with(log_dir, max_size_mb, max_files, false)
}

pub fn auto_cleanup_with(
    log_dir: &Path,
    max_size_mb: f64,
    max_files: usize,
    dry_run: bool,
) -> Result<CleanupReport> {
    let (size, count) = log_dir_usage(log_dir)?;
    let size_mb = size as f64 / (1024.0 * 1024.0);

    if size_mb <= max_size_mb && count <= max_files {
        info!(
            size_mb,
            count, "log directory within limits, skipping cleanup"
        );
        return Ok(CleanupReport {
            dry_run,
            ..CleanupReport::default()
        });
    }

    cleanup_old_logs(&CleanupConfig {
        max_files: max_files / 2,
        log_dir: log_dir.to_path_buf(),
        dry_run,
    })
}

fn collect_log_files(log_dir: &Path) -> Result<Vec<(PathBuf, SystemTime)>> {
    let mut files = Vec::new();
    if !log_dir.exists() {
        return Ok(files);
    }

    for entry in fs::read_dir(log_dir)
        .with_context(|| format!("failed to read log directory {}", log_dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let is_log = (name.starts_with("episode_") || name.starts_with("events_"))
            && name.ends_with(".json");
        if !is_log {
            continue;
        }
        let mtime = entry
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((path, mtime));
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn touch(dir: &Path, name: &str, age: Duration) {
        let path = dir.join(name);
        fs::write(&path, "{}").unwrap();
        let mtime = SystemTime::now() - age;
        // filetime would be cleaner, but setting times via File avoids
        // the extra dependency.
        let file = fs::File::options().write(true).open(&path).unwrap();
        let _ = file.set_modified(mtime);
    }

    #[test]
    fn under_limit_deletes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "episode_a.json", Duration::from_secs(100));

        let report = cleanup_old_logs(&CleanupConfig {
            max_files: 10,
            log_dir: dir.path().to_path_buf(),
            dry_run: false,
        })
        .unwrap();
        assert_eq!(report.deleted_files, 0);
        assert!(dir.path().join("episode_a.json").exists());
    }

    #[test]
    fn deletes_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "episode_old.json", Duration::from_secs(3_000));
        touch(dir.path(), "events_mid.json", Duration::from_secs(2_000));
        touch(dir.path(), "episode_new.json", Duration::from_secs(10));

        let report = cleanup_old_logs(&CleanupConfig {
            max_files: 2,
            log_dir: dir.path().to_path_buf(),
            dry_run: false,
        })
        .unwrap();

        assert_eq!(report.deleted_files, 1);
        assert!(!dir.path().join("episode_old.json").exists());
        assert!(dir.path().join("events_mid.json").exists());
        assert!(dir.path().join("episode_new.json").exists());
    }

    #[test]
    fn dry_run_reports_without_deleting() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "episode_a.json", Duration::from_secs(300));
        touch(dir.path(), "episode_b.json", Duration::from_secs(200));
        touch(dir.path(), "episode_c.json", Duration::from_secs(100));

        let report = cleanup_old_logs(&CleanupConfig {
            max_files: 1,
            log_dir: dir.path().to_path_buf(),
            dry_run: true,
        })
        .unwrap();

        assert!(report.dry_run);
        assert_eq!(report.deleted_files, 2);
        assert!(dir.path().join("episode_a.json").exists());
        assert!(dir.path().join("episode_b.json").exists());
    }

    #[test]
    fn auto_cleanup_keeps_half_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0u64..10 {
            touch(
                dir.path(),
                &format!("episode_{i}.json"),
                Duration::from_secs(1_000 - i * 50),
            );
        }

        // Over the 4-file limit: retain 4 / 2 = 2 newest.
        let report = auto_cleanup(dir.path(), 1_000.0, 4).unwrap();
        assert_eq!(report.deleted_files, 8);
        let (_, count) = log_dir_usage(dir.path()).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn ignores_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "episode_a.json", Duration::from_secs(300));
        fs::write(dir.path().join("insights.json"), "{}").unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();

        cleanup_old_logs(&CleanupConfig {
            max_files: 0,
            log_dir: dir.path().to_path_buf(),
            dry_run: false,
        })
        .unwrap();

        assert!(!dir.path().join("episode_a.json").exists());
        assert!(dir.path().join("insights.json").exists());
        assert!(dir.path().join("notes.txt").exists());
    }
}
