use crate::model::Snapshot;
use anyhow::Context;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const BACKUP_FILE_PREFIX: &str = "handwriting-backup-";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub byte_len: usize,
}

pub fn backup_file_name(date: chrono::NaiveDate) -> String {
    format!("{}{}.json", BACKUP_FILE_PREFIX, date.format("%Y-%m-%d"))
}

/// Writes the snapshot into `out_dir` under a dated file name. The file is
/// written next to its destination first and renamed into place.
pub fn export_snapshot(snapshot: &Snapshot, out_dir: &Path) -> anyhow::Result<ExportSummary> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create directory {}", out_dir.to_string_lossy()))?;

    let dst = out_dir.join(backup_file_name(chrono::Local::now().date_naive()));
    let text = serde_json::to_string(snapshot).context("failed to serialize snapshot")?;

    let tmp = dst.with_extension("json.writing");
    {
        let mut f = std::fs::File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.to_string_lossy()))?;
        f.write_all(text.as_bytes())
            .with_context(|| format!("failed to write {}", tmp.to_string_lossy()))?;
        f.flush().context("failed to flush backup file")?;
    }
    std::fs::rename(&tmp, &dst)
        .with_context(|| format!("failed to move backup to {}", dst.to_string_lossy()))?;

    Ok(ExportSummary {
        path: dst,
        byte_len: text.len(),
    })
}

pub fn read_backup(in_path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(in_path)
        .with_context(|| format!("failed to read backup {}", in_path.to_string_lossy()))
}
