pub mod error;
pub mod tier;

use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::file_svc::get_snapshot_dirs;
use error::*;

pub const DB_DUMP_FILE: &str = "immich_db.sql.gz";
pub const UPLOADS_ARCHIVE_FILE: &str = "immich_uploads.tar.gz";
pub const VOLUME_ARCHIVE_FILE: &str = "portainer_data.tar.gz";
pub const CONFIG_COPY_FILE: &str = "config.json";
pub const SECRETS_ARCHIVE_FILE: &str = "secrets.tar.gz.enc";
pub const TUNNEL_COPY_DIR: &str = "cloudflared";
pub const MANIFEST_FILE: &str = "manifest.txt";

///
/// One timestamped backup directory under `<root>/backups`
///
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub name: String,
    pub path: PathBuf,
}

impl Snapshot {
    pub fn new(path: PathBuf) -> Self {
        let name = path.file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Self { name, path }
    }

    ///
    /// Calendar date from the `YYYYMMDD` prefix, `None` when it is not a real date
    ///
    pub fn date(&self) -> Option<NaiveDate> {
        self.name.get(..8).and_then(|pfx| NaiveDate::parse_from_str(pfx, "%Y%m%d").ok())
    }

    pub fn artifact(&self, file_name: &str) -> PathBuf {
        self.path.join(file_name)
    }

    pub fn has_artifact(&self, file_name: &str) -> bool {
        self.artifact(file_name).exists()
    }
}

///
/// All snapshots under `backups_dir`, newest first. A missing directory
/// holds no snapshots.
///
pub fn list_snapshots(backups_dir: &Path) -> Result<Vec<Snapshot>> {
    if !backups_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut snapshots: Vec<Snapshot> = get_snapshot_dirs(backups_dir)?
        .into_iter()
        .map(Snapshot::new)
        .collect();
    snapshots.sort_by(|a, b| b.name.cmp(&a.name));
    Ok(snapshots)
}
