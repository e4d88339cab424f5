use std::path::{Path, PathBuf};

use humansize::{format_size, BINARY};
use tracing::warn;

use crate::{
    file_svc::dir_size,
    snapshot::{error::Result, list_snapshots, tier::{read_tier, Tier}},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub tier: Tier,
    pub size: u64,
    pub path: PathBuf,
}

impl CatalogEntry {
    pub fn display_line(&self) -> String {
        format!("{:<16} {:<8} {:>10}  {}",
            self.name, self.tier.label(), format_size(self.size, BINARY), self.path.display())
    }
}

///
/// The `list` table: a header and one line per entry. `None` when there is
/// nothing to list.
///
pub fn render_listing(entries: &[CatalogEntry]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }
    let mut out = format!("{:<16} {:<8} {:>10}  {}\n", "BACKUP", "TIER", "SIZE", "PATH");
    for entry in entries {
        out.push_str(&entry.display_line());
        out.push('\n');
    }
    Some(out)
}

///
/// Every snapshot under `backups_dir`, newest first. Nothing is written:
/// unclassified snapshots get the tier their date would give them.
///
pub fn catalog(backups_dir: &Path) -> Result<Vec<CatalogEntry>> {
    let mut entries = Vec::new();
    for snapshot in list_snapshots(backups_dir)? {
        let stored = read_tier(&snapshot.path).unwrap_or_else(|e| {
            warn!("Unreadable tier record in {}: {}", snapshot.name, e);
            None
        });
        let tier = stored
            .or_else(|| snapshot.date().map(Tier::for_date))
            .unwrap_or(Tier::Daily);

        entries.push(CatalogEntry {
            size: dir_size(&snapshot.path),
            name: snapshot.name,
            tier,
            path: snapshot.path,
        });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::tier::{LEGACY_MONTHLY_MARKER, TIER_RECORD_FILE};

    #[test]
    fn test_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let entries = catalog(&dir.path().join("backups")).unwrap();
        assert!(entries.is_empty());
        assert_eq!(render_listing(&entries), None);
    }

    #[test]
    fn test_listing_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["20240301_020000", "20240305_020000"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }

        let listing = render_listing(&catalog(dir.path()).unwrap()).unwrap();
        let lines: Vec<&str> = listing.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("BACKUP"));
        assert!(lines[1].starts_with("20240305_020000  Daily"));
        assert!(lines[2].starts_with("20240301_020000  Monthly"));
    }

    #[test]
    fn test_catalog_labels_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["20240305_020000", "20240310_020000", "20241399_000000", "20240101_020000"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("20240305_020000/immich_db.sql.gz"), vec![0u8; 1536]).unwrap();
        std::fs::write(dir.path().join("20241399_000000").join(LEGACY_MONTHLY_MARKER), b"").unwrap();

        let entries = catalog(dir.path()).unwrap();
        let summary: Vec<(&str, &str)> = entries.iter().map(|e| (e.name.as_str(), e.tier.label())).collect();
        assert_eq!(summary, vec![
            ("20241399_000000", "Monthly"),
            ("20240310_020000", "Weekly"),
            ("20240305_020000", "Daily"),
            ("20240101_020000", "Monthly"),
        ]);
        assert_eq!(entries[2].size, 1536);
        assert!(entries[2].display_line().contains(&format_size(1536u64, BINARY)));
        assert!(!dir.path().join("20240310_020000").join(TIER_RECORD_FILE).exists());
    }
}
