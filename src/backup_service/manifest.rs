use std::{fmt::Write, path::Path};

use chrono::NaiveDateTime;
use humansize::{format_size, BINARY};
use tracing::warn;
use walkdir::WalkDir;

use super::StepRecord;
use crate::{container_svc::ContainerRuntime, hash_svc::hash_file, snapshot::{Snapshot, MANIFEST_FILE}};

pub struct ManifestEntry {
    pub rel_path: String,
    pub size: u64,
    pub checksum: Option<String>,
}

pub struct DiskUsage {
    pub total: u64,
    pub free: u64,
}

pub struct Manifest<'a> {
    pub created: NaiveDateTime,
    pub hostname: String,
    pub storage_root: &'a Path,
    pub snapshot: &'a Snapshot,
    pub steps: &'a [StepRecord],
    pub entries: Vec<ManifestEntry>,
    pub containers: Vec<String>,
    pub disk: Option<DiskUsage>,
}

impl<'a> Manifest<'a> {
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail
        let _ = self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) -> std::fmt::Result {
        writeln!(out, "Backup manifest")?;
        writeln!(out, "===============")?;
        writeln!(out, "Created:      {}", self.created.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(out, "Hostname:     {}", self.hostname)?;
        writeln!(out, "Storage root: {}", self.storage_root.display())?;
        writeln!(out, "Snapshot:     {}", self.snapshot.path.display())?;

        writeln!(out, "\nSteps")?;
        writeln!(out, "-----")?;
        for record in self.steps {
            writeln!(out, "{:<12} {:<8} {}", record.step, record.outcome.label(), record.outcome.detail())?;
        }

        writeln!(out, "\nContents")?;
        writeln!(out, "--------")?;
        if self.entries.is_empty() {
            writeln!(out, "(empty)")?;
        }
        for entry in &self.entries {
            writeln!(out, "{:>10}  {:<24}  {}",
                format_size(entry.size, BINARY),
                entry.checksum.as_deref().unwrap_or("-"),
                entry.rel_path)?;
        }

        writeln!(out, "\nRunning containers")?;
        writeln!(out, "------------------")?;
        if self.containers.is_empty() {
            writeln!(out, "(none)")?;
        }
        for container in &self.containers {
            writeln!(out, "{}", container)?;
        }

        writeln!(out, "\nDisk usage ({})", self.storage_root.display())?;
        writeln!(out, "----------")?;
        match &self.disk {
            Some(disk) => writeln!(out, "Total: {}  Used: {}  Free: {}",
                format_size(disk.total, BINARY),
                format_size(disk.total.saturating_sub(disk.free), BINARY),
                format_size(disk.free, BINARY))?,
            None => writeln!(out, "(unavailable)")?,
        }
        Ok(())
    }
}

///
/// Every regular file in the snapshot except the manifest, in path order,
/// with its size and checksum
///
pub async fn collect_entries(snapshot: &Snapshot) -> Vec<ManifestEntry> {
    let mut entries = Vec::new();
    let walker = WalkDir::new(&snapshot.path).min_depth(1).sort_by_file_name();
    for entry in walker.into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        let rel_path = entry.path().strip_prefix(&snapshot.path)
            .unwrap_or_else(|_| entry.path())
            .to_string_lossy()
            .to_string();
        if rel_path == MANIFEST_FILE {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        let checksum = match hash_file(entry.path()).await {
            Ok(hsh) => Some(hsh),
            Err(e) => {
                warn!("Could not checksum {}: {}", rel_path, e);
                None
            }
        };
        entries.push(ManifestEntry { rel_path, size, checksum });
    }
    entries
}

pub fn hostname() -> String {
    nix::unistd::gethostname()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

pub fn disk_usage(path: &Path) -> Option<DiskUsage> {
    let stat = nix::sys::statvfs::statvfs(path).ok()?;
    let fragment = stat.fragment_size() as u64;
    Some(DiskUsage {
        total: stat.blocks() as u64 * fragment,
        free: stat.blocks_available() as u64 * fragment,
    })
}

pub async fn running_containers(runtime: &dyn ContainerRuntime) -> Vec<String> {
    match runtime.running_containers().await {
        Ok(containers) => containers,
        Err(e) => {
            warn!("Could not list running containers: {}", e);
            Vec::new()
        }
    }
}
