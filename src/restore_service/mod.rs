pub mod error;

use std::{io, path::Path};

use nix::unistd::{fchownat, FchownatFlags, Gid, Uid};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::{
    archive_svc::Archiver,
    cipher_svc::Cipher,
    config::Settings,
    container_svc::ContainerRuntime,
    database_svc::DatabaseClient,
    prompt_svc::Prompt,
    snapshot::{
        Snapshot, CONFIG_COPY_FILE, DB_DUMP_FILE, SECRETS_ARCHIVE_FILE, UPLOADS_ARCHIVE_FILE,
        VOLUME_ARCHIVE_FILE,
    },
};
use self::error::*;

#[derive(Debug, PartialEq, Eq)]
pub enum RestoreOutcome {
    ///
    /// The restore ran to the end. Lists the artifacts that were applied.
    ///
    Restored(Vec<&'static str>),
    Cancelled,
}

pub struct RestoreService<'a> {
    settings: &'a Settings,
    runtime: &'a dyn ContainerRuntime,
    database: &'a dyn DatabaseClient,
    archiver: &'a dyn Archiver,
    cipher: &'a dyn Cipher,
    prompt: &'a dyn Prompt,
}

impl<'a> RestoreService<'a> {
    pub fn new(
        settings: &'a Settings,
        runtime: &'a dyn ContainerRuntime,
        database: &'a dyn DatabaseClient,
        archiver: &'a dyn Archiver,
        cipher: &'a dyn Cipher,
        prompt: &'a dyn Prompt,
    ) -> Self {
        Self { settings, runtime, database, archiver, cipher, prompt }
    }

    ///
    /// Replaces live data with the contents of the snapshot at `path`. Absent
    /// artifacts are skipped. The first failing step ends the restore and
    /// leaves the services as they are at that point.
    ///
    pub async fn restore(&self, path: &Path, assume_yes: bool) -> Result<RestoreOutcome> {
        if !path.is_dir() {
            return Err(Error::SnapshotNotFound(path.to_path_buf()));
        }
        let snapshot = Snapshot::new(path.to_path_buf());

        if !assume_yes {
            let question = format!(
                "Restoring {} stops all services and overwrites current data. Continue?",
                snapshot.name
            );
            if !self.prompt.confirm(&question)? {
                warn!("Restore cancelled");
                return Ok(RestoreOutcome::Cancelled);
            }
        }

        info!("Restoring from {}", snapshot.path.display());
        info!("Stopping services");
        self.runtime.stop_all().await?;

        let mut restored = Vec::new();
        if snapshot.has_artifact(DB_DUMP_FILE) {
            self.restore_database(&snapshot).await?;
            restored.push("database");
        }
        if snapshot.has_artifact(UPLOADS_ARCHIVE_FILE) {
            self.restore_uploads(&snapshot)?;
            restored.push("uploads");
        }
        if snapshot.has_artifact(VOLUME_ARCHIVE_FILE) {
            info!("Restoring volume {}", self.settings.volume_name);
            self.runtime.import_volume(&self.settings.volume_name, &snapshot.path, VOLUME_ARCHIVE_FILE).await?;
            restored.push("volume");
        }
        if snapshot.has_artifact(CONFIG_COPY_FILE) {
            info!("Restoring configuration to {}", self.settings.config_path.display());
            tokio::fs::copy(snapshot.artifact(CONFIG_COPY_FILE), &self.settings.config_path).await?;
            restored.push("config");
        }
        if snapshot.has_artifact(SECRETS_ARCHIVE_FILE) {
            self.restore_secrets(&snapshot)?;
            restored.push("secrets");
        }

        info!("Starting services");
        self.runtime.start_all().await?;
        info!("Restore from {} complete", snapshot.name);

        Ok(RestoreOutcome::Restored(restored))
    }

    async fn restore_database(&self, snapshot: &Snapshot) -> Result<()> {
        info!("Restoring database {}", self.settings.db_name);
        self.runtime.start_service(&self.settings.db_service).await?;
        tokio::time::sleep(self.settings.restore_grace).await;
        if !self.database.is_ready().await? {
            return Err(Error::DatabaseNotReady);
        }
        self.database.recreate().await?;
        self.database.replay(&snapshot.artifact(DB_DUMP_FILE)).await?;
        Ok(())
    }

    fn restore_uploads(&self, snapshot: &Snapshot) -> Result<()> {
        let upload_dir = &self.settings.upload_dir;
        info!("Restoring uploads to {}", upload_dir.display());
        if upload_dir.exists() {
            std::fs::remove_dir_all(upload_dir)?;
        }
        std::fs::create_dir_all(upload_dir)?;
        self.archiver.extract_file(&snapshot.artifact(UPLOADS_ARCHIVE_FILE), upload_dir)?;
        chown_tree(upload_dir, self.settings.upload_uid, self.settings.upload_gid)
    }

    fn restore_secrets(&self, snapshot: &Snapshot) -> Result<()> {
        let secrets_dir = &self.settings.secrets_dir;
        info!("Restoring secrets to {}", secrets_dir.display());
        let passphrase = self.prompt.passphrase("Passphrase for the secrets archive", false)?;
        let sealed = std::fs::read(snapshot.artifact(SECRETS_ARCHIVE_FILE))?;
        let plain = self.cipher.decrypt(&sealed, &passphrase)?;
        std::fs::create_dir_all(secrets_dir)?;
        self.archiver.extract_bytes(&plain, secrets_dir)?;
        Ok(())
    }
}

///
/// Hands every entry below `root` to `uid:gid` without following symlinks
///
fn chown_tree(root: &Path, uid: u32, gid: u32) -> Result<()> {
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(io::Error::from)?;
        fchownat(None, entry.path(), Some(Uid::from_raw(uid)), Some(Gid::from_raw(gid)), FchownatFlags::NoFollowSymlink)
            .map_err(|source| Error::OwnershipError { path: entry.path().to_path_buf(), source })?;
    }
    Ok(())
}
