pub mod error;
pub mod manifest;

use std::path::Path;

use humansize::{format_size, BINARY};
use tracing::{error, info, warn};

use crate::{
    archive_svc::Archiver,
    cipher_svc::Cipher,
    config::{Settings, CONFIG_FILE_NAME},
    container_svc::ContainerRuntime,
    database_svc::DatabaseClient,
    file_svc::copy_dir_all,
    prompt_svc::Prompt,
    snapshot::{
        Snapshot, DB_DUMP_FILE, MANIFEST_FILE, SECRETS_ARCHIVE_FILE, TUNNEL_COPY_DIR,
        UPLOADS_ARCHIVE_FILE, VOLUME_ARCHIVE_FILE,
    },
    time_provider::{snapshot_name, TimeProvider},
};
use self::{error::*, manifest::Manifest};

type StepResult = std::result::Result<String, StepError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done(String),
    Skipped(String),
    Failed(String),
}

impl StepOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Done(_) => "done",
            StepOutcome::Skipped(_) => "skipped",
            StepOutcome::Failed(_) => "failed",
        }
    }
    pub fn detail(&self) -> &str {
        match self {
            StepOutcome::Done(d) | StepOutcome::Skipped(d) | StepOutcome::Failed(d) => d,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepRecord {
    pub step: &'static str,
    pub outcome: StepOutcome,
}

///
/// The snapshot a backup run produced and how each step went
///
#[derive(Debug)]
pub struct SnapshotReport {
    pub snapshot: Snapshot,
    pub steps: Vec<StepRecord>,
}

impl SnapshotReport {
    pub fn outcome(&self, step: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|r| r.step == step).map(|r| &r.outcome)
    }
    pub fn failures(&self) -> usize {
        self.steps.iter().filter(|r| matches!(r.outcome, StepOutcome::Failed(_))).count()
    }
}

///
/// Produces one snapshot. Every step is attempted once and a failing step
/// never stops the ones after it.
///
pub struct BackupService<'a> {
    settings: &'a Settings,
    runtime: &'a dyn ContainerRuntime,
    database: &'a dyn DatabaseClient,
    archiver: &'a dyn Archiver,
    cipher: &'a dyn Cipher,
    prompt: &'a dyn Prompt,
    time_provider: &'a dyn TimeProvider,
}

impl<'a> BackupService<'a> {
    pub fn new(
        settings: &'a Settings,
        runtime: &'a dyn ContainerRuntime,
        database: &'a dyn DatabaseClient,
        archiver: &'a dyn Archiver,
        cipher: &'a dyn Cipher,
        prompt: &'a dyn Prompt,
        time_provider: &'a dyn TimeProvider,
    ) -> Self {
        Self { settings, runtime, database, archiver, cipher, prompt, time_provider }
    }

    pub async fn create_snapshot(&self) -> Result<SnapshotReport> {
        let snapshot = Snapshot::new(self.settings.backups_dir().join(snapshot_name(self.time_provider)));
        std::fs::create_dir_all(self.settings.backups_dir())
            .and_then(|_| std::fs::create_dir(&snapshot.path))
            .map_err(|source| Error::SnapshotDirError { path: snapshot.path.clone(), source })?;
        info!("Creating backup in {}", snapshot.path.display());

        let mut steps = Vec::new();
        steps.push(record("database", self.backup_database(&snapshot).await));
        steps.push(record("uploads", self.backup_uploads(&snapshot)));
        steps.push(record("volume", self.backup_volume(&snapshot).await));
        steps.push(record("config", copy_file(&self.settings.config_path, &snapshot.artifact(CONFIG_FILE_NAME)).await));
        steps.push(record("compose", self.backup_compose_file(&snapshot).await));
        steps.push(record("secrets", self.backup_secrets(&snapshot)));
        steps.push(record("tunnel", self.backup_tunnel_credentials(&snapshot)));

        self.write_manifest(&snapshot, &steps).await;

        let report = SnapshotReport { snapshot, steps };
        match report.failures() {
            0 => info!("Backup {} complete", report.snapshot.name),
            n => warn!("Backup {} finished with {} failed step(s)", report.snapshot.name, n),
        }
        Ok(report)
    }

    async fn backup_database(&self, snapshot: &Snapshot) -> StepResult {
        info!("Backing up database {}", self.settings.db_name);
        if !self.database.is_ready().await? {
            return Err(StepError::DatabaseNotReady);
        }
        let size = self.database.dump(&snapshot.artifact(DB_DUMP_FILE)).await?;
        Ok(format!("dumped {}", format_size(size, BINARY)))
    }

    fn backup_uploads(&self, snapshot: &Snapshot) -> StepResult {
        let upload_dir = &self.settings.upload_dir;
        if !upload_dir.is_dir() {
            return Err(StepError::Skipped(format!("upload directory {} not found", upload_dir.display())));
        }
        info!("Archiving uploads from {}", upload_dir.display());
        let report = self.archiver.archive_to_file(upload_dir, &snapshot.artifact(UPLOADS_ARCHIVE_FILE))?;
        Ok(format!("{} entries archived, {} skipped", report.entries, report.skipped.len()))
    }

    async fn backup_volume(&self, snapshot: &Snapshot) -> StepResult {
        let volume = &self.settings.volume_name;
        if !self.runtime.volume_exists(volume).await? {
            return Err(StepError::Skipped(format!("volume {} not found", volume)));
        }
        info!("Exporting volume {}", volume);
        self.runtime.export_volume(volume, &snapshot.path, VOLUME_ARCHIVE_FILE).await?;
        Ok(format!("exported {}", volume))
    }

    async fn backup_compose_file(&self, snapshot: &Snapshot) -> StepResult {
        let compose_file = &self.settings.compose_file;
        let Some(name) = compose_file.file_name() else {
            return Err(StepError::Skipped(format!("{} is not a file", compose_file.display())));
        };
        copy_file(compose_file, &snapshot.path.join(name)).await
    }

    fn backup_secrets(&self, snapshot: &Snapshot) -> StepResult {
        let secrets_dir = &self.settings.secrets_dir;
        if !secrets_dir.is_dir() {
            return Err(StepError::Skipped(format!("secrets directory {} not found", secrets_dir.display())));
        }
        info!("Encrypting secrets from {}", secrets_dir.display());
        let passphrase = self.prompt.passphrase("Passphrase for the secrets archive", true)?;
        let (plain, report) = self.archiver.archive_to_bytes(secrets_dir)?;
        let sealed = self.cipher.encrypt(&plain, &passphrase)?;
        std::fs::write(snapshot.artifact(SECRETS_ARCHIVE_FILE), &sealed)?;
        Ok(format!("{} entries encrypted", report.entries))
    }

    fn backup_tunnel_credentials(&self, snapshot: &Snapshot) -> StepResult {
        let dir = match &self.settings.tunnel_credentials_dir {
            Some(dir) if dir.is_dir() => dir,
            _ => return Err(StepError::Skipped("no tunnel credentials found".to_string())),
        };
        copy_dir_all(dir, &snapshot.artifact(TUNNEL_COPY_DIR))?;
        Ok(format!("copied {}", dir.display()))
    }

    async fn write_manifest(&self, snapshot: &Snapshot, steps: &[StepRecord]) {
        let manifest = Manifest {
            created: self.time_provider.naive_local_start(),
            hostname: manifest::hostname(),
            storage_root: &self.settings.storage_root,
            snapshot,
            steps,
            entries: manifest::collect_entries(snapshot).await,
            containers: manifest::running_containers(self.runtime).await,
            disk: manifest::disk_usage(&self.settings.storage_root),
        };
        if let Err(e) = tokio::fs::write(snapshot.artifact(MANIFEST_FILE), manifest.render()).await {
            error!("Could not write manifest for {}: {}", snapshot.name, e);
        }
    }
}

async fn copy_file(src: &Path, dest: &Path) -> StepResult {
    if !src.is_file() {
        return Err(StepError::Skipped(format!("{} not found", src.display())));
    }
    let size = tokio::fs::copy(src, dest).await?;
    Ok(format!("copied {}", format_size(size, BINARY)))
}

fn record(step: &'static str, result: StepResult) -> StepRecord {
    let outcome = match result {
        Ok(detail) => {
            info!("{}: {}", step, detail);
            StepOutcome::Done(detail)
        }
        Err(StepError::Skipped(reason)) => {
            warn!("{}: skipped, {}", step, reason);
            StepOutcome::Skipped(reason)
        }
        Err(e) => {
            error!("{}: {}", step, e);
            StepOutcome::Failed(e.to_string())
        }
    };
    StepRecord { step, outcome }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::{
        archive_svc::{MockArchiver, TarGzArchiver},
        cipher_svc::AesGcmCipher,
        container_svc::MockContainerRuntime,
        database_svc::MockDatabaseClient,
        prompt_svc::MockPrompt,
        time_provider::MockTimeProvider,
    };

    struct Fixture {
        root: tempfile::TempDir,
        settings: Settings,
    }

    fn build_fixture() -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let stack = root.path().join("stack");
        std::fs::create_dir_all(&stack).unwrap();
        let storage = root.path().join("ssd");
        std::fs::create_dir_all(&storage).unwrap();

        let lookup = |key: &str| match key {
            "PI_STACK_DIR" => Some(stack.display().to_string()),
            _ => None,
        };
        let settings = Settings::resolve(storage, stack.join(CONFIG_FILE_NAME), lookup).unwrap();
        Fixture { root, settings }
    }

    fn populate_stack(settings: &Settings) {
        std::fs::write(&settings.config_path, br#"{"external_drive":"/mnt/ssd"}"#).unwrap();
        std::fs::write(&settings.compose_file, b"services: {}\n").unwrap();
        std::fs::create_dir_all(&settings.secrets_dir).unwrap();
        std::fs::write(settings.secrets_dir.join("db_password"), b"hunter2").unwrap();
        std::fs::create_dir_all(settings.upload_dir.join("library")).unwrap();
        std::fs::write(settings.upload_dir.join("library/IMG_0001.jpg"), b"jpeg").unwrap();
    }

    fn build_mock_time_provider() -> MockTimeProvider {
        let mut tp = MockTimeProvider::new();
        tp.expect_naive_local_start()
            .returning(|| NaiveDate::from_ymd_opt(2024, 3, 1).unwrap().and_hms_opt(2, 0, 0).unwrap());
        tp
    }

    fn build_mock_runtime(volume_exists: bool) -> MockContainerRuntime {
        let mut runtime = MockContainerRuntime::new();
        runtime.expect_volume_exists().returning(move |_: &str| Ok(volume_exists));
        runtime.expect_export_volume()
            .returning(|_: &str, dir: &Path, name: &str| { std::fs::write(dir.join(name), b"volume").unwrap(); Ok(()) });
        runtime.expect_running_containers()
            .returning(|| Ok(vec!["immich_server\tUp 2 hours".to_string()]));
        runtime
    }

    #[tokio::test]
    async fn test_full_snapshot() {
        let fixture = build_fixture();
        populate_stack(&fixture.settings);

        let runtime = build_mock_runtime(true);
        let mut database = MockDatabaseClient::new();
        database.expect_is_ready().times(1).returning(|| Ok(true));
        database.expect_dump().times(1)
            .returning(|dest: &Path| { std::fs::write(dest, b"gz").unwrap(); Ok(2048) });
        let mut prompt = MockPrompt::new();
        prompt.expect_passphrase().times(1).returning(|_: &str, confirm: bool| { assert!(confirm); Ok("pw".to_string()) });
        let tp = build_mock_time_provider();

        let svc = BackupService::new(&fixture.settings, &runtime, &database, &TarGzArchiver, &AesGcmCipher, &prompt, &tp);
        let report = svc.create_snapshot().await.unwrap();

        let snap = &report.snapshot;
        assert_eq!(snap.name, "20240301_020000");
        assert_eq!(report.failures(), 0);
        for artifact in [DB_DUMP_FILE, UPLOADS_ARCHIVE_FILE, VOLUME_ARCHIVE_FILE, CONFIG_FILE_NAME,
            "docker-compose.yml", SECRETS_ARCHIVE_FILE, MANIFEST_FILE] {
            assert!(snap.has_artifact(artifact), "missing {artifact}");
        }
        assert_eq!(report.outcome("tunnel").map(StepOutcome::label), Some("skipped"));
        assert!(!snap.has_artifact("secrets"));

        let sealed = std::fs::read(snap.artifact(SECRETS_ARCHIVE_FILE)).unwrap();
        assert!(!sealed.windows(7).any(|w| w == b"hunter2"));
        let plain = AesGcmCipher.decrypt(&sealed, "pw").unwrap();
        let out = tempfile::tempdir().unwrap();
        TarGzArchiver.extract_bytes(&plain, out.path()).unwrap();
        assert_eq!(std::fs::read(out.path().join("db_password")).unwrap(), b"hunter2");

        let manifest = std::fs::read_to_string(snap.artifact(MANIFEST_FILE)).unwrap();
        assert!(manifest.contains("immich_server"));
        assert!(manifest.contains(UPLOADS_ARCHIVE_FILE));
        assert!(manifest.contains(&fixture.settings.storage_root.display().to_string()));
    }

    #[tokio::test]
    async fn test_failed_database_does_not_stop_other_steps() {
        let fixture = build_fixture();
        populate_stack(&fixture.settings);

        let runtime = build_mock_runtime(true);
        let mut database = MockDatabaseClient::new();
        database.expect_is_ready().returning(|| Ok(false));
        let mut prompt = MockPrompt::new();
        prompt.expect_passphrase().returning(|_: &str, _: bool| Ok("pw".to_string()));
        let tp = build_mock_time_provider();

        let svc = BackupService::new(&fixture.settings, &runtime, &database, &TarGzArchiver, &AesGcmCipher, &prompt, &tp);
        let report = svc.create_snapshot().await.unwrap();

        assert_eq!(report.failures(), 1);
        assert_eq!(report.outcome("database"),
            Some(&StepOutcome::Failed("database is not accepting connections".to_string())));
        assert!(!report.snapshot.has_artifact(DB_DUMP_FILE));
        assert!(report.snapshot.has_artifact(UPLOADS_ARCHIVE_FILE));
        assert!(report.snapshot.has_artifact(SECRETS_ARCHIVE_FILE));

        let manifest = std::fs::read_to_string(report.snapshot.artifact(MANIFEST_FILE)).unwrap();
        assert!(manifest.contains("failed"));
        assert!(!manifest.contains(DB_DUMP_FILE));
    }

    #[tokio::test]
    async fn test_missing_sources_are_skipped() {
        let fixture = build_fixture();

        let runtime = build_mock_runtime(false);
        let mut database = MockDatabaseClient::new();
        database.expect_is_ready().returning(|| Ok(true));
        database.expect_dump().returning(|dest: &Path| { std::fs::write(dest, b"gz").unwrap(); Ok(2) });
        // No passphrase is requested without a secrets directory
        let prompt = MockPrompt::new();
        let archiver = MockArchiver::new();
        let tp = build_mock_time_provider();

        let svc = BackupService::new(&fixture.settings, &runtime, &database, &archiver, &AesGcmCipher, &prompt, &tp);
        let report = svc.create_snapshot().await.unwrap();

        assert_eq!(report.failures(), 0);
        for step in ["uploads", "volume", "config", "compose", "secrets", "tunnel"] {
            assert_eq!(report.outcome(step).map(StepOutcome::label), Some("skipped"), "{step}");
        }
        assert!(report.snapshot.has_artifact(MANIFEST_FILE));
    }

    #[tokio::test]
    async fn test_tunnel_credentials_are_copied() {
        let mut fixture = build_fixture();
        let creds = fixture.root.path().join("cloudflared");
        std::fs::create_dir_all(&creds).unwrap();
        std::fs::write(creds.join("cert.pem"), b"pem").unwrap();
        fixture.settings.tunnel_credentials_dir = Some(creds);

        let runtime = build_mock_runtime(false);
        let mut database = MockDatabaseClient::new();
        database.expect_is_ready().returning(|| Ok(false));
        let prompt = MockPrompt::new();
        let tp = build_mock_time_provider();

        let svc = BackupService::new(&fixture.settings, &runtime, &database, &TarGzArchiver, &AesGcmCipher, &prompt, &tp);
        let report = svc.create_snapshot().await.unwrap();

        assert_eq!(report.outcome("tunnel").map(StepOutcome::label), Some("done"));
        assert_eq!(std::fs::read(report.snapshot.path.join("cloudflared/cert.pem")).unwrap(), b"pem");
    }

    #[tokio::test]
    async fn test_existing_snapshot_dir_is_fatal() {
        let fixture = build_fixture();
        std::fs::create_dir_all(fixture.settings.backups_dir().join("20240301_020000")).unwrap();

        let runtime = MockContainerRuntime::new();
        let database = MockDatabaseClient::new();
        let prompt = MockPrompt::new();
        let tp = build_mock_time_provider();

        let svc = BackupService::new(&fixture.settings, &runtime, &database, &TarGzArchiver, &AesGcmCipher, &prompt, &tp);
        let err = svc.create_snapshot().await.unwrap_err();
        assert!(matches!(err, Error::SnapshotDirError { path, .. } if path.ends_with("20240301_020000")));
    }
}
