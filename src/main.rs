use std::{path::{Path, PathBuf}, process::ExitCode};

use clap::{Parser, Subcommand};
use nix::unistd::Uid;
use tracing::{error, info, warn};

use pi_backup::{
    app_error::{AppError, Result},
    archive_svc::TarGzArchiver,
    backup_service::BackupService,
    catalog::{catalog, render_listing},
    cipher_svc::AesGcmCipher,
    config::{stack_dir, Config, Settings, CONFIG_FILE_NAME},
    container_svc::{ComposeProject, DockerCompose},
    database_svc::PostgresClient,
    lock::RunLock,
    logging::init_tracing_subscriber,
    prompt_svc::TerminalPrompt,
    restore_service::{RestoreOutcome, RestoreService},
    retention_service::RetentionService,
    time_provider::CoreTimeProvider,
};

#[derive(Parser)]
#[command(name = "pi_backup", version, about = "Back up, rotate and restore the Pi service stack")]
struct Cli {
    /// Path to the deployment config.json
    #[arg(long, env = "PI_BACKUP_CONFIG")]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Create a snapshot, then rotate old ones (default)
    Backup,
    /// Restore services from a snapshot directory
    Restore {
        snapshot: PathBuf,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// List snapshots, newest first
    List,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing_subscriber();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config
        .unwrap_or_else(|| stack_dir(|key| std::env::var(key).ok()).join(CONFIG_FILE_NAME));
    let storage_root = Config::load(&config_path)?;
    let settings = Settings::from_env(storage_root, config_path)?;

    match cli.command.unwrap_or(Command::Backup) {
        Command::Backup => backup(&settings).await,
        Command::Restore { snapshot, yes } => restore(&settings, &snapshot, yes).await,
        Command::List => {
            list(&settings);
            Ok(())
        }
    }
}

fn require_root() -> Result<()> {
    if Uid::effective().is_root() { Ok(()) } else { Err(AppError::InsufficientPrivilege) }
}

fn stack_clients(settings: &Settings) -> (DockerCompose, PostgresClient) {
    let project = ComposeProject::new(settings.compose_file.clone());
    let runtime = DockerCompose::new(project.clone(), settings.helper_image.clone());
    let database = PostgresClient::new(
        project, settings.db_service.clone(), settings.db_name.clone(), settings.db_user.clone(),
    );
    (runtime, database)
}

async fn backup(settings: &Settings) -> Result<()> {
    require_root()?;
    let backups_dir = settings.backups_dir();
    let _lock = RunLock::acquire(&backups_dir)?;

    let (runtime, database) = stack_clients(settings);
    let prompt = TerminalPrompt::new();
    let time_provider = CoreTimeProvider::new();

    let backup_service = BackupService::new(
        settings, &runtime, &database, &TarGzArchiver, &AesGcmCipher, &prompt, &time_provider,
    );
    let report = backup_service.create_snapshot().await?;

    let rotation = RetentionService::new(settings.retention, &time_provider).rotate(&backups_dir)?;
    info!("Backup saved to {} ({} old backup(s) removed)", report.snapshot.path.display(), rotation.deleted.len());
    Ok(())
}

async fn restore(settings: &Settings, snapshot: &Path, assume_yes: bool) -> Result<()> {
    require_root()?;
    let _lock = RunLock::acquire(&settings.backups_dir())?;

    let (runtime, database) = stack_clients(settings);
    let prompt = TerminalPrompt::new();

    let restore_service = RestoreService::new(settings, &runtime, &database, &TarGzArchiver, &AesGcmCipher, &prompt);
    match restore_service.restore(snapshot, assume_yes).await? {
        RestoreOutcome::Cancelled => info!("Nothing was changed"),
        RestoreOutcome::Restored(steps) => info!("Restored: {}", steps.join(", ")),
    }
    Ok(())
}

fn list(settings: &Settings) {
    let backups_dir = settings.backups_dir();
    let entries = match catalog(&backups_dir) {
        Ok(entries) => entries,
        Err(e) => {
            error!("Could not read {}: {}", backups_dir.display(), e);
            return;
        }
    };

    match render_listing(&entries) {
        None => warn!("No backups found in {}", backups_dir.display()),
        Some(listing) => {
            print!("{}", listing);
            info!("{} backup(s) in {}", entries.len(), backups_dir.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use pi_backup::{config::ConfigError, lock::LockError};

    use super::*;

    fn write_config(dir: &Path) -> PathBuf {
        let config = dir.join(CONFIG_FILE_NAME);
        let doc = serde_json::json!({ "external_drive": dir.join("ssd") });
        std::fs::write(&config, doc.to_string()).unwrap();
        config
    }

    #[test]
    fn test_backup_is_the_default_command() {
        let cli = Cli::try_parse_from(["pi_backup", "--config", "/tmp/config.json"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.json")));
    }

    #[test]
    fn test_restore_arguments() {
        let cli = Cli::try_parse_from(["pi_backup", "restore", "/mnt/ssd/backups/20240301_020000", "--yes"]).unwrap();
        match cli.command {
            Some(Command::Restore { snapshot, yes }) => {
                assert_eq!(snapshot, PathBuf::from("/mnt/ssd/backups/20240301_020000"));
                assert!(yes);
            }
            _ => panic!("expected restore"),
        }
        assert!(Cli::try_parse_from(["pi_backup", "restore"]).is_err());
    }

    #[tokio::test]
    async fn test_missing_config_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli { config: Some(dir.path().join("absent.json")), command: Some(Command::List) };
        let err = run(cli).await.unwrap_err();
        assert!(matches!(err, AppError::Config(ConfigError::ConfigMissing(_))));
    }

    #[tokio::test]
    async fn test_list_on_empty_root_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli { config: Some(write_config(dir.path())), command: Some(Command::List) };
        assert!(run(cli).await.is_ok());
    }

    #[tokio::test]
    async fn test_backup_refused_before_touching_the_stack() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path());
        let _held = RunLock::acquire(&dir.path().join("ssd").join("backups")).unwrap();

        let cli = Cli { config: Some(config), command: None };
        let err = run(cli).await.unwrap_err();
        if Uid::effective().is_root() {
            assert!(matches!(err, AppError::Lock(LockError::Locked(_))));
        } else {
            assert!(matches!(err, AppError::InsufficientPrivilege));
        }
    }
}
