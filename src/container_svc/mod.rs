use std::path::{Path, PathBuf};

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::process_svc::{self, error::Result};

const DOCKER: &str = "docker";

///
/// The compose project all managed services belong to
///
#[derive(Debug, Clone)]
pub struct ComposeProject {
    compose_file: PathBuf,
}

impl ComposeProject {
    pub fn new(compose_file: PathBuf) -> Self {
        Self { compose_file }
    }

    ///
    /// `docker` arguments for a compose subcommand against this project
    ///
    pub fn args(&self, sub: &[&str]) -> Vec<String> {
        let mut args = vec!["compose".to_string(), "-f".to_string(), self.compose_file.display().to_string()];
        args.extend(sub.iter().map(|s| s.to_string()));
        args
    }
}

///
/// Container runtime operations the coordinator depends on
///
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ContainerRuntime : Send + Sync {
    ///
    /// Stops every service of the compose project
    ///
    async fn stop_all(&self) -> Result<()>;
    ///
    /// Starts one service (and nothing it does not depend on)
    ///
    async fn start_service(&self, service: &str) -> Result<()>;
    ///
    /// Brings the full stack up
    ///
    async fn start_all(&self) -> Result<()>;
    ///
    /// Name and status line of each running container
    ///
    async fn running_containers(&self) -> Result<Vec<String>>;
    async fn volume_exists(&self, volume: &str) -> Result<bool>;
    ///
    /// Writes a gzipped tar of the volume's contents to `dest_dir/archive_name`
    /// from a throwaway container with the volume mounted read-only
    ///
    async fn export_volume(&self, volume: &str, dest_dir: &Path, archive_name: &str) -> Result<()>;
    ///
    /// Clears the volume and extracts `src_dir/archive_name` into it
    ///
    async fn import_volume(&self, volume: &str, src_dir: &Path, archive_name: &str) -> Result<()>;
}

pub struct DockerCompose {
    project: ComposeProject,
    helper_image: String,
}

impl DockerCompose {
    pub fn new(project: ComposeProject, helper_image: String) -> Self {
        Self { project, helper_image }
    }

    fn helper_args(&self, mounts: [String; 2], script: String) -> Vec<String> {
        let [volume_mount, backup_mount] = mounts;
        vec![
            "run".to_string(), "--rm".to_string(),
            "-v".to_string(), volume_mount,
            "-v".to_string(), backup_mount,
            self.helper_image.clone(),
            "sh".to_string(), "-c".to_string(), script,
        ]
    }

    pub fn export_args(&self, volume: &str, dest_dir: &Path, archive_name: &str) -> Vec<String> {
        self.helper_args(
            [format!("{volume}:/volume:ro"), format!("{}:/backup", dest_dir.display())],
            format!("tar czf '/backup/{archive_name}' -C /volume ."),
        )
    }

    pub fn import_args(&self, volume: &str, src_dir: &Path, archive_name: &str) -> Vec<String> {
        self.helper_args(
            [format!("{volume}:/volume"), format!("{}:/backup:ro", src_dir.display())],
            format!("find /volume -mindepth 1 -delete && tar xzf '/backup/{archive_name}' -C /volume"),
        )
    }
}

#[async_trait]
impl ContainerRuntime for DockerCompose {
    async fn stop_all(&self) -> Result<()> {
        process_svc::run(DOCKER, &self.project.args(&["stop"])).await?;
        Ok(())
    }
    async fn start_service(&self, service: &str) -> Result<()> {
        process_svc::run(DOCKER, &self.project.args(&["up", "-d", "--no-deps", service])).await?;
        Ok(())
    }
    async fn start_all(&self) -> Result<()> {
        process_svc::run(DOCKER, &self.project.args(&["up", "-d"])).await?;
        Ok(())
    }
    async fn running_containers(&self) -> Result<Vec<String>> {
        let args = ["ps", "--format", "{{.Names}}\t{{.Status}}"].map(String::from);
        let out = process_svc::run(DOCKER, &args).await?;
        Ok(out.lines().filter(|l| !l.trim().is_empty()).map(str::to_string).collect())
    }
    async fn volume_exists(&self, volume: &str) -> Result<bool> {
        process_svc::succeeds(DOCKER, &["volume".to_string(), "inspect".to_string(), volume.to_string()]).await
    }
    async fn export_volume(&self, volume: &str, dest_dir: &Path, archive_name: &str) -> Result<()> {
        process_svc::run(DOCKER, &self.export_args(volume, dest_dir, archive_name)).await?;
        Ok(())
    }
    async fn import_volume(&self, volume: &str, src_dir: &Path, archive_name: &str) -> Result<()> {
        process_svc::run(DOCKER, &self.import_args(volume, src_dir, archive_name)).await?;
        Ok(())
    }
}
