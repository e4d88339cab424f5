use std::path::Path;

use async_trait::async_trait;

#[cfg(test)]
use mockall::automock;

use crate::{container_svc::ComposeProject, process_svc::{self, error::Result}};

const DOCKER: &str = "docker";

///
/// Database operations, executed inside the database service's container
///
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DatabaseClient : Send + Sync {
    ///
    /// Readiness probe: whether the server is accepting connections
    ///
    async fn is_ready(&self) -> Result<bool>;
    ///
    /// Writes a gzipped full logical dump to `dest`, returning the uncompressed size
    ///
    async fn dump(&self, dest: &Path) -> Result<u64>;
    ///
    /// Drops the target database and creates it again, empty
    ///
    async fn recreate(&self) -> Result<()>;
    ///
    /// Replays a gzipped dump into the target database
    ///
    async fn replay(&self, src: &Path) -> Result<()>;
}

pub struct PostgresClient {
    project: ComposeProject,
    service: String,
    db_name: String,
    db_user: String,
}

impl PostgresClient {
    pub fn new(project: ComposeProject, service: String, db_name: String, db_user: String) -> Self {
        Self { project, service, db_name, db_user }
    }

    fn exec_args(&self, cmd: &[&str]) -> Vec<String> {
        let mut sub = vec!["exec", "-T", self.service.as_str()];
        sub.extend_from_slice(cmd);
        self.project.args(&sub)
    }

    fn psql_args(&self, database: &str, sql: Option<&str>) -> Vec<String> {
        let mut cmd = vec!["psql", "-v", "ON_ERROR_STOP=1", "-U", self.db_user.as_str(), "-d", database];
        if let Some(sql) = sql {
            cmd.extend_from_slice(&["-c", sql]);
        }
        self.exec_args(&cmd)
    }
}

#[async_trait]
impl DatabaseClient for PostgresClient {
    async fn is_ready(&self) -> Result<bool> {
        process_svc::succeeds(DOCKER, &self.exec_args(&["pg_isready", "-U", self.db_user.as_str()])).await
    }
    async fn dump(&self, dest: &Path) -> Result<u64> {
        let args = self.exec_args(&["pg_dump", "-U", self.db_user.as_str(), "-d", self.db_name.as_str()]);
        process_svc::stream_to_gzip(DOCKER, &args, dest).await
    }
    async fn recreate(&self) -> Result<()> {
        let drop = format!("DROP DATABASE IF EXISTS \"{}\" WITH (FORCE);", self.db_name);
        let create = format!("CREATE DATABASE \"{}\";", self.db_name);
        process_svc::run(DOCKER, &self.psql_args("postgres", Some(&drop))).await?;
        process_svc::run(DOCKER, &self.psql_args("postgres", Some(&create))).await?;
        Ok(())
    }
    async fn replay(&self, src: &Path) -> Result<()> {
        process_svc::feed_from_gzip(DOCKER, &self.psql_args(&self.db_name, None), src).await
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn build_client() -> PostgresClient {
        PostgresClient::new(
            ComposeProject::new(PathBuf::from("/opt/pi-stack/docker-compose.yml")),
            "database".to_string(), "immich".to_string(), "postgres".to_string(),
        )
    }

    #[test]
    fn test_exec_targets_database_service() {
        let args = build_client().exec_args(&["pg_isready", "-U", "postgres"]);
        assert_eq!(&args[3..], ["exec", "-T", "database", "pg_isready", "-U", "postgres"]);
    }

    #[test]
    fn test_psql_stops_on_error() {
        let args = build_client().psql_args("immich", None);
        assert!(args.windows(2).any(|w| w == ["-v", "ON_ERROR_STOP=1"]));
        assert_eq!(args.last().unwrap(), "immich");
    }
}
