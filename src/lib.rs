pub mod app_error;
pub mod archive_svc;
pub mod backup_service;
pub mod catalog;
pub mod cipher_svc;
pub mod config;
pub mod container_svc;
pub mod database_svc;
pub mod file_svc;
pub mod hash_svc;
pub mod lock;
pub mod logging;
pub mod process_svc;
pub mod prompt_svc;
pub mod restore_service;
pub mod retention_service;
pub mod snapshot;
pub mod time_provider;
