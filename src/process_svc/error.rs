use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not start `{program}`: {source}")]
    SpawnError { program: String, source: std::io::Error },
    #[error("`{program}` exited with {}: {stderr}", describe_exit(.code))]
    CommandFailed { program: String, code: Option<i32>, stderr: String },
    #[error("I/O error while talking to a subprocess: {0}")]
    IOError(#[from] std::io::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "a signal".to_string(),
    }
}
