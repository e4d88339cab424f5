pub mod error;

use std::{
    fs::File,
    io::{BufReader, BufWriter, ErrorKind, Read, Write},
    path::Path,
    process::{Output, Stdio},
};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    process::{Child, ChildStderr, Command},
    task::JoinHandle,
};
use tokio_util::bytes::BytesMut;
use tracing::debug;

use self::error::*;

fn command(program: &str, args: &[String]) -> Command {
    debug!("Running {} {}", program, args.join(" "));
    let mut cmd = Command::new(program);
    cmd.args(args).kill_on_drop(true);
    cmd
}

fn spawn_error(program: &str) -> impl FnOnce(std::io::Error) -> Error + '_ {
    move |source| Error::SpawnError { program: program.to_string(), source }
}

fn check(program: &str, output: Output) -> Result<Output> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(Error::CommandFailed {
            program: program.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

///
/// Runs the program to completion and returns its stdout. A non-zero exit is an error.
///
pub async fn run(program: &str, args: &[String]) -> Result<String> {
    let output = command(program, args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(spawn_error(program))?;
    let output = check(program, output)?;
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

///
/// Runs the program and reports whether it exited successfully. Output is discarded.
///
pub async fn succeeds(program: &str, args: &[String]) -> Result<bool> {
    let status = command(program, args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map_err(spawn_error(program))?;
    Ok(status.success())
}

///
/// Streams the program's stdout through gzip at maximum compression into
/// `dest`. Returns the number of uncompressed bytes. A partial file is
/// removed when the program fails.
///
pub async fn stream_to_gzip(program: &str, args: &[String], dest: &Path) -> Result<u64> {
    let result = stream_to_gzip_inner(program, args, dest).await;
    if result.is_err() && dest.exists() {
        std::fs::remove_file(dest)?;
    }
    result
}

async fn stream_to_gzip_inner(program: &str, args: &[String], dest: &Path) -> Result<u64> {
    let mut child = command(program, args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error(program))?;
    let stderr = drain(child.stderr.take());

    let to_file = BufWriter::new(File::create(dest)?);
    let mut gz = GzEncoder::new(to_file, Compression::best());

    let mut total = 0u64;
    if let Some(mut stdout) = child.stdout.take() {
        let mut bytes = BytesMut::with_capacity(64 * 1024);
        while stdout.read_buf(&mut bytes).await? > 0 {
            gz.write_all(&bytes[..])?;
            total += bytes.len() as u64;
            bytes.clear();
        }
    }

    finish(program, child, stderr).await?;
    gz.finish()?.flush()?;
    Ok(total)
}

///
/// Feeds the gunzipped contents of `src` into the program's stdin. When the
/// program stops reading early its exit status and stderr are reported.
///
pub async fn feed_from_gzip(program: &str, args: &[String], src: &Path) -> Result<()> {
    let mut child = command(program, args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_error(program))?;
    let stderr = drain(child.stderr.take());

    let mut gz = GzDecoder::new(BufReader::new(File::open(src)?));
    if let Some(mut stdin) = child.stdin.take() {
        let mut bytes = vec![0u8; 64 * 1024];
        let fed = async {
            loop {
                let n = gz.read(&mut bytes)?;
                if n == 0 { break; }
                stdin.write_all(&bytes[..n]).await?;
            }
            stdin.shutdown().await?;
            Ok::<(), std::io::Error>(())
        }.await;

        match fed {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::BrokenPipe => debug!("{} closed its input early", program),
            Err(e) => return Err(e.into()),
        }
    }

    finish(program, child, stderr).await
}

///
/// Reads stderr to the end on its own task while stdout or stdin is pumped
///
fn drain(stderr: Option<ChildStderr>) -> JoinHandle<Vec<u8>> {
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut stderr) = stderr {
            if let Err(e) = stderr.read_to_end(&mut buf).await {
                debug!("Could not read subprocess stderr: {}", e);
            }
        }
        buf
    })
}

async fn finish(program: &str, mut child: Child, stderr: JoinHandle<Vec<u8>>) -> Result<()> {
    let status = child.wait().await?;
    let stderr = stderr.await.unwrap_or_default();
    check(program, Output { status, stdout: Vec::new(), stderr })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        assert_eq!(run("sh", &sh("echo hello")).await.unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn test_run_reports_failure() {
        let err = run("sh", &sh("echo nope >&2; exit 3")).await.unwrap_err();
        match err {
            Error::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "nope");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = succeeds("definitely-not-a-real-binary", &[]).await.unwrap_err();
        assert!(matches!(err, Error::SpawnError { .. }));
    }

    #[tokio::test]
    async fn test_gzip_stream_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.sql.gz");

        let written = stream_to_gzip("sh", &sh("printf 'CREATE TABLE t;\\n'"), &dump).await.unwrap();
        assert_eq!(written, 16);

        let out = dir.path().join("replayed.sql");
        let script = format!("cat > '{}'", out.display());
        feed_from_gzip("sh", &sh(&script), &dump).await.unwrap();
        assert_eq!(std::fs::read_to_string(out).unwrap(), "CREATE TABLE t;\n");
    }

    #[tokio::test]
    async fn test_failed_stream_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.sql.gz");

        assert!(stream_to_gzip("sh", &sh("echo partial; exit 1"), &dump).await.is_err());
        assert!(!dump.exists());
    }

    #[tokio::test]
    async fn test_stream_survives_noisy_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.sql.gz");
        let script = "head -c 1048576 /dev/zero | tr '\\0' 'N' >&2; printf 'SELECT 1;\\n'";

        let written = tokio::time::timeout(Duration::from_secs(30), stream_to_gzip("sh", &sh(script), &dump))
            .await
            .expect("dump stalled on a full stderr pipe")
            .unwrap();
        assert_eq!(written, 10);
    }

    #[tokio::test]
    async fn test_feed_survives_noisy_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.sql.gz");
        stream_to_gzip("sh", &sh("head -c 1048576 /dev/zero"), &dump).await.unwrap();

        let script = "head -c 1048576 /dev/zero | tr '\\0' 'N' >&2; cat > /dev/null";
        tokio::time::timeout(Duration::from_secs(30), feed_from_gzip("sh", &sh(script), &dump))
            .await
            .expect("replay stalled on a full stderr pipe")
            .unwrap();
    }

    #[tokio::test]
    async fn test_feed_reports_early_exit() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.sql.gz");
        stream_to_gzip("sh", &sh("head -c 4194304 /dev/zero"), &dump).await.unwrap();

        let err = feed_from_gzip("sh", &sh("echo 'ERROR: syntax error' >&2; exit 3"), &dump).await.unwrap_err();
        match err {
            Error::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "ERROR: syntax error");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
