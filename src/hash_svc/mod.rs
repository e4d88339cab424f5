pub mod error;

use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::io::AsyncReadExt;
use tokio_util::bytes::BytesMut;

use error::*;

///
/// Generates a base64-encoded MD5 checksum of the file at `path`
///
pub async fn hash_file(path: &Path) -> Result<String> {
    // The MD5 hash, generated over time while the file is being
    // asynchronously processed
    let mut md5_ctx = md5::Context::new();

    let file = tokio::fs::File::open(path).await?;
    let mut file_reader = tokio::io::BufReader::new(file);

    let mut bytes = BytesMut::with_capacity(64 * 1024);
    while file_reader.read_buf(&mut bytes).await? > 0 {
        md5_ctx.consume(&bytes[..]);
        bytes.clear();
    }

    Ok(STANDARD.encode(md5_ctx.compute().0))
}
