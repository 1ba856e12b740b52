use bytes::Bytes;
use std::{io, path::Path};
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt, BufReader},
};
use tracing::debug;

use crate::error::LoadError;

/// Reads `[u16 LE length][length bytes]` records until end of input.
///
/// End of input while reading a length field (including a single dangling
/// byte) terminates the clip cleanly. Running out of input inside a frame
/// body is corruption and fails the whole load; the partial sequence is
/// dropped.
pub async fn read_frames<R>(mut reader: R) -> Result<Vec<Bytes>, LoadError>
where
    R: AsyncRead + Unpin,
{
    let mut frames = Vec::new();

    loop {
        let len = match reader.read_u16_le().await {
            Ok(len) => len,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(frames),
            Err(source) => {
                return Err(LoadError::Frame {
                    index: frames.len(),
                    source,
                })
            }
        };

        let mut body = vec![0u8; usize::from(len)];
        reader
            .read_exact(&mut body)
            .await
            .map_err(|source| LoadError::Frame {
                index: frames.len(),
                source,
            })?;

        frames.push(Bytes::from(body));
    }
}

/// Loads every frame of a clip file from disk.
pub async fn load_clip_file(path: &Path) -> Result<Vec<Bytes>, LoadError> {
    let file = File::open(path).await.map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let frames = read_frames(BufReader::new(file)).await?;
    debug!("📦 {} frames read from {}", frames.len(), path.display());

    Ok(frames)
}
