use bytes::{BufMut, Bytes, BytesMut};
use std::io::{self, Read, Seek, SeekFrom};
use symphonia::core::io::MediaSource;

const MAGIC: &[u8; 4] = b"DCA1";

/// Opus parameters advertised in the stream header. Clip files are
/// expected to hold 20 ms stereo frames at 48 kHz.
#[derive(Debug, Clone, Copy)]
pub struct OpusFormat {
    pub sample_rate: u32,
    pub frame_size: u64,
    pub channels: u8,
    pub bitrate: u32,
}

impl Default for OpusFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            frame_size: 960,
            channels: 2,
            bitrate: 128_000,
        }
    }
}

/// Builds the `DCA1` magic, metadata length and JSON metadata block.
pub fn header(format: &OpusFormat) -> Bytes {
    let metadata = serde_json::json!({
        "dca": {
            "version": 1,
            "tool": {
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "url": null,
                "author": null,
            },
        },
        "opus": {
            "mode": "voip",
            "sample_rate": format.sample_rate,
            "frame_size": format.frame_size,
            "abr": format.bitrate,
            "vbr": true,
            "channels": format.channels,
        },
        "info": null,
        "origin": null,
        "extra": null,
    })
    .to_string();

    let mut out = BytesMut::with_capacity(MAGIC.len() + 4 + metadata.len());
    out.put_slice(MAGIC);
    out.put_i32_le(metadata.len() as i32);
    out.put_slice(metadata.as_bytes());
    out.freeze()
}

/// Longest frame a DCA record can carry; its length prefix is signed.
pub const MAX_FRAME_LEN: usize = i16::MAX as usize;

/// Length-prefixed record as it appears after the header, or `None` if the
/// frame is longer than [`MAX_FRAME_LEN`].
pub fn record(frame: &[u8]) -> Option<Bytes> {
    let len = i16::try_from(frame.len()).ok()?;
    let mut out = BytesMut::with_capacity(2 + frame.len());
    out.put_i16_le(len);
    out.put_slice(frame);
    Some(out.freeze())
}

/// Blocking reader that turns frames arriving on a channel into a DCA
/// byte stream.
///
/// Reads block until the next frame is sent. Once every sender is dropped
/// the stream ends.
pub struct DcaStream {
    frames: flume::Receiver<Bytes>,
    pending: Bytes,
}

impl DcaStream {
    pub fn new(frames: flume::Receiver<Bytes>, format: &OpusFormat) -> Self {
        Self {
            frames,
            pending: header(format),
        }
    }
}

impl Read for DcaStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        if self.pending.is_empty() {
            match self.frames.recv() {
                Ok(frame) => {
                    self.pending = record(&frame).ok_or_else(|| {
                        io::Error::new(
                            io::ErrorKind::InvalidData,
                            format!("frame of {} bytes does not fit a DCA record", frame.len()),
                        )
                    })?;
                }
                Err(flume::RecvError::Disconnected) => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending.split_to(n));
        Ok(n)
    }
}

impl Seek for DcaStream {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "live clip streams cannot seek",
        ))
    }
}

impl MediaSource for DcaStream {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn header_carries_magic_and_metadata() {
        let header = header(&OpusFormat::default());

        assert_eq!(&header[..4], b"DCA1");
        let len = i32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        assert_eq!(header.len(), 8 + len);

        let metadata: serde_json::Value = serde_json::from_slice(&header[8..]).unwrap();
        assert_eq!(metadata["opus"]["sample_rate"], 48_000);
        assert_eq!(metadata["opus"]["channels"], 2);
    }

    #[test]
    fn stream_emits_header_then_records_then_ends() {
        let (tx, rx) = flume::bounded(4);
        tx.send(Bytes::from_static(b"one")).unwrap();
        tx.send(Bytes::from_static(b"two!")).unwrap();
        drop(tx);

        let mut stream = DcaStream::new(rx, &OpusFormat::default());
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();

        let header = header(&OpusFormat::default());
        assert_eq!(&out[..header.len()], &header[..]);

        let body = &out[header.len()..];
        assert_eq!(body, b"\x03\x00one\x04\x00two!");
    }

    #[test]
    fn small_reads_split_records() {
        let (tx, rx) = flume::bounded(1);
        tx.send(Bytes::from_static(b"abcdef")).unwrap();
        drop(tx);

        let mut stream = DcaStream::new(rx, &OpusFormat::default());
        stream.pending = Bytes::new();

        let mut buf = [0u8; 3];
        assert_eq!(stream.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"\x06\x00a");
        assert_eq!(stream.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"bcd");
        assert_eq!(stream.read(&mut buf).unwrap(), 2);
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn oversized_frames_have_no_record() {
        assert_eq!(record(&vec![0u8; MAX_FRAME_LEN]).map(|r| r.len()), Some(MAX_FRAME_LEN + 2));
        assert_eq!(record(&vec![0u8; MAX_FRAME_LEN + 1]), None);

        let (tx, rx) = flume::bounded(1);
        tx.send(Bytes::from(vec![0u8; 40_000])).unwrap();
        let mut stream = DcaStream::new(rx, &OpusFormat::default());
        stream.pending = Bytes::new();

        let err = stream.read(&mut [0u8; 16]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn stream_cannot_seek() {
        let (_tx, rx) = flume::bounded(1);
        let mut stream = DcaStream::new(rx, &OpusFormat::default());

        assert!(!stream.is_seekable());
        assert!(stream.seek(SeekFrom::Start(0)).is_err());
    }
}
