// src/recorder/sink_mjpeg.rs
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::recorder::{SegmentEncoder, SegmentSink};
use crate::ring::Frame;

/// Concatenated JPEGs; plays with `ffplay -f mjpeg` and remuxes losslessly.
#[derive(Debug, Default, Clone)]
pub struct MjpegEncoder;

impl SegmentEncoder for MjpegEncoder {
    fn extension(&self) -> &str {
        "mjpeg"
    }

    fn open(&self, path: &Path) -> anyhow::Result<Box<dyn SegmentSink>> {
        let file = File::create(path)?;
        log::debug!("[mjpeg_sink] new file {:?}", path);
        Ok(Box::new(MjpegSink {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            bytes: 0,
        }))
    }
}

struct MjpegSink {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes: u64,
}

impl SegmentSink for MjpegSink {
    fn write_frame(&mut self, frame: &Frame) -> anyhow::Result<()> {
        self.writer.write_all(&frame.data)?;
        self.bytes += frame.data.len() as u64;
        Ok(())
    }

    fn finish(self: Box<Self>) -> anyhow::Result<()> {
        let MjpegSink {
            path,
            writer,
            bytes,
        } = *self;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_data()?;
        log::debug!("[mjpeg_sink] closed {:?} ({} bytes)", path, bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn frames_are_concatenated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seg.mjpeg");

        let mut sink = MjpegEncoder.open(&path).unwrap();
        for (seq, data) in [(1, "ab"), (2, "cd")] {
            sink.write_frame(&Frame {
                seq,
                utc_ns: 0,
                data: Bytes::from(data),
            })
            .unwrap();
        }
        sink.finish().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"abcd");
    }
}
