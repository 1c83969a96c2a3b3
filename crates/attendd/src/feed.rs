//! Frame feed and capture decoding.
//!
//! The detector/embedder runs out of process and writes one line of JSON
//! per frame: an array holding one embedding (array of numbers) per face.
//! An empty line is a frame with no faces. Enrollment captures use the
//! same encoding.

use attend_core::{Embedding, EmbeddingOracle, OracleError};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("failed to open feed {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("feed read failed: {0}")]
    Read(#[from] std::io::Error),
}

/// Decode one frame's faces.
pub fn parse_faces(line: &str) -> Result<Vec<Embedding>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(line)
}

pub type BoxedReader = Box<dyn AsyncBufRead + Unpin + Send>;

/// Newline-delimited frames from any async reader.
pub struct JsonLinesFeed<R> {
    reader: R,
    buf: Vec<u8>,
    line_no: u64,
}

impl JsonLinesFeed<BoxedReader> {
    /// Open a feed by path, or stdin for `-`.
    pub async fn open(source: &str) -> Result<Self, FeedError> {
        let reader: BoxedReader = if source == "-" {
            Box::new(BufReader::new(tokio::io::stdin()))
        } else {
            let file = tokio::fs::File::open(source)
                .await
                .map_err(|source_err| FeedError::Open {
                    path: source.to_string(),
                    source: source_err,
                })?;
            Box::new(BufReader::new(file))
        };
        tracing::info!(source, "frame feed opened");
        Ok(Self::new(reader))
    }
}

impl<R: AsyncBufRead + Unpin> JsonLinesFeed<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_no: 0,
        }
    }

    /// Next frame's faces, or `None` at end of feed.
    ///
    /// A malformed line, including one that is not UTF-8, is logged and
    /// yields an empty frame; it does not stop the feed.
    pub async fn next_frame(&mut self) -> Result<Option<Vec<Embedding>>, FeedError> {
        self.buf.clear();
        if self.reader.read_until(b'\n', &mut self.buf).await? == 0 {
            return Ok(None);
        }
        self.line_no += 1;

        let mut bytes = self.buf.as_slice();
        if let Some(rest) = bytes.strip_suffix(b"\n") {
            bytes = rest;
        }
        if let Some(rest) = bytes.strip_suffix(b"\r") {
            bytes = rest;
        }
        let line = match std::str::from_utf8(bytes) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(line = self.line_no, error = %e, "feed line is not UTF-8; treating as empty frame");
                return Ok(Some(Vec::new()));
            }
        };

        match parse_faces(line) {
            Ok(faces) => Ok(Some(faces)),
            Err(e) => {
                tracing::warn!(line = self.line_no, error = %e, "malformed feed line; treating as empty frame");
                Ok(Some(Vec::new()))
            }
        }
    }
}

/// Oracle over a capture already reduced to embeddings by the external
/// detector. The "image" is the capture's JSON text.
#[derive(Debug, Default, Clone, Copy)]
pub struct CaptureOracle;

impl EmbeddingOracle for CaptureOracle {
    type Image = str;

    fn extract(&self, image: &str) -> Result<Vec<Embedding>, OracleError> {
        parse_faces(image).map_err(|e| OracleError::Extraction(format!("bad capture: {e}")))
    }
}
