use crate::types::Embedding;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("embedding extraction failed: {0}")]
    Extraction(String),
}

/// Opaque image → embeddings extractor. Returns one embedding per face found.
pub trait EmbeddingOracle {
    type Image: ?Sized;

    fn extract(&self, image: &Self::Image) -> Result<Vec<Embedding>, OracleError>;
}
