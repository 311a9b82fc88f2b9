//! Error types for the simulation core

use glam::IVec2;
use thiserror::Error;

/// Faults raised while stepping the world or applying commands
#[derive(Debug, Error)]
pub enum SimError {
    #[error("unknown material {material} at {position}")]
    UnknownMaterial { material: u16, position: IVec2 },

    #[error("chunk {0} is not loaded")]
    ChunkNotLoaded(IVec2),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("chunk {chunk} update panicked: {message}")]
    ChunkPanicked { chunk: IVec2, message: String },

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Faults raised while reading or writing saved chunk deltas
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode chunk delta: {0}")]
    Encode(String),

    #[error("failed to decode chunk delta: {0}")]
    Decode(String),

    #[error("failed to decompress chunk delta: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),

    #[error("unsupported delta version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },

    #[error("failed to parse world metadata: {0}")]
    MetadataParse(#[from] ron::error::SpannedError),

    #[error("failed to write world metadata: {0}")]
    MetadataWrite(#[from] ron::Error),
}
