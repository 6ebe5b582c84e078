//! Error taxonomy for tile decoding and loading

use std::path::PathBuf;

use crate::map::tile::TileId;

/// Result alias used throughout the tile pipeline
pub type TileResult<T> = Result<T, TileError>;

#[derive(Debug, thiserror::Error)]
pub enum TileError {
    /// Backing file does not exist. The cache treats this as an empty tile.
    #[error("tile file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("corrupt tile file {}: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The slot stopped wanting this tile before the load finished
    #[error("load of tile {tile:?} was superseded")]
    Stale { tile: TileId },
}

impl TileError {
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound { path }
        } else {
            Self::Io { path, source }
        }
    }

    /// Whether the error just means "nothing stored here"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
