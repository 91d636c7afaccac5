use std::io;
use std::path::PathBuf;

use image::ImageError;


/// The uploaded bytes could not be turned into a raster surface.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {

    #[error("no image data")]
    Empty,

    #[error("not a decodable image: {0}")]
    Image(#[from] ImageError),

    #[error("decoder stopped before producing a result")]
    Interrupted,
}

/// The fixed overlay could not be loaded; nothing can be composited without it.
#[derive(Debug, thiserror::Error)]
pub enum AssetLoadError {

    #[error("overlay asset not found at {}", .0.display())]
    Missing(PathBuf),

    #[error("overlay asset {} unreadable: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: io::Error,
    },

    #[error("overlay asset {} undecodable: {source}", .path.display())]
    Decode {
        path: PathBuf,
        source: DecodeError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {

    #[error("no composite has been rendered yet")]
    NothingToExport,

    #[error("png encoding failed: {0}")]
    Encoding(#[from] ImageError),

    #[error("cannot write export: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("opacity must be an integer in [0, 100], got {0:?}")]
pub struct InvalidOpacity(pub String);

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    AssetLoad(#[from] AssetLoadError),

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Opacity(#[from] InvalidOpacity),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type ComposeResult<T> = Result<T, ComposeError>;
