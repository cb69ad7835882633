use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViewerError {
    #[error("incorrect mask dimensions: mask {mask:?} does not match volume {volume:?}")]
    MaskShapeMismatch { mask: Vec<usize>, volume: Vec<usize> },

    #[error("mask {path} was given without an image volume")]
    MaskWithoutVolume { path: String },

    #[error("volume {path} has an empty axis: shape {shape:?}")]
    EmptyVolume { path: String, shape: Vec<usize> },

    #[error("unsupported volume dimensionality {shape:?}, expected 3D")]
    UnsupportedDimensionality { shape: Vec<usize> },
}
