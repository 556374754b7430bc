use std::path::PathBuf;
use thiserror::Error;

pub type VatResult<T> = std::result::Result<T, VatError>;

#[derive(Debug, Error)]
pub enum VatError {
    #[error("VAT metadata could not be parsed: {0}")]
    Metadata(#[from] serde_json::Error),
    #[error("VAT metadata field '{field}' is invalid: {reason}")]
    InvalidMetadata { field: &'static str, reason: String },
    #[error("{which} atlas is {actual_width}x{actual_height}, metadata expects {expected_width}x{expected_height}")]
    AtlasSize {
        which: &'static str,
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },
    #[error("failed to decode atlas image '{path}': {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("mesh format '{extension}' is not supported (expected .gltf or .glb)")]
    UnsupportedMesh { extension: String },
    #[error("uniform '{name}' is not declared by shader variant '{variant}'")]
    UnknownUniform { name: String, variant: String },
    #[error("shader variant '{variant}' declares {count} user uniforms, at most {max} are supported")]
    TooManyUniforms { variant: String, count: usize, max: usize },
    #[error("{durations} duration profiles were supplied for {plane_uvs} instance placements")]
    InstanceInputs { durations: usize, plane_uvs: usize },
    #[error("instance count {count} exceeds the supported maximum of {max}")]
    InstanceCount { count: usize, max: usize },
}

impl VatError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        VatError::InvalidMetadata { field, reason: reason.into() }
    }
}
