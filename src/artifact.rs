//! On-disk artifacts: the fitted pipeline and the location encoder.
//!
//! Each file is a bincode header (magic + format version) followed by the
//! bincode payload. The model file also records the encoder's class list so
//! a model is never paired with an encoder it was not trained against.

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::default_artifact_dir;
use crate::encoder::LocationEncoder;
use crate::model::PricePipeline;

pub const MODEL_FILE: &str = "house_model.bin";
pub const ENCODER_FILE: &str = "location_encoder.bin";
pub const TRAIN_CONFIG_FILE: &str = "train_config.json";

pub const FORMAT_VERSION: u32 = 1;
const MODEL_MAGIC: [u8; 8] = *b"PFMODEL\0";
const ENCODER_MAGIC: [u8; 8] = *b"PFLOCENC";

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("artifact not found: {}", path.display())]
    Missing { path: PathBuf },
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("artifact {} is corrupt: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },
    #[error("{} is not a compatible {expected} artifact (found format version {found})", path.display())]
    Incompatible {
        path: PathBuf,
        expected: &'static str,
        found: u32,
    },
    #[error("model and location encoder were not trained together; retrain to regenerate both")]
    Mismatched,
}

/// Locations of the artifacts inside one directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    dir: PathBuf,
}

impl ArtifactPaths {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn model(&self) -> PathBuf {
        self.dir.join(MODEL_FILE)
    }

    pub fn encoder(&self) -> PathBuf {
        self.dir.join(ENCODER_FILE)
    }

    pub fn train_config(&self) -> PathBuf {
        self.dir.join(TRAIN_CONFIG_FILE)
    }
}

impl Default for ArtifactPaths {
    /// `<crate dir>/model`, independent of the working directory
    fn default() -> Self {
        Self::new(default_artifact_dir())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    magic: [u8; 8],
    version: u32,
}

#[derive(Serialize)]
struct ModelPayloadRef<'a> {
    pipeline: &'a PricePipeline,
    locations: &'a [String],
}

#[derive(Deserialize)]
struct ModelPayload {
    pipeline: PricePipeline,
    locations: Vec<String>,
}

fn write_artifact<T: Serialize>(path: &Path, magic: [u8; 8], payload: &T) -> Result<(), ArtifactError> {
    let io_err = |source| ArtifactError::Io {
        path: path.to_path_buf(),
        source,
    };
    let corrupt = |e: bincode::Error| ArtifactError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    let header = Header {
        magic,
        version: FORMAT_VERSION,
    };
    bincode::serialize_into(&mut writer, &header).map_err(corrupt)?;
    bincode::serialize_into(&mut writer, payload).map_err(corrupt)?;
    writer.flush().map_err(io_err)?;
    Ok(())
}

fn read_artifact<T: for<'de> Deserialize<'de>>(
    path: &Path,
    magic: [u8; 8],
    expected: &'static str,
) -> Result<T, ArtifactError> {
    let file = File::open(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => ArtifactError::Missing {
            path: path.to_path_buf(),
        },
        _ => ArtifactError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;
    let mut reader = BufReader::new(file);
    let corrupt = |e: bincode::Error| ArtifactError::Corrupt {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let header: Header = bincode::deserialize_from(&mut reader).map_err(corrupt)?;
    if header.magic != magic || header.version != FORMAT_VERSION {
        return Err(ArtifactError::Incompatible {
            path: path.to_path_buf(),
            expected,
            found: header.version,
        });
    }
    bincode::deserialize_from(&mut reader).map_err(corrupt)
}

/// Write both artifacts, creating the directory if needed
pub fn save_artifacts(
    paths: &ArtifactPaths,
    pipeline: &PricePipeline,
    encoder: &LocationEncoder,
) -> Result<(), ArtifactError> {
    fs::create_dir_all(paths.dir()).map_err(|source| ArtifactError::Io {
        path: paths.dir().to_path_buf(),
        source,
    })?;

    let payload = ModelPayloadRef {
        pipeline,
        locations: encoder.classes(),
    };
    write_artifact(&paths.model(), MODEL_MAGIC, &payload)?;
    write_artifact(&paths.encoder(), ENCODER_MAGIC, encoder)?;

    tracing::info!(dir = %paths.dir().display(), "artifacts saved");
    Ok(())
}

/// Read both artifacts and check they belong together
pub fn load_artifacts(paths: &ArtifactPaths) -> Result<(PricePipeline, LocationEncoder), ArtifactError> {
    let model: ModelPayload = read_artifact(&paths.model(), MODEL_MAGIC, "model")?;
    let encoder: LocationEncoder = read_artifact(&paths.encoder(), ENCODER_MAGIC, "location encoder")?;

    if model.locations.as_slice() != encoder.classes() {
        return Err(ArtifactError::Mismatched);
    }

    tracing::debug!(
        dir = %paths.dir().display(),
        locations = encoder.len(),
        "artifacts loaded"
    );
    Ok((model.pipeline, encoder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::model::ModelKind;
    use crate::target::TargetTransform;
    use ndarray::{Array1, Array2};
    use tempfile::tempdir;

    fn fitted() -> (PricePipeline, LocationEncoder) {
        let locations = ["Pune", "Mumbai", "Chennai", "Pune", "Mumbai", "Chennai", "Pune", "Mumbai"];
        let (encoder, codes) = LocationEncoder::fit_transform(&locations).unwrap();
        let x = Array2::from_shape_fn((8, 4), |(i, j)| match j {
            0 => 700.0 + 130.0 * i as f64 + 11.0 * (i % 2) as f64,
            1 => (1 + (i * i) % 5) as f64,
            2 => (1 + i / 3) as f64,
            _ => codes[i] as f64,
        });
        let y: Array1<f64> = x.column(0).mapv(|a| a * 4000.0) + x.column(3).mapv(|c| c * 250_000.0);
        let config = ModelConfig {
            kind: ModelKind::Linear,
            target: TargetTransform::Identity,
            ..ModelConfig::default()
        };
        (PricePipeline::fit(&x, &y, &config).unwrap(), encoder)
    }

    #[test]
    fn test_round_trip() {
        let dir = tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path().join("nested"));
        let (pipeline, encoder) = fitted();

        save_artifacts(&paths, &pipeline, &encoder).unwrap();
        assert!(paths.model().exists());
        assert!(paths.encoder().exists());

        let (loaded_pipeline, loaded_encoder) = load_artifacts(&paths).unwrap();
        assert_eq!(loaded_pipeline, pipeline);
        assert_eq!(loaded_encoder, encoder);
    }

    #[test]
    fn test_missing_files() {
        let dir = tempdir().unwrap();
        let err = load_artifacts(&ArtifactPaths::new(dir.path())).unwrap_err();
        assert!(matches!(err, ArtifactError::Missing { .. }));
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path());
        let (pipeline, encoder) = fitted();
        save_artifacts(&paths, &pipeline, &encoder).unwrap();

        let bytes = fs::read(paths.model()).unwrap();
        fs::write(paths.model(), &bytes[..bytes.len() / 2]).unwrap();
        assert!(matches!(load_artifacts(&paths), Err(ArtifactError::Corrupt { .. })));
    }

    #[test]
    fn test_swapped_files_are_incompatible() {
        let dir = tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path());
        let (pipeline, encoder) = fitted();
        save_artifacts(&paths, &pipeline, &encoder).unwrap();

        fs::copy(paths.encoder(), paths.model()).unwrap();
        assert!(matches!(
            load_artifacts(&paths),
            Err(ArtifactError::Incompatible { expected: "model", .. })
        ));
    }

    #[test]
    fn test_mismatched_pair() {
        let dir = tempdir().unwrap();
        let paths = ArtifactPaths::new(dir.path());
        let (pipeline, encoder) = fitted();
        save_artifacts(&paths, &pipeline, &encoder).unwrap();

        let other = LocationEncoder::fit(&["Delhi", "Goa"]).unwrap();
        write_artifact(&paths.encoder(), ENCODER_MAGIC, &other).unwrap();
        assert!(matches!(load_artifacts(&paths), Err(ArtifactError::Mismatched)));
    }

    #[test]
    fn test_default_dir_is_absolute() {
        assert!(ArtifactPaths::default().dir().is_absolute());
    }
}
