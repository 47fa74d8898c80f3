//! Model blobs and the stores that hold them.
//!
//! A [`ModelBlob`] is the opaque, serialisable form of a Q-network: its
//! layer widths, one spec per weight tensor, and all weight values packed as
//! little-endian `f32` bytes in spec order and base64-encoded.  Where the
//! blob lives is the store's business; the core only promises that
//! export-then-import reproduces the same weights bit for bit.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

pub const DTYPE_F32: &str = "float32";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelTopology {
    /// Input width, hidden widths, output width.
    pub layer_sizes: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightSpec {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: String,
}

impl WeightSpec {
    /// Number of values the shape describes.  Shapes too large to address
    /// are malformed.
    pub fn element_count(&self) -> Result<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| {
                Error::MalformedModel(format!("weight {} has oversized shape {:?}", self.name, self.shape))
            })
    }

    /// Size of the packed `f32` payload for this weight.
    pub fn byte_len(&self) -> Result<usize> {
        self.element_count()?
            .checked_mul(4)
            .ok_or_else(|| Error::MalformedModel(format!("weight {} is too large", self.name)))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelBlob {
    pub topology: ModelTopology,
    /// Absent in blobs written before weight metadata existed; such blobs
    /// cannot be loaded.
    #[serde(default)]
    pub weight_specs: Option<Vec<WeightSpec>>,
    #[serde(default)]
    pub weight_data: String,
}

impl ModelBlob {
    /// Pack named tensors, given as `(name, shape, values)`.
    pub fn pack(layer_sizes: Vec<usize>, tensors: &[(String, Vec<usize>, Vec<f32>)]) -> Self {
        let mut specs = Vec::with_capacity(tensors.len());
        let mut bytes = Vec::new();
        for (name, shape, values) in tensors {
            specs.push(WeightSpec {
                name: name.clone(),
                shape: shape.clone(),
                dtype: DTYPE_F32.to_string(),
            });
            bytes.extend(values.iter().flat_map(|v| v.to_le_bytes()));
        }
        Self {
            topology: ModelTopology { layer_sizes },
            weight_specs: Some(specs),
            weight_data: BASE64_STANDARD.encode(bytes),
        }
    }

    /// Inverse of [`ModelBlob::pack`], checking that the byte payload agrees
    /// with the specs.
    pub fn unpack(&self) -> Result<Vec<(String, Vec<usize>, Vec<f32>)>> {
        let specs = self.weight_specs.as_ref().ok_or(Error::MissingWeightSpecs)?;
        let bytes = BASE64_STANDARD
            .decode(self.weight_data.as_bytes())
            .map_err(|e| Error::MalformedModel(format!("weight data is not base64: {e}")))?;

        let expected = specs.iter().try_fold(0usize, |total, spec| {
            total
                .checked_add(spec.byte_len()?)
                .ok_or_else(|| Error::MalformedModel("weight specs overflow".into()))
        })?;
        if bytes.len() != expected {
            return Err(Error::MalformedModel(format!(
                "weight data holds {} bytes, specs describe {expected}",
                bytes.len()
            )));
        }

        let mut offset = 0;
        let mut tensors = Vec::with_capacity(specs.len());
        for spec in specs {
            if spec.dtype != DTYPE_F32 {
                return Err(Error::MalformedModel(format!(
                    "weight {} has unsupported dtype {}",
                    spec.name, spec.dtype
                )));
            }
            let end = offset + spec.byte_len()?;
            let values = bytes[offset..end]
                .chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
            tensors.push((spec.name.clone(), spec.shape.clone(), values));
            offset = end;
        }
        Ok(tensors)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::MalformedModel(e.to_string()))
    }
}

// ── Stores ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct StoredModel {
    pub name: String,
    pub blob: ModelBlob,
}

/// Backing store for model blobs.  Failures are returned as-is; nothing is
/// retried here.
pub trait ModelStore {
    fn save(&self, name: &str, blob: &ModelBlob) -> Result<()>;

    /// Load `name`, or the most recently saved model when `name` is `None`.
    fn load(&self, name: Option<&str>) -> Result<StoredModel>;
}

pub fn default_model_name() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("dqn-model-{secs}")
}

/// One pretty-printed JSON file per model inside a directory.
#[derive(Clone, Debug)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        let name = name.trim();
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.starts_with('.') {
            return Err(Error::MalformedModel(format!(
                "invalid model name (must be a plain file stem): {name:?}"
            )));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }

    fn newest(&self) -> Result<Option<PathBuf>> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut newest: Option<(SystemTime, PathBuf)> = None;
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let modified = fs::metadata(&path)?.modified()?;
            if newest.as_ref().map_or(true, |(t, _)| modified >= *t) {
                newest = Some((modified, path));
            }
        }
        Ok(newest.map(|(_, path)| path))
    }
}

impl ModelStore for FileStore {
    fn save(&self, name: &str, blob: &ModelBlob) -> Result<()> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.dir)?;
        fs::write(&path, blob.to_json()?)?;
        info!(model = name, path = %path.display(), "model saved");
        Ok(())
    }

    fn load(&self, name: Option<&str>) -> Result<StoredModel> {
        let path = match name {
            Some(name) => {
                let path = self.path_for(name)?;
                if !path.exists() {
                    return Err(Error::ModelNotFound(name.to_string()));
                }
                path
            }
            None => self
                .newest()?
                .ok_or_else(|| Error::ModelNotFound(self.dir.display().to_string()))?,
        };

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string();
        let text = fs::read_to_string(&path)?;
        let blob = ModelBlob::from_json(&text).map_err(|e| {
            warn!(model = %stem, "stored model is unreadable: {e}");
            e
        })?;
        Ok(StoredModel { name: stem, blob })
    }
}
