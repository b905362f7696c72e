//! Names of the well-known uniforms and attributes, and the skinning budget.
//!
//! Shaders written for this crate follow a naming convention; [`GlConfig`] makes it explicit and
//! lets applications with different conventions load their own names from JSON.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::vertex::AttributeKind;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Uniform names resolved by the derived shader variants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniformNames {
    pub projection: String,
    pub view: String,
    pub model: String,
    pub texture: String,
    /// Name of the uniform block holding the bone matrices.
    pub bones: String,
}

impl Default for UniformNames {
    fn default() -> Self {
        Self {
            projection: "u_projection".to_string(),
            view: "u_view".to_string(),
            model: "u_model".to_string(),
            texture: "u_texture".to_string(),
            bones: "u_bones".to_string(),
        }
    }
}

/// Vertex attribute names, one per [`AttributeKind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeNames {
    pub position: String,
    pub normal: String,
    pub texcoord: String,
    pub color: String,
    pub bone: String,
}

impl AttributeNames {
    pub fn name(&self, kind: AttributeKind) -> &str {
        match kind {
            AttributeKind::Position => &self.position,
            AttributeKind::Normal => &self.normal,
            AttributeKind::Texcoord => &self.texcoord,
            AttributeKind::Color => &self.color,
            AttributeKind::Bone => &self.bone,
        }
    }
}

impl Default for AttributeNames {
    fn default() -> Self {
        Self {
            position: "vertex".to_string(),
            normal: "normal".to_string(),
            texcoord: "texcoord".to_string(),
            color: "color".to_string(),
            bone: "bone".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlConfig {
    pub uniforms: UniformNames,
    pub attributes: AttributeNames,
    /// Number of bone matrices the skinned shader's uniform buffer has room for.
    pub max_bone_count: usize,
}

impl Default for GlConfig {
    fn default() -> Self {
        Self {
            uniforms: UniformNames::default(),
            attributes: AttributeNames::default(),
            max_bone_count: 64,
        }
    }
}

impl GlConfig {
    /// Parses a config from JSON. Missing fields keep their defaults.
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&s)?;
        log::debug!("loaded gl config from {}", path.display());
        Ok(config)
    }
}
