//! Read-only function catalog consumed by the planner and the engine.
//!
//! A catalog is either loaded from a JSON file produced by an external
//! extractor or built by the best-effort extractor in [`extract`].

pub mod extract;
pub mod language;

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use language::Language;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("path does not exist: {0}")]
    NotFound(PathBuf),

    #[error("unsupported source file: {0}")]
    Unsupported(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid catalog json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid project config: {0}")]
    Config(#[from] toml::de::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Param {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: String,
    #[serde(default)]
    pub is_pointer: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSignature {
    pub name: String,
    pub return_type: String,
    #[serde(default)]
    pub params: Vec<Param>,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub line: usize,
    #[serde(default = "default_public")]
    pub is_public: bool,
    #[serde(default)]
    pub docstring: Option<String>,
}

fn default_public() -> bool {
    true
}

impl FunctionSignature {
    /// Plain prototype text, e.g. `int parse(const char * buf, int len)`.
    pub fn prototype(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|p| {
                if p.is_pointer && !p.ty.contains('*') {
                    format!("{} * {}", p.ty, p.name)
                } else {
                    format!("{} {}", p.ty, p.name)
                }
            })
            .collect::<Vec<_>>()
            .join(", ");

        format!("{} {}({})", self.return_type, self.name, params)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub project_name: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub functions: Vec<FunctionSignature>,
    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub source_files: Vec<String>,
}

impl Catalog {
    pub fn new(project_name: impl Into<String>, language: Language) -> Self {
        Self {
            project_name: project_name.into(),
            language,
            functions: Vec::new(),
            includes: Vec::new(),
            source_files: Vec::new(),
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.function(name).is_some()
    }

    /// Public function names in catalog order.
    pub fn public_names(&self) -> Vec<&str> {
        self.functions
            .iter()
            .filter(|f| f.is_public)
            .map(|f| f.name.as_str())
            .collect()
    }
}
