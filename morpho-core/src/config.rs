//! Configuração dos anotadores (etiquetador e lematizador).
//!
//! ```json
//! { "language": "en", "model": "models/en-lemmatizer.json", "use_model_cache": true }
//! ```

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::cache::ModelSource;
use crate::error::{MorphoError, Result};

/// Lê um arquivo JSON de configuração; os erros citam o caminho.
pub(crate) fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|source| MorphoError::File {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file))
        .map_err(|e| MorphoError::config(format!("{}: {e}", path.display())))
}

fn default_use_model_cache() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotatorConfig {
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub model: Option<PathBuf>,
    #[serde(default = "default_use_model_cache")]
    pub use_model_cache: bool,
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            language: None,
            model: None,
            use_model_cache: true,
        }
    }
}

impl AnnotatorConfig {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: Some(language.into()),
            ..Default::default()
        }
    }

    pub fn with_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.model = Some(path.into());
        self
    }

    pub fn with_model_cache(mut self, use_model_cache: bool) -> Self {
        self.use_model_cache = use_model_cache;
        self
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json_file(path.as_ref())
    }

    /// Código do idioma; obrigatório.
    pub fn language(&self) -> Result<&str> {
        self.language
            .as_deref()
            .filter(|l| !l.trim().is_empty())
            .ok_or(MorphoError::MissingProperty("language"))
    }

    pub fn model_source(&self) -> Option<ModelSource> {
        self.model.clone().map(ModelSource::Path)
    }
}
