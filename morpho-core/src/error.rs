//! # Erros do Sistema
//!
//! Separa explicitamente os dois canais de falha:
//!
//! - **Fatais** ([`MorphoError`]): configuração inválida, modelo ausente ou
//!   corrompido. Propagados via `Result` para quem construiu o componente.
//! - **Recuperáveis**: linhas de corpus malformadas e scripts de edição
//!   inaplicáveis. Nunca chegam aqui; são registrados via `tracing` e
//!   substituídos por valores sentinela (ex: o lema `_`).

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T, E = MorphoError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum MorphoError {
    /// Parâmetro de configuração inválido (tipo de treinador desconhecido,
    /// beam size não numérico, ...).
    #[error("configuration error: {msg}")]
    Config { msg: String },

    /// Propriedade obrigatória ausente (ex: `language`).
    #[error("missing required property: {0}")]
    MissingProperty(&'static str),

    /// Arquivo de configuração ou de saída inacessível.
    #[error("{}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model file not found: {}", path.display())]
    ModelNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// O artefato foi lido mas não serve para o uso pedido.
    #[error("invalid model for language '{language}': {msg}")]
    InvalidModel { language: String, msg: String },

    #[error("invalid sample: {0}")]
    InvalidSample(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl MorphoError {
    pub(crate) fn config<S>(msg: S) -> Self
    where
        S: Into<String>,
    {
        Self::Config { msg: msg.into() }
    }

    pub(crate) fn invalid_model<L, S>(language: L, msg: S) -> Self
    where
        L: Into<String>,
        S: Into<String>,
    {
        Self::InvalidModel {
            language: language.into(),
            msg: msg.into(),
        }
    }
}
