//! # Artefato de Modelo Treinado
//!
//! O [`ModelArtifact`] agrega tudo o que o decodificador precisa para rotular
//! uma sentença:
//!
//! - **Idioma** ao qual o modelo pertence
//! - **Tarefa** (etiquetagem ou lematização); com o idioma, forma a chave do
//!   [`crate::cache::ModelCache`]
//! - **Manifesto**: metadados textuais, incluindo o tamanho do beam
//! - **Gerador de contexto** e **validador de sequência** escolhidos no treino
//! - **Parâmetros de pontuação** ([`ScoringModel`])
//!
//! O artefato é serializado em JSON e, depois de carregado, é imutável e
//! compartilhado (`Arc`) por todas as instâncias daquele idioma.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MorphoError, Result};
use crate::features::{ContextGenerator, Task};
use crate::maxent::MaxEntModel;
use crate::perceptron::{LinearChainModel, PerceptronModel};
use crate::validator::SequenceValidator;

/// Chave do manifesto com o tamanho do beam.
pub const BEAM_SIZE_PARAMETER: &str = "BeamSize";

pub const DEFAULT_BEAM_SIZE: usize = 3;

/// Um evento de treino: o rótulo correto e as features ativas naquela posição.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub outcome: String,
    pub context: Vec<String>,
}

/// Pontua as saídas de um modelo para um contexto.
///
/// `prev` é o rótulo decidido na posição anterior (`None` no início da
/// sentença). Modelos de eventos o ignoram, já que o histórico entra pelas
/// features do contexto.
pub trait Scorer {
    fn outcomes(&self) -> &[String];

    /// Probabilidade de cada saída, na ordem de [`Scorer::outcomes`].
    fn eval(&self, context: &[String], prev: Option<&str>) -> Vec<f64>;
}

/// Parâmetros de pontuação produzidos por cada modo de treino.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoringModel {
    MaxEnt(MaxEntModel),
    Perceptron(PerceptronModel),
    /// Modelo de sequência completa, com pesos de transição entre rótulos.
    LinearChain(LinearChainModel),
}

impl Scorer for ScoringModel {
    fn outcomes(&self) -> &[String] {
        match self {
            ScoringModel::MaxEnt(m) => m.outcomes(),
            ScoringModel::Perceptron(m) => m.outcomes(),
            ScoringModel::LinearChain(m) => m.outcomes(),
        }
    }

    fn eval(&self, context: &[String], prev: Option<&str>) -> Vec<f64> {
        match self {
            ScoringModel::MaxEnt(m) => m.eval(context, prev),
            ScoringModel::Perceptron(m) => m.eval(context, prev),
            ScoringModel::LinearChain(m) => m.eval(context, prev),
        }
    }
}

/// Soma dos pesos das features ativas para cada saída.
///
/// $$ \text{score}_o = \sum_{f \in \text{context}} w_{f, o} $$
pub(crate) fn linear_scores(
    weights: &HashMap<String, Vec<f64>>,
    n_outcomes: usize,
    context: &[String],
    extra: Option<&str>,
) -> Vec<f64> {
    let mut scores = vec![0.0; n_outcomes];
    let active = context.iter().map(String::as_str).chain(extra);
    for feature in active {
        if let Some(w) = weights.get(feature) {
            for (s, w) in scores.iter_mut().zip(w) {
                *s += w;
            }
        }
    }
    scores
}

/// Converte scores em probabilidades (softmax numericamente estável).
pub(crate) fn softmax(scores: &[f64]) -> Vec<f64> {
    if scores.is_empty() {
        return vec![];
    }
    let max_score = scores.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|&s| (s - max_score).exp()).collect();
    let sum: f64 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec![1.0 / scores.len() as f64; scores.len()];
    }
    exps.iter().map(|e| e / sum).collect()
}

/// Modelo treinado pronto para decodificação.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub language: String,
    pub task: Task,
    #[serde(default)]
    pub manifest: BTreeMap<String, String>,
    pub context_generator: ContextGenerator,
    pub validator: SequenceValidator,
    pub model: ScoringModel,
}

impl ModelArtifact {
    /// Lê um artefato JSON de qualquer fonte de bytes.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let artifact: Self = serde_json::from_reader(BufReader::new(reader))?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| MorphoError::ModelNotFound {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file)
    }

    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = BufWriter::new(writer);
        serde_json::to_writer(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| MorphoError::File {
            path: path.to_path_buf(),
            source,
        })?;
        self.save(file)
    }

    pub fn manifest_property(&self, key: &str) -> Option<&str> {
        self.manifest.get(key).map(String::as_str)
    }

    /// Tamanho do beam declarado no manifesto ([`DEFAULT_BEAM_SIZE`] se ausente).
    pub fn beam_size(&self) -> Result<usize> {
        match self.manifest_property(BEAM_SIZE_PARAMETER) {
            None => Ok(DEFAULT_BEAM_SIZE),
            Some(value) => match value.trim().parse::<usize>() {
                Ok(size) if size > 0 => Ok(size),
                _ => Err(MorphoError::config(format!(
                    "invalid {BEAM_SIZE_PARAMETER} '{value}' in model manifest for language '{}'",
                    self.language
                ))),
            },
        }
    }

    /// Todas as saídas possíveis (tags ou classes de transformação).
    pub fn outcomes(&self) -> &[String] {
        self.model.outcomes()
    }

    fn validate(&self) -> Result<()> {
        if self.language.trim().is_empty() {
            return Err(MorphoError::invalid_model("", "model has no language code"));
        }
        if self.outcomes().is_empty() {
            return Err(MorphoError::invalid_model(&self.language, "model has no outcomes"));
        }
        self.check_components()
    }

    /// Garante que o artefato foi treinado para `task` e que seus componentes
    /// são coerentes com ela.
    pub(crate) fn expect_task(&self, task: Task) -> Result<()> {
        if self.task != task {
            return Err(MorphoError::invalid_model(
                &self.language,
                format!(
                    "expected a {} model, found a {} model",
                    task.name(),
                    self.task.name()
                ),
            ));
        }
        self.check_components()
    }

    /// O gerador de contexto e o validador precisam ser os da tarefa.
    fn check_components(&self) -> Result<()> {
        if self.context_generator != ContextGenerator::for_task(self.task) {
            return Err(MorphoError::invalid_model(
                &self.language,
                format!(
                    "{:?} context generator in a {} model",
                    self.context_generator,
                    self.task.name()
                ),
            ));
        }
        let validator_fits = match (&self.validator, self.task) {
            (SequenceValidator::Any, _) => true,
            (SequenceValidator::TagDictionary(_), Task::Pos) => true,
            (SequenceValidator::ClassesByTag(_), Task::Lemma) => true,
            _ => false,
        };
        if !validator_fits {
            return Err(MorphoError::invalid_model(
                &self.language,
                format!("validator does not fit a {} model", self.task.name()),
            ));
        }
        Ok(())
    }
}
