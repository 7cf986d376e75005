//! # Treinamento de Modelos
//!
//! Liga amostras anotadas, parâmetros de treino e a fábrica de componentes a
//! um dos três modos de treino:
//!
//! | Tipo de treinador | Algoritmos | Modelo produzido |
//! |-------------------|------------|------------------|
//! | [`TrainerType::Event`] | `MAXENT`, `PERCEPTRON` | eventos independentes por token |
//! | [`TrainerType::EventSequence`] | `PERCEPTRON_SEQUENCE` | eventos, corrigidos por sentença |
//! | [`TrainerType::Sequence`] | `STRUCTURED_PERCEPTRON` | cadeia linear com transições |
//!
//! Todos os parâmetros são validados **antes** de qualquer treino começar.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::read_json_file;
use crate::corpus::Sample;
use crate::error::{MorphoError, Result};
use crate::features::{ContextGenerator, Task};
use crate::maxent::MaxEntModel;
use crate::model::{
    Event, ModelArtifact, Scorer, ScoringModel, BEAM_SIZE_PARAMETER, DEFAULT_BEAM_SIZE,
};
use crate::perceptron::{LinearChainModel, PerceptronModel};
use crate::validator::SequenceValidator;

pub const ALGORITHM_PARAMETER: &str = "Algorithm";
pub const TRAINER_TYPE_PARAMETER: &str = "TrainerType";
pub const ITERATIONS_PARAMETER: &str = "Iterations";
pub const CUTOFF_PARAMETER: &str = "Cutoff";
pub const LEARNING_RATE_PARAMETER: &str = "LearningRate";
pub const L2_PARAMETER: &str = "L2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    MaxEnt,
    Perceptron,
    PerceptronSequence,
    StructuredPerceptron,
}

impl Algorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::MaxEnt => "MAXENT",
            Algorithm::Perceptron => "PERCEPTRON",
            Algorithm::PerceptronSequence => "PERCEPTRON_SEQUENCE",
            Algorithm::StructuredPerceptron => "STRUCTURED_PERCEPTRON",
        }
    }

    pub fn trainer_type(&self) -> TrainerType {
        match self {
            Algorithm::MaxEnt | Algorithm::Perceptron => TrainerType::Event,
            Algorithm::PerceptronSequence => TrainerType::EventSequence,
            Algorithm::StructuredPerceptron => TrainerType::Sequence,
        }
    }
}

impl FromStr for Algorithm {
    type Err = MorphoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "MAXENT" => Ok(Algorithm::MaxEnt),
            "PERCEPTRON" => Ok(Algorithm::Perceptron),
            "PERCEPTRON_SEQUENCE" => Ok(Algorithm::PerceptronSequence),
            "STRUCTURED_PERCEPTRON" => Ok(Algorithm::StructuredPerceptron),
            other => Err(MorphoError::config(format!("unknown training algorithm '{other}'"))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrainerType {
    Event,
    EventSequence,
    Sequence,
}

impl TrainerType {
    pub fn name(&self) -> &'static str {
        match self {
            TrainerType::Event => "Event",
            TrainerType::EventSequence => "EventModelSequence",
            TrainerType::Sequence => "Sequence",
        }
    }
}

impl FromStr for TrainerType {
    type Err = MorphoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "Event" => Ok(TrainerType::Event),
            "EventModelSequence" => Ok(TrainerType::EventSequence),
            "Sequence" => Ok(TrainerType::Sequence),
            other => Err(MorphoError::config(format!("unknown trainer type '{other}'"))),
        }
    }
}

/// Parâmetros de treino como mapa textual, com acessores tipados.
///
/// ```json
/// { "Algorithm": "PERCEPTRON_SEQUENCE", "Iterations": "50", "BeamSize": "5" }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainingParameters {
    settings: BTreeMap<String, String>,
}

impl TrainingParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        read_json_file(path.as_ref())
    }

    pub fn set(mut self, key: &str, value: impl ToString) -> Self {
        self.settings.insert(key.to_string(), value.to_string());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    pub fn settings(&self) -> &BTreeMap<String, String> {
        &self.settings
    }

    pub fn algorithm(&self) -> Result<Algorithm> {
        self.get(ALGORITHM_PARAMETER)
            .map_or(Ok(Algorithm::MaxEnt), str::parse)
    }

    /// Tipo de treinador: derivado do algoritmo ou declarado explicitamente,
    /// caso em que precisa ser compatível com ele.
    pub fn trainer_type(&self) -> Result<TrainerType> {
        let algorithm = self.algorithm()?;
        match self.get(TRAINER_TYPE_PARAMETER) {
            None => Ok(algorithm.trainer_type()),
            Some(value) => {
                let declared: TrainerType = value.parse()?;
                if declared != algorithm.trainer_type() {
                    return Err(MorphoError::config(format!(
                        "trainer type '{}' does not support algorithm '{algorithm}'",
                        declared.name()
                    )));
                }
                Ok(declared)
            }
        }
    }

    pub fn iterations(&self) -> Result<usize> {
        self.number(ITERATIONS_PARAMETER, 100)
    }

    pub fn cutoff(&self) -> Result<usize> {
        self.number(CUTOFF_PARAMETER, 5)
    }

    pub fn beam_size(&self) -> Result<usize> {
        let size = self.number(BEAM_SIZE_PARAMETER, DEFAULT_BEAM_SIZE)?;
        if size == 0 {
            return Err(MorphoError::config(format!("{BEAM_SIZE_PARAMETER} must be positive")));
        }
        Ok(size)
    }

    pub fn learning_rate(&self) -> Result<f64> {
        self.number(LEARNING_RATE_PARAMETER, 0.1)
    }

    pub fn l2(&self) -> Result<f64> {
        self.number(L2_PARAMETER, 0.0)
    }

    fn number<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.trim().parse().map_err(|_| {
                MorphoError::config(format!("parameter {key} has invalid value '{value}'"))
            }),
        }
    }
}

/// Validador escolhido na hora do treino.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidatorChoice {
    #[default]
    Any,
    /// Dicionário construído a partir das próprias amostras de treino.
    Dictionary,
}

/// Componentes gravados no artefato junto com os pesos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelFactory {
    pub task: Task,
    pub context_generator: ContextGenerator,
    pub validator: ValidatorChoice,
}

impl ModelFactory {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            context_generator: ContextGenerator::for_task(task),
            validator: ValidatorChoice::Any,
        }
    }

    pub fn with_validator(mut self, validator: ValidatorChoice) -> Self {
        self.validator = validator;
        self
    }

    fn validator(&self, samples: &[Sample]) -> SequenceValidator {
        match self.validator {
            ValidatorChoice::Any => SequenceValidator::Any,
            ValidatorChoice::Dictionary => SequenceValidator::from_samples(self.task, samples),
        }
    }
}

/// Eventos de treino: um por token, com o histórico correto como contexto.
pub fn events(samples: &[Sample], factory: &ModelFactory) -> Vec<Event> {
    let task = factory.task;
    let generator = factory.context_generator;
    samples
        .par_iter()
        .flat_map_iter(|sample| {
            let labels = sample.labels(task);
            (0..sample.len()).map(move |i| Event {
                outcome: labels[i].clone(),
                context: generator.context(i, sample.tokens(), &labels[..i], sample.aux(task)),
            })
        })
        .collect()
}

/// Remove features vistas menos de `cutoff` vezes.
fn apply_cutoff(mut events: Vec<Event>, cutoff: usize) -> Vec<Event> {
    if cutoff <= 1 {
        return events;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for event in &events {
        for feature in &event.context {
            *counts.entry(feature.as_str()).or_insert(0) += 1;
        }
    }
    let kept: HashSet<String> = counts
        .into_iter()
        .filter(|(_, count)| *count >= cutoff)
        .map(|(feature, _)| feature.to_string())
        .collect();
    for event in &mut events {
        event.context.retain(|f| kept.contains(f));
    }
    events
}

/// Treina um modelo para `language` a partir das amostras.
pub fn train(
    language: &str,
    samples: &[Sample],
    params: &TrainingParameters,
    factory: &ModelFactory,
) -> Result<ModelArtifact> {
    let algorithm = params.algorithm()?;
    let trainer_type = params.trainer_type()?;
    let iterations = params.iterations()?;
    let cutoff = params.cutoff()?;
    let beam_size = params.beam_size()?;
    let learning_rate = params.learning_rate()?;
    let l2 = params.l2()?;

    if language.trim().is_empty() {
        return Err(MorphoError::MissingProperty("language"));
    }
    if samples.is_empty() {
        return Err(MorphoError::InvalidSample("no training samples".to_string()));
    }

    let start = Instant::now();
    info!(
        language,
        task = factory.task.name(),
        algorithm = algorithm.name(),
        trainer = trainer_type.name(),
        samples = samples.len(),
        "training started"
    );

    let task = factory.task;
    let generator = factory.context_generator;
    let model = match algorithm {
        Algorithm::MaxEnt => {
            let events = apply_cutoff(events(samples, factory), cutoff);
            ScoringModel::MaxEnt(MaxEntModel::train(&events, iterations, learning_rate, l2))
        }
        Algorithm::Perceptron => {
            let events = apply_cutoff(events(samples, factory), cutoff);
            ScoringModel::Perceptron(PerceptronModel::train(&events, iterations))
        }
        Algorithm::PerceptronSequence => ScoringModel::Perceptron(
            PerceptronModel::train_sequences(samples, task, generator, iterations, beam_size),
        ),
        Algorithm::StructuredPerceptron => ScoringModel::LinearChain(LinearChainModel::train(
            samples, task, generator, iterations, beam_size,
        )),
    };

    let manifest = BTreeMap::from([
        (BEAM_SIZE_PARAMETER.to_string(), beam_size.to_string()),
        (ALGORITHM_PARAMETER.to_string(), algorithm.name().to_string()),
        (TRAINER_TYPE_PARAMETER.to_string(), trainer_type.name().to_string()),
        (ITERATIONS_PARAMETER.to_string(), iterations.to_string()),
        (CUTOFF_PARAMETER.to_string(), cutoff.to_string()),
    ]);

    info!(
        language,
        outcomes = model.outcomes().len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "training finished"
    );

    Ok(ModelArtifact {
        language: language.to_string(),
        task,
        manifest,
        context_generator: generator,
        validator: factory.validator(samples),
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn samples() -> Vec<Sample> {
        vec![
            Sample::from_lemmas(
                strings(&["the", "dogs", "bark"]),
                strings(&["DET", "NOUN", "VERB"]),
                strings(&["the", "dog", "bark"]),
            )
            .unwrap(),
            Sample::from_lemmas(
                strings(&["cats", "walked"]),
                strings(&["NOUN", "VERB"]),
                strings(&["cat", "walk"]),
            )
            .unwrap(),
        ]
    }

    #[test]
    fn test_parameter_defaults() {
        let params = TrainingParameters::new();
        assert_eq!(params.algorithm().unwrap(), Algorithm::MaxEnt);
        assert_eq!(params.iterations().unwrap(), 100);
        assert_eq!(params.cutoff().unwrap(), 5);
        assert_eq!(params.beam_size().unwrap(), 3);
        assert_eq!(params.learning_rate().unwrap(), 0.1);
    }

    #[test]
    fn test_parameters_from_json() {
        let params: TrainingParameters =
            serde_json::from_str(r#"{"Algorithm":"perceptron_sequence","Iterations":"7"}"#).unwrap();
        assert_eq!(params.algorithm().unwrap(), Algorithm::PerceptronSequence);
        assert_eq!(params.trainer_type().unwrap(), TrainerType::EventSequence);
        assert_eq!(params.iterations().unwrap(), 7);
    }

    #[test]
    fn test_parameters_file_errors_name_path() {
        let err = TrainingParameters::from_json_file("/nonexistent/params.json").unwrap_err();
        assert!(matches!(err, MorphoError::File { .. }));
        assert!(err.to_string().starts_with("/nonexistent/params.json: "));
    }

    #[test]
    fn test_unknown_algorithm_fails_before_training() {
        let params = TrainingParameters::new().set(ALGORITHM_PARAMETER, "NAIVE_BAYES");
        let err = train("en", &samples(), &params, &ModelFactory::new(Task::Pos)).unwrap_err();
        assert!(matches!(err, MorphoError::Config { .. }));
    }

    #[test]
    fn test_incompatible_trainer_type() {
        let params = TrainingParameters::new()
            .set(ALGORITHM_PARAMETER, "MAXENT")
            .set(TRAINER_TYPE_PARAMETER, "Sequence");
        assert!(matches!(params.trainer_type(), Err(MorphoError::Config { .. })));

        let params = TrainingParameters::new().set(TRAINER_TYPE_PARAMETER, "Batch");
        assert!(matches!(params.trainer_type(), Err(MorphoError::Config { .. })));
    }

    #[test]
    fn test_invalid_number() {
        let params = TrainingParameters::new().set(ITERATIONS_PARAMETER, "many");
        assert!(matches!(params.iterations(), Err(MorphoError::Config { .. })));
    }

    #[test]
    fn test_events_use_gold_history() {
        let events = events(&samples(), &ModelFactory::new(Task::Pos));
        assert_eq!(events.len(), 5);
        assert_eq!(events[1].outcome, "NOUN");
        assert!(events[1].context.contains(&"prev_tag=DET".to_string()));
    }

    #[test]
    fn test_cutoff_drops_rare_features() {
        let events = apply_cutoff(events(&samples(), &ModelFactory::new(Task::Lemma)), 5);
        // "bias" aparece em todos os cinco eventos
        assert!(events.iter().all(|e| e.context == ["bias"]));
    }

    #[test]
    fn test_train_writes_manifest() {
        let params = TrainingParameters::new()
            .set(ALGORITHM_PARAMETER, "STRUCTURED_PERCEPTRON")
            .set(ITERATIONS_PARAMETER, 3)
            .set(BEAM_SIZE_PARAMETER, 4);
        let factory = ModelFactory::new(Task::Lemma).with_validator(ValidatorChoice::Dictionary);
        let artifact = train("en", &samples(), &params, &factory).unwrap();

        assert_eq!(artifact.beam_size().unwrap(), 4);
        assert_eq!(artifact.manifest_property(TRAINER_TYPE_PARAMETER), Some("Sequence"));
        assert_eq!(artifact.context_generator, ContextGenerator::Lemma);
        assert!(matches!(artifact.model, ScoringModel::LinearChain(_)));
        assert!(matches!(artifact.validator, SequenceValidator::ClassesByTag(_)));
    }
}
