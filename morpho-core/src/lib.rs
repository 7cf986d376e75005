//! # morpho-core: Etiquetagem Morfossintática e Lematização Estatísticas
//!
//! Este crate implementa a camada de análise morfológica de um pipeline de
//! NLP: dada uma sentença já tokenizada, atribui a cada token uma **tag**
//! morfossintática e um **lema**.
//!
//! ## Arquitetura do Sistema
//!
//! A lematização é tratada como rotulagem de sequência: em vez de prever o
//! lema (vocabulário aberto), o modelo prevê a **classe de transformação**
//! que leva a palavra ao lema (vocabulário fechado e pequeno).
//!
//! 1.  **Corpus** ([`corpus`]): linhas `token<TAB>tag<TAB>lema`, convertidas em [`Sample`]s.
//! 2.  **Script de edição** ([`ses`]): `("walked", "walk") → "D0:dD1:e"`, e de volta.
//! 3.  **Features** ([`features`]): contexto discreto de cada posição, por tarefa.
//! 4.  **Modelos** ([`maxent`], [`perceptron`]): pontuam cada rótulo candidato.
//! 5.  **Decodificação** ([`beam`]): busca em beam com [`validator`] estrutural.
//! 6.  **Fachadas** ([`tagger`], [`lemmatizer`]): tokens → [`Morpheme`]s, com
//!     modelos compartilhados por idioma via [`cache`].
//! 7.  **Treino e avaliação** ([`trainer`], [`evaluate`]).
//!
//! ## Exemplo de Uso
//!
//! ```rust
//! use std::io::Cursor;
//! use morpho_core::corpus::read_samples;
//! use morpho_core::trainer::{self, ModelFactory, TrainingParameters};
//! use morpho_core::{StatisticalLemmatizer, Task};
//!
//! let corpus = "the\tDET\tthe\ndogs\tNOUN\tdog\nbarked\tVERB\tbark\n\n";
//! let samples = read_samples(Cursor::new(corpus)).unwrap();
//!
//! let params = TrainingParameters::new()
//!     .set("Algorithm", "PERCEPTRON_SEQUENCE")
//!     .set("Iterations", 5);
//! let model = trainer::train("en", &samples, &params, &ModelFactory::new(Task::Lemma)).unwrap();
//!
//! let lemmatizer = StatisticalLemmatizer::from_model(model.into()).unwrap();
//! let tokens: Vec<String> = ["the", "dogs", "barked"].map(String::from).into();
//! let tags: Vec<String> = ["DET", "NOUN", "VERB"].map(String::from).into();
//!
//! assert_eq!(lemmatizer.lemmatize(&tokens, &tags).unwrap(), ["the", "dog", "bark"]);
//! ```

pub mod beam;
pub mod cache;
pub mod config;
pub mod corpus;
pub mod error;
pub mod evaluate;
pub mod features;
pub mod lemmatizer;
pub mod maxent;
pub mod model;
pub mod morpheme;
pub mod perceptron;
pub mod ses;
pub mod tagger;
pub mod trainer;
pub mod validator;

pub use beam::{BeamDecoder, BeamSearch, Sequence, SequenceClassifier};
pub use cache::{ModelCache, ModelSource};
pub use config::AnnotatorConfig;
pub use corpus::{Sample, SampleStream};
pub use error::{MorphoError, Result};
pub use evaluate::{Evaluator, Labeler, WordAccuracy};
pub use features::{ContextGenerator, Task};
pub use lemmatizer::{LemmaMap, SequenceLemmatizer, StatisticalLemmatizer};
pub use model::ModelArtifact;
pub use morpheme::{DefaultMorphemeFactory, Morpheme, MorphemeFactory};
pub use tagger::{SequenceTagger, StatisticalTagger};
pub use validator::SequenceValidator;
