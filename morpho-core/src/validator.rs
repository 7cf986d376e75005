//! # Validadores de Sequência
//!
//! Filtro estrutural aplicado pelo decodificador **antes** de pontuar uma
//! continuação: independe da probabilidade do modelo.
//!
//! O decodificador só propõe rótulos do conjunto de saídas do modelo, então
//! a variante padrão ([`SequenceValidator::Any`]) aceita qualquer candidato.
//! As variantes com dicionário restringem os candidatos ao que foi observado
//! no treino.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::corpus::Sample;
use crate::features::Task;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "entries", rename_all = "snake_case")]
pub enum SequenceValidator {
    /// Sem restrição além do conjunto de saídas do modelo.
    #[default]
    Any,
    /// Etiquetagem: palavra (minúscula) → tags vistas no treino.
    /// Palavras desconhecidas não são restritas.
    TagDictionary(BTreeMap<String, BTreeSet<String>>),
    /// Lematização: tag da posição → classes vistas no treino com ela.
    /// Tags desconhecidas não são restritas.
    ClassesByTag(BTreeMap<String, BTreeSet<String>>),
}

impl SequenceValidator {
    /// `true` se `candidate` é uma continuação admissível na posição `index`.
    pub fn valid(
        &self,
        index: usize,
        tokens: &[String],
        _prior: &[String],
        aux: &[String],
        candidate: &str,
    ) -> bool {
        match self {
            SequenceValidator::Any => true,
            SequenceValidator::TagDictionary(dict) => tokens
                .get(index)
                .and_then(|word| dict.get(&word.to_lowercase()))
                .map_or(true, |tags| tags.contains(candidate)),
            SequenceValidator::ClassesByTag(dict) => aux
                .get(index)
                .and_then(|tag| dict.get(tag))
                .map_or(true, |classes| classes.contains(candidate)),
        }
    }

    /// Constrói o dicionário adequado à tarefa a partir das amostras de treino.
    pub fn from_samples(task: Task, samples: &[Sample]) -> Self {
        let mut dict: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for sample in samples {
            for i in 0..sample.len() {
                let (key, label) = match task {
                    Task::Pos => (sample.tokens()[i].to_lowercase(), &sample.tags()[i]),
                    Task::Lemma => (sample.tags()[i].clone(), &sample.classes()[i]),
                };
                dict.entry(key).or_default().insert(label.clone());
            }
        }
        match task {
            Task::Pos => SequenceValidator::TagDictionary(dict),
            Task::Lemma => SequenceValidator::ClassesByTag(dict),
        }
    }
}
