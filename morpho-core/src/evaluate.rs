//! # Avaliação por Acurácia de Token
//!
//! Compara, token a token, os rótulos previstos por um [`Labeler`] com os
//! rótulos de referência de cada [`Sample`].
//!
//! O acumulador ([`WordAccuracy`]) é um **valor**: cada chamada recebe o
//! acumulado e devolve o novo, então a avaliação paralela (rayon) é só um
//! `fold` por thread seguido de `reduce` com [`WordAccuracy::merge`].

use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::corpus::Sample;
use crate::error::Result;
use crate::features::Task;
use crate::lemmatizer::SequenceLemmatizer;
use crate::tagger::SequenceTagger;

/// Média corrente de acertos por token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WordAccuracy {
    sum: f64,
    count: usize,
}

impl WordAccuracy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registra um token: 1.0 se acertou, 0.0 se errou.
    pub fn add(mut self, value: f64) -> Self {
        self.sum += value;
        self.count += 1;
        self
    }

    /// Compara referência e previsão posição a posição.
    pub fn record(self, reference: &[String], predicted: &[String]) -> Self {
        let mut acc = self;
        for (i, gold) in reference.iter().enumerate() {
            let hit = predicted.get(i).is_some_and(|p| p == gold);
            acc = acc.add(if hit { 1.0 } else { 0.0 });
        }
        acc
    }

    pub fn merge(self, other: Self) -> Self {
        Self {
            sum: self.sum + other.sum,
            count: self.count + other.count,
        }
    }

    /// Acurácia média (0.0 quando nada foi avaliado).
    pub fn word_accuracy(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn word_count(&self) -> usize {
        self.count
    }
}

impl fmt::Display for WordAccuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Accuracy: {} Number of Samples: {}", self.word_accuracy(), self.count)
    }
}

/// Algo que rotula uma amostra e sabe qual é a sua referência.
pub trait Labeler {
    fn predict(&self, sample: &Sample) -> Vec<String>;

    fn reference<'s>(&self, sample: &'s Sample) -> &'s [String];
}

impl Labeler for SequenceTagger {
    fn predict(&self, sample: &Sample) -> Vec<String> {
        self.tag(sample.tokens())
    }

    fn reference<'s>(&self, sample: &'s Sample) -> &'s [String] {
        sample.labels(Task::Pos)
    }
}

/// Avalia classes de transformação, usando as tags de referência como entrada.
impl Labeler for SequenceLemmatizer {
    fn predict(&self, sample: &Sample) -> Vec<String> {
        self.lemmatize(sample.tokens(), sample.tags())
    }

    fn reference<'s>(&self, sample: &'s Sample) -> &'s [String] {
        sample.labels(Task::Lemma)
    }
}

pub struct Evaluator<L> {
    labeler: L,
}

impl<L: Labeler> Evaluator<L> {
    pub fn new(labeler: L) -> Self {
        Self { labeler }
    }

    pub fn process_sample(&self, acc: WordAccuracy, sample: &Sample) -> WordAccuracy {
        let predicted = self.labeler.predict(sample);
        acc.record(self.labeler.reference(sample), &predicted)
    }

    /// Avalia um stream de amostras, parando no primeiro erro de leitura.
    pub fn evaluate<I>(&self, samples: I) -> Result<WordAccuracy>
    where
        I: IntoIterator<Item = Result<Sample>>,
    {
        samples
            .into_iter()
            .try_fold(WordAccuracy::new(), |acc, sample| {
                Ok(self.process_sample(acc, &sample?))
            })
    }

    pub fn labeler(&self) -> &L {
        &self.labeler
    }
}

impl<L: Labeler + Sync> Evaluator<L> {
    /// Avaliação paralela sobre amostras já carregadas.
    pub fn par_evaluate(&self, samples: &[Sample]) -> WordAccuracy {
        samples
            .par_iter()
            .fold(WordAccuracy::new, |acc, sample| self.process_sample(acc, sample))
            .reduce(WordAccuracy::new, WordAccuracy::merge)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Devolve previsões fixas, independentemente da entrada.
    struct Fixed(Vec<String>);

    impl Labeler for Fixed {
        fn predict(&self, _sample: &Sample) -> Vec<String> {
            self.0.clone()
        }

        fn reference<'s>(&self, sample: &'s Sample) -> &'s [String] {
            sample.tags()
        }
    }

    fn strings(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn sample() -> Sample {
        Sample::from_lemmas(
            strings(&["a", "b", "c"]),
            strings(&["run", "run", "dog"]),
            strings(&["a", "b", "c"]),
        )
        .unwrap()
    }

    #[test]
    fn test_word_accuracy() {
        let acc = WordAccuracy::new().record(
            &strings(&["run", "run", "dog"]),
            &strings(&["run", "ran", "dog"]),
        );
        assert!((acc.word_accuracy() - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(acc.word_count(), 3);
        assert!(acc.to_string().starts_with("Accuracy: 0.666"));
        assert!(acc.to_string().ends_with("Number of Samples: 3"));
    }

    #[test]
    fn test_empty_accuracy_is_zero() {
        assert_eq!(WordAccuracy::new().word_accuracy(), 0.0);
    }

    #[test]
    fn test_evaluator_online_and_parallel() {
        let evaluator = Evaluator::new(Fixed(strings(&["run", "ran", "dog"])));
        let samples = vec![sample(), sample()];

        let first = evaluator.process_sample(WordAccuracy::new(), &samples[0]);
        assert_eq!(first.word_count(), 3);

        let sequential = evaluator
            .evaluate(samples.iter().cloned().map(Ok))
            .unwrap();
        let parallel = evaluator.par_evaluate(&samples);
        assert_eq!(sequential.word_count(), 6);
        assert_eq!(parallel.word_count(), 6);
        assert!((sequential.word_accuracy() - parallel.word_accuracy()).abs() < 1e-12);
    }

    #[test]
    fn test_short_prediction_counts_as_miss() {
        let acc = WordAccuracy::new().record(&strings(&["a", "b"]), &strings(&["a"]));
        assert_eq!(acc.word_count(), 2);
        assert_eq!(acc.word_accuracy(), 0.5);
    }
}
