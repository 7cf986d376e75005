//! # Averaged Perceptron
//!
//! Algoritmo online e *mistake-driven*: só atualiza os pesos quando erra.
//! O modelo final usa a **média** dos pesos ao longo de todo o treino, o que
//! estabiliza o aprendizado e reduz overfitting.
//!
//! Três modos de treino compartilham o mesmo acumulador ([`AveragedWeights`]):
//!
//! | Modo | Unidade de atualização | Resultado |
//! |------|------------------------|-----------|
//! | [`PerceptronModel::train`] | evento isolado | [`PerceptronModel`] |
//! | [`PerceptronModel::train_sequences`] | sentença decodificada em beam | [`PerceptronModel`] |
//! | [`LinearChainModel::train`] | sentença, com pesos de transição | [`LinearChainModel`] |
//!
//! # Lazy Averaging
//! Somar todos os pesos a cada passo custaria $O(N \cdot T)$. Aqui o total de
//! um peso só é atualizado quando ele muda, levando em conta quantos passos
//! ele ficou constante. O resultado é idêntico à média ingênua.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::beam::BeamSearch;
use crate::corpus::Sample;
use crate::features::{ContextGenerator, Task};
use crate::maxent::argmax;
use crate::model::{linear_scores, softmax, Event, Scorer};
use crate::validator::SequenceValidator;

/// Prefixo da feature de transição do modelo de cadeia linear.
const TRANSITION_PREFIX: &str = "trans=";

fn transition_feature(prev: Option<&str>) -> String {
    format!("{TRANSITION_PREFIX}{}", prev.unwrap_or("BOS"))
}

/// Acumulador de pesos com média preguiçosa.
#[derive(Debug, Default)]
struct AveragedWeights {
    n_outcomes: usize,
    /// Pesos atuais $w$.
    current: HashMap<String, Vec<f64>>,
    /// Soma acumulada $\sum_t w_t$.
    totals: HashMap<String, Vec<f64>>,
    /// Passo da última atualização de cada peso.
    last_update: HashMap<String, Vec<usize>>,
    steps: usize,
}

impl AveragedWeights {
    fn new(n_outcomes: usize) -> Self {
        Self {
            n_outcomes,
            ..Default::default()
        }
    }

    fn scores(&self, context: &[String], extra: Option<&str>) -> Vec<f64> {
        linear_scores(&self.current, self.n_outcomes, context, extra)
    }

    fn update(&mut self, feature: &str, outcome: usize, delta: f64) {
        let n = self.n_outcomes;
        let current = self
            .current
            .entry(feature.to_string())
            .or_insert_with(|| vec![0.0; n]);
        let totals = self
            .totals
            .entry(feature.to_string())
            .or_insert_with(|| vec![0.0; n]);
        let last = self
            .last_update
            .entry(feature.to_string())
            .or_insert_with(|| vec![0; n]);

        // O peso antigo valeu desde a última atualização até agora
        totals[outcome] += (self.steps - last[outcome]) as f64 * current[outcome];
        last[outcome] = self.steps;
        current[outcome] += delta;
    }

    fn tick(&mut self) {
        self.steps += 1;
    }

    /// Fecha os totais no passo final e devolve os pesos médios.
    fn finalize(mut self) -> HashMap<String, Vec<f64>> {
        if self.steps == 0 {
            return self.current;
        }
        let steps = self.steps as f64;
        let mut averaged = HashMap::with_capacity(self.current.len());
        for (feature, current) in self.current {
            let totals = self.totals.remove(&feature).unwrap_or_default();
            let last = self.last_update.remove(&feature).unwrap_or_default();
            let weights: Vec<f64> = current
                .iter()
                .enumerate()
                .map(|(o, w)| {
                    let total = totals.get(o).copied().unwrap_or(0.0);
                    let since = self.steps - last.get(o).copied().unwrap_or(0);
                    (total + since as f64 * w) / steps
                })
                .collect();
            if weights.iter().any(|w| *w != 0.0) {
                averaged.insert(feature, weights);
            }
        }
        averaged
    }
}

/// Pontua com os pesos correntes durante o treino estruturado.
struct TrainingScorer<'a> {
    outcomes: &'a [String],
    weights: &'a AveragedWeights,
    transitions: bool,
}

impl Scorer for TrainingScorer<'_> {
    fn outcomes(&self) -> &[String] {
        self.outcomes
    }

    fn eval(&self, context: &[String], prev: Option<&str>) -> Vec<f64> {
        let transition = self.transitions.then(|| transition_feature(prev));
        softmax(&self.weights.scores(context, transition.as_deref()))
    }
}

/// Perceptron de eventos (um rótulo por posição, histórico via features).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerceptronModel {
    outcomes: Vec<String>,
    weights: HashMap<String, Vec<f64>>,
}

impl PerceptronModel {
    /// Treina evento a evento.
    ///
    /// Para cada evento: prediz com os pesos atuais e, se errar, promove o
    /// rótulo correto e penaliza o predito.
    ///
    /// $w_{correto} \leftarrow w_{correto} + \phi(x)$
    /// $w_{errado} \leftarrow w_{errado} - \phi(x)$
    pub fn train(events: &[Event], iterations: usize) -> Self {
        let outcomes = sorted_outcomes(events.iter().map(|e| e.outcome.as_str()));
        let index = outcome_index(&outcomes);
        let mut weights = AveragedWeights::new(outcomes.len());

        for iteration in 0..iterations {
            let mut correct = 0usize;
            for event in events {
                let gold = index[event.outcome.as_str()];
                let predicted = argmax(&weights.scores(&event.context, None));
                if predicted == gold {
                    correct += 1;
                } else {
                    for feature in &event.context {
                        weights.update(feature, gold, 1.0);
                        weights.update(feature, predicted, -1.0);
                    }
                }
                weights.tick();
            }
            info!(
                iteration,
                accuracy = correct as f64 / events.len().max(1) as f64,
                "perceptron training"
            );
        }

        Self {
            outcomes,
            weights: weights.finalize(),
        }
    }

    /// Treina sentença a sentença, decodificando cada uma com o beam e
    /// corrigindo as posições em que a sequência predita diverge da correta.
    pub fn train_sequences(
        samples: &[Sample],
        task: Task,
        generator: ContextGenerator,
        iterations: usize,
        beam_size: usize,
    ) -> Self {
        let (outcomes, weights) =
            train_structured(samples, task, generator, iterations, beam_size, false);
        Self { outcomes, weights }
    }

    pub fn outcomes(&self) -> &[String] {
        &self.outcomes
    }
}

impl Scorer for PerceptronModel {
    fn outcomes(&self) -> &[String] {
        &self.outcomes
    }

    fn eval(&self, context: &[String], _prev: Option<&str>) -> Vec<f64> {
        softmax(&linear_scores(&self.weights, self.outcomes.len(), context, None))
    }
}

/// Perceptron estruturado de cadeia linear.
///
/// Além das features de contexto, aprende um peso para cada par
/// (rótulo anterior, rótulo atual), consultado pelo decodificador a cada passo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearChainModel {
    outcomes: Vec<String>,
    weights: HashMap<String, Vec<f64>>,
}

impl LinearChainModel {
    pub fn train(
        samples: &[Sample],
        task: Task,
        generator: ContextGenerator,
        iterations: usize,
        beam_size: usize,
    ) -> Self {
        let (outcomes, weights) =
            train_structured(samples, task, generator, iterations, beam_size, true);
        Self { outcomes, weights }
    }

    pub fn outcomes(&self) -> &[String] {
        &self.outcomes
    }
}

impl Scorer for LinearChainModel {
    fn outcomes(&self) -> &[String] {
        &self.outcomes
    }

    fn eval(&self, context: &[String], prev: Option<&str>) -> Vec<f64> {
        let transition = transition_feature(prev);
        softmax(&linear_scores(
            &self.weights,
            self.outcomes.len(),
            context,
            Some(&transition),
        ))
    }
}

fn train_structured(
    samples: &[Sample],
    task: Task,
    generator: ContextGenerator,
    iterations: usize,
    beam_size: usize,
    transitions: bool,
) -> (Vec<String>, HashMap<String, Vec<f64>>) {
    let outcomes = sorted_outcomes(
        samples
            .iter()
            .flat_map(|s| s.labels(task).iter().map(String::as_str)),
    );
    let index = outcome_index(&outcomes);
    let mut weights = AveragedWeights::new(outcomes.len());
    let beam = BeamSearch::new(beam_size);

    for iteration in 0..iterations {
        let mut correct = 0usize;
        let mut total = 0usize;

        for sample in samples {
            let tokens = sample.tokens();
            let gold = sample.labels(task);
            let aux = sample.aux(task);

            let predicted = {
                let scorer = TrainingScorer {
                    outcomes: &outcomes,
                    weights: &weights,
                    transitions,
                };
                beam.best_sequence(&scorer, tokens, aux, generator, &SequenceValidator::Any)
                    .into_outcomes()
            };

            total += gold.len();
            correct += gold.iter().zip(&predicted).filter(|(g, p)| g == p).count();

            if predicted.as_slice() != gold {
                for i in 0..gold.len() {
                    let gold_context = generator.context(i, tokens, &gold[..i], aux);
                    let pred_context = generator.context(i, tokens, &predicted[..i], aux);
                    let gold_prev = i.checked_sub(1).map(|p| gold[p].as_str());
                    let pred_prev = i.checked_sub(1).map(|p| predicted[p].as_str());

                    if gold[i] == predicted[i] && gold_context == pred_context && gold_prev == pred_prev {
                        continue;
                    }

                    let g = index[gold[i].as_str()];
                    let p = index[predicted[i].as_str()];
                    for feature in &gold_context {
                        weights.update(feature, g, 1.0);
                    }
                    for feature in &pred_context {
                        weights.update(feature, p, -1.0);
                    }
                    if transitions {
                        weights.update(&transition_feature(gold_prev), g, 1.0);
                        weights.update(&transition_feature(pred_prev), p, -1.0);
                    }
                }
            }
            weights.tick();
        }

        info!(
            iteration,
            accuracy = correct as f64 / total.max(1) as f64,
            "sequence perceptron training"
        );
    }

    (outcomes, weights.finalize())
}

fn sorted_outcomes<'a>(labels: impl Iterator<Item = &'a str>) -> Vec<String> {
    labels
        .collect::<BTreeSet<_>>()
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn outcome_index(outcomes: &[String]) -> HashMap<&str, usize> {
    outcomes
        .iter()
        .enumerate()
        .map(|(i, o)| (o.as_str(), i))
        .collect()
}
