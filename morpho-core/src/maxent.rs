//! # Maximum Entropy (Regressão Logística Multinomial)
//!
//! Classificador log-linear treinado sobre eventos (features → rótulo).
//! É o modelo de eventos padrão: o decodificador em beam o consulta em cada
//! posição com o contexto produzido pelo [`crate::features::ContextGenerator`].
//!
//! ## Algoritmo
//! - **Treinamento**: Stochastic Gradient Descent (SGD) com regularização L2.
//! - **Predição**: $P(y|x) = \frac{\exp(\sum_i w_{i,y})}{Z(x)}$

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::model::{linear_scores, softmax, Event, Scorer};

/// Modelo de Entropia Máxima.
///
/// Pesos esparsos por feature: `weights[feature][outcome_index]`. Features
/// nunca vistas no treino simplesmente não contribuem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaxEntModel {
    outcomes: Vec<String>,
    weights: HashMap<String, Vec<f64>>,
}

impl MaxEntModel {
    /// Treina o modelo com SGD.
    ///
    /// # Parâmetros
    /// * `events` - Eventos de treino.
    /// * `iterations` - Número de épocas.
    /// * `learning_rate` ($\eta$) - Tamanho do passo do gradiente.
    /// * `lambda` ($\lambda$) - Regularização L2 aplicada às features ativas.
    pub fn train(events: &[Event], iterations: usize, learning_rate: f64, lambda: f64) -> Self {
        let outcomes: Vec<String> = events
            .iter()
            .map(|e| e.outcome.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let index: HashMap<&str, usize> = outcomes
            .iter()
            .enumerate()
            .map(|(i, o)| (o.as_str(), i))
            .collect();
        let n = outcomes.len();
        let mut weights: HashMap<String, Vec<f64>> = HashMap::new();

        for epoch in 0..iterations {
            let mut correct = 0usize;

            for event in events {
                let gold = index[event.outcome.as_str()];
                let scores = linear_scores(&weights, n, &event.context, None);
                let probs = softmax(&scores);

                if argmax(&probs) == gold {
                    correct += 1;
                }

                // w = w + rate * (indicador_classe_correta - prob_predita - lambda * w)
                for feature in &event.context {
                    let w = weights
                        .entry(feature.clone())
                        .or_insert_with(|| vec![0.0; n]);
                    for (o, p) in probs.iter().enumerate() {
                        let indicator = if o == gold { 1.0 } else { 0.0 };
                        let error = indicator - p;
                        w[o] += learning_rate * (error - lambda * w[o]);
                    }
                }
            }

            if epoch % 5 == 0 || epoch + 1 == iterations {
                info!(
                    epoch,
                    accuracy = correct as f64 / events.len().max(1) as f64,
                    "maxent training"
                );
            }
        }

        Self { outcomes, weights }
    }

    pub fn outcomes(&self) -> &[String] {
        &self.outcomes
    }
}

impl Scorer for MaxEntModel {
    fn outcomes(&self) -> &[String] {
        &self.outcomes
    }

    fn eval(&self, context: &[String], _prev: Option<&str>) -> Vec<f64> {
        softmax(&linear_scores(&self.weights, self.outcomes.len(), context, None))
    }
}

/// Índice do maior valor (o primeiro, em caso de empate).
pub(crate) fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(outcome: &str, features: &[&str]) -> Event {
        Event {
            outcome: outcome.to_string(),
            context: features.iter().map(|f| f.to_string()).collect(),
        }
    }

    #[test]
    fn test_maxent_simple_learning() {
        let events = vec![
            event("D0:s", &["bias", "suffix1=s", "tag=NOUN"]),
            event("D0:s", &["bias", "suffix1=s", "tag=NOUN", "word=dogs"]),
            event("=", &["bias", "suffix1=g", "tag=NOUN"]),
            event("D0:dD1:e", &["bias", "suffix2=ed", "tag=VERB"]),
        ];
        let model = MaxEntModel::train(&events, 30, 0.1, 0.001);

        let probs = model.eval(&["bias".into(), "suffix1=s".into(), "tag=NOUN".into()], None);
        let best = &model.outcomes()[argmax(&probs)];
        assert_eq!(best, "D0:s");
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_features_are_uniform() {
        let events = vec![event("A", &["x"]), event("B", &["y"])];
        let model = MaxEntModel::train(&events, 5, 0.1, 0.0);
        let probs = model.eval(&["never-seen".into()], None);
        assert!((probs[0] - probs[1]).abs() < 1e-12);
    }

    #[test]
    fn test_argmax_prefers_first_on_tie() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), 1);
        assert_eq!(argmax(&[]), 0);
    }
}
