//! # Busca em Beam: Decodificação de Sequências
//!
//! Encontra as sequências de rótulos mais prováveis para uma sentença.
//! Ao contrário do Viterbi, o contexto de cada posição depende das decisões
//! anteriores (features de histórico), então não há subestrutura ótima
//! exata: mantemos apenas as `B` melhores hipóteses parciais a cada passo.
//!
//! ## Algoritmo
//!
//! ```text
//! hipóteses = [ε]
//! para cada posição i:
//!     para cada hipótese h (melhores primeiro):
//!         ctx = gerador.context(i, tokens, h, aux)
//!         p   = modelo.eval(ctx, último(h))
//!         estende h com as B saídas mais prováveis aceitas pelo validador
//!     hipóteses = as B melhores extensões
//! ```
//!
//! O score de uma sequência é a soma dos logaritmos das probabilidades de
//! cada passo. Empates são resolvidos pela ordem das saídas do modelo, então
//! a decodificação é determinística.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;
use crate::features::ContextGenerator;
use crate::model::{ModelArtifact, Scorer};
use crate::validator::SequenceValidator;

/// Uma sequência de rótulos com as probabilidades de cada passo.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    outcomes: Vec<String>,
    probs: Vec<f64>,
    /// $\sum_i \ln p_i$
    score: f64,
}

impl Sequence {
    pub fn outcomes(&self) -> &[String] {
        &self.outcomes
    }

    pub fn probs(&self) -> &[f64] {
        &self.probs
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn into_outcomes(self) -> Vec<String> {
        self.outcomes
    }

    fn extended(&self, outcome: &str, prob: f64) -> Self {
        let mut next = self.clone();
        next.outcomes.push(outcome.to_string());
        next.probs.push(prob);
        next.score += prob.ln();
        next
    }
}

/// Busca em beam de largura fixa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeamSearch {
    size: usize,
}

impl BeamSearch {
    pub fn new(size: usize) -> Self {
        Self { size: size.max(1) }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// A melhor sequência (vazia se `tokens` for vazio).
    pub fn best_sequence<S: Scorer + ?Sized>(
        &self,
        scorer: &S,
        tokens: &[String],
        aux: &[String],
        generator: ContextGenerator,
        validator: &SequenceValidator,
    ) -> Sequence {
        self.best_sequences(1, scorer, tokens, aux, generator, validator, None)
            .into_iter()
            .next()
            .unwrap_or_default()
    }

    /// As `k` melhores sequências, da mais para a menos provável.
    ///
    /// Com `min_score`, extensões cujo score acumulado não o supera são
    /// descartadas, então o resultado pode ter menos de `k` itens.
    #[allow(clippy::too_many_arguments)]
    pub fn best_sequences<S: Scorer + ?Sized>(
        &self,
        k: usize,
        scorer: &S,
        tokens: &[String],
        aux: &[String],
        generator: ContextGenerator,
        validator: &SequenceValidator,
        min_score: Option<f64>,
    ) -> Vec<Sequence> {
        if k == 0 {
            return vec![];
        }
        if tokens.is_empty() {
            return vec![Sequence::default()];
        }

        let width = self.size.max(k);
        let outcomes = scorer.outcomes();
        let mut beam = vec![Sequence::default()];

        for i in 0..tokens.len() {
            let mut next = Vec::with_capacity(beam.len() * width);

            for hypothesis in &beam {
                let context = generator.context(i, tokens, hypothesis.outcomes(), aux);
                let prev = hypothesis.outcomes().last().map(String::as_str);
                let probs = scorer.eval(&context, prev);

                let mut ranked: Vec<usize> = (0..probs.len().min(outcomes.len())).collect();
                ranked.sort_by(|a, b| probs[*b].total_cmp(&probs[*a]));

                let mut accepted = 0;
                for &o in &ranked {
                    if accepted == width {
                        break;
                    }
                    if !validator.valid(i, tokens, hypothesis.outcomes(), aux, &outcomes[o]) {
                        continue;
                    }
                    accepted += 1;
                    push_above(&mut next, hypothesis.extended(&outcomes[o], probs[o]), min_score);
                }

                if accepted == 0 {
                    warn!(
                        position = i,
                        token = %tokens[i],
                        "no outcome accepted by sequence validator, ignoring it"
                    );
                    for &o in ranked.iter().take(width) {
                        push_above(&mut next, hypothesis.extended(&outcomes[o], probs[o]), min_score);
                    }
                }
            }

            next.sort_by(|a, b| b.score.total_cmp(&a.score));
            next.truncate(width);
            if next.is_empty() {
                return vec![];
            }
            beam = next;
        }

        beam.truncate(k);
        beam
    }
}

fn push_above(next: &mut Vec<Sequence>, sequence: Sequence, min_score: Option<f64>) {
    if min_score.map_or(true, |min| sequence.score > min) {
        next.push(sequence);
    }
}

/// Contrato comum dos modelos de classificação de sequências.
pub trait SequenceClassifier {
    fn best_sequence(
        &self,
        tokens: &[String],
        aux: &[String],
        generator: ContextGenerator,
        validator: &SequenceValidator,
    ) -> Sequence;

    fn best_sequences(
        &self,
        k: usize,
        tokens: &[String],
        aux: &[String],
        generator: ContextGenerator,
        validator: &SequenceValidator,
        min_score: Option<f64>,
    ) -> Vec<Sequence>;

    fn outcomes(&self) -> &[String];
}

/// Decodificador ligado a um modelo carregado, com o tamanho de beam lido
/// do manifesto.
#[derive(Debug, Clone)]
pub struct BeamDecoder {
    model: Arc<ModelArtifact>,
    beam: BeamSearch,
}

impl BeamDecoder {
    pub fn new(model: Arc<ModelArtifact>) -> Result<Self> {
        let beam = BeamSearch::new(model.beam_size()?);
        Ok(Self { model, beam })
    }

    pub fn model(&self) -> &Arc<ModelArtifact> {
        &self.model
    }

    pub fn beam_size(&self) -> usize {
        self.beam.size()
    }

    /// Melhor sequência usando o gerador e o validador gravados no modelo.
    pub fn decode(&self, tokens: &[String], aux: &[String]) -> Sequence {
        self.best_sequence(
            tokens,
            aux,
            self.model.context_generator,
            &self.model.validator,
        )
    }

    pub fn decode_k(
        &self,
        k: usize,
        tokens: &[String],
        aux: &[String],
        min_score: Option<f64>,
    ) -> Vec<Sequence> {
        self.best_sequences(
            k,
            tokens,
            aux,
            self.model.context_generator,
            &self.model.validator,
            min_score,
        )
    }
}

impl SequenceClassifier for BeamDecoder {
    fn best_sequence(
        &self,
        tokens: &[String],
        aux: &[String],
        generator: ContextGenerator,
        validator: &SequenceValidator,
    ) -> Sequence {
        self.beam
            .best_sequence(&self.model.model, tokens, aux, generator, validator)
    }

    fn best_sequences(
        &self,
        k: usize,
        tokens: &[String],
        aux: &[String],
        generator: ContextGenerator,
        validator: &SequenceValidator,
        min_score: Option<f64>,
    ) -> Vec<Sequence> {
        self.beam.best_sequences(
            k,
            &self.model.model,
            tokens,
            aux,
            generator,
            validator,
            min_score,
        )
    }

    fn outcomes(&self) -> &[String] {
        self.model.outcomes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};

    /// Distribuição fixa, independente do contexto.
    struct FixedScorer {
        outcomes: Vec<String>,
        probs: Vec<f64>,
    }

    impl Scorer for FixedScorer {
        fn outcomes(&self) -> &[String] {
            &self.outcomes
        }

        fn eval(&self, _context: &[String], _prev: Option<&str>) -> Vec<f64> {
            self.probs.clone()
        }
    }

    fn fixed(pairs: &[(&str, f64)]) -> FixedScorer {
        FixedScorer {
            outcomes: pairs.iter().map(|(o, _)| o.to_string()).collect(),
            probs: pairs.iter().map(|(_, p)| *p).collect(),
        }
    }

    fn strings(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_best_sequence_takes_most_probable() {
        let scorer = fixed(&[("A", 0.2), ("B", 0.7), ("C", 0.1)]);
        let tokens = strings(&["x", "y"]);
        let best = BeamSearch::new(3).best_sequence(
            &scorer,
            &tokens,
            &[],
            ContextGenerator::Pos,
            &SequenceValidator::Any,
        );
        assert_eq!(best.outcomes(), ["B", "B"]);
        assert!((best.score() - 2.0 * 0.7f64.ln()).abs() < 1e-12);
        assert_eq!(best.probs(), [0.7, 0.7]);
    }

    #[test]
    fn test_k_best_are_ordered() {
        let scorer = fixed(&[("A", 0.5), ("B", 0.3), ("C", 0.2)]);
        let tokens = strings(&["x", "y"]);
        let seqs = BeamSearch::new(2).best_sequences(
            4,
            &scorer,
            &tokens,
            &[],
            ContextGenerator::Pos,
            &SequenceValidator::Any,
            None,
        );
        assert_eq!(seqs.len(), 4);
        assert_eq!(seqs[0].outcomes(), ["A", "A"]);
        for pair in seqs.windows(2) {
            assert!(pair[0].score() >= pair[1].score());
        }
    }

    #[test]
    fn test_ties_are_deterministic() {
        let scorer = fixed(&[("A", 0.5), ("B", 0.5)]);
        let tokens = strings(&["x"]);
        let run = || {
            BeamSearch::new(2).best_sequences(
                2,
                &scorer,
                &tokens,
                &[],
                ContextGenerator::Pos,
                &SequenceValidator::Any,
                None,
            )
        };
        let first = run();
        assert_eq!(first[0].outcomes(), ["A"]);
        assert_eq!(first, run());
    }

    #[test]
    fn test_min_score_filters() {
        let scorer = fixed(&[("A", 0.6), ("B", 0.4)]);
        let tokens = strings(&["x"]);
        let seqs = BeamSearch::new(3).best_sequences(
            2,
            &scorer,
            &tokens,
            &[],
            ContextGenerator::Pos,
            &SequenceValidator::Any,
            Some(0.5f64.ln()),
        );
        assert_eq!(seqs.len(), 1);
        assert_eq!(seqs[0].outcomes(), ["A"]);
    }

    #[test]
    fn test_validator_restricts_candidates() {
        let scorer = fixed(&[("NOUN", 0.8), ("VERB", 0.2)]);
        let tokens = strings(&["run"]);
        let dict = BTreeMap::from([("run".to_string(), BTreeSet::from(["VERB".to_string()]))]);
        let best = BeamSearch::new(3).best_sequence(
            &scorer,
            &tokens,
            &[],
            ContextGenerator::Pos,
            &SequenceValidator::TagDictionary(dict),
        );
        assert_eq!(best.outcomes(), ["VERB"]);
    }

    #[test]
    fn test_validator_rejecting_everything_falls_back() {
        let scorer = fixed(&[("NOUN", 0.8), ("VERB", 0.2)]);
        let tokens = strings(&["run"]);
        let dict = BTreeMap::from([("run".to_string(), BTreeSet::from(["ADP".to_string()]))]);
        let best = BeamSearch::new(3).best_sequence(
            &scorer,
            &tokens,
            &[],
            ContextGenerator::Pos,
            &SequenceValidator::TagDictionary(dict),
        );
        assert_eq!(best.outcomes(), ["NOUN"]);
    }

    #[test]
    fn test_empty_sentence() {
        let scorer = fixed(&[("A", 1.0)]);
        let best = BeamSearch::new(3).best_sequence(
            &scorer,
            &[],
            &[],
            ContextGenerator::Pos,
            &SequenceValidator::Any,
        );
        assert!(best.outcomes().is_empty());
    }
}
