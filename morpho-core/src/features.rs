//! # Geradores de Contexto (Features)
//!
//! Para cada posição de uma sentença, produz o conjunto de features discretas
//! que o modelo usa para pontuar cada rótulo candidato naquela posição.
//!
//! Existem duas variantes com o mesmo contrato e templates diferentes,
//! escolhidas pela tarefa ([`Task`]):
//!
//! ### [`ContextGenerator::Pos`] (etiquetagem morfossintática)
//! - Forma da palavra, prefixos e sufixos de 1 a 4 grafemas
//! - Ortografia: capitalização, maiúsculas, dígitos, hífen, padrão numérico
//! - Janela de ±2 palavras
//! - As duas últimas tags já decididas pelo decodificador
//!
//! ### [`ContextGenerator::Lemma`] (lematização)
//! - Palavra em minúsculas, tag da posição e a combinação das duas
//! - Prefixos e sufixos de 1 a 5 grafemas
//! - Tags vizinhas e a última classe de transformação decidida
//!
//! Geradores não têm estado: podem ser chamados em paralelo quantas vezes for
//! preciso.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

/// Números, datas e horas ("2023", "3,14", "12:30", "1/2").
static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[+-]?\d+([.,:/]\d+)*$").expect("valid number pattern"));

/// Tarefa de rotulagem de sequência.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    /// Rótulos são tags morfossintáticas.
    Pos,
    /// Rótulos são classes de transformação ([`crate::ses`]).
    Lemma,
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::Pos => "pos",
            Task::Lemma => "lemma",
        }
    }
}

/// Estratégia de geração de contexto armazenada junto com o modelo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextGenerator {
    Pos,
    Lemma,
}

impl ContextGenerator {
    /// Variante padrão para cada tarefa.
    pub fn for_task(task: Task) -> Self {
        match task {
            Task::Pos => ContextGenerator::Pos,
            Task::Lemma => ContextGenerator::Lemma,
        }
    }

    /// Features da posição `index`.
    ///
    /// # Parâmetros
    /// - `tokens`: a sentença completa.
    /// - `prior`: rótulos já decididos para as posições `0..index`.
    /// - `aux`: entrada auxiliar alinhada com `tokens` (as tags, para o
    ///   lematizador; vazia para o etiquetador).
    pub fn context(
        &self,
        index: usize,
        tokens: &[String],
        prior: &[String],
        aux: &[String],
    ) -> Vec<String> {
        let mut features = match self {
            ContextGenerator::Pos => pos_context(index, tokens, prior),
            ContextGenerator::Lemma => lemma_context(index, tokens, prior, aux),
        };
        features.sort_unstable();
        features.dedup();
        features
    }
}

fn pos_context(i: usize, tokens: &[String], prior: &[String]) -> Vec<String> {
    let word = &tokens[i];
    let lower = word.to_lowercase();
    let mut fv = Vec::with_capacity(32);

    fv.push("bias".to_string());
    fv.push(format!("word={lower}"));
    push_affixes(&mut fv, &lower, 4);
    push_shape(&mut fv, word);

    if i == 0 {
        fv.push("BOS".to_string());
    } else {
        fv.push(format!("prev_word={}", tokens[i - 1].to_lowercase()));
    }
    if i > 1 {
        fv.push(format!("prev2_word={}", tokens[i - 2].to_lowercase()));
    }
    if i + 1 < tokens.len() {
        fv.push(format!("next_word={}", tokens[i + 1].to_lowercase()));
    } else {
        fv.push("EOS".to_string());
    }
    if i + 2 < tokens.len() {
        fv.push(format!("next2_word={}", tokens[i + 2].to_lowercase()));
    }

    // Histórico de decisões do decodificador
    let prev_tag = prior_at(prior, i, 1);
    let prev2_tag = prior_at(prior, i, 2);
    fv.push(format!("prev_tag={prev_tag}"));
    fv.push(format!("prev2_tags={prev2_tag},{prev_tag}"));
    fv.push(format!("prev_tag_word={prev_tag},{lower}"));

    fv
}

fn lemma_context(i: usize, tokens: &[String], prior: &[String], aux: &[String]) -> Vec<String> {
    let word = &tokens[i];
    let lower = word.to_lowercase();
    let tag = aux.get(i).map(String::as_str).unwrap_or("*");
    let mut fv = Vec::with_capacity(32);

    fv.push("bias".to_string());
    fv.push(format!("word={lower}"));
    fv.push(format!("tag={tag}"));
    fv.push(format!("word_tag={lower},{tag}"));
    push_affixes(&mut fv, &lower, 5);
    for suffix in suffixes(&lower, 3) {
        fv.push(format!("suffix_tag={suffix},{tag}"));
    }
    push_shape(&mut fv, word);

    let prev_tag = if i > 0 { aux.get(i - 1).map(String::as_str).unwrap_or("*") } else { "BOS" };
    let next_tag = aux.get(i + 1).map(String::as_str).unwrap_or("EOS");
    fv.push(format!("prev_tag={prev_tag}"));
    fv.push(format!("next_tag={next_tag}"));
    fv.push(format!("prev_class={}", prior_at(prior, i, 1)));

    fv
}

/// Rótulo decidido `back` posições antes de `i` (ou marcador de início).
fn prior_at(prior: &[String], i: usize, back: usize) -> &str {
    if i < back {
        return "BOS";
    }
    prior.get(i - back).map(String::as_str).unwrap_or("*")
}

/// Adiciona prefixos e sufixos de 1 a `max` grafemas.
fn push_affixes(fv: &mut Vec<String>, lower: &str, max: usize) {
    let graphemes: Vec<&str> = lower.graphemes(true).collect();
    for n in 1..=max.min(graphemes.len()) {
        fv.push(format!("prefix{n}={}", graphemes[..n].concat()));
        fv.push(format!("suffix{n}={}", graphemes[graphemes.len() - n..].concat()));
    }
}

fn suffixes(lower: &str, max: usize) -> Vec<String> {
    let graphemes: Vec<&str> = lower.graphemes(true).collect();
    (1..=max.min(graphemes.len()))
        .map(|n| graphemes[graphemes.len() - n..].concat())
        .collect()
}

fn push_shape(fv: &mut Vec<String>, word: &str) {
    let first_upper = word.chars().next().map(char::is_uppercase).unwrap_or(false);
    let has_alpha = word.chars().any(char::is_alphabetic);
    let all_upper = has_alpha && word.chars().all(|c| c.is_uppercase() || !c.is_alphabetic());

    if first_upper {
        fv.push("is_capitalized".to_string());
    }
    if all_upper && word.chars().count() > 1 {
        fv.push("is_all_caps".to_string());
    }
    if word.chars().any(|c| c.is_ascii_digit()) {
        fv.push("has_digit".to_string());
    }
    if word.contains('-') {
        fv.push("has_hyphen".to_string());
    }
    if NUMBER.is_match(word) {
        fv.push("is_number".to_string());
    }
    if !word.is_empty() && word.chars().all(|c| !c.is_alphanumeric()) {
        fv.push("is_punctuation".to_string());
    }
}
