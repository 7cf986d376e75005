//! # Corpus Anotado e Amostras de Treino
//!
//! Lê corpora no formato tabular de três colunas:
//!
//! ```text
//! The     DET     the
//! cats    NOUN    cat
//! sleep   VERB    sleep
//!
//! Dogs    NOUN    dog
//! ```
//!
//! - Uma linha por token: `token<TAB>tag<TAB>lema`.
//! - Uma linha em branco encerra a sentença ([`Sample`]).
//! - Linhas que não têm exatamente três campos são descartadas com um aviso
//!   no log; a leitura continua normalmente.
//!
//! Cada lema é convertido na sua classe de transformação ([`crate::ses`])
//! no momento da leitura, então a mesma amostra serve para treinar tanto o
//! etiquetador (rótulo = tag) quanto o lematizador (rótulo = classe).

use std::io::BufRead;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MorphoError, Result};
use crate::features::Task;
use crate::ses;

/// Uma sentença anotada: tokens, tags e classes de transformação alinhados.
///
/// Invariante: as três sequências têm o mesmo tamanho, maior que zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    tokens: Vec<String>,
    tags: Vec<String>,
    classes: Vec<String>,
}

/// Rejeita uma entrada auxiliar (`what`) que não acompanha os tokens.
pub(crate) fn check_aligned(tokens: &[String], what: &str, len: usize) -> Result<()> {
    if tokens.len() != len {
        return Err(MorphoError::InvalidSample(format!(
            "length mismatch: {} tokens, {len} {what}",
            tokens.len()
        )));
    }
    Ok(())
}

impl Sample {
    pub fn new(tokens: Vec<String>, tags: Vec<String>, classes: Vec<String>) -> Result<Self> {
        if tokens.is_empty() {
            return Err(MorphoError::InvalidSample("empty sentence".to_string()));
        }
        if tokens.len() != tags.len() || tokens.len() != classes.len() {
            return Err(MorphoError::InvalidSample(format!(
                "length mismatch: {} tokens, {} tags, {} classes",
                tokens.len(),
                tags.len(),
                classes.len()
            )));
        }
        Ok(Self {
            tokens,
            tags,
            classes,
        })
    }

    /// Constrói a amostra a partir dos lemas, codificando cada par
    /// `(token, lema)` como classe.
    pub fn from_lemmas(tokens: Vec<String>, tags: Vec<String>, lemmas: Vec<String>) -> Result<Self> {
        if tokens.len() != lemmas.len() {
            return Err(MorphoError::InvalidSample(format!(
                "length mismatch: {} tokens, {} lemmas",
                tokens.len(),
                lemmas.len()
            )));
        }
        let classes = tokens
            .iter()
            .zip(&lemmas)
            .map(|(token, lemma)| ses::encode(token, lemma))
            .collect();
        Self::new(tokens, tags, classes)
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    /// Lemas reconstruídos a partir das classes (`_` quando inaplicável).
    pub fn lemmas(&self) -> Vec<String> {
        self.tokens
            .iter()
            .zip(&self.classes)
            .map(|(token, class)| {
                let lemma = ses::decode(token, class);
                if lemma.is_empty() {
                    crate::lemmatizer::PLACEHOLDER_LEMMA.to_string()
                } else {
                    lemma
                }
            })
            .collect()
    }

    /// Rótulos que a tarefa aprende: tags ou classes.
    pub fn labels(&self, task: Task) -> &[String] {
        match task {
            Task::Pos => &self.tags,
            Task::Lemma => &self.classes,
        }
    }

    /// Entrada auxiliar da tarefa: as tags para o lematizador, nada para o
    /// etiquetador.
    pub fn aux(&self, task: Task) -> &[String] {
        match task {
            Task::Pos => &[],
            Task::Lemma => &self.tags,
        }
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Iterador de [`Sample`]s sobre qualquer fonte de linhas.
///
/// Erros de E/S são devolvidos como `Err`; linhas malformadas são apenas
/// registradas e ignoradas.
pub struct SampleStream<R> {
    reader: R,
    line_number: usize,
    finished: bool,
}

impl<R: BufRead> SampleStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
            finished: false,
        }
    }

    fn read_sample(&mut self) -> Result<Option<Sample>> {
        let mut tokens = Vec::new();
        let mut tags = Vec::new();
        let mut classes = Vec::new();
        let mut line = String::new();

        loop {
            line.clear();
            let read = self.reader.read_line(&mut line)?;
            if read == 0 {
                self.finished = true;
                break;
            }
            self.line_number += 1;

            let content = line.trim_end_matches(['\n', '\r']);
            if content.is_empty() {
                if tokens.is_empty() {
                    // Linhas em branco consecutivas
                    continue;
                }
                break;
            }

            let parts: Vec<&str> = content.split('\t').collect();
            if parts.len() != 3 {
                warn!(line = self.line_number, "Skipping corrupt line: {content}");
                continue;
            }
            classes.push(ses::encode(parts[0], parts[2]));
            tokens.push(parts[0].to_string());
            tags.push(parts[1].to_string());
        }

        if tokens.is_empty() {
            return Ok(None);
        }
        Sample::new(tokens, tags, classes).map(Some)
    }
}

impl<R: BufRead> Iterator for SampleStream<R> {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.read_sample() {
            Ok(Some(sample)) => Some(Ok(sample)),
            Ok(None) => None,
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

/// Lê todas as amostras de um corpus, parando no primeiro erro de E/S.
pub fn read_samples<R: BufRead>(reader: R) -> Result<Vec<Sample>> {
    SampleStream::new(reader).collect()
}
