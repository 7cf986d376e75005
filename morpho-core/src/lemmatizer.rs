//! # Lematizador Estatístico
//!
//! O modelo não prevê lemas diretamente: prevê a **classe de transformação**
//! ([`crate::ses`]) de cada token, que é então aplicada à palavra.
//!
//! ```text
//! (tokens, tags) → ContextGenerator → beam → classes → ses::decode → lemas
//! ```
//!
//! Uma classe prevista que não se aplica à palavra produz o lema
//! [`PLACEHOLDER_LEMMA`] em vez de um erro.

use std::collections::HashMap;
use std::io::Read;
use std::sync::Arc;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::debug;

use crate::beam::{BeamDecoder, Sequence};
use crate::cache::{ModelCache, ModelSource};
use crate::config::AnnotatorConfig;
use crate::corpus::check_aligned;
use crate::error::Result;
use crate::features::Task;
use crate::model::ModelArtifact;
use crate::morpheme::{DefaultMorphemeFactory, Morpheme, MorphemeFactory};
use crate::ses;

/// Lema devolvido quando a classe prevista não se aplica à palavra.
pub const PLACEHOLDER_LEMMA: &str = "_";

/// Lematizador sobre um modelo de classes de transformação.
#[derive(Debug, Clone)]
pub struct SequenceLemmatizer {
    decoder: BeamDecoder,
}

impl SequenceLemmatizer {
    pub fn new(model: Arc<ModelArtifact>) -> Result<Self> {
        model.expect_task(Task::Lemma)?;
        Ok(Self {
            decoder: BeamDecoder::new(model)?,
        })
    }

    /// Classes de transformação previstas para cada token.
    pub fn lemmatize(&self, tokens: &[String], tags: &[String]) -> Vec<String> {
        self.decoder.decode(tokens, tags).into_outcomes()
    }

    /// As `k` melhores sequências de classes.
    pub fn lemmatize_k(&self, k: usize, tokens: &[String], tags: &[String]) -> Vec<Vec<String>> {
        self.decoder
            .decode_k(k, tokens, tags, None)
            .into_iter()
            .map(Sequence::into_outcomes)
            .collect()
    }

    pub fn top_k_sequences(
        &self,
        tokens: &[String],
        tags: &[String],
        min_score: Option<f64>,
    ) -> Vec<Sequence> {
        self.decoder
            .decode_k(self.decoder.beam_size(), tokens, tags, min_score)
    }

    /// Aplica cada classe ao token correspondente.
    pub fn decode_lemmas(&self, tokens: &[String], classes: &[String]) -> Vec<String> {
        tokens
            .iter()
            .zip(classes)
            .map(|(word, class)| {
                let lemma = ses::decode(word, class);
                debug!(word = %word, class = %class, lemma = %lemma, "decoded lemma");
                if lemma.is_empty() {
                    PLACEHOLDER_LEMMA.to_string()
                } else {
                    lemma
                }
            })
            .collect()
    }

    /// Todas as classes que o modelo conhece.
    pub fn all_lemma_classes(&self) -> &[String] {
        self.decoder.model().outcomes()
    }

    pub fn model(&self) -> &Arc<ModelArtifact> {
        self.decoder.model()
    }
}

/// Mapa ordenado token → valores `tag#lema` distintos, na ordem da primeira
/// ocorrência.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LemmaMap {
    entries: Vec<(String, Vec<String>)>,
    index: HashMap<String, usize>,
}

impl LemmaMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adiciona `value` a `token`, ignorando valores repetidos.
    pub fn insert(&mut self, token: &str, value: String) {
        let slot = match self.index.get(token) {
            Some(&i) => i,
            None => {
                self.entries.push((token.to_string(), Vec::new()));
                self.index.insert(token.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        let values = &mut self.entries[slot].1;
        if !values.contains(&value) {
            values.push(value);
        }
    }

    pub fn get(&self, token: &str) -> &[String] {
        self.index
            .get(token)
            .map(|&i| self.entries[i].1.as_slice())
            .unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for LemmaMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (token, values) in &self.entries {
            map.serialize_entry(token, values)?;
        }
        map.end()
    }
}

/// Fachada de lematização: (tokens, tags) → lemas e [`Morpheme`]s.
pub struct StatisticalLemmatizer {
    lemmatizer: SequenceLemmatizer,
    factory: Box<dyn MorphemeFactory>,
}

impl StatisticalLemmatizer {
    /// Resolve idioma e modelo pela configuração, passando pelo cache.
    pub fn new(config: &AnnotatorConfig, cache: &ModelCache) -> Result<Self> {
        let language = config.language()?;
        let model = cache.acquire(
            Task::Lemma,
            language,
            config.model_source(),
            config.use_model_cache,
        )?;
        Self::from_model(model)
    }

    /// Como [`StatisticalLemmatizer::new`], lendo o modelo de um stream.
    pub fn from_reader(
        language: &str,
        reader: Box<dyn Read + Send>,
        cache: &ModelCache,
        use_model_cache: bool,
    ) -> Result<Self> {
        let model = cache.acquire(
            Task::Lemma,
            language,
            Some(ModelSource::Reader(reader)),
            use_model_cache,
        )?;
        Self::from_model(model)
    }

    pub fn from_model(model: Arc<ModelArtifact>) -> Result<Self> {
        Ok(Self {
            lemmatizer: SequenceLemmatizer::new(model)?,
            factory: Box::new(DefaultMorphemeFactory),
        })
    }

    pub fn with_factory(mut self, factory: Box<dyn MorphemeFactory>) -> Self {
        self.factory = factory;
        self
    }

    /// Lemas da sentença; `tags` precisa ter uma tag por token.
    pub fn lemmatize(&self, tokens: &[String], tags: &[String]) -> Result<Vec<String>> {
        check_aligned(tokens, "tags", tags.len())?;
        let classes = self.lemmatizer.lemmatize(tokens, tags);
        Ok(self.lemmatizer.decode_lemmas(tokens, &classes))
    }

    pub fn morphemes(&self, tokens: &[String], tags: &[String]) -> Result<Vec<Morpheme>> {
        let lemmas = self.lemmatize(tokens, tags)?;
        self.morphemes_from_strings(tokens, tags, &lemmas)
    }

    pub fn morphemes_from_strings(
        &self,
        tokens: &[String],
        tags: &[String],
        lemmas: &[String],
    ) -> Result<Vec<Morpheme>> {
        check_aligned(tokens, "tags", tags.len())?;
        check_aligned(tokens, "lemmas", lemmas.len())?;
        Ok(tokens
            .iter()
            .zip(tags)
            .zip(lemmas)
            .map(|((word, tag), lemma)| self.factory.create_morpheme(word, tag, Some(lemma)))
            .collect())
    }

    /// Lematiza a sentença com cada etiquetagem alternativa (`tag_rows`, uma
    /// sequência completa de tags por linha) e agrupa os pares `tag#lema`
    /// obtidos para cada token.
    pub fn multiple_lemmas(
        &self,
        tokens: &[String],
        tag_rows: &[Vec<String>],
    ) -> Result<LemmaMap> {
        let mut map = LemmaMap::new();
        for row in tag_rows {
            let lemmas = self.lemmatize(tokens, row)?;
            for ((token, tag), lemma) in tokens.iter().zip(row).zip(&lemmas) {
                map.insert(token, format!("{tag}#{lemma}"));
            }
        }
        Ok(map)
    }

    pub fn lemmatizer(&self) -> &SequenceLemmatizer {
        &self.lemmatizer
    }
}
