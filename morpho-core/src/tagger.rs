//! # Etiquetador Morfossintático
//!
//! Duas camadas:
//!
//! - [`SequenceTagger`]: decodifica tags a partir de um modelo de etiquetagem
//!   (melhor sequência, k melhores, probabilidades).
//! - [`StatisticalTagger`]: fachada que obtém o modelo pelo
//!   [`ModelCache`] e devolve [`Morpheme`]s.
//!
//! ```text
//! tokens → ContextGenerator → beam → tags → Morpheme{word, tag}
//! ```

use std::io::Read;
use std::sync::Arc;

use tracing::debug;

use crate::beam::{BeamDecoder, Sequence};
use crate::cache::{ModelCache, ModelSource};
use crate::config::AnnotatorConfig;
use crate::corpus::check_aligned;
use crate::error::Result;
use crate::features::Task;
use crate::model::ModelArtifact;
use crate::morpheme::{DefaultMorphemeFactory, Morpheme, MorphemeFactory};

/// Número de sequências alternativas em [`StatisticalTagger::all_pos_tags`].
pub const DEFAULT_TAG_ROWS: usize = 13;

/// Etiquetador sobre um modelo de etiquetagem carregado.
#[derive(Debug, Clone)]
pub struct SequenceTagger {
    decoder: BeamDecoder,
}

impl SequenceTagger {
    pub fn new(model: Arc<ModelArtifact>) -> Result<Self> {
        model.expect_task(Task::Pos)?;
        Ok(Self {
            decoder: BeamDecoder::new(model)?,
        })
    }

    pub fn tag(&self, tokens: &[String]) -> Vec<String> {
        self.decoder.decode(tokens, &[]).into_outcomes()
    }

    /// As `k` melhores sequências de tags, uma por linha.
    pub fn tag_k(&self, k: usize, tokens: &[String]) -> Vec<Vec<String>> {
        self.decoder
            .decode_k(k, tokens, &[], None)
            .into_iter()
            .map(Sequence::into_outcomes)
            .collect()
    }

    /// Sequências completas (com probabilidades), no máximo o tamanho do beam.
    pub fn top_k_sequences(&self, tokens: &[String], min_score: Option<f64>) -> Vec<Sequence> {
        self.decoder
            .decode_k(self.decoder.beam_size(), tokens, &[], min_score)
    }

    pub fn all_tags(&self) -> &[String] {
        self.decoder.model().outcomes()
    }

    pub fn model(&self) -> &Arc<ModelArtifact> {
        self.decoder.model()
    }
}

/// Fachada de etiquetagem: tokens → [`Morpheme`]s.
pub struct StatisticalTagger {
    tagger: SequenceTagger,
    factory: Box<dyn MorphemeFactory>,
}

impl StatisticalTagger {
    /// Resolve idioma e modelo pela configuração, passando pelo cache.
    pub fn new(config: &AnnotatorConfig, cache: &ModelCache) -> Result<Self> {
        let language = config.language()?;
        let model = cache.acquire(
            Task::Pos,
            language,
            config.model_source(),
            config.use_model_cache,
        )?;
        Self::from_model(model)
    }

    /// Como [`StatisticalTagger::new`], lendo o modelo de um stream.
    pub fn from_reader(
        language: &str,
        reader: Box<dyn Read + Send>,
        cache: &ModelCache,
        use_model_cache: bool,
    ) -> Result<Self> {
        let model = cache.acquire(
            Task::Pos,
            language,
            Some(ModelSource::Reader(reader)),
            use_model_cache,
        )?;
        Self::from_model(model)
    }

    pub fn from_model(model: Arc<ModelArtifact>) -> Result<Self> {
        Ok(Self {
            tagger: SequenceTagger::new(model)?,
            factory: Box::new(DefaultMorphemeFactory),
        })
    }

    pub fn with_factory(mut self, factory: Box<dyn MorphemeFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn pos_annotate(&self, tokens: &[String]) -> Vec<String> {
        let tags = self.tagger.tag(tokens);
        debug!(tokens = tokens.len(), ?tags, "pos annotation");
        tags
    }

    pub fn morphemes(&self, tokens: &[String]) -> Vec<Morpheme> {
        let tags = self.pos_annotate(tokens);
        self.build_morphemes(tokens, &tags)
    }

    /// Morfemas a partir de tags já conhecidas, uma por token.
    pub fn morphemes_from_strings(
        &self,
        tokens: &[String],
        tags: &[String],
    ) -> Result<Vec<Morpheme>> {
        check_aligned(tokens, "tags", tags.len())?;
        Ok(self.build_morphemes(tokens, tags))
    }

    fn build_morphemes(&self, tokens: &[String], tags: &[String]) -> Vec<Morpheme> {
        tokens
            .iter()
            .zip(tags)
            .map(|(word, tag)| self.factory.create_morpheme(word, tag, None))
            .collect()
    }

    /// Etiquetagens alternativas da sentença ([`DEFAULT_TAG_ROWS`] no máximo),
    /// uma sequência completa por linha.
    pub fn all_pos_tags(&self, tokens: &[String]) -> Vec<Vec<String>> {
        self.all_pos_tags_k(tokens, DEFAULT_TAG_ROWS)
    }

    pub fn all_pos_tags_k(&self, tokens: &[String], k: usize) -> Vec<Vec<String>> {
        self.tagger.tag_k(k, tokens)
    }

    pub fn tagger(&self) -> &SequenceTagger {
        &self.tagger
    }
}
