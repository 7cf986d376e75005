//! Unidade de saída dos anotadores: forma da palavra, tag e lema.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Morpheme {
    pub word: String,
    pub tag: String,
    /// Ausente quando só a etiquetagem foi feita.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lemma: Option<String>,
}

/// Cria os [`Morpheme`]s devolvidos pelos anotadores.
///
/// Permite que quem consome a biblioteca normalize ou enriqueça a saída
/// (ex: mapear tags para outro tagset) sem reescrever o pipeline.
pub trait MorphemeFactory: Send + Sync {
    fn create_morpheme(&self, word: &str, tag: &str, lemma: Option<&str>) -> Morpheme;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultMorphemeFactory;

impl MorphemeFactory for DefaultMorphemeFactory {
    fn create_morpheme(&self, word: &str, tag: &str, lemma: Option<&str>) -> Morpheme {
        Morpheme {
            word: word.to_string(),
            tag: tag.to_string(),
            lemma: lemma.map(str::to_string),
        }
    }
}
