//! # Cache de Modelos por Tarefa e Idioma
//!
//! Carregar um modelo é caro (leitura + desserialização de milhares de
//! pesos). O [`ModelCache`] garante que cada par (tarefa, idioma) seja
//! carregado **uma única vez** por processo, mesmo com várias threads pedindo
//! o mesmo modelo ao mesmo tempo:
//!
//! | Chave            | Modelo                  |
//! |------------------|-------------------------|
//! | `(Pos, "en")`    | etiquetador do inglês   |
//! | `(Lemma, "en")`  | lematizador do inglês   |
//!
//! - **Acerto**: leitura de um slot já inicializado, sem exclusão mútua.
//! - **Falha**: um mutex *por chave* serializa os carregadores daquela
//!   chave; quem esperava encontra o valor pronto. Outras chaves seguem em
//!   paralelo.
//! - **Erro de carga**: o slot continua vazio e a próxima chamada tenta de
//!   novo.
//!
//! O cache é um objeto de serviço explícito, compartilhado via `Arc`.

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use std::time::Instant;

use tracing::{info, warn};

use crate::error::{MorphoError, Result};
use crate::features::Task;
use crate::model::ModelArtifact;

/// Origem dos bytes de um modelo.
pub enum ModelSource {
    Path(PathBuf),
    Reader(Box<dyn Read + Send>),
}

impl fmt::Debug for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            ModelSource::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Path(path) => write!(f, "{}", path.display()),
            ModelSource::Reader(_) => f.write_str("<stream>"),
        }
    }
}

impl From<PathBuf> for ModelSource {
    fn from(path: PathBuf) -> Self {
        ModelSource::Path(path)
    }
}

#[derive(Default)]
struct Slot {
    value: OnceLock<Arc<ModelArtifact>>,
    loading: Mutex<()>,
}

type Key = (Task, String);

/// Registro de modelos carregados, chaveado por tarefa e código do idioma.
#[derive(Default)]
pub struct ModelCache {
    slots: RwLock<HashMap<Key, Arc<Slot>>>,
    loads: AtomicUsize,
}

impl fmt::Debug for ModelCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelCache")
            .field("languages", &self.languages())
            .field("loads", &self.load_count())
            .finish()
    }
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Modelo de `task` já carregado para `language`, se houver.
    pub fn get(&self, task: Task, language: &str) -> Option<Arc<ModelArtifact>> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(&(task, language.to_string()))
            .and_then(|slot| slot.value.get().cloned())
    }

    /// Idiomas com algum modelo carregado, em ordem alfabética e sem repetição.
    pub fn languages(&self) -> Vec<String> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        let mut languages: Vec<String> = slots
            .iter()
            .filter(|(_, slot)| slot.value.get().is_some())
            .map(|((_, language), _)| language.clone())
            .collect();
        languages.sort();
        languages.dedup();
        languages
    }

    /// Quantas cargas bem-sucedidas aconteceram (com ou sem cache).
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Obtém o modelo de `task` para `language`.
    ///
    /// Com `use_cache`, devolve o modelo registrado ou carrega de `source`
    /// uma única vez. Sem `use_cache`, sempre carrega de `source` e não toca
    /// no registro. Um artefato de outra tarefa é rejeitado antes de ser
    /// registrado.
    pub fn acquire(
        &self,
        task: Task,
        language: &str,
        source: Option<ModelSource>,
        use_cache: bool,
    ) -> Result<Arc<ModelArtifact>> {
        if !use_cache {
            let source = source.ok_or(MorphoError::MissingProperty("model"))?;
            return self.load(task, language, source).map(Arc::new);
        }
        self.get_or_load(task, language, || {
            let source = source.ok_or(MorphoError::MissingProperty("model"))?;
            self.load(task, language, source)
        })
    }

    /// Devolve o valor do slot ou executa `loader` com exclusão por chave.
    pub fn get_or_load<F>(
        &self,
        task: Task,
        language: &str,
        loader: F,
    ) -> Result<Arc<ModelArtifact>>
    where
        F: FnOnce() -> Result<ModelArtifact>,
    {
        let slot = self.slot(task, language);
        if let Some(model) = slot.value.get() {
            return Ok(Arc::clone(model));
        }

        let _guard = slot.loading.lock().unwrap_or_else(PoisonError::into_inner);
        // Outro carregador pode ter terminado enquanto esperávamos
        if let Some(model) = slot.value.get() {
            return Ok(Arc::clone(model));
        }

        let model = Arc::new(loader()?);
        Ok(Arc::clone(slot.value.get_or_init(|| model)))
    }

    fn slot(&self, task: Task, language: &str) -> Arc<Slot> {
        let key = (task, language.to_string());
        {
            let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(slot) = slots.get(&key) {
                return Arc::clone(slot);
            }
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key).or_default())
    }

    fn load(&self, task: Task, language: &str, source: ModelSource) -> Result<ModelArtifact> {
        let start = Instant::now();
        let description = source.to_string();

        let artifact = match source {
            ModelSource::Path(path) => ModelArtifact::from_path(path),
            ModelSource::Reader(reader) => ModelArtifact::from_reader(reader),
        }
        .map_err(|e| match e {
            MorphoError::Json(e) => {
                MorphoError::invalid_model(language, format!("{description}: {e}"))
            }
            MorphoError::Io(e) => {
                MorphoError::invalid_model(language, format!("{description}: {e}"))
            }
            other => other,
        })?;
        artifact.expect_task(task).map_err(|e| match e {
            MorphoError::InvalidModel { language, msg } => MorphoError::InvalidModel {
                language,
                msg: format!("{description}: {msg}"),
            },
            other => other,
        })?;

        if artifact.language != language {
            warn!(
                requested = language,
                found = %artifact.language,
                source = %description,
                "model language differs from requested language"
            );
        }

        self.loads.fetch_add(1, Ordering::SeqCst);
        info!(
            language,
            task = artifact.task.name(),
            source = %description,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "model loaded"
        );
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use crate::features::ContextGenerator;
    use crate::maxent::MaxEntModel;
    use crate::model::{Event, ScoringModel};
    use crate::validator::SequenceValidator;

    fn artifact_json(task: Task, language: &str) -> Vec<u8> {
        let events = vec![Event {
            outcome: "=".into(),
            context: vec!["bias".into()],
        }];
        let artifact = ModelArtifact {
            language: language.into(),
            task,
            manifest: BTreeMap::new(),
            context_generator: ContextGenerator::for_task(task),
            validator: SequenceValidator::Any,
            model: ScoringModel::MaxEnt(MaxEntModel::train(&events, 1, 0.1, 0.0)),
        };
        let mut buf = Vec::new();
        artifact.save(&mut buf).unwrap();
        buf
    }

    fn reader(task: Task, language: &str) -> Option<ModelSource> {
        Some(ModelSource::Reader(Box::new(std::io::Cursor::new(
            artifact_json(task, language),
        ))))
    }

    #[test]
    fn test_hit_returns_same_arc() {
        let cache = ModelCache::new();
        let first = cache.acquire(Task::Lemma, "en", reader(Task::Lemma, "en"), true).unwrap();
        let second = cache.acquire(Task::Lemma, "en", None, true).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.load_count(), 1);
        assert_eq!(cache.languages(), ["en"]);
    }

    #[test]
    fn test_bypass_does_not_register() {
        let cache = ModelCache::new();
        let model = cache.acquire(Task::Lemma, "pt", reader(Task::Lemma, "pt"), false).unwrap();
        assert_eq!(model.language, "pt");
        assert!(cache.get(Task::Lemma, "pt").is_none());
    }

    #[test]
    fn test_failed_load_leaves_slot_empty() {
        let cache = ModelCache::new();
        let broken = Some(ModelSource::Reader(Box::new(std::io::Cursor::new(
            b"{not json".to_vec(),
        ))));
        let err = cache.acquire(Task::Lemma, "de", broken, true).unwrap_err();
        assert!(matches!(err, MorphoError::InvalidModel { ref language, .. } if language == "de"));

        let model = cache.acquire(Task::Lemma, "de", reader(Task::Lemma, "de"), true).unwrap();
        assert_eq!(model.language, "de");
    }

    #[test]
    fn test_missing_source() {
        let cache = ModelCache::new();
        assert!(matches!(
            cache.acquire(Task::Pos, "es", None, true),
            Err(MorphoError::MissingProperty("model"))
        ));
    }

    #[test]
    fn test_tasks_share_language_without_colliding() {
        let cache = ModelCache::new();
        let pos = cache.acquire(Task::Pos, "en", reader(Task::Pos, "en"), true).unwrap();
        let lemma = cache.acquire(Task::Lemma, "en", reader(Task::Lemma, "en"), true).unwrap();

        assert_eq!(pos.task, Task::Pos);
        assert_eq!(lemma.task, Task::Lemma);
        assert_eq!(cache.load_count(), 2);
        assert_eq!(cache.languages(), ["en"]);
        assert!(Arc::ptr_eq(&cache.get(Task::Pos, "en").unwrap(), &pos));
        assert!(Arc::ptr_eq(&cache.get(Task::Lemma, "en").unwrap(), &lemma));
    }

    #[test]
    fn test_wrong_task_is_not_registered() {
        let cache = ModelCache::new();
        let err = cache
            .acquire(Task::Pos, "en", reader(Task::Lemma, "en"), true)
            .unwrap_err();
        assert!(matches!(err, MorphoError::InvalidModel { .. }));
        assert!(cache.get(Task::Pos, "en").is_none());
        assert_eq!(cache.load_count(), 0);

        let pos = cache.acquire(Task::Pos, "en", reader(Task::Pos, "en"), true).unwrap();
        assert_eq!(pos.task, Task::Pos);
    }
}
