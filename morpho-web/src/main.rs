//! Servidor HTTP Axum para etiquetagem e lematização
//!
//! Rotas:
//! - `GET  /health`: idiomas carregados e número de cargas de modelo
//! - `POST /tag`: tokens → morfemas com tags
//! - `POST /lemmatize`: tokens (+ tags opcionais) → morfemas com lemas
//! - `POST /lemmatize/multiple`: tokens (+ etiquetagens alternativas) → `tag#lema` por token
//!
//! Configuração por ambiente:
//! - `MORPHO_CONFIG`: arquivo JSON com os modelos a carregar
//! - `MORPHO_ADDR`: endereço de escuta (padrão `0.0.0.0:3000`)

use std::collections::HashMap;
use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use morpho_core::{
    AnnotatorConfig, LemmaMap, ModelCache, Morpheme, MorphoError, StatisticalLemmatizer,
    StatisticalTagger,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const DEFAULT_ADDR: &str = "0.0.0.0:3000";

/// Modelos carregados na inicialização.
#[derive(Debug, Default, Deserialize)]
struct ServerConfig {
    #[serde(default)]
    taggers: Vec<AnnotatorConfig>,
    #[serde(default)]
    lemmatizers: Vec<AnnotatorConfig>,
}

impl ServerConfig {
    fn from_env() -> Result<Self, Box<dyn Error>> {
        match std::env::var("MORPHO_CONFIG") {
            Ok(path) => {
                let file = File::open(&path).map_err(|e| format!("{path}: {e}"))?;
                Ok(serde_json::from_reader(BufReader::new(file))?)
            }
            Err(_) => Ok(Self::default()),
        }
    }
}

/// Estado compartilhado da aplicação
struct AppState {
    cache: Arc<ModelCache>,
    taggers: HashMap<String, Arc<StatisticalTagger>>,
    lemmatizers: HashMap<String, Arc<StatisticalLemmatizer>>,
}

impl AppState {
    fn load(config: &ServerConfig, cache: Arc<ModelCache>) -> Result<Self, MorphoError> {
        let mut taggers = HashMap::new();
        for annotator in &config.taggers {
            let tagger = StatisticalTagger::new(annotator, &cache)?;
            taggers.insert(annotator.language()?.to_string(), Arc::new(tagger));
        }
        let mut lemmatizers = HashMap::new();
        for annotator in &config.lemmatizers {
            let lemmatizer = StatisticalLemmatizer::new(annotator, &cache)?;
            lemmatizers.insert(annotator.language()?.to_string(), Arc::new(lemmatizer));
        }
        Ok(Self {
            cache,
            taggers,
            lemmatizers,
        })
    }

    fn tagger(&self, language: &str) -> Result<Arc<StatisticalTagger>, ApiError> {
        self.taggers
            .get(language)
            .cloned()
            .ok_or_else(|| ApiError::UnknownLanguage(format!("no tagger for '{language}'")))
    }

    fn lemmatizer(&self, language: &str) -> Result<Arc<StatisticalLemmatizer>, ApiError> {
        self.lemmatizers
            .get(language)
            .cloned()
            .ok_or_else(|| ApiError::UnknownLanguage(format!("no lemmatizer for '{language}'")))
    }
}

enum ApiError {
    BadRequest(String),
    UnknownLanguage(String),
    Internal(String),
}

impl From<MorphoError> for ApiError {
    fn from(err: MorphoError) -> Self {
        match err {
            MorphoError::InvalidSample(msg) => ApiError::BadRequest(msg),
            other => {
                error!("annotation failed: {other}");
                ApiError::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::UnknownLanguage(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({ "error": msg }))).into_response()
    }
}

#[derive(Deserialize)]
struct TagRequest {
    language: String,
    tokens: Vec<String>,
    /// Também devolve até `k` etiquetagens alternativas.
    #[serde(default)]
    k: Option<usize>,
}

#[derive(Serialize)]
struct TagResponse {
    morphemes: Vec<Morpheme>,
    #[serde(skip_serializing_if = "Option::is_none")]
    alternatives: Option<Vec<Vec<String>>>,
    processing_ms: u64,
}

#[derive(Deserialize)]
struct LemmatizeRequest {
    language: String,
    tokens: Vec<String>,
    /// Sem tags, a sentença é etiquetada antes.
    #[serde(default)]
    tags: Option<Vec<String>>,
}

#[derive(Serialize)]
struct LemmatizeResponse {
    morphemes: Vec<Morpheme>,
    processing_ms: u64,
}

#[derive(Deserialize)]
struct MultipleLemmasRequest {
    language: String,
    tokens: Vec<String>,
    #[serde(default)]
    tag_rows: Option<Vec<Vec<String>>>,
}

#[derive(Serialize)]
struct MultipleLemmasResponse {
    lemmas: LemmaMap,
    processing_ms: u64,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    taggers: Vec<String>,
    lemmatizers: Vec<String>,
    model_loads: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env()?;
    let cache = Arc::new(ModelCache::new());
    let state = Arc::new(AppState::load(&config, cache)?);
    info!(
        taggers = state.taggers.len(),
        lemmatizers = state.lemmatizers.len(),
        "models ready"
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/tag", post(tag_handler))
        .route("/lemmatize", post(lemmatize_handler))
        .route("/lemmatize/multiple", post(multiple_lemmas_handler))
        .layer(cors)
        .with_state(state);

    let addr = std::env::var("MORPHO_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Servidor morpho iniciado em http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut taggers: Vec<String> = state.taggers.keys().cloned().collect();
    let mut lemmatizers: Vec<String> = state.lemmatizers.keys().cloned().collect();
    taggers.sort();
    lemmatizers.sort();
    Json(HealthResponse {
        status: "ok",
        taggers,
        lemmatizers,
        model_loads: state.cache.load_count(),
    })
}

async fn tag_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TagRequest>,
) -> Result<Json<TagResponse>, ApiError> {
    check_tokens(&req.tokens)?;
    let tagger = state.tagger(&req.language)?;

    run_blocking(move || {
        let start = Instant::now();
        let morphemes = tagger.morphemes(&req.tokens);
        let alternatives = req.k.map(|k| tagger.all_pos_tags_k(&req.tokens, k));
        TagResponse {
            morphemes,
            alternatives,
            processing_ms: start.elapsed().as_millis() as u64,
        }
    })
    .await
    .map(Json)
}

async fn lemmatize_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LemmatizeRequest>,
) -> Result<Json<LemmatizeResponse>, ApiError> {
    check_tokens(&req.tokens)?;
    let lemmatizer = state.lemmatizer(&req.language)?;
    let tagger = match &req.tags {
        Some(tags) => {
            check_aligned(&req.tokens, tags)?;
            None
        }
        None => Some(state.tagger(&req.language)?),
    };

    run_blocking(move || -> Result<LemmatizeResponse, ApiError> {
        let start = Instant::now();
        let tags = match (req.tags, tagger) {
            (Some(tags), _) => tags,
            (None, Some(tagger)) => tagger.pos_annotate(&req.tokens),
            (None, None) => Vec::new(),
        };
        Ok(LemmatizeResponse {
            morphemes: lemmatizer.morphemes(&req.tokens, &tags)?,
            processing_ms: start.elapsed().as_millis() as u64,
        })
    })
    .await?
    .map(Json)
}

async fn multiple_lemmas_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MultipleLemmasRequest>,
) -> Result<Json<MultipleLemmasResponse>, ApiError> {
    check_tokens(&req.tokens)?;
    let lemmatizer = state.lemmatizer(&req.language)?;
    let tagger = match &req.tag_rows {
        Some(rows) => {
            for row in rows {
                check_aligned(&req.tokens, row)?;
            }
            None
        }
        None => Some(state.tagger(&req.language)?),
    };

    run_blocking(move || -> Result<MultipleLemmasResponse, ApiError> {
        let start = Instant::now();
        let rows = match (req.tag_rows, tagger) {
            (Some(rows), _) => rows,
            (None, Some(tagger)) => tagger.all_pos_tags(&req.tokens),
            (None, None) => Vec::new(),
        };
        Ok(MultipleLemmasResponse {
            lemmas: lemmatizer.multiple_lemmas(&req.tokens, &rows)?,
            processing_ms: start.elapsed().as_millis() as u64,
        })
    })
    .await?
    .map(Json)
}

/// Executa a decodificação (CPU) fora do runtime assíncrono.
async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("annotation task failed: {e}");
        ApiError::Internal("annotation failed".to_string())
    })
}

fn check_tokens(tokens: &[String]) -> Result<(), ApiError> {
    if tokens.is_empty() {
        return Err(ApiError::BadRequest("empty token list".to_string()));
    }
    Ok(())
}

fn check_aligned(tokens: &[String], tags: &[String]) -> Result<(), ApiError> {
    if tokens.len() != tags.len() {
        return Err(ApiError::BadRequest(format!(
            "{} tokens but {} tags",
            tokens.len(),
            tags.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use morpho_core::trainer::{self, ModelFactory, TrainingParameters};
    use morpho_core::{Sample, Task};

    #[test]
    fn test_server_config_parses_annotators() {
        let json = r#"{
            "taggers": [{"language": "en", "model": "models/en-pos.json"}],
            "lemmatizers": [{"language": "en", "model": "models/en-lemma.json", "use_model_cache": false}]
        }"#;
        let config: ServerConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.taggers.len(), 1);
        assert!(config.taggers[0].use_model_cache);
        assert!(!config.lemmatizers[0].use_model_cache);
    }

    #[test]
    fn test_empty_config_loads_nothing() {
        let state = AppState::load(&ServerConfig::default(), Arc::new(ModelCache::new())).unwrap();
        assert!(state.taggers.is_empty());
        assert!(state.lemmatizer("en").is_err());
    }

    #[test]
    fn test_tagger_and_lemmatizer_share_language() {
        let sample = Sample::from_lemmas(
            vec!["dogs".into(), "bark".into()],
            vec!["NOUN".into(), "VERB".into()],
            vec!["dog".into(), "bark".into()],
        )
        .unwrap();
        let params = TrainingParameters::new().set("Iterations", 2).set("Cutoff", 0);
        let dir = std::env::temp_dir();
        let mut config = ServerConfig::default();
        let mut paths = Vec::new();
        for task in [Task::Pos, Task::Lemma] {
            let artifact =
                trainer::train("en", &[sample.clone()], &params, &ModelFactory::new(task)).unwrap();
            let name = format!("morpho-web-{}-en-{}.json", std::process::id(), task.name());
            let path = dir.join(name);
            artifact.save_to_path(&path).unwrap();
            let annotator = AnnotatorConfig::new("en").with_model(&path);
            match task {
                Task::Pos => config.taggers.push(annotator),
                Task::Lemma => config.lemmatizers.push(annotator),
            }
            paths.push(path);
        }

        let cache = Arc::new(ModelCache::new());
        let state = AppState::load(&config, Arc::clone(&cache));
        for path in paths {
            std::fs::remove_file(path).ok();
        }

        let state = state.unwrap();
        assert!(state.tagger("en").is_ok());
        assert!(state.lemmatizer("en").is_ok());
        assert_eq!(cache.load_count(), 2);
    }

    #[test]
    fn test_misaligned_input_is_bad_request() {
        let err = ApiError::from(MorphoError::InvalidSample("2 tokens, 1 tags".into()));
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_request_checks() {
        let tokens = vec!["run".to_string()];
        assert!(check_tokens(&[]).is_err());
        assert!(check_aligned(&tokens, &["VERB".to_string()]).is_ok());
        assert!(check_aligned(&tokens, &[]).is_err());
    }
}
