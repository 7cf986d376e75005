use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use morpho_core::corpus::Sample;
use morpho_core::trainer::{self, ModelFactory, TrainingParameters};
use morpho_core::{ModelArtifact, ModelCache, ModelSource, MorphoError, Task};

const THREADS: usize = 8;

fn artifact(language: &str) -> ModelArtifact {
    let sample = Sample::from_lemmas(
        vec!["dogs".into(), "bark".into()],
        vec!["NOUN".into(), "VERB".into()],
        vec!["dog".into(), "bark".into()],
    )
    .unwrap();
    let params = TrainingParameters::new().set("Iterations", 2).set("Cutoff", 0);
    trainer::train(language, &[sample], &params, &ModelFactory::new(Task::Lemma)).unwrap()
}

fn model_file(language: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let path = std::env::temp_dir().join(format!(
        "morpho-cache-{}-{nanos}-{language}.json",
        std::process::id()
    ));
    artifact(language).save_to_path(&path).unwrap();
    path
}

#[test]
fn concurrent_first_requests_load_once() {
    let path = model_file("en");
    let cache = Arc::new(ModelCache::new());
    let barrier = Arc::new(Barrier::new(THREADS));

    let models: Vec<Arc<ModelArtifact>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let barrier = Arc::clone(&barrier);
                let path = path.clone();
                scope.spawn(move || {
                    barrier.wait();
                    cache
                        .acquire(Task::Lemma, "en", Some(ModelSource::Path(path)), true)
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(cache.load_count(), 1);
    assert!(models.iter().all(|m| Arc::ptr_eq(m, &models[0])));
    std::fs::remove_file(path).ok();
}

#[test]
fn slow_loader_runs_once_per_key() {
    let cache = ModelCache::new();
    let calls = AtomicUsize::new(0);
    let barrier = Barrier::new(THREADS);

    thread::scope(|scope| {
        for i in 0..THREADS {
            let (cache, calls, barrier) = (&cache, &calls, &barrier);
            // Metade das threads pede "en", metade pede "pt"
            let language = if i % 2 == 0 { "en" } else { "pt" };
            scope.spawn(move || {
                barrier.wait();
                cache
                    .get_or_load(Task::Lemma, language, || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        Ok(artifact(language))
                    })
                    .unwrap();
            });
        }
    });

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.languages(), ["en", "pt"]);
}

#[test]
fn failed_load_does_not_poison() {
    let cache = ModelCache::new();
    let missing = PathBuf::from("/nonexistent/de-lemma.json");
    let err = cache
        .acquire(Task::Lemma, "de", Some(ModelSource::Path(missing)), true)
        .unwrap_err();
    assert!(matches!(err, MorphoError::ModelNotFound { .. }));
    assert!(cache.get(Task::Lemma, "de").is_none());

    let path = model_file("de");
    let model = cache
        .acquire(Task::Lemma, "de", Some(ModelSource::Path(path.clone())), true)
        .unwrap();
    assert_eq!(model.language, "de");
    assert_eq!(cache.load_count(), 1);
    std::fs::remove_file(path).ok();
}

#[test]
fn bypass_loads_every_time() {
    let path = model_file("eu");
    let cache = ModelCache::new();
    let a = cache
        .acquire(Task::Lemma, "eu", Some(ModelSource::Path(path.clone())), false)
        .unwrap();
    let b = cache
        .acquire(Task::Lemma, "eu", Some(ModelSource::Path(path.clone())), false)
        .unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(cache.load_count(), 2);
    assert!(cache.languages().is_empty());

    let manifest: &BTreeMap<String, String> = &a.manifest;
    assert_eq!(manifest.get("BeamSize").map(String::as_str), Some("3"));
    std::fs::remove_file(path).ok();
}
