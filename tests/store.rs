use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use expvisor::store::{BlobStore, FsBlobStore, Scope, Store};
use expvisor::{
    Experiment, ExperimentError, Params, ParamsetContext, RunStatus, RunnerConfig, StoreError,
};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Checkpoint {
    epoch: u32,
    losses: Vec<f64>,
    tags: BTreeMap<String, String>,
}

#[tokio::test]
async fn values_survive_a_fresh_handle() {
    let dir = tempfile::tempdir().unwrap();
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(dir.path()));

    let checkpoint = Checkpoint {
        epoch: 3,
        losses: vec![0.9, 0.5, 0.25],
        tags: BTreeMap::from([("model".to_string(), "mlp".to_string())]),
    };

    let writer = Store::open(Arc::clone(&blobs), "v2", "lr-0.1");
    writer.set("checkpoint", &checkpoint).await.unwrap();
    assert_eq!(writer.get::<Checkpoint>("checkpoint").await.unwrap(), checkpoint);

    let reader = Store::open_read_only(Arc::clone(&blobs), "v2", "lr-0.1")
        .await
        .unwrap();
    assert_eq!(reader.get::<Checkpoint>("checkpoint").await.unwrap(), checkpoint);
    assert!(reader.contains("checkpoint").await.unwrap());
    assert!(!reader.contains("weights").await.unwrap());

    let on_disk = dir
        .path()
        .join("_cache")
        .join("v2")
        .join("lr-0.1")
        .join("checkpoint.bin");
    assert!(on_disk.exists());
}

#[tokio::test]
async fn scopes_are_isolated() {
    let dir = tempfile::tempdir().unwrap();
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(dir.path()));

    Store::open(Arc::clone(&blobs), "v1", "a")
        .set("n", &1)
        .await
        .unwrap();

    let other = Store::open(Arc::clone(&blobs), "v1", "b");
    let err = other.get::<i32>("n").await.unwrap_err();
    assert!(err.is_not_found());

    assert!(blobs.exists(&Scope::new("v1", "a")).await.unwrap());
    assert!(!blobs.exists(&Scope::new("v2", "a")).await.unwrap());
}

#[tokio::test]
async fn read_only_handles_reject_writes_and_missing_scopes() {
    let dir = tempfile::tempdir().unwrap();
    let blobs: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(dir.path()));

    let missing = Store::open_read_only(Arc::clone(&blobs), "v1", "nobody").await;
    assert!(matches!(missing, Err(StoreError::NoSuchScope { .. })));

    Store::open(Arc::clone(&blobs), "v1", "p").set("x", "hello").await.unwrap();
    let reader = Store::open_read_only(blobs, "v1", "p").await.unwrap();
    assert!(reader.is_read_only());
    let err = reader.set("x", "again").await.unwrap_err();
    assert_eq!(err.as_label(), "store_read_only");
    assert_eq!(reader.get::<String>("x").await.unwrap(), "hello");
}

#[tokio::test]
async fn second_run_reuses_cached_values() {
    let dir = tempfile::tempdir().unwrap();
    let computed = Arc::new(AtomicUsize::new(0));

    let build = |computed: Arc<AtomicUsize>| {
        Experiment::builder("store_resume")
            .version("v1")
            .paramsets([("small", json!({"n": 3})), ("large", json!({"n": 30}))])
            .function(move |ctx: ParamsetContext, params: Params| {
                let computed = Arc::clone(&computed);
                async move {
                    let store = Store::for_context(&ctx);
                    let total: u64 = match store.get("total").await {
                        Ok(total) => total,
                        Err(err) if err.is_not_found() => {
                            computed.fetch_add(1, Ordering::SeqCst);
                            let n: u64 = params.get("n")?;
                            let total = (1..=n).sum();
                            store.set("total", &total).await?;
                            total
                        }
                        Err(err) => return Err(err.into()),
                    };
                    Ok::<_, ExperimentError>(json!(total))
                }
            })
            .build()
            .unwrap()
    };

    let cfg = RunnerConfig {
        handle_signals: false,
        cache_dir: dir.path().to_path_buf(),
        ..RunnerConfig::default()
    };

    let first = build(Arc::clone(&computed)).run(cfg.clone()).await.unwrap();
    assert_eq!(first.status, RunStatus::Successful);
    assert_eq!(computed.load(Ordering::SeqCst), 2);

    let second = build(Arc::clone(&computed)).run(cfg).await.unwrap();
    assert_eq!(second.status, RunStatus::Successful);
    assert_eq!(computed.load(Ordering::SeqCst), 2);
    assert_eq!(second.results["small"], json!(6));
    assert_eq!(second.results["large"], json!(465));
}
