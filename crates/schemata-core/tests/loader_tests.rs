//! Asynchronous compilation with documents fetched on demand.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use schemata_core::{CompileAsyncError, DirLoader, Engine, LoadError, Loader, SchemaError};

fn person() -> Value {
    json!({
        "$id": "http://example.com/person.json",
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "age": { "$ref": "defs.json#/definitions/age" }
        }
    })
}

fn schema_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let defs = json!({
        "definitions": {
            "age": { "type": "integer", "minimum": 0 }
        }
    });
    std::fs::write(dir.path().join("defs.json"), defs.to_string()).expect("write defs");
    dir
}

#[tokio::test]
async fn missing_documents_are_loaded_from_disk() {
    let dir = schema_dir();
    let engine = Engine::default().with_loader(DirLoader::new(dir.path()));

    let validator = engine.compile_async(person()).await.expect("compiles");
    assert!(engine.has_schema("http://example.com/defs.json").expect("lookup"));
    assert!(validator.is_valid(&json!({ "name": "Ann", "age": 40 })).expect("check"));

    let result = validator.check(&json!({ "age": -1 })).expect("check");
    assert_eq!(result.errors().len(), 1);
    assert_eq!(result.errors()[0].instance_path, "/age");
    assert_eq!(result.errors()[0].schema_path, "#/definitions/age/minimum");

    // loaded documents serve plain compiles from now on
    engine.compile(person()).expect("sync compile");
}

#[tokio::test]
async fn absent_files_fail_the_load() {
    let dir = tempfile::tempdir().expect("tempdir");
    let engine = Engine::default().with_loader(DirLoader::new(dir.path()));

    let err = engine.compile_async(person()).await.unwrap_err();
    match err {
        CompileAsyncError::Load { uri, source } => {
            assert_eq!(uri, "http://example.com/defs.json");
            assert!(matches!(source.as_ref(), LoadError::NotFound(_)));
        }
        other => panic!("expected a load error, got {other:?}"),
    }
}

#[tokio::test]
async fn bad_pointers_into_loaded_documents_stay_missing() {
    let dir = schema_dir();
    let engine = Engine::default().with_loader(DirLoader::new(dir.path()));
    let schema = json!({
        "$id": "http://example.com/broken.json",
        "$ref": "defs.json#/definitions/nope"
    });

    let err = engine.compile_async(schema).await.unwrap_err();
    match err {
        CompileAsyncError::StillMissing { uri, missing_ref } => {
            assert_eq!(uri, "http://example.com/defs.json");
            assert_eq!(missing_ref, "http://example.com/defs.json#/definitions/nope");
        }
        other => panic!("expected an unresolved reference, got {other:?}"),
    }
}

#[tokio::test]
async fn without_a_loader_the_reference_is_missing() {
    let err = Engine::default().compile_async(person()).await.unwrap_err();
    assert!(matches!(
        err,
        CompileAsyncError::Schema(SchemaError::MissingSchema { ref missing_schema, .. })
            if missing_schema == "http://example.com/defs.json"
    ));
}

/// Serves one fixed document, slowly, counting requests.
struct Counting {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl Loader for Counting {
    async fn fetch(&self, uri: &str) -> Result<Value, LoadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        if uri != "http://example.com/defs.json" {
            return Err(LoadError::NotFound(uri.to_string()));
        }
        Ok(json!({ "definitions": { "age": { "type": "integer" } } }))
    }
}

#[tokio::test]
async fn concurrent_compiles_share_one_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = Engine::default().with_loader(Counting {
        calls: calls.clone(),
    });
    let other = json!({
        "$id": "http://example.com/other.json",
        "items": { "$ref": "defs.json#/definitions/age" }
    });

    let (a, b) = tokio::join!(engine.compile_async(person()), engine.compile_async(other));
    let (a, b) = (a.expect("person compiles"), b.expect("other compiles"));

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!a.is_valid(&json!({ "age": "old" })).expect("check"));
    assert!(b.is_valid(&json!([1, 2, 3])).expect("check"));
}
