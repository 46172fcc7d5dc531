use async_trait::async_trait;

use tt_lang::ast::*;
use tt_lang::parse_program;
use tt_schema::provider::EntityTypeRecord;
use tt_schema::{SchemaProvider, SchemaResolver};

use crate::error::CompileResult;

use super::TypeChecker;

mod type_check;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// Provider that knows nothing; every class under test is injected.
struct NullProvider;

#[async_trait]
impl SchemaProvider for NullProvider {
    async fn get_schemas(&self, kinds: &[String], _use_meta: bool) -> anyhow::Result<String> {
        anyhow::bail!("no such kind: {}", kinds.join(","))
    }
    async fn get_device_code(&self, kind: &str) -> anyhow::Result<String> {
        anyhow::bail!("no such kind: {kind}")
    }
    async fn get_examples_by_kind(&self, kind: &str) -> anyhow::Result<String> {
        anyhow::bail!("no such kind: {kind}")
    }
    async fn get_all_entity_types(&self) -> anyhow::Result<Vec<EntityTypeRecord>> {
        Ok(vec![])
    }
}

pub(super) const TWITTER: &str = r#"class @com.twitter {
  monitorable list query home_timeline(out text : String, out author : Entity(tt:username), out hashtags : Array(String));
  action post(in req status : String);
}"#;

pub(super) const XKCD: &str = r#"class @com.xkcd {
  list query get_comic(in opt number : Number, out title : String, out link : Entity(tt:url));
}"#;

pub(super) const WEATHER: &str = r#"class @org.weather {
  monitorable list query current(in req location : Location, out temperature : Measure(C), out summary : String) #[minimal_projection=["temperature"]];
}"#;

pub(super) const CAMERA: &str = r#"class @security-camera {
  monitorable query current_event(out start_time : Date, out has_person : Boolean);
}"#;

pub(super) fn test_resolver(classes: &[&str]) -> SchemaResolver {
    let resolver = SchemaResolver::new(Box::new(NullProvider), None);
    for source in classes {
        resolver.inject_class(tt_lang::parse_class(source).unwrap());
    }
    resolver
}

pub(super) async fn check(source: &str, classes: &[&str]) -> CompileResult<Program> {
    let resolver = test_resolver(classes);
    let program = parse_program(source).unwrap_or_else(|e| panic!("parse failed: {e}"));
    TypeChecker::new(&resolver).check_program(&program).await
}

pub(super) fn check_ok(source: &str, classes: &[&str]) -> Program {
    futures_block(check(source, classes)).unwrap_or_else(|e| panic!("check failed: {e:?}"))
}

pub(super) fn check_err(source: &str, classes: &[&str], reason: &str) {
    let err = futures_block(check(source, classes))
        .expect_err(&format!("`{source}` should not type-check"));
    let debug = format!("{err:?}");
    assert!(
        debug.contains(reason),
        "expected {reason} for `{source}`, got: {debug}"
    );
}

/// Tiny current-thread executor so non-async tests can drive the checker.
pub(super) fn futures_block<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
        .block_on(fut)
}
