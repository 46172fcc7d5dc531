//! Shared fixtures for the compiler and transform test suites.

use async_trait::async_trait;

use tt_lang::ast::Program;
use tt_lang::parse_program;
use tt_schema::provider::EntityTypeRecord;
use tt_schema::{SchemaProvider, SchemaResolver};

pub(crate) struct NullProvider;

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

pub(crate) const WEATHER: &str = r#"class @org.weather {
  monitorable list query current(in req location : Location, out temperature : Measure(C), out summary : String) #[minimal_projection=["temperature"]];
}"#;

pub(crate) const TWITTER: &str = r#"class @com.twitter {
  monitorable list query home_timeline(out text : String, out author : Entity(tt:username), out likes : Number);
  action post(in req status : String);
}"#;

pub(crate) const XKCD: &str = r#"class @com.xkcd {
  list query get_comic(in opt number : Number, out title : String, out link : Entity(tt:url));
}"#;

pub(crate) const CAMERA: &str = r#"class @security-camera {
  monitorable query current_event(out start_time : Date, out has_person : Boolean);
}"#;

pub(crate) fn test_resolver(classes: &[&str]) -> SchemaResolver {
    let resolver = SchemaResolver::new(Box::new(NullProvider), None);
    for source in classes {
        resolver.inject_class(tt_lang::parse_class(source).unwrap());
    }
    resolver
}

pub(crate) fn parse(source: &str) -> Program {
    parse_program(source).unwrap_or_else(|e| panic!("parse failed: {e}"))
}

pub(crate) fn block_on<F: std::future::Future>(fut: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap()
        .block_on(fut)
}
