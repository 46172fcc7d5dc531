use async_trait::async_trait;

use tt_lang::ast::Type;

// ---------------------------------------------------------------------------
// Upstream metadata source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct EntityTypeRecord {
    pub ty: String,
    pub subtype_of: Option<String>,
}

/// The upstream registry the resolver fetches from. Implementations talk to
/// the network (or a test fixture); all methods may suspend.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Source text of the class definitions for `kinds`. `use_meta` asks
    /// for natural-language metadata to be included.
    async fn get_schemas(&self, kinds: &[String], use_meta: bool) -> anyhow::Result<String>;

    /// Full source of one device class, including implementation annotations.
    async fn get_device_code(&self, kind: &str) -> anyhow::Result<String>;

    /// Dataset source text for one kind.
    async fn get_examples_by_kind(&self, kind: &str) -> anyhow::Result<String>;

    async fn get_all_entity_types(&self) -> anyhow::Result<Vec<EntityTypeRecord>>;
}

// ---------------------------------------------------------------------------
// In-memory tables
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct MemorySchema {
    pub args: Vec<String>,
    pub types: Vec<Type>,
}

/// Schema source for in-memory tables (`get_memory_schema`).
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    async fn get_schema(
        &self,
        table: &str,
        principal: Option<&str>,
    ) -> anyhow::Result<Option<MemorySchema>>;
}
