use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use orion_error::StructError;
use tokio::sync::OnceCell;
use tracing::debug;

use tt_lang::ast::{ArgDef, ArgDirection, ClassDef, Dataset, FunctionDef, FunctionKind};
use tt_lang::{parse_class, parse_dataset};

use crate::cache::TtlCache;
use crate::error::{SchemaReason, SchemaResult};
use crate::provider::{MemoryProvider, SchemaProvider};

// ---------------------------------------------------------------------------
// SchemaResolver
// ---------------------------------------------------------------------------

type ClassCell = Arc<OnceCell<Arc<ClassDef>>>;

/// Process-wide schema service. Lookups are keyed by class kind; concurrent
/// requests for the same kind coalesce into a single provider call, and
/// successful responses live in a TTL cache. Failures are never cached.
pub struct SchemaResolver {
    provider: Box<dyn SchemaProvider>,
    memory: Option<Box<dyn MemoryProvider>>,
    ttl: Option<Duration>,
    cache: Mutex<TtlCache<String, Arc<ClassDef>>>,
    examples: Mutex<TtlCache<String, Arc<Dataset>>>,
    injected: Mutex<HashMap<String, Arc<ClassDef>>>,
    pending: Mutex<HashMap<String, ClassCell>>,
}

impl SchemaResolver {
    pub fn new(provider: Box<dyn SchemaProvider>, ttl: Option<Duration>) -> Self {
        SchemaResolver {
            provider,
            memory: None,
            ttl,
            cache: Mutex::new(TtlCache::new(ttl)),
            examples: Mutex::new(TtlCache::new(ttl)),
            injected: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_memory(mut self, memory: Box<dyn MemoryProvider>) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Override lookups for a kind with a pre-resolved class. Used by tests
    /// and by modules that ship their own class definitions.
    pub fn inject_class(&self, class: ClassDef) {
        let kind = class.kind.clone();
        self.injected
            .lock()
            .expect("injected lock poisoned")
            .insert(kind, Arc::new(Self::stamp(class)));
    }

    /// The flattened class for `kind`, with all `extends` parents merged in.
    pub async fn get_full_class(&self, kind: &str) -> SchemaResult<Arc<ClassDef>> {
        if let Some(class) = self.injected.lock().expect("injected lock poisoned").get(kind) {
            return Ok(class.clone());
        }
        if let Some(class) = self
            .cache
            .lock()
            .expect("cache lock poisoned")
            .get(&kind.to_string())
        {
            debug!(kind, "schema cache hit");
            return Ok(class.clone());
        }

        let cell: ClassCell = self
            .pending
            .lock()
            .expect("pending lock poisoned")
            .entry(kind.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        let result = cell
            .get_or_try_init(|| self.fetch_class(kind))
            .await
            .cloned();
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .remove(kind);
        result
    }

    async fn fetch_class(&self, kind: &str) -> SchemaResult<Arc<ClassDef>> {
        debug!(kind, "fetching schema from provider");
        let source = self
            .provider
            .get_schemas(&[kind.to_string()], true)
            .await
            .map_err(|e| {
                StructError::from(SchemaReason::UnknownKind).with_detail(format!("{kind}: {e}"))
            })?;
        let class = parse_class(&source).map_err(|e| {
            StructError::from(SchemaReason::BadClassSource).with_detail(format!("{kind}: {e}"))
        })?;
        let mut class = Self::stamp(class);

        // Merge inherited signatures, parents first so the child wins.
        for parent_kind in class.extends.clone() {
            let parent = Box::pin(self.get_full_class(&parent_kind)).await?;
            merge_parent(&mut class, &parent);
        }

        let class = Arc::new(class);
        self.cache
            .lock()
            .expect("cache lock poisoned")
            .set(kind.to_string(), class.clone(), self.ttl);
        Ok(class)
    }

    /// Recompute each function's owning kind so `qualified_name()` is always
    /// `kind.name` for the class it is reachable from.
    fn stamp(mut class: ClassDef) -> ClassDef {
        let kind = class.kind.clone();
        for f in class.queries.iter_mut().chain(class.actions.iter_mut()) {
            f.class_kind = kind.clone();
        }
        class
    }

    /// A single function signature. Stream lookups resolve monitorable
    /// queries.
    pub async fn get_function(
        &self,
        kind: &str,
        kind_of: FunctionKind,
        name: &str,
    ) -> SchemaResult<Arc<FunctionDef>> {
        let class = self.get_full_class(kind).await?;
        class
            .function(kind_of, name)
            .map(|f| Arc::new(f.clone()))
            .ok_or_else(|| {
                StructError::from(SchemaReason::UnknownFunction)
                    .with_detail(format!("{kind} has no {} `{name}`", kind_of.as_str()))
            })
    }

    /// Signature of an in-memory table.
    pub async fn get_memory_schema(&self, table: &str) -> SchemaResult<Arc<FunctionDef>> {
        let Some(memory) = &self.memory else {
            return Err(StructError::from(SchemaReason::UnknownKind)
                .with_detail("no memory provider configured"));
        };
        let schema = memory
            .get_schema(table, None)
            .await
            .map_err(|e| {
                StructError::from(SchemaReason::UnknownKind).with_detail(format!("{table}: {e}"))
            })?
            .ok_or_else(|| {
                StructError::from(SchemaReason::UnknownKind)
                    .with_detail(format!("no memory table `{table}`"))
            })?;

        let args = schema
            .args
            .into_iter()
            .zip(schema.types)
            .map(|(name, ty)| ArgDef::new(ArgDirection::Out, name, ty))
            .collect();
        let mut f = FunctionDef::new("memory", table, FunctionKind::Query, args);
        f.is_list = true;
        f.is_monitorable = true;
        Ok(Arc::new(f))
    }

    /// The dataset (examples) published for a kind.
    pub async fn get_examples(&self, kind: &str) -> SchemaResult<Arc<Dataset>> {
        if let Some(dataset) = self
            .examples
            .lock()
            .expect("examples lock poisoned")
            .get(&kind.to_string())
        {
            return Ok(dataset.clone());
        }
        let source = self
            .provider
            .get_examples_by_kind(kind)
            .await
            .map_err(|e| {
                StructError::from(SchemaReason::UnknownKind).with_detail(format!("{kind}: {e}"))
            })?;
        let dataset = Arc::new(parse_dataset(&source).map_err(|e| {
            StructError::from(SchemaReason::BadClassSource).with_detail(format!("{kind}: {e}"))
        })?);
        self.examples
            .lock()
            .expect("examples lock poisoned")
            .set(kind.to_string(), dataset.clone(), self.ttl);
        Ok(dataset)
    }
}

fn merge_parent(class: &mut ClassDef, parent: &ClassDef) {
    let kind = class.kind.clone();
    for q in &parent.queries {
        if class.query(&q.name).is_none() {
            let mut q = q.clone();
            q.class_kind = kind.clone();
            class.queries.push(q);
        }
    }
    for a in &parent.actions {
        if class.action(&a.name).is_none() {
            let mut a = a.clone();
            a.class_kind = kind.clone();
            class.actions.push(a);
        }
    }
}
