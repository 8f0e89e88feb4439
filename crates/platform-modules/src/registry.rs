//! Module registry
//!
//! The registry is the canonical, tenant-independent catalog of modules and
//! their dependency edges. The lifecycle manager only reads from it; the
//! write side ([`MemoryModuleRegistry::register`] and friends) is for
//! platform operators.
//!
//! Every catalog write bumps [`ModuleRegistry::revision`], which callers
//! caching registry reads can compare against to invalidate.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{ModuleError, ModuleResult};
use crate::graph::{self, Cycle};
use crate::module::{Module, ModuleDependency};

/// Read contract of the module catalog.
#[async_trait]
pub trait ModuleRegistry: Send + Sync {
    /// Active modules, ordered by category then name.
    async fn list_available(&self) -> ModuleResult<Vec<Module>>;

    /// An active module.
    ///
    /// Fails with `ModuleNotFound` if the module does not exist or has
    /// been retired.
    async fn get(&self, module_id: Uuid) -> ModuleResult<Module>;

    /// Any module, retired ones included.
    async fn find(&self, module_id: Uuid) -> ModuleResult<Option<Module>>;

    /// Edges out of `module_id`.
    async fn list_dependencies(&self, module_id: Uuid) -> ModuleResult<Vec<ModuleDependency>>;

    /// Edges into `module_id`.
    async fn list_dependents(&self, module_id: Uuid) -> ModuleResult<Vec<ModuleDependency>>;

    /// Every edge in the catalog.
    async fn list_edges(&self) -> ModuleResult<Vec<ModuleDependency>>;

    /// Monotonic catalog revision.
    fn revision(&self) -> u64;
}

/// Human-readable name for a module, falling back to its id.
///
/// Used when building error messages; a failed lookup never hides the
/// original error.
pub async fn module_name(registry: &dyn ModuleRegistry, module_id: Uuid) -> String {
    match registry.find(module_id).await {
        Ok(Some(module)) => module.name,
        Ok(None) => module_id.to_string(),
        Err(e) => {
            tracing::debug!(module_id = %module_id, error = %e, "Module name lookup failed");
            module_id.to_string()
        }
    }
}

#[derive(Debug, Default)]
struct Catalog {
    modules: HashMap<Uuid, Module>,
    edges: Vec<ModuleDependency>,
}

impl Catalog {
    fn name_of(&self, module_id: Uuid) -> String {
        self.modules
            .get(&module_id)
            .map(|m| m.name.clone())
            .unwrap_or_else(|| module_id.to_string())
    }

    fn refresh_dependency_names(&mut self, module_id: Uuid) {
        let names: Vec<String> = self
            .edges
            .iter()
            .filter(|e| e.module_id == module_id && e.is_dependency())
            .map(|e| self.name_of(e.depends_on_id))
            .collect();
        if let Some(module) = self.modules.get_mut(&module_id) {
            module.dependencies = names;
            module.updated_at = Utc::now();
        }
    }
}

/// In-memory module catalog.
///
/// Rejects dependency cycles at write time, so the evaluator never has to
/// reason about two modules blocking each other.
#[derive(Debug, Default)]
pub struct MemoryModuleRegistry {
    catalog: RwLock<Catalog>,
    revision: AtomicU64,
}

impl MemoryModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::Release);
    }

    /// Add a module to the catalog.
    ///
    /// The module's `dependencies` list is owned by the registry and is
    /// reset here; declare edges with [`add_dependency`](Self::add_dependency).
    pub async fn register(&self, mut module: Module) -> ModuleResult<Module> {
        if module.name.trim().is_empty() {
            return Err(ModuleError::InvalidModule(
                "module name must not be empty".to_string(),
            ));
        }

        let mut catalog = self.catalog.write().await;
        if catalog.modules.values().any(|m| m.name == module.name) {
            return Err(ModuleError::DuplicateModule(module.name));
        }
        if catalog.modules.contains_key(&module.id) {
            return Err(ModuleError::InvalidModule(format!(
                "module id {} already registered",
                module.id
            )));
        }

        module.dependencies.clear();
        catalog.modules.insert(module.id, module.clone());
        self.bump();

        tracing::info!(module_id = %module.id, module = %module.name, "Module registered");
        Ok(module)
    }

    /// Declare a catalog edge.
    ///
    /// Both endpoints must exist and differ, the pair must not already have
    /// an edge, and a dependency edge must not close a cycle.
    pub async fn add_dependency(&self, edge: ModuleDependency) -> ModuleResult<()> {
        let mut catalog = self.catalog.write().await;

        for endpoint in [edge.module_id, edge.depends_on_id] {
            if !catalog.modules.contains_key(&endpoint) {
                return Err(ModuleError::InvalidModule(format!(
                    "unknown module {endpoint}"
                )));
            }
        }
        if edge.module_id == edge.depends_on_id {
            return Err(ModuleError::InvalidModule(format!(
                "module {} cannot reference itself",
                catalog.name_of(edge.module_id)
            )));
        }
        if catalog
            .edges
            .iter()
            .any(|e| e.module_id == edge.module_id && e.depends_on_id == edge.depends_on_id)
        {
            return Err(ModuleError::InvalidModule(format!(
                "edge {} -> {} already declared",
                catalog.name_of(edge.module_id),
                catalog.name_of(edge.depends_on_id)
            )));
        }
        if let Some(Cycle(path)) = graph::cycle_with(&catalog.edges, &edge) {
            let names = path.into_iter().map(|id| catalog.name_of(id)).collect();
            return Err(ModuleError::DependencyCycle(names));
        }

        let module_id = edge.module_id;
        catalog.edges.push(edge);
        catalog.refresh_dependency_names(module_id);
        self.bump();
        Ok(())
    }

    /// Retire a module. Existing installations keep referencing it.
    pub async fn retire(&self, module_id: Uuid) -> ModuleResult<()> {
        let mut catalog = self.catalog.write().await;
        let module = catalog
            .modules
            .get_mut(&module_id)
            .ok_or_else(|| ModuleError::ModuleNotFound(module_id.to_string()))?;
        module.is_active = false;
        module.updated_at = Utc::now();
        tracing::info!(module_id = %module_id, module = %module.name, "Module retired");
        self.bump();
        Ok(())
    }
}

#[async_trait]
impl ModuleRegistry for MemoryModuleRegistry {
    async fn list_available(&self) -> ModuleResult<Vec<Module>> {
        let catalog = self.catalog.read().await;
        let mut modules: Vec<Module> = catalog
            .modules
            .values()
            .filter(|m| m.is_active)
            .cloned()
            .collect();
        modules.sort_by(|a, b| a.category.cmp(&b.category).then_with(|| a.name.cmp(&b.name)));
        Ok(modules)
    }

    async fn get(&self, module_id: Uuid) -> ModuleResult<Module> {
        let catalog = self.catalog.read().await;
        match catalog.modules.get(&module_id) {
            Some(module) if module.is_active => Ok(module.clone()),
            Some(module) => Err(ModuleError::ModuleNotFound(module.name.clone())),
            None => Err(ModuleError::ModuleNotFound(module_id.to_string())),
        }
    }

    async fn find(&self, module_id: Uuid) -> ModuleResult<Option<Module>> {
        Ok(self.catalog.read().await.modules.get(&module_id).cloned())
    }

    async fn list_dependencies(&self, module_id: Uuid) -> ModuleResult<Vec<ModuleDependency>> {
        let catalog = self.catalog.read().await;
        Ok(catalog
            .edges
            .iter()
            .filter(|e| e.module_id == module_id)
            .cloned()
            .collect())
    }

    async fn list_dependents(&self, module_id: Uuid) -> ModuleResult<Vec<ModuleDependency>> {
        let catalog = self.catalog.read().await;
        Ok(catalog
            .edges
            .iter()
            .filter(|e| e.depends_on_id == module_id)
            .cloned()
            .collect())
    }

    async fn list_edges(&self) -> ModuleResult<Vec<ModuleDependency>> {
        Ok(self.catalog.read().await.edges.clone())
    }

    fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }
}
