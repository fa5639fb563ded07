//! The loader: turns a requested artifact name into a loaded [`Plugin`].
//!
//! # Load sequence
//!
//! ```text
//! resolve identity ─▶ registry.find_or_reserve ─┬─ Existing ─▶ wait for outcome
//!                                               └─ Reserved ─▶ map artifact
//!                                                              ─▶ module-init
//!                                                              ─▶ run <module>.init (optional)
//!                                                              ─▶ resolve <module>.<symbol>
//!                                                              ─▶ registry.publish
//! ```
//!
//! Only the reserving caller performs native calls. Every outcome, including
//! failure and a panic inside the load, is published so waiters never hang on
//! an abandoned record. A mapped artifact stays with its record either way.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use crate::config::LoaderConfig;
use crate::error::{PluginError, Result};
use crate::module::{DescriptorModuleInit, ModuleInit};
use crate::native::{LibloadingLoader, MappedArtifact, NativeLoader};
use crate::path::{CanonicalPathResolver, LiteralPathResolver, PathResolver};
use crate::plugin::Plugin;
use crate::registry::{PluginRecord, PluginRegistry, Reservation};
use crate::symbol::{Symbol, SymbolTable};

/// Opens plugin artifacts through a shared [`PluginRegistry`].
pub struct Loader {
    registry: Arc<PluginRegistry>,
    native: Arc<dyn NativeLoader>,
    module_init: Arc<dyn ModuleInit>,
    resolver: Arc<dyn PathResolver>,
    config: LoaderConfig,
}

impl Loader {
    pub fn builder() -> LoaderBuilder {
        LoaderBuilder::default()
    }

    /// Native loader on the process-wide registry.
    pub fn from_config(config: LoaderConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn registry(&self) -> &Arc<PluginRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Open the artifact `name`, loading it if no caller has yet.
    ///
    /// Concurrent and repeated calls for the same identity share one load and
    /// one outcome. A failed identity is never retried.
    pub fn open(&self, name: &str) -> Result<Plugin> {
        let display_name = self.config.display_name(name);
        let identity = self
            .resolver
            .resolve(name)
            .map_err(|reason| PluginError::PathResolution {
                name: name.to_string(),
                reason,
            })?;

        let record = match self.registry.find_or_reserve(&identity) {
            Reservation::Existing(record) => return attach(&record, display_name),
            Reservation::Reserved(record) => record,
        };

        // A panicking load is published as a failure like any other.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.load(&record, &identity, name, display_name)
        }))
        .unwrap_or_else(|payload| {
            let reason = format!("load panicked: {}", panic_message(&*payload));
            Err(PluginError::module_init(display_name, reason))
        });
        self.registry.publish(&record, outcome)
    }

    fn load(
        &self,
        record: &PluginRecord,
        identity: &str,
        name: &str,
        display_name: &str,
    ) -> Result<Plugin> {
        let artifact: Arc<dyn MappedArtifact> = self
            .native
            .map_artifact(Path::new(identity))
            .map_err(|reason| PluginError::native_map(name, reason))?
            .into();
        record.retain(Arc::clone(&artifact));

        // May re-enter `open` for other artifacts; no lock is held here.
        let declaration = self
            .module_init
            .module_init(artifact.as_ref())
            .map_err(|reason| PluginError::module_init(display_name, reason))?;

        let init_symbol = self.config.init_symbol(&declaration.module_path);
        match artifact.resolve_export(&init_symbol) {
            Ok(entry) => {
                tracing::debug!("Running initializer {}", init_symbol);
                // SAFETY: the artifact exports `<module>.init` as a no-argument function.
                unsafe { artifact.run_initializer(entry) };
            }
            Err(_) => tracing::debug!("No initializer {} in {}", init_symbol, display_name),
        }

        let mut symbols = HashMap::with_capacity(declaration.symbols.len());
        for (symbol, kind) in &declaration.symbols {
            let address = artifact
                .resolve_export(&declaration.qualified(symbol))
                .map_err(|reason| {
                    PluginError::missing_export(display_name, symbol.as_str(), reason)
                })?;
            symbols.insert(symbol.clone(), Symbol::resolved(*kind, address));
        }

        Ok(Plugin::new(
            identity.to_string(),
            declaration.module_path,
            SymbolTable::new(identity, symbols),
            artifact,
        ))
    }
}

/// Join a record created by another caller.
fn attach(record: &PluginRecord, display_name: &str) -> Result<Plugin> {
    match record.wait() {
        Ok(plugin) => Ok(plugin.clone()),
        Err(cause) => Err(PluginError::previous_failure(display_name, cause.clone())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Loader")
            .field("plugins", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Loader`]. Unset collaborators default to the native ones.
#[derive(Default)]
pub struct LoaderBuilder {
    registry: Option<Arc<PluginRegistry>>,
    native: Option<Arc<dyn NativeLoader>>,
    module_init: Option<Arc<dyn ModuleInit>>,
    resolver: Option<Arc<dyn PathResolver>>,
    config: LoaderConfig,
}

impl LoaderBuilder {
    pub fn registry(mut self, registry: Arc<PluginRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn native(mut self, native: Arc<dyn NativeLoader>) -> Self {
        self.native = Some(native);
        self
    }

    pub fn module_init(mut self, module_init: Arc<dyn ModuleInit>) -> Self {
        self.module_init = Some(module_init);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn PathResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Loader {
        let resolver = self.resolver.unwrap_or_else(|| {
            if self.config.canonicalize_paths {
                Arc::new(CanonicalPathResolver)
            } else {
                Arc::new(LiteralPathResolver)
            }
        });
        Loader {
            registry: self.registry.unwrap_or_else(PluginRegistry::global),
            native: self
                .native
                .unwrap_or_else(|| Arc::new(LibloadingLoader::new())),
            module_init: self
                .module_init
                .unwrap_or_else(|| Arc::new(DescriptorModuleInit::new())),
            resolver,
            config: self.config,
        }
    }
}
