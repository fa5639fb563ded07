//! Load-once dynamic plugin loading.
//!
//! A plugin is a shared library (`.so`/`.dylib`/`.dll`) that declares a module
//! identity and a table of exports. [`Loader::open`] maps each distinct
//! artifact at most once per registry, runs its optional initializer once,
//! and resolves its exports into an immutable [`SymbolTable`]. Concurrent
//! callers for the same artifact share that single load, and a failed load is
//! cached and replayed instead of retried.
//!
//! # Usage
//!
//! ```rust,ignore
//! let plugin = dynhost_core::open("plugins/libsample.so")?;
//! let version = dynhost_core::lookup(&plugin, "Version")?;
//! let run: extern "C" fn() = unsafe { plugin.lookup("Run")?.as_fn() }.unwrap();
//! run();
//! ```

pub mod config;
pub mod error;
pub mod loader;
pub mod module;
pub mod native;
pub mod path;
pub mod plugin;
pub mod registry;
pub mod symbol;

use once_cell::sync::Lazy;

pub use config::LoaderConfig;
pub use error::{PluginError, Result};
pub use loader::{Loader, LoaderBuilder};
pub use module::{DescriptorModuleInit, ModuleDeclaration, ModuleInit};
pub use native::{LibloadingLoader, MappedArtifact, NativeLoader};
pub use path::{CanonicalPathResolver, LiteralPathResolver, PathResolver};
pub use plugin::Plugin;
pub use registry::{PluginRecord, PluginRegistry, RecordStatus, Reservation};
pub use symbol::{RawAddress, Symbol, SymbolKind, SymbolTable};

static GLOBAL_LOADER: Lazy<Loader> = Lazy::new(|| {
    let config = LoaderConfig::default()
        .with_env_overrides()
        .unwrap_or_else(|e| {
            tracing::warn!("Ignoring loader environment overrides: {}", e);
            LoaderConfig::default()
        });
    Loader::from_config(config)
});

/// The process-wide loader, backed by [`PluginRegistry::global`].
pub fn global_loader() -> &'static Loader {
    &GLOBAL_LOADER
}

/// Open a plugin with the process-wide loader.
pub fn open(name: &str) -> Result<Plugin> {
    GLOBAL_LOADER.open(name)
}

/// Look up an exported symbol of an opened plugin.
pub fn lookup<'a>(plugin: &'a Plugin, name: &str) -> Result<&'a Symbol> {
    plugin.lookup(name)
}

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::error::{PluginError, Result};
    pub use crate::loader::Loader;
    pub use crate::plugin::Plugin;
    pub use crate::registry::{PluginRegistry, RecordStatus};
    pub use crate::symbol::{Symbol, SymbolKind};
}
