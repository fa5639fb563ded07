//! Instrumented stand-ins for the native loader and module-init.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dynhost_core::{
    LiteralPathResolver, Loader, MappedArtifact, ModuleDeclaration, ModuleInit, NativeLoader,
    PluginRegistry, RawAddress,
};

type Hook = Arc<dyn Fn() + Send + Sync>;

/// Behaviour of one fake artifact.
#[derive(Default)]
pub struct FakeArtifact {
    pub exports: HashMap<String, RawAddress>,
    pub map_error: Option<String>,
    pub map_delay: Option<Duration>,
    pub declaration: Option<Result<ModuleDeclaration, String>>,
    pub module_init_hook: Option<Hook>,
    pub init_hook: Option<Hook>,
    pub map_calls: AtomicUsize,
    pub module_init_calls: AtomicUsize,
    pub init_calls: AtomicUsize,
    pub drops: AtomicUsize,
}

impl FakeArtifact {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `name` at a fake, never dereferenced address.
    pub fn export(mut self, name: &str, addr: usize) -> Self {
        self.exports
            .insert(name.to_string(), RawAddress::from_usize(addr).unwrap());
        self
    }

    pub fn export_address(mut self, name: &str, addr: RawAddress) -> Self {
        self.exports.insert(name.to_string(), addr);
        self
    }

    pub fn map_error(mut self, reason: &str) -> Self {
        self.map_error = Some(reason.to_string());
        self
    }

    pub fn map_delay(mut self, delay: Duration) -> Self {
        self.map_delay = Some(delay);
        self
    }

    pub fn declares(mut self, declaration: ModuleDeclaration) -> Self {
        self.declaration = Some(Ok(declaration));
        self
    }

    pub fn module_init_error(mut self, reason: &str) -> Self {
        self.declaration = Some(Err(reason.to_string()));
        self
    }

    pub fn on_module_init(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.module_init_hook = Some(Arc::new(hook));
        self
    }

    pub fn on_init(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.init_hook = Some(Arc::new(hook));
        self
    }

    pub fn map_count(&self) -> usize {
        self.map_calls.load(Ordering::SeqCst)
    }

    pub fn init_count(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn module_init_count(&self) -> usize {
        self.module_init_calls.load(Ordering::SeqCst)
    }

    /// How many mapped handles to this artifact have been dropped.
    pub fn drop_count(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

/// Native loader serving [`FakeArtifact`]s by path.
#[derive(Default)]
pub struct StubNative {
    artifacts: HashMap<String, Arc<FakeArtifact>>,
}

impl StubNative {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, fake: FakeArtifact) -> Self {
        self.artifacts.insert(path.to_string(), Arc::new(fake));
        self
    }

    pub fn artifact(&self, path: &str) -> Arc<FakeArtifact> {
        Arc::clone(&self.artifacts[path])
    }
}

impl NativeLoader for StubNative {
    fn map_artifact(&self, path: &Path) -> Result<Box<dyn MappedArtifact>, String> {
        let key = path.to_string_lossy();
        let fake = self
            .artifacts
            .get(key.as_ref())
            .ok_or_else(|| {
                format!("{key}: cannot open shared object file: No such file or directory")
            })?;
        fake.map_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = fake.map_delay {
            std::thread::sleep(delay);
        }
        if let Some(reason) = &fake.map_error {
            return Err(reason.clone());
        }
        Ok(Box::new(StubArtifact {
            fake: Arc::clone(fake),
            path: path.to_path_buf(),
        }))
    }
}

pub struct StubArtifact {
    fake: Arc<FakeArtifact>,
    path: PathBuf,
}

impl MappedArtifact for StubArtifact {
    fn resolve_export(&self, name: &str) -> Result<RawAddress, String> {
        self.fake
            .exports
            .get(name)
            .copied()
            .ok_or_else(|| format!("{name}: undefined symbol"))
    }

    unsafe fn run_initializer(&self, _entry: RawAddress) {
        self.fake.init_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &self.fake.init_hook {
            hook();
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StubArtifact {
    fn drop(&mut self) {
        self.fake.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Module-init that reports whatever its fake artifact declares.
pub struct StubModuleInit {
    native: Arc<StubNative>,
}

impl ModuleInit for StubModuleInit {
    fn module_init(&self, artifact: &dyn MappedArtifact) -> Result<ModuleDeclaration, String> {
        let fake = self.native.artifact(&artifact.path().to_string_lossy());
        fake.module_init_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = &fake.module_init_hook {
            hook();
        }
        fake.declaration
            .clone()
            .unwrap_or_else(|| Err("module table missing".to_string()))
    }
}

/// A loader over `native` with a fresh registry and literal identities.
pub fn stub_loader(native: Arc<StubNative>) -> Loader {
    Loader::builder()
        .registry(Arc::new(PluginRegistry::new()))
        .native(Arc::clone(&native) as Arc<dyn NativeLoader>)
        .module_init(Arc::new(StubModuleInit { native }))
        .resolver(Arc::new(LiteralPathResolver))
        .build()
}
