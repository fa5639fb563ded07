//! Native loader adapter backed by libloading.
//!
//! The loader talks to the operating system only through [`NativeLoader`] and
//! [`MappedArtifact`], so tests can substitute instrumented stubs.

use std::ffi::c_void;
use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};

use libloading::Library;

use crate::symbol::RawAddress;

/// Maps artifacts into the process.
pub trait NativeLoader: Send + Sync {
    /// Map the artifact at `path`. The error is the OS's description of the
    /// failure, captured at the failing call.
    fn map_artifact(&self, path: &Path) -> Result<Box<dyn MappedArtifact>, String>;
}

/// An artifact that has been mapped into the process. Never unmapped.
pub trait MappedArtifact: Send + Sync {
    /// Resolve an export by its full name.
    fn resolve_export(&self, name: &str) -> Result<RawAddress, String>;

    /// Call a resolved initializer with no arguments, ignoring any result.
    ///
    /// # Safety
    /// `entry` must be an initializer resolved from this artifact.
    unsafe fn run_initializer(&self, entry: RawAddress) {
        let init: extern "C" fn() = std::mem::transmute(entry.as_ptr());
        init();
    }

    /// Path the artifact was mapped from, for diagnostics.
    fn path(&self) -> &Path;
}

/// [`NativeLoader`] using `dlopen`/`LoadLibrary` through libloading.
///
/// On Windows libloading suppresses the critical-error dialog while mapping,
/// and on every platform it reads `dlerror`/`GetLastError` right after the
/// failing call.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibloadingLoader;

impl LibloadingLoader {
    pub fn new() -> Self {
        Self
    }
}

impl NativeLoader for LibloadingLoader {
    fn map_artifact(&self, path: &Path) -> Result<Box<dyn MappedArtifact>, String> {
        // Mapping runs the artifact's static constructors; nothing here can vouch for them.
        let library = unsafe { Library::new(path) }.map_err(|e| e.to_string())?;
        tracing::debug!("Mapped native artifact {}", path.display());
        Ok(Box::new(MappedLibrary {
            library: ManuallyDrop::new(library),
            path: path.to_path_buf(),
        }))
    }
}

/// A library mapped by [`LibloadingLoader`].
///
/// Dropping it does not close the library: static constructors and the
/// module initializer may have registered state that outlives any handle.
pub struct MappedLibrary {
    library: ManuallyDrop<Library>,
    path: PathBuf,
}

impl MappedArtifact for MappedLibrary {
    fn resolve_export(&self, name: &str) -> Result<RawAddress, String> {
        let symbol: libloading::Symbol<*mut c_void> =
            unsafe { self.library.get(name.as_bytes()) }.map_err(|e| e.to_string())?;
        RawAddress::new(*symbol).ok_or_else(|| format!("symbol {name} resolved to null"))
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Debug for MappedLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedLibrary")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}
