//! Dynamic strategy loader
//!
//! Resolves the five required C exports at load time; any missing symbol
//! is fatal. The loaded library stays alive for the loader's lifetime so
//! the resolved function pointers remain valid.

use crate::abi::{EngineCtx, FnCreate, FnDestroy, FnLifecycle, StrategyHandle};
use libloading::Library;
use std::ffi::CString;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Plugin loading and lifecycle error types
#[derive(Debug, Error)]
pub enum PluginError {
    /// The shared library could not be loaded
    #[error("failed to load strategy library {}: {source}", path.display())]
    Load {
        /// Library path as given
        path: PathBuf,
        /// Loader error
        #[source]
        source: libloading::Error,
    },

    /// A required export is missing from the library
    #[error("missing export {name}: {source}")]
    MissingExport {
        /// The export that failed to resolve
        name: &'static str,
        /// Loader error
        #[source]
        source: libloading::Error,
    },

    /// `strategy_create` returned null
    #[error("strategy_create returned null")]
    CreateFailed,

    /// The params string contains an interior NUL byte
    #[error("params contain an interior NUL byte")]
    BadParams(#[from] std::ffi::NulError),

    /// A lifecycle call was made before `create`
    #[error("strategy instance not created")]
    NotCreated,
}

/// A loaded strategy library with one live instance at most
#[derive(Debug)]
pub struct PluginLoader {
    // Drop destroys the instance before the library unloads.
    handle: StrategyHandle,
    create_fn: FnCreate,
    destroy_fn: FnDestroy,
    on_start_fn: FnLifecycle,
    on_bar_fn: FnLifecycle,
    on_end_fn: FnLifecycle,
    _lib: Library,
}

impl PluginLoader {
    /// Load a strategy library and resolve its five exports.
    ///
    /// # Errors
    ///
    /// Fails if the library cannot be loaded or any export is missing.
    pub fn load(path: &Path) -> Result<Self, PluginError> {
        // SAFETY: loading executes the library's initializers; the plugin
        // contract requires them to be side-effect free.
        let lib = unsafe { Library::new(path) }.map_err(|source| PluginError::Load {
            path: path.to_path_buf(),
            source,
        })?;

        // SAFETY: symbol types must match the exported signatures; that is
        // exactly the ABI contract the plugin ships against.
        let create_fn = unsafe { resolve::<FnCreate>(&lib, "strategy_create\0")? };
        let destroy_fn = unsafe { resolve::<FnDestroy>(&lib, "strategy_destroy\0")? };
        let on_start_fn = unsafe { resolve::<FnLifecycle>(&lib, "strategy_on_start\0")? };
        let on_bar_fn = unsafe { resolve::<FnLifecycle>(&lib, "strategy_on_bar\0")? };
        let on_end_fn = unsafe { resolve::<FnLifecycle>(&lib, "strategy_on_end\0")? };

        info!(path = %path.display(), "loaded strategy plugin");

        Ok(Self {
            handle: std::ptr::null_mut(),
            create_fn,
            destroy_fn,
            on_start_fn,
            on_bar_fn,
            on_end_fn,
            _lib: lib,
        })
    }

    /// Create the strategy instance. `params` is opaque to the engine,
    /// conventionally JSON that the strategy parses itself.
    ///
    /// # Errors
    ///
    /// Fails if `params` contains a NUL byte or the plugin returns null.
    pub fn create(&mut self, params: &str) -> Result<(), PluginError> {
        self.destroy();

        let params = CString::new(params)?;
        // SAFETY: create_fn resolved against the contract; params is a
        // valid NUL-terminated string for the duration of the call.
        let handle = unsafe { (self.create_fn)(params.as_ptr()) };
        if handle.is_null() {
            return Err(PluginError::CreateFailed);
        }
        self.handle = handle;
        debug!("strategy instance created");
        Ok(())
    }

    /// Destroy the live instance, if any. Idempotent.
    pub fn destroy(&mut self) {
        if !self.handle.is_null() {
            // SAFETY: handle came from create_fn and is destroyed once.
            unsafe { (self.destroy_fn)(self.handle) };
            self.handle = std::ptr::null_mut();
        }
    }

    /// Invoke `strategy_on_start`.
    ///
    /// # Errors
    ///
    /// Fails if called before [`Self::create`].
    pub fn on_start(&mut self, ctx: &mut EngineCtx) -> Result<(), PluginError> {
        self.call(self.on_start_fn, ctx)
    }

    /// Invoke `strategy_on_bar`.
    ///
    /// # Errors
    ///
    /// Fails if called before [`Self::create`].
    pub fn on_bar(&mut self, ctx: &mut EngineCtx) -> Result<(), PluginError> {
        self.call(self.on_bar_fn, ctx)
    }

    /// Invoke `strategy_on_end`.
    ///
    /// # Errors
    ///
    /// Fails if called before [`Self::create`].
    pub fn on_end(&mut self, ctx: &mut EngineCtx) -> Result<(), PluginError> {
        self.call(self.on_end_fn, ctx)
    }

    fn call(&mut self, f: FnLifecycle, ctx: &mut EngineCtx) -> Result<(), PluginError> {
        if self.handle.is_null() {
            return Err(PluginError::NotCreated);
        }
        // SAFETY: handle is live and ctx is a valid engine context for the
        // duration of the call.
        unsafe { f(self.handle, std::ptr::from_mut(ctx)) };
        Ok(())
    }
}

impl Drop for PluginLoader {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Resolve one export to a bare function pointer.
///
/// # Safety
///
/// `T` must match the exported symbol's actual signature.
unsafe fn resolve<T: Copy>(lib: &Library, name: &'static str) -> Result<T, PluginError> {
    // SAFETY: forwarded contract; name is NUL-terminated by construction.
    let symbol = unsafe { lib.get::<T>(name.as_bytes()) }.map_err(|source| {
        PluginError::MissingExport {
            name: name.trim_end_matches('\0'),
            source,
        }
    })?;
    Ok(*symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_library_fails_to_load() {
        let err = PluginLoader::load(Path::new("/nonexistent/libstrategy.so")).unwrap_err();
        assert!(matches!(err, PluginError::Load { .. }));
    }
}
