//! Strategy surface
//!
//! Internal strategies implement [`Strategy`] directly; dynamically loaded
//! plugins are adapted through [`PluginStrategy`]. Both are driven through
//! the same engine context, so the ABI path is exercised either way.

use anyhow::Result;
use plugin::{EngineCtx, PluginError, PluginLoader};
use std::path::Path;

/// A strategy driven by the engine loop
pub trait Strategy {
    /// Called once before the first bar
    fn on_start(&mut self, ctx: &mut EngineCtx) -> Result<()>;

    /// Called once per bar, in timestamp order
    fn on_bar(&mut self, ctx: &mut EngineCtx) -> Result<()>;

    /// Called once after the final bar, including after an early
    /// blown-account termination
    fn on_end(&mut self, ctx: &mut EngineCtx) -> Result<()>;
}

/// A dynamically loaded strategy plugin behind the [`Strategy`] trait
pub struct PluginStrategy {
    loader: PluginLoader,
}

impl PluginStrategy {
    /// Load the plugin at `path` and create its instance with `params`.
    ///
    /// # Errors
    ///
    /// Fails on load errors, missing exports, or a null instance.
    pub fn load(path: &Path, params: &str) -> Result<Self, PluginError> {
        let mut loader = PluginLoader::load(path)?;
        loader.create(params)?;
        Ok(Self { loader })
    }
}

impl Strategy for PluginStrategy {
    fn on_start(&mut self, ctx: &mut EngineCtx) -> Result<()> {
        self.loader.on_start(ctx)?;
        Ok(())
    }

    fn on_bar(&mut self, ctx: &mut EngineCtx) -> Result<()> {
        self.loader.on_bar(ctx)?;
        Ok(())
    }

    fn on_end(&mut self, ctx: &mut EngineCtx) -> Result<()> {
        self.loader.on_end(ctx)?;
        Ok(())
    }
}
