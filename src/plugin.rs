//! Plugin hooks.
//!
//! A [`Plugin`] is called around every frame. Plugins run in registration
//! order and may edit the level between frames, e.g. to animate transforms
//! or swap materials.
//!
//! # Lifecycle
//!
//! 1. `startup()` once, when the plugin is added to a renderer
//! 2. `pre_render()` every frame before the first pass; returning `false`
//!    skips the passes of that frame
//! 3. `post_render()` every frame after the last pass
//! 4. `end()` once, when the plugin is removed or the renderer is dropped

use crate::{error::PluginError, level::Level};

/// What a plugin sees of the running renderer.
pub struct PluginContext<'a> {
    pub level: &'a mut Level,
    /// Seconds since the level was loaded.
    pub elapsed: f64,
    pub delta_time: f64,
    pub size: [u32; 2],
}

pub trait Plugin {
    /// Unique within a registry.
    fn name(&self) -> &str;

    fn startup(&mut self, _size: [u32; 2]) {}

    fn pre_render(&mut self, _ctx: &mut PluginContext) -> bool {
        true
    }

    fn post_render(&mut self, _ctx: &mut PluginContext) {}

    fn end(&mut self) {}
}

#[derive(Default)]
pub struct PluginRegistry {
    plugins: Vec<Box<dyn Plugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, plugin: Box<dyn Plugin>) -> Result<(), PluginError> {
        if self.get(plugin.name()).is_some() {
            return Err(PluginError::Duplicate(plugin.name().to_string()));
        }
        self.plugins.push(plugin);
        Ok(())
    }

    /// Removes `name` and calls its `end` hook.
    pub fn remove(&mut self, name: &str) -> Result<Box<dyn Plugin>, PluginError> {
        let index = self
            .plugins
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))?;
        let mut plugin = self.plugins.remove(index);
        plugin.end();
        Ok(plugin)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Plugin> {
        self.plugins
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Every plugin gets called even after one asked to skip the frame.
    pub fn pre_render(&mut self, ctx: &mut PluginContext) -> bool {
        self.plugins
            .iter_mut()
            .fold(true, |render, plugin| plugin.pre_render(ctx) && render)
    }

    pub fn post_render(&mut self, ctx: &mut PluginContext) {
        for plugin in &mut self.plugins {
            plugin.post_render(ctx);
        }
    }

    pub fn end_all(&mut self) {
        for mut plugin in self.plugins.drain(..) {
            plugin.end();
        }
    }
}

impl Drop for PluginRegistry {
    fn drop(&mut self) {
        self.end_all();
    }
}
