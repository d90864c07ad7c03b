//! The plugin catalog lives outside this crate; persistence only needs to know
//! whether any plugin is currently broken.

/// Read-only view of the plugin registry.
pub trait PluginRegistry: Send + Sync {
    /// Names of plugins currently in error status.
    fn errored_plugins(&self) -> Vec<String>;
}

/// Registry used when no plugin catalog is wired in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPlugins;

impl PluginRegistry for NoPlugins {
    fn errored_plugins(&self) -> Vec<String> {
        Vec::new()
    }
}
