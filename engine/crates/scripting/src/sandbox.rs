use std::path::Path;

use mlua::Lua;
use serde::Deserialize;

use crate::error::ScriptError;

/// Configuration for the Luau VM owned by a script host.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScriptConfig {
    /// Memory limit in bytes (default 16 MB).
    pub memory_limit: usize,
    /// Luau sandbox mode: builtin libraries become read-only and globals
    /// written by scripts land in a per-state proxy table.
    pub sandbox: bool,
    /// File extensions picked up by directory batches, without the dot.
    pub extensions: Vec<String>,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            memory_limit: 16 * 1024 * 1024, // 16 MB
            sandbox: true,
            extensions: vec!["lua".to_string(), "luau".to_string()],
        }
    }
}

impl ScriptConfig {
    /// Whether `path` carries one of the configured script extensions.
    pub fn matches(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| self.extensions.iter().any(|e| e == ext))
            .unwrap_or(false)
    }
}

/// Create a Luau VM configured with the memory limit and sandbox mode.
pub fn create_lua(config: &ScriptConfig) -> Result<Lua, ScriptError> {
    let lua = Lua::new();

    if config.sandbox {
        lua.sandbox(true)?;
        // Sandboxing marks the globals proxy safeenv, which lets Luau cache
        // global lookups at load time. Rebinding a global must stay visible
        // to functions that are already loaded.
        lua.globals().set_safeenv(false);
    }

    lua.set_memory_limit(config.memory_limit)?;

    Ok(lua)
}
