use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use mlua::{FromLua, FromLuaMulti, IntoLua, IntoLuaMulti, Lua, LuaSerdeExt, MultiValue, Value};
use observability::BatchMetrics;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::log::register_log_api;
use crate::error::ScriptError;
use crate::handles::{next_host_id, HandleTable, ScriptHandle};
use crate::policy::ErrorPolicy;
use crate::sandbox::{self, ScriptConfig};
use crate::value::{register_value, ScriptValue};

/// A chunk compiled but not yet executed.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledScript {
    pub name: String,
    pub function: ScriptHandle,
}

/// Owns one Luau state and mediates every exchange with it: calls, globals,
/// and loading script source.
///
/// Failures from eager loading (`run_*`, `compile_*`) go to the injected
/// [`ErrorPolicy`] and are also returned. Failures from calls are only
/// returned; reporting them is the caller's decision.
///
/// A host is not internally synchronised. Scripts run to completion on the
/// calling thread.
pub struct ScriptHost {
    lua: Lua,
    config: ScriptConfig,
    policy: Arc<dyn ErrorPolicy>,
    id: u32,
    script_count: usize,
    torn_down: bool,
}

impl ScriptHost {
    /// Create a host with a fresh Lua state bound to `policy`.
    pub fn new(config: ScriptConfig, policy: Arc<dyn ErrorPolicy>) -> Result<Self, ScriptError> {
        let lua = sandbox::create_lua(&config)?;
        let id = next_host_id();

        // Handle table lives in app data so conversions inside callbacks can reach it
        lua.set_app_data(HandleTable::new(id));

        register_log_api(&lua)?;

        info!(
            host = id,
            "ScriptHost initialized (memory_limit={}KB, sandbox={})",
            config.memory_limit / 1024,
            config.sandbox
        );

        Ok(Self {
            lua,
            config,
            policy,
            id,
            script_count: 0,
            torn_down: false,
        })
    }

    /// True iff the global `name` currently holds a function. Never fails.
    pub fn exists_callable(&self, name: &str) -> bool {
        matches!(self.lua.globals().get::<Value>(name), Ok(Value::Function(_)))
    }

    /// Call the global function `name`.
    ///
    /// The returned vector holds exactly `num_results` values: surplus
    /// results are dropped and missing ones are `Nil`.
    ///
    /// With `protect` set, a runtime error inside the script comes back as
    /// `Err`. Without it the failure aborts the calling chain.
    ///
    /// # Panics
    /// When `protect` is false and the script raises an error.
    pub fn invoke<A: IntoLuaMulti>(
        &self,
        name: &str,
        num_results: usize,
        protect: bool,
        args: A,
    ) -> Result<Vec<ScriptValue>, ScriptError> {
        let func = match self.lua.globals().get::<Value>(name)? {
            Value::Function(f) => f,
            _ => return Err(ScriptError::NotCallable(name.to_string())),
        };

        match func.call::<MultiValue>(args) {
            Ok(values) => self.collect_results(values, num_results),
            Err(e) if protect => {
                debug!(function = name, "protected call failed: {}", e);
                Err(ScriptError::Lua(e))
            }
            Err(e) => panic!("unprotected call to '{}' failed: {}", name, e),
        }
    }

    /// Protected call discarding any results.
    pub fn invoke_simple<A: IntoLuaMulti>(&self, name: &str, args: A) -> Result<(), ScriptError> {
        self.invoke(name, 0, true, args).map(|_| ())
    }

    /// Protected call returning the first result.
    pub fn invoke_with_result<A: IntoLuaMulti>(
        &self,
        name: &str,
        args: A,
    ) -> Result<ScriptValue, ScriptError> {
        let mut results = self.invoke(name, 1, true, args)?;
        Ok(results.pop().unwrap_or_default())
    }

    /// Protected call of a function handle, e.g. a compiled chunk or a
    /// function returned by a script. Returns every result.
    pub fn call<A: IntoLuaMulti>(
        &self,
        handle: &ScriptHandle,
        args: A,
    ) -> Result<Vec<ScriptValue>, ScriptError> {
        let func = match self.resolve(handle)? {
            Value::Function(f) => f,
            _ => return Err(ScriptError::NotCallable(handle.to_string())),
        };
        let values = func.call::<MultiValue>(args)?;
        let count = values.len();
        self.collect_results(values, count)
    }

    fn collect_results(
        &self,
        values: MultiValue,
        num_results: usize,
    ) -> Result<Vec<ScriptValue>, ScriptError> {
        let mut results = Vec::with_capacity(num_results);
        for value in values.into_iter().take(num_results) {
            results.push(ScriptValue::from_lua(value, &self.lua)?);
        }
        results.resize(num_results, ScriptValue::Nil);
        Ok(results)
    }

    /// Bind a host value to a global, replacing any previous binding.
    ///
    /// Anything `IntoLua` works: primitives, `Vec`/maps (become tables),
    /// `mlua::Function`s, `UserData` objects (indexable, methods callable
    /// with `obj:method()`), and [`ScriptValue`]s.
    pub fn set_global<V: IntoLua>(&self, name: &str, value: V) -> Result<(), ScriptError> {
        self.lua.globals().set(name, value)?;
        debug!(global = name, "global bound");
        Ok(())
    }

    /// Bind a plain serializable host value as a Lua table (or primitive).
    pub fn set_global_data<T: Serialize + ?Sized>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<(), ScriptError> {
        let lua_val = self.lua.to_value(value)?;
        self.set_global(name, lua_val)
    }

    /// Register a host function as a global callable.
    pub fn register_function<F, A, R>(&self, name: &str, func: F) -> Result<(), ScriptError>
    where
        F: Fn(&Lua, A) -> mlua::Result<R> + Send + 'static,
        A: FromLuaMulti,
        R: IntoLuaMulti,
    {
        let func = self.lua.create_function(func)?;
        self.lua.globals().set(name, func)?;
        debug!(function = name, "host function registered");
        Ok(())
    }

    /// Untyped read of a global. Absent globals read as `Nil`.
    pub fn get_global(&self, name: &str) -> Result<ScriptValue, ScriptError> {
        Ok(self.lua.globals().get::<ScriptValue>(name)?)
    }

    /// Deserialize a global into a host type. `Ok(None)` when absent.
    pub fn get_global_data<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ScriptError> {
        match self.lua.globals().get::<Value>(name)? {
            Value::Nil => Ok(None),
            value => Ok(Some(self.lua.from_value(value)?)),
        }
    }

    // Typed getters: an absent global and a global of another type both
    // yield the default. No coercion between strings and numbers.

    pub fn get_string(&self, name: &str, default: &str) -> String {
        match self.lua.globals().get::<Value>(name) {
            Ok(Value::String(s)) => s.to_string_lossy().to_string(),
            other => {
                self.note_default(name, "string", &other);
                default.to_string()
            }
        }
    }

    pub fn get_number(&self, name: &str, default: f64) -> f64 {
        match self.lua.globals().get::<Value>(name) {
            Ok(Value::Number(n)) => n,
            Ok(Value::Integer(i)) => i as f64,
            other => {
                self.note_default(name, "number", &other);
                default
            }
        }
    }

    pub fn get_bool(&self, name: &str, default: bool) -> bool {
        match self.lua.globals().get::<Value>(name) {
            Ok(Value::Boolean(b)) => b,
            other => {
                self.note_default(name, "boolean", &other);
                default
            }
        }
    }

    fn note_default(&self, name: &str, expected: &str, found: &mlua::Result<Value>) {
        match found {
            Ok(Value::Nil) => {}
            Ok(v) => debug!(
                global = name,
                "expected {}, found {}; using default",
                expected,
                v.type_name()
            ),
            Err(e) => debug!(global = name, "read failed ({}); using default", e),
        }
    }

    /// Compile and execute source text.
    pub fn run_string(&mut self, code: &str) -> Result<(), ScriptError> {
        self.run_script("string", code)
    }

    /// Compile and execute source text under a chunk name used in error
    /// messages.
    pub fn run_script(&mut self, name: &str, source: &str) -> Result<(), ScriptError> {
        let result = self
            .lua
            .load(source)
            .set_name(format!("={}", name))
            .exec()
            .map_err(|e| ScriptError::Load(format!("{}: {}", name, e)));
        self.finish_load(name, result)
    }

    /// Compile and execute a source file.
    pub fn run_file(&mut self, path: impl AsRef<Path>) -> Result<(), ScriptError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let result = read_source(path).and_then(|source| {
            self.lua
                .load(source)
                .set_name(format!("@{}", name))
                .exec()
                .map_err(|e| ScriptError::Load(format!("{}: {}", name, e)))
        });
        self.finish_load(&name, result)
    }

    fn finish_load(&mut self, name: &str, result: Result<(), ScriptError>) -> Result<(), ScriptError> {
        let result = self.reported(result);
        if result.is_ok() {
            self.script_count += 1;
            info!(script = name, "Script loaded successfully");
        }
        result
    }

    /// Run every script file in `dir` (non-recursive) in file-name order.
    ///
    /// A failing file is reported and skipped; the rest still run. Returns
    /// the first failure once the whole batch has been attempted.
    pub fn run_directory(&mut self, dir: impl AsRef<Path>) -> Result<(), ScriptError> {
        let dir = dir.as_ref();
        let start = Instant::now();
        let files = self.reported(self.script_files(dir))?;

        let mut metrics = BatchMetrics::new(dir, "run");
        let mut first_error = None;
        for path in files {
            match self.run_file(&path) {
                Ok(()) => metrics.loaded += 1,
                Err(e) => {
                    metrics.failed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }
        metrics.duration_us = start.elapsed().as_micros();
        metrics.log();

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Compile source text without running it.
    pub fn compile_string(&self, code: &str) -> Result<CompiledScript, ScriptError> {
        self.compile_script("string", code)
    }

    /// Compile named source text without running it.
    pub fn compile_script(&self, name: &str, source: &str) -> Result<CompiledScript, ScriptError> {
        let result = self.compile_chunk(name, format!("={}", name), source.to_string());
        self.reported(result)
    }

    /// Compile a source file without running it.
    pub fn compile_file(&self, path: impl AsRef<Path>) -> Result<CompiledScript, ScriptError> {
        let path = path.as_ref();
        let name = path.display().to_string();
        let result = read_source(path)
            .and_then(|source| self.compile_chunk(&name, format!("@{}", name), source));
        self.reported(result)
    }

    /// Compile every script file in `dir`. Files that fail are reported and
    /// left out of the result.
    pub fn compile_directory(&self, dir: impl AsRef<Path>) -> Vec<CompiledScript> {
        let dir = dir.as_ref();
        let start = Instant::now();
        let files = match self.reported(self.script_files(dir)) {
            Ok(files) => files,
            Err(_) => return Vec::new(),
        };

        let mut metrics = BatchMetrics::new(dir, "compile");
        let mut compiled = Vec::with_capacity(files.len());
        for path in files {
            match self.compile_file(&path) {
                Ok(script) => {
                    metrics.loaded += 1;
                    compiled.push(script);
                }
                Err(_) => metrics.failed += 1,
            }
        }
        metrics.duration_us = start.elapsed().as_micros();
        metrics.log();

        compiled
    }

    fn compile_chunk(
        &self,
        name: &str,
        chunk_name: String,
        source: String,
    ) -> Result<CompiledScript, ScriptError> {
        let func = self
            .lua
            .load(source)
            .set_name(chunk_name)
            .into_function()
            .map_err(|e| ScriptError::Load(format!("{}: {}", name, e)))?;
        let function = register_value(&self.lua, Value::Function(func))?;
        debug!(script = name, "Script compiled");
        Ok(CompiledScript {
            name: name.to_string(),
            function,
        })
    }

    /// Execute a previously compiled chunk. Protected; failures are returned.
    pub fn run_compiled(&self, script: &CompiledScript) -> Result<Vec<ScriptValue>, ScriptError> {
        self.call(&script.function, ())
    }

    /// Script files of `dir` matching the configured extensions, sorted by
    /// file name. Sub-directories are not entered.
    fn script_files(&self, dir: &Path) -> Result<Vec<PathBuf>, ScriptError> {
        if !dir.is_dir() {
            return Err(ScriptError::Load(format!(
                "not a directory: {}",
                dir.display()
            )));
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file() && self.config.matches(p))
            .collect();

        // Sort for deterministic load order
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        Ok(files)
    }

    fn reported<T>(&self, result: Result<T, ScriptError>) -> Result<T, ScriptError> {
        if let Err(e) = &result {
            warn!(host = self.id, "{}", e);
            self.policy.report(&[e]);
        }
        result
    }

    pub(crate) fn report_with_context(&self, err: &ScriptError, context: &str) {
        warn!(host = self.id, "{} ({})", err, context);
        self.policy.report(&[err, &context]);
    }

    /// Look up the VM value behind a handle.
    pub fn resolve(&self, handle: &ScriptHandle) -> Result<Value, ScriptError> {
        let invalid = || ScriptError::InvalidHandle(handle.clone());
        let table = self.lua.app_data_ref::<HandleTable>().ok_or_else(invalid)?;
        let key = table.get(handle).ok_or_else(invalid)?;
        Ok(self.lua.registry_value::<Value>(key)?)
    }

    /// Unpin a handle now instead of when its last clone is dropped. Every
    /// clone becomes invalid. Returns false for handles that are already
    /// released or belong to another host.
    pub fn release(&self, handle: &ScriptHandle) -> bool {
        let key = match self.lua.app_data_mut::<HandleTable>() {
            Some(mut table) => table.remove(handle),
            None => None,
        };
        match key {
            Some(key) => {
                if let Err(e) = self.lua.remove_registry_value(key) {
                    debug!("registry removal failed: {}", e);
                }
                true
            }
            None => false,
        }
    }

    /// Number of handles currently pinned by this host. Slots of dropped
    /// handles are collected first.
    pub fn live_handles(&self) -> usize {
        match self.lua.app_data_mut::<HandleTable>() {
            Some(mut table) => {
                let freed = table.collect();
                if freed > 0 {
                    debug!(host = self.id, freed, "dropped handles collected");
                }
                table.len()
            }
            None => 0,
        }
    }

    /// Create an empty table and return a handle to it.
    pub fn new_table(&self) -> Result<ScriptHandle, ScriptError> {
        let table = self.lua.create_table()?;
        Ok(register_value(&self.lua, Value::Table(table))?)
    }

    /// Swap the error policy between operations.
    pub fn set_policy(&mut self, policy: Arc<dyn ErrorPolicy>) {
        self.policy = policy;
    }

    /// Get a reference to the underlying Lua VM.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Number of scripts successfully run.
    pub fn script_count(&self) -> usize {
        self.script_count
    }

    /// Run the `OnDestroy` hook if present, then release the Lua state.
    /// Consumes the host, so it cannot be used or destroyed again.
    pub fn destroy(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        // on_destroy(false) reports hook failures itself and never errors
        let _ = self.on_destroy(false);

        if let Some(table) = self.lua.remove_app_data::<HandleTable>() {
            debug!(host = self.id, handles = table.len(), "handle table dropped");
        }
        info!(host = self.id, scripts = self.script_count, "ScriptHost destroyed");
    }
}

impl Drop for ScriptHost {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn read_source(path: &Path) -> Result<String, ScriptError> {
    std::fs::read_to_string(path)
        .map_err(|e| ScriptError::Load(format!("{}: {}", path.display(), e)))
}
