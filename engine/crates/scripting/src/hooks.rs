use tracing::debug;

use crate::error::ScriptError;
use crate::host::ScriptHost;

/// Optional global entry points a script may define.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleHook {
    /// `OnCreate()`, run by the embedder after loading scripts
    OnCreate,
    /// `OnDestroy()`, run once when the host is torn down
    OnDestroy,
}

impl LifecycleHook {
    pub fn global_name(self) -> &'static str {
        match self {
            Self::OnCreate => "OnCreate",
            Self::OnDestroy => "OnDestroy",
        }
    }
}

impl ScriptHost {
    /// Run `OnCreate` if the scripts define it.
    pub fn on_create(&self, error_if_missing: bool) -> Result<(), ScriptError> {
        self.run_hook(LifecycleHook::OnCreate, error_if_missing)
    }

    /// Run `OnDestroy` if the scripts define it.
    pub fn on_destroy(&self, error_if_missing: bool) -> Result<(), ScriptError> {
        self.run_hook(LifecycleHook::OnDestroy, error_if_missing)
    }

    /// Only a missing hook is an error, and only when `error_if_missing`
    /// is set. A hook that raises is reported through the error policy.
    pub fn run_hook(&self, hook: LifecycleHook, error_if_missing: bool) -> Result<(), ScriptError> {
        let name = hook.global_name();

        if !self.exists_callable(name) {
            if error_if_missing {
                return Err(ScriptError::HookNotFound(name));
            }
            debug!(hook = name, "lifecycle hook not defined, skipping");
            return Ok(());
        }

        if let Err(e) = self.invoke_simple(name, ()) {
            self.report_with_context(&e, &format!("in {} hook", name));
        }
        Ok(())
    }
}
