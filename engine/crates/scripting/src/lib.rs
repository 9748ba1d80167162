pub mod error;
pub mod policy;
pub mod sandbox;
pub mod handles;
pub mod value;
pub mod host;
pub mod hooks;
pub mod api;

pub use error::ScriptError;
pub use handles::ScriptHandle;
pub use hooks::LifecycleHook;
pub use host::{CompiledScript, ScriptHost};
pub use policy::{CapturePolicy, ContinuePolicy, ErrorPolicy, FatalPolicy};
pub use sandbox::ScriptConfig;
pub use value::ScriptValue;

// Re-export mlua for embedders registering functions and userdata
pub use mlua;
