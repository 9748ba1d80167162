use thiserror::Error;

use crate::handles::ScriptHandle;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),

    #[error("script load error: {0}")]
    Load(String),

    #[error("global '{0}' is not callable")]
    NotCallable(String),

    #[error("hook function {0} not found")]
    HookNotFound(&'static str),

    #[error("invalid or released handle: {0}")]
    InvalidHandle(ScriptHandle),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
