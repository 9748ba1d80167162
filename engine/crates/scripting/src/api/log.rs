use mlua::{Lua, Result as LuaResult};
use tracing::Level;

fn emit(level: Level, msg: &str) {
    match level {
        Level::ERROR => tracing::error!(target: "lua_script", "{}", msg),
        Level::WARN => tracing::warn!(target: "lua_script", "{}", msg),
        Level::INFO => tracing::info!(target: "lua_script", "{}", msg),
        Level::DEBUG => tracing::debug!(target: "lua_script", "{}", msg),
        _ => tracing::trace!(target: "lua_script", "{}", msg),
    }
}

/// Register the `log` global table: `log.info(msg)`, `log.warn(msg)`,
/// `log.error(msg)`, `log.debug(msg)`, `log.trace(msg)`.
pub fn register_log_api(lua: &Lua) -> LuaResult<()> {
    let log_table = lua.create_table()?;

    for (name, level) in [
        ("error", Level::ERROR),
        ("warn", Level::WARN),
        ("info", Level::INFO),
        ("debug", Level::DEBUG),
        ("trace", Level::TRACE),
    ] {
        let func = lua.create_function(move |_lua, msg: String| {
            emit(level, &msg);
            Ok(())
        })?;
        log_table.set(name, func)?;
    }

    lua.globals().set("log", log_table)?;
    Ok(())
}
