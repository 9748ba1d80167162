use mlua::{FromLua, IntoLua, Lua, Value};

use crate::handles::{HandleTable, ScriptHandle};

/// A value exchanged across the host/script boundary.
///
/// Primitives are copied out of the VM. Tables, functions and everything
/// else that lives by reference inside the VM come back as handles.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScriptValue {
    #[default]
    Nil,
    Boolean(bool),
    Number(f64),
    String(String),
    Table(ScriptHandle),
    Function(ScriptHandle),
    /// Userdata and other reference kinds (threads, buffers, vectors).
    Object(ScriptHandle),
}

impl ScriptValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Boolean(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Table(_) => "table",
            Self::Function(_) => "function",
            Self::Object(_) => "object",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The VM handle behind a table, function or object value.
    pub fn handle(&self) -> Option<&ScriptHandle> {
        match self {
            Self::Table(h) | Self::Function(h) | Self::Object(h) => Some(h),
            _ => None,
        }
    }
}

impl From<bool> for ScriptValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<f64> for ScriptValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i32> for ScriptValue {
    fn from(n: i32) -> Self {
        Self::Number(n as f64)
    }
}

impl From<i64> for ScriptValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for ScriptValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl<T: Into<ScriptValue>> From<Option<T>> for ScriptValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or_default()
    }
}

fn missing_table() -> mlua::Error {
    mlua::Error::runtime("script handle table is not installed on this Lua state")
}

/// Pin a VM value in the registry and hand out a handle for it. The pin
/// lasts until the handle and all its clones are dropped.
pub(crate) fn register_value(lua: &Lua, value: Value) -> mlua::Result<ScriptHandle> {
    let key = lua.create_registry_value(value)?;
    let mut table = lua.app_data_mut::<HandleTable>().ok_or_else(missing_table)?;
    Ok(table.insert(key))
}

/// Look a handle back up. Fails for released handles and handles issued by
/// another host.
pub(crate) fn resolve_value(lua: &Lua, handle: &ScriptHandle) -> mlua::Result<Value> {
    let table = lua.app_data_ref::<HandleTable>().ok_or_else(missing_table)?;
    let key = table
        .get(handle)
        .ok_or_else(|| mlua::Error::runtime(format!("invalid or released handle: {}", handle)))?;
    lua.registry_value::<Value>(key)
}

impl FromLua for ScriptValue {
    fn from_lua(value: Value, lua: &Lua) -> mlua::Result<Self> {
        Ok(match value {
            Value::Nil => Self::Nil,
            Value::Boolean(b) => Self::Boolean(b),
            Value::Integer(i) => Self::Number(i as f64),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::String(s.to_string_lossy().to_string()),
            Value::Error(e) => Self::String(e.to_string()),
            v @ Value::Table(_) => Self::Table(register_value(lua, v)?),
            v @ Value::Function(_) => Self::Function(register_value(lua, v)?),
            other => Self::Object(register_value(lua, other)?),
        })
    }
}

impl IntoLua for ScriptValue {
    fn into_lua(self, lua: &Lua) -> mlua::Result<Value> {
        match self {
            Self::Nil => Ok(Value::Nil),
            Self::Boolean(b) => Ok(Value::Boolean(b)),
            Self::Number(n) => Ok(Value::Number(n)),
            Self::String(s) => lua.create_string(&s).map(Value::String),
            Self::Table(h) | Self::Function(h) | Self::Object(h) => resolve_value(lua, &h),
        }
    }
}
