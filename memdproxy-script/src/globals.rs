//! Host globals installed into every script environment.
//!
//! Usage from a script:
//!
//! ```lua
//! function GET(packet)
//!     log("GET for key %s", bytesToString(packet.Key))
//!     packet.Key = stringToBytes("other")
//!     forward(packet)
//! end
//! ```
//!
//! `forward` and `reply` marshal their argument immediately and queue the
//! resulting packet as a pending action; the invoking task drains the queue
//! after the handler returns and routes each action by the origin of the
//! packet being handled.

use crate::host::{ActionSink, ScriptAction};
use crate::marshal;
use mlua::{Function, Lua, MultiValue, Table, Value};
use std::sync::Arc;

/// Registers all host globals on a fresh interpreter.
pub(crate) fn register(lua: &Lua, script_name: Arc<str>, sink: ActionSink) -> mlua::Result<()> {
    let globals = lua.globals();

    let forward_sink = sink.clone();
    globals.set(
        "forward",
        lua.create_function(move |lua, packet: Table| {
            let packet = marshal::packet_from_lua(lua, &packet).map_err(mlua::Error::external)?;
            forward_sink.lock().push(ScriptAction::Forward(packet));
            Ok(())
        })?,
    )?;

    let reply_sink = sink;
    globals.set(
        "reply",
        lua.create_function(move |lua, packet: Table| {
            let packet = marshal::packet_from_lua(lua, &packet).map_err(mlua::Error::external)?;
            reply_sink.lock().push(ScriptAction::Reply(packet));
            Ok(())
        })?,
    )?;

    globals.set(
        "log",
        lua.create_function(move |lua, args: MultiValue| {
            let message = format_log_message(lua, args)?;
            tracing::info!(script = %script_name, "{}", message);
            Ok(())
        })?,
    )?;

    globals.set(
        "stringToBytes",
        lua.create_function(|lua, s: mlua::String| {
            marshal::bytes_to_lua(lua, &s.as_bytes()).map_err(mlua::Error::external)
        })?,
    )?;

    globals.set(
        "bytesToString",
        lua.create_function(|lua, value: Value| {
            let bytes = marshal::byte_array_from_lua(lua, &value, "bytesToString")
                .map_err(mlua::Error::external)?;
            let text = String::from_utf8(bytes.to_vec()).map_err(|_| {
                mlua::Error::RuntimeError("bytesToString: input is not valid UTF-8".into())
            })?;
            lua.create_string(text)
        })?,
    )?;

    Ok(())
}

/// Renders a `log(fmt, ...)` call. With a single argument the argument
/// itself is the message; with more, the arguments go through Lua's
/// `string.format`.
fn format_log_message(lua: &Lua, args: MultiValue) -> mlua::Result<String> {
    if args.len() <= 1 {
        let value = args.into_iter().next().unwrap_or(Value::Nil);
        let type_name = value.type_name();
        return Ok(match lua.coerce_string(value)? {
            Some(s) => s.to_string_lossy().to_string(),
            None => format!("<{type_name}>"),
        });
    }
    let string_table: Table = lua.globals().get("string")?;
    let format: Function = string_table.get("format")?;
    let formatted: mlua::String = format.call(args)?;
    Ok(formatted.to_string_lossy().to_string())
}
