//! Packet <-> Lua value conversion.
//!
//! Packets are exposed to handlers as tables with the canonical field names
//! (`Magic`, `Command`, `Datatype`, `Status`, `Vbucket`, `Opaque`, `Cas`,
//! `CollectionID`, `Key`, `Extras`, `Value`). Byte sequences become
//! sequences of 0-255 integers on the way in and are accepted back as Lua
//! strings, integer sequences, or sequences of integer-coercible values.

use crate::error::ScriptError;
use bytes::Bytes;
use memdproxy_protocol::{Magic, Packet};
use mlua::{Lua, Table, Value};

/// Converts a packet into the table handed to a handler.
pub fn packet_to_lua(lua: &Lua, packet: &Packet) -> Result<Table, ScriptError> {
    let table = lua.create_table().map_err(runtime)?;
    table
        .set("Magic", packet.magic.classic_wire())
        .map_err(runtime)?;
    table.set("Command", packet.opcode).map_err(runtime)?;
    table.set("Datatype", packet.datatype).map_err(runtime)?;
    table.set("Status", packet.status).map_err(runtime)?;
    table.set("Vbucket", packet.vbucket).map_err(runtime)?;
    table.set("Opaque", packet.opaque).map_err(runtime)?;
    table.set("Cas", packet.cas).map_err(runtime)?;
    table
        .set("CollectionID", packet.collection_id)
        .map_err(runtime)?;
    table
        .set("Key", bytes_to_lua(lua, &packet.key)?)
        .map_err(runtime)?;
    table
        .set("Extras", bytes_to_lua(lua, &packet.extras)?)
        .map_err(runtime)?;
    table
        .set("Value", bytes_to_lua(lua, &packet.value)?)
        .map_err(runtime)?;
    Ok(table)
}

/// Builds a packet from a table passed to `forward` or `reply`.
///
/// `Magic`, `Command`, `Datatype`, and `Status` are required; `Vbucket` is
/// required on requests. Everything else defaults to zero/empty.
/// Out-of-range integers are truncated to their low bits.
pub fn packet_from_lua(lua: &Lua, table: &Table) -> Result<Packet, ScriptError> {
    let magic = match required_integer(lua, table, "Magic")? as u8 {
        0x80 | 0x08 => Magic::Request,
        0x81 | 0x18 => Magic::Response,
        other => {
            return Err(ScriptError::Marshal(format!(
                "invalid magic {other:#04x}"
            )))
        }
    };

    let vbucket = if magic.is_request() {
        required_integer(lua, table, "Vbucket")? as u16
    } else {
        optional_integer(lua, table, "Vbucket")? as u16
    };

    Ok(Packet {
        magic,
        flexible: false,
        opcode: required_integer(lua, table, "Command")? as u8,
        datatype: required_integer(lua, table, "Datatype")? as u8,
        status: required_integer(lua, table, "Status")? as u16,
        vbucket,
        opaque: optional_integer(lua, table, "Opaque")? as u32,
        cas: optional_integer(lua, table, "Cas")? as u64,
        collection_id: optional_integer(lua, table, "CollectionID")? as u32,
        key: optional_bytes(lua, table, "Key")?,
        extras: optional_bytes(lua, table, "Extras")?,
        value: optional_bytes(lua, table, "Value")?,
        framing_extras: Bytes::new(),
    })
}

/// Exposes a byte sequence as a Lua sequence of integers.
pub fn bytes_to_lua(lua: &Lua, bytes: &[u8]) -> Result<Table, ScriptError> {
    lua.create_sequence_from(bytes.iter().map(|&b| b as i64))
        .map_err(runtime)
}

/// Accepts a byte sequence in any of the shapes handlers may produce:
/// a Lua string, a sequence of integers, or a sequence of values each
/// coercible to an integer. Out-of-range elements are truncated.
pub fn byte_array_from_lua(lua: &Lua, value: &Value, ctx: &str) -> Result<Bytes, ScriptError> {
    match value {
        Value::String(s) => Ok(Bytes::copy_from_slice(&s.as_bytes())),
        Value::Table(t) => {
            let mut out = Vec::with_capacity(t.raw_len());
            for element in t.sequence_values::<Value>() {
                let element = element.map_err(|e| {
                    ScriptError::Marshal(format!("{ctx}: {e}"))
                })?;
                out.push(lua_to_i64(lua, element, ctx)? as u8);
            }
            Ok(Bytes::from(out))
        }
        other => Err(ScriptError::Marshal(format!(
            "{ctx}: expected byte sequence, got {}",
            other.type_name()
        ))),
    }
}

fn runtime(err: mlua::Error) -> ScriptError {
    ScriptError::Runtime(err.to_string())
}

fn get_field(table: &Table, key: &str) -> Result<Value, ScriptError> {
    table
        .get(key)
        .map_err(|e| ScriptError::Marshal(format!("field {key:?}: {e}")))
}

fn required_integer(lua: &Lua, table: &Table, key: &str) -> Result<i64, ScriptError> {
    let value = get_field(table, key)?;
    if value.is_nil() {
        return Err(ScriptError::Marshal(format!(
            "missing required field {key:?}"
        )));
    }
    lua_to_i64(lua, value, key)
}

fn optional_integer(lua: &Lua, table: &Table, key: &str) -> Result<i64, ScriptError> {
    let value = get_field(table, key)?;
    if value.is_nil() {
        return Ok(0);
    }
    lua_to_i64(lua, value, key)
}

fn optional_bytes(lua: &Lua, table: &Table, key: &str) -> Result<Bytes, ScriptError> {
    let value = get_field(table, key)?;
    if value.is_nil() {
        return Ok(Bytes::new());
    }
    byte_array_from_lua(lua, &value, key)
}

fn lua_to_i64(lua: &Lua, value: Value, ctx: &str) -> Result<i64, ScriptError> {
    match value {
        Value::Integer(i) => Ok(i),
        Value::Number(n) => Ok(n as i64),
        other => {
            let type_name = other.type_name();
            match lua.coerce_integer(other) {
                Ok(Some(i)) => Ok(i),
                _ => Err(ScriptError::Marshal(format!(
                    "{ctx}: expected integer, got {type_name}"
                ))),
            }
        }
    }
}
