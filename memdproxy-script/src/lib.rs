//! # memdproxy-script
//!
//! Embedded Lua host for user packet handlers.
//!
//! A user script is a single Lua source unit whose top-level functions are
//! named after canonical opcode names (`GET`, `SET`, `HELO`, ...). For each
//! proxied packet whose opcode has a handler, the host calls the handler
//! with a table describing the packet; the handler reacts through the
//! installed globals (`forward`, `reply`, `log`, `stringToBytes`,
//! `bytesToString`).

pub mod error;
pub mod globals;
pub mod host;
pub mod marshal;

pub use error::ScriptError;
pub use host::{Dispatch, Invocation, ScriptAction, ScriptEngine, ScriptHost};
