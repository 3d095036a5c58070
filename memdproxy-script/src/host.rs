//! Script host lifecycle and handler dispatch.
//!
//! [`ScriptHost`] is the template built once at startup: it compile-checks
//! the user script and hands out one [`ScriptEngine`] per accepted
//! connection. Each engine is an independent interpreter that re-executes
//! the script's top level, so per-session state in script globals never
//! leaks between connections.

use crate::error::ScriptError;
use crate::globals;
use crate::marshal;
use memdproxy_protocol::Packet;
use mlua::{Lua, Value};
use parking_lot::Mutex;
use std::sync::Arc;

/// A packet action issued by a handler, in issue order.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptAction {
    /// Send toward the side opposite the handled packet's origin.
    Forward(Packet),
    /// Send back toward the handled packet's origin.
    Reply(Packet),
}

/// Queue the host globals push actions onto during one handler call.
pub(crate) type ActionSink = Arc<Mutex<Vec<ScriptAction>>>;

/// The outcome of invoking a handler.
///
/// When the handler failed partway, `actions` still holds everything it
/// issued before the failure; those actions are delivered regardless.
#[derive(Debug)]
pub struct Invocation {
    pub actions: Vec<ScriptAction>,
    pub error: Option<ScriptError>,
}

/// The outcome of offering a packet to the script.
#[derive(Debug)]
pub enum Dispatch {
    /// No handler is defined for the opcode; the caller forwards unchanged.
    NoHandler,
    /// A handler ran (possibly failing); route the collected actions.
    Handled(Invocation),
}

/// The compiled user script, loaded once at process start.
#[derive(Debug, Clone)]
pub struct ScriptHost {
    name: Arc<str>,
    source: Arc<str>,
}

impl ScriptHost {
    /// Compile-checks the script and builds the template.
    ///
    /// `name` should be the script's base file name; it tags every log line
    /// the script emits and every packet it injects.
    pub fn load(name: impl Into<String>, source: impl Into<String>) -> Result<Self, ScriptError> {
        let host = Self {
            name: Arc::from(name.into()),
            source: Arc::from(source.into()),
        };
        host.instantiate()?;
        Ok(host)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Builds an independent engine for one connection.
    pub fn instantiate(&self) -> Result<ScriptEngine, ScriptError> {
        ScriptEngine::new(self.name.clone(), &self.source)
    }
}

/// One connection's interpreter.
///
/// Not internally synchronized: callers must serialize `dispatch` calls
/// (the proxy wraps each engine in a mutex shared by the pair's readers).
pub struct ScriptEngine {
    lua: Lua,
    name: Arc<str>,
    sink: ActionSink,
}

impl ScriptEngine {
    fn new(name: Arc<str>, source: &str) -> Result<Self, ScriptError> {
        let lua = Lua::new();
        let sink: ActionSink = Arc::new(Mutex::new(Vec::new()));
        globals::register(&lua, name.clone(), sink.clone())
            .map_err(|e| ScriptError::Compile(e.to_string()))?;
        lua.load(source)
            .set_name(name.as_ref())
            .exec()
            .map_err(|e| ScriptError::Compile(e.to_string()))?;
        Ok(Self { lua, name, sink })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The script name as a cheap shared handle, for tagging packets.
    pub fn name_tag(&self) -> Arc<str> {
        self.name.clone()
    }

    /// Offers one packet to the script.
    ///
    /// Looks up a top-level function named after the packet's opcode and, if
    /// present, invokes it with the marshalled packet. Actions the handler
    /// issued before any failure are returned either way; a script throw
    /// never propagates past this method.
    pub fn dispatch(&self, packet: &Packet) -> Dispatch {
        let Some(handler_name) = packet.command_name() else {
            return Dispatch::NoHandler;
        };
        let value: Value = match self.lua.globals().get(handler_name) {
            Ok(v) => v,
            Err(e) => {
                return Dispatch::Handled(Invocation {
                    actions: Vec::new(),
                    error: Some(e.into()),
                })
            }
        };
        let handler = match value {
            Value::Nil => return Dispatch::NoHandler,
            Value::Function(f) => f,
            other => {
                return Dispatch::Handled(Invocation {
                    actions: Vec::new(),
                    error: Some(ScriptError::Runtime(format!(
                        "global {handler_name:?} is a {}, not a function",
                        other.type_name()
                    ))),
                })
            }
        };

        self.sink.lock().clear();
        let result = marshal::packet_to_lua(&self.lua, packet)
            .and_then(|table| handler.call::<()>(table).map_err(ScriptError::from));
        let actions = std::mem::take(&mut *self.sink.lock());
        Dispatch::Handled(Invocation {
            actions,
            error: result.err(),
        })
    }
}
