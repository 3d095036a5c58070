//! Opcode and status code tables.
//!
//! Handler lookup in user scripts and packet logging both key off the
//! canonical opcode names returned by [`name`].

pub const GET: u8 = 0x00;
pub const SET: u8 = 0x01;
pub const ADD: u8 = 0x02;
pub const REPLACE: u8 = 0x03;
pub const DELETE: u8 = 0x04;
pub const INCREMENT: u8 = 0x05;
pub const DECREMENT: u8 = 0x06;
pub const QUIT: u8 = 0x07;
pub const FLUSH: u8 = 0x08;
pub const GETQ: u8 = 0x09;
pub const NOOP: u8 = 0x0a;
pub const VERSION: u8 = 0x0b;
pub const GETK: u8 = 0x0c;
pub const GETKQ: u8 = 0x0d;
pub const APPEND: u8 = 0x0e;
pub const PREPEND: u8 = 0x0f;
pub const STAT: u8 = 0x10;
pub const SETQ: u8 = 0x11;
pub const ADDQ: u8 = 0x12;
pub const REPLACEQ: u8 = 0x13;
pub const DELETEQ: u8 = 0x14;
pub const INCREMENTQ: u8 = 0x15;
pub const DECREMENTQ: u8 = 0x16;
pub const QUITQ: u8 = 0x17;
pub const FLUSHQ: u8 = 0x18;
pub const APPENDQ: u8 = 0x19;
pub const PREPENDQ: u8 = 0x1a;
pub const VERBOSITY: u8 = 0x1b;
pub const TOUCH: u8 = 0x1c;
pub const GAT: u8 = 0x1d;
pub const GATQ: u8 = 0x1e;
pub const HELO: u8 = 0x1f;
pub const SASL_LIST_MECHS: u8 = 0x20;
pub const SASL_AUTH: u8 = 0x21;
pub const SASL_STEP: u8 = 0x22;
pub const DCP_OPEN: u8 = 0x50;
pub const DCP_ADD_STREAM: u8 = 0x51;
pub const DCP_CLOSE_STREAM: u8 = 0x52;
pub const DCP_STREAM_REQ: u8 = 0x53;
pub const DCP_GET_FAILOVER_LOG: u8 = 0x54;
pub const DCP_STREAM_END: u8 = 0x55;
pub const DCP_SNAPSHOT_MARKER: u8 = 0x56;
pub const DCP_MUTATION: u8 = 0x57;
pub const DCP_DELETION: u8 = 0x58;
pub const DCP_EXPIRATION: u8 = 0x59;
pub const DCP_SET_VBUCKET_STATE: u8 = 0x5b;
pub const DCP_NOOP: u8 = 0x5c;
pub const DCP_BUFFER_ACK: u8 = 0x5d;
pub const DCP_CONTROL: u8 = 0x5e;
pub const GET_REPLICA: u8 = 0x83;
pub const SELECT_BUCKET: u8 = 0x89;
pub const OBSERVE_SEQNO: u8 = 0x91;
pub const OBSERVE: u8 = 0x92;
pub const GET_LOCKED: u8 = 0x94;
pub const UNLOCK: u8 = 0x95;
pub const GET_META: u8 = 0xa0;
pub const SET_WITH_META: u8 = 0xa2;
pub const DELETE_WITH_META: u8 = 0xa8;
pub const GET_CLUSTER_CONFIG: u8 = 0xb5;
pub const GET_RANDOM_KEY: u8 = 0xb6;
pub const COLLECTIONS_SET_MANIFEST: u8 = 0xb9;
pub const COLLECTIONS_GET_MANIFEST: u8 = 0xba;
pub const COLLECTIONS_GET_ID: u8 = 0xbb;
pub const SUBDOC_GET: u8 = 0xc5;
pub const SUBDOC_EXISTS: u8 = 0xc6;
pub const SUBDOC_DICT_ADD: u8 = 0xc7;
pub const SUBDOC_DICT_UPSERT: u8 = 0xc8;
pub const SUBDOC_DELETE: u8 = 0xc9;
pub const SUBDOC_REPLACE: u8 = 0xca;
pub const SUBDOC_ARRAY_PUSH_LAST: u8 = 0xcb;
pub const SUBDOC_ARRAY_PUSH_FIRST: u8 = 0xcc;
pub const SUBDOC_ARRAY_INSERT: u8 = 0xcd;
pub const SUBDOC_ARRAY_ADD_UNIQUE: u8 = 0xce;
pub const SUBDOC_COUNTER: u8 = 0xcf;
pub const SUBDOC_MULTI_LOOKUP: u8 = 0xd0;
pub const SUBDOC_MULTI_MUTATION: u8 = 0xd1;
pub const SUBDOC_GET_COUNT: u8 = 0xd2;
pub const GET_ERROR_MAP: u8 = 0xfe;

/// Returns the canonical name of an opcode, or `None` for codes this
/// implementation does not know. Packets with unknown opcodes are still
/// proxied; they just cannot have script handlers.
pub fn name(opcode: u8) -> Option<&'static str> {
    Some(match opcode {
        GET => "GET",
        SET => "SET",
        ADD => "ADD",
        REPLACE => "REPLACE",
        DELETE => "DELETE",
        INCREMENT => "INCREMENT",
        DECREMENT => "DECREMENT",
        QUIT => "QUIT",
        FLUSH => "FLUSH",
        GETQ => "GETQ",
        NOOP => "NOOP",
        VERSION => "VERSION",
        GETK => "GETK",
        GETKQ => "GETKQ",
        APPEND => "APPEND",
        PREPEND => "PREPEND",
        STAT => "STAT",
        SETQ => "SETQ",
        ADDQ => "ADDQ",
        REPLACEQ => "REPLACEQ",
        DELETEQ => "DELETEQ",
        INCREMENTQ => "INCREMENTQ",
        DECREMENTQ => "DECREMENTQ",
        QUITQ => "QUITQ",
        FLUSHQ => "FLUSHQ",
        APPENDQ => "APPENDQ",
        PREPENDQ => "PREPENDQ",
        VERBOSITY => "VERBOSITY",
        TOUCH => "TOUCH",
        GAT => "GAT",
        GATQ => "GATQ",
        HELO => "HELO",
        SASL_LIST_MECHS => "SASL_LIST_MECHS",
        SASL_AUTH => "SASL_AUTH",
        SASL_STEP => "SASL_STEP",
        DCP_OPEN => "DCP_OPEN",
        DCP_ADD_STREAM => "DCP_ADD_STREAM",
        DCP_CLOSE_STREAM => "DCP_CLOSE_STREAM",
        DCP_STREAM_REQ => "DCP_STREAM_REQ",
        DCP_GET_FAILOVER_LOG => "DCP_GET_FAILOVER_LOG",
        DCP_STREAM_END => "DCP_STREAM_END",
        DCP_SNAPSHOT_MARKER => "DCP_SNAPSHOT_MARKER",
        DCP_MUTATION => "DCP_MUTATION",
        DCP_DELETION => "DCP_DELETION",
        DCP_EXPIRATION => "DCP_EXPIRATION",
        DCP_SET_VBUCKET_STATE => "DCP_SET_VBUCKET_STATE",
        DCP_NOOP => "DCP_NOOP",
        DCP_BUFFER_ACK => "DCP_BUFFER_ACK",
        DCP_CONTROL => "DCP_CONTROL",
        GET_REPLICA => "GET_REPLICA",
        SELECT_BUCKET => "SELECT_BUCKET",
        OBSERVE_SEQNO => "OBSERVE_SEQNO",
        OBSERVE => "OBSERVE",
        GET_LOCKED => "GET_LOCKED",
        UNLOCK => "UNLOCK",
        GET_META => "GET_META",
        SET_WITH_META => "SET_WITH_META",
        DELETE_WITH_META => "DELETE_WITH_META",
        GET_CLUSTER_CONFIG => "GET_CLUSTER_CONFIG",
        GET_RANDOM_KEY => "GET_RANDOM_KEY",
        COLLECTIONS_SET_MANIFEST => "COLLECTIONS_SET_MANIFEST",
        COLLECTIONS_GET_MANIFEST => "COLLECTIONS_GET_MANIFEST",
        COLLECTIONS_GET_ID => "COLLECTIONS_GET_ID",
        SUBDOC_GET => "SUBDOC_GET",
        SUBDOC_EXISTS => "SUBDOC_EXISTS",
        SUBDOC_DICT_ADD => "SUBDOC_DICT_ADD",
        SUBDOC_DICT_UPSERT => "SUBDOC_DICT_UPSERT",
        SUBDOC_DELETE => "SUBDOC_DELETE",
        SUBDOC_REPLACE => "SUBDOC_REPLACE",
        SUBDOC_ARRAY_PUSH_LAST => "SUBDOC_ARRAY_PUSH_LAST",
        SUBDOC_ARRAY_PUSH_FIRST => "SUBDOC_ARRAY_PUSH_FIRST",
        SUBDOC_ARRAY_INSERT => "SUBDOC_ARRAY_INSERT",
        SUBDOC_ARRAY_ADD_UNIQUE => "SUBDOC_ARRAY_ADD_UNIQUE",
        SUBDOC_COUNTER => "SUBDOC_COUNTER",
        SUBDOC_MULTI_LOOKUP => "SUBDOC_MULTI_LOOKUP",
        SUBDOC_MULTI_MUTATION => "SUBDOC_MULTI_MUTATION",
        SUBDOC_GET_COUNT => "SUBDOC_GET_COUNT",
        GET_ERROR_MAP => "GET_ERROR_MAP",
        _ => return None,
    })
}

/// Returns whether the key of a request with this opcode carries a
/// collection-id prefix once the COLLECTIONS feature is negotiated.
pub fn is_collection_scoped(opcode: u8) -> bool {
    matches!(
        opcode,
        GET | GETQ
            | GETK
            | GETKQ
            | SET
            | SETQ
            | ADD
            | ADDQ
            | REPLACE
            | REPLACEQ
            | DELETE
            | DELETEQ
            | INCREMENT
            | INCREMENTQ
            | DECREMENT
            | DECREMENTQ
            | APPEND
            | APPENDQ
            | PREPEND
            | PREPENDQ
            | TOUCH
            | GAT
            | GATQ
            | GET_REPLICA
            | GET_LOCKED
            | UNLOCK
            | GET_META
            | SET_WITH_META
            | DELETE_WITH_META
            | SUBDOC_GET
            | SUBDOC_EXISTS
            | SUBDOC_DICT_ADD
            | SUBDOC_DICT_UPSERT
            | SUBDOC_DELETE
            | SUBDOC_REPLACE
            | SUBDOC_ARRAY_PUSH_LAST
            | SUBDOC_ARRAY_PUSH_FIRST
            | SUBDOC_ARRAY_INSERT
            | SUBDOC_ARRAY_ADD_UNIQUE
            | SUBDOC_COUNTER
            | SUBDOC_MULTI_LOOKUP
            | SUBDOC_MULTI_MUTATION
            | SUBDOC_GET_COUNT
    )
}

/// Returns the conventional name of a response status code.
pub fn status_name(status: u16) -> Option<&'static str> {
    Some(match status {
        0x0000 => "SUCCESS",
        0x0001 => "KEY_NOT_FOUND",
        0x0002 => "KEY_EXISTS",
        0x0003 => "VALUE_TOO_LARGE",
        0x0004 => "INVALID_ARGUMENTS",
        0x0005 => "ITEM_NOT_STORED",
        0x0006 => "DELTA_BAD_VALUE",
        0x0007 => "NOT_MY_VBUCKET",
        0x0008 => "NO_BUCKET",
        0x0009 => "LOCKED",
        0x001f => "AUTH_STALE",
        0x0020 => "AUTH_ERROR",
        0x0021 => "AUTH_CONTINUE",
        0x0022 => "RANGE_ERROR",
        0x0023 => "ROLLBACK",
        0x0024 => "NO_ACCESS",
        0x0025 => "NOT_INITIALIZED",
        0x0081 => "UNKNOWN_COMMAND",
        0x0082 => "OUT_OF_MEMORY",
        0x0083 => "NOT_SUPPORTED",
        0x0084 => "INTERNAL_ERROR",
        0x0085 => "BUSY",
        0x0086 => "TEMPORARY_FAILURE",
        0x0088 => "UNKNOWN_COLLECTION",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_lookup() {
        assert_eq!(name(GET), Some("GET"));
        assert_eq!(name(HELO), Some("HELO"));
        assert_eq!(name(SUBDOC_MULTI_MUTATION), Some("SUBDOC_MULTI_MUTATION"));
        assert_eq!(name(0xff), None);
    }

    #[test]
    fn test_collection_scoping() {
        assert!(is_collection_scoped(GET));
        assert!(is_collection_scoped(SUBDOC_GET));
        assert!(!is_collection_scoped(HELO));
        assert!(!is_collection_scoped(NOOP));
        assert!(!is_collection_scoped(STAT));
    }

    #[test]
    fn test_status_names() {
        assert_eq!(status_name(0x0000), Some("SUCCESS"));
        assert_eq!(status_name(0x0001), Some("KEY_NOT_FOUND"));
        assert_eq!(status_name(0x4242), None);
    }
}
