//! JSON-RPC error codes.
//!
//! Legacy-dialect responses carry the same codes inside their
//! `{"error": {...}}` body, so the taxonomy is shared across both dialects.

/// Standard JSON-RPC error: invalid JSON
pub const PARSE_ERROR: i32 = -32700;
/// Standard JSON-RPC error: not a valid request object
pub const INVALID_REQUEST: i32 = -32600;
/// Standard JSON-RPC error: method does not exist
pub const METHOD_NOT_FOUND: i32 = -32601;
/// Standard JSON-RPC error: invalid method parameters
pub const INVALID_PARAMS: i32 = -32602;
/// Standard JSON-RPC error: internal error
pub const INTERNAL_ERROR: i32 = -32603;

// Implementation-defined server error range (-32000..-32099).

/// The bounded tool-call wait expired before the executor finished.
pub const TIMEOUT: i32 = -32000;
