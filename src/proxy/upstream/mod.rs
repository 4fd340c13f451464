// Upstream module
// Kiro wire-protocol translation: payload building, event-stream decoding,
// response assembly, SSE synthesis.

pub mod assembler;
pub mod event_stream;
pub mod parsers;
pub mod payload;
pub mod stream_events;
