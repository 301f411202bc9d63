//! MCP (Model Context Protocol) server plumbing.
//!
//! **Dispatch** (`server`): JSON-RPC 2.0 `initialize`, `ping`, `tools/list`,
//! `tools/call`, notifications and batches.
//!
//! **Transports**: SSE (`GET /sse` + `POST /messages/`, in `sse`) and direct
//! JSON over HTTP (`POST /mcp`).
//!
//! Transport reference: <https://modelcontextprotocol.io/specification/2024-11-05/basic/transports>

pub mod protocol;
pub mod server;
pub mod sse;

pub use server::{__path_mcp_handler, mcp_handler};
pub use sse::{__path_messages_handler, __path_sse_handler, messages_handler, sse_handler, SessionRegistry};
