//! Core abstractions for per-session contexts and message delivery.
//!
//! This crate provides the fundamental building blocks:
//! - `ForwardMsg` - Typed server-to-client message enum
//! - `ForwardChannel` - Per-session FIFO queue with a separate delivery path
//! - `ScriptRunContext` - The application-facing handle to one session
//! - `UserInfo` / `UserInfoProxy` - Per-session identity and its read-only facade
//! - Sink trait and shared identifiers

pub mod channel;
pub mod context;
pub mod forward_msg;
pub mod traits;
pub mod user_info;

pub use channel::{ForwardChannel, ForwardReceiver};
pub use context::{AuthState, ScriptRunContext, SessionState, SharedSessionState};
pub use forward_msg::ForwardMsg;
pub use traits::{MessageSink, SessionId, SinkError};
pub use user_info::{UserInfo, UserInfoError, UserInfoProxy};
