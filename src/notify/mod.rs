//! Chat platform abstractions: notification delivery, role management,
//! bounded retry, and shared mocks.

pub mod mock;
pub mod retry;
pub mod traits;

pub use retry::retry_with_backoff;
pub use traits::{is_chat_error_retryable, ChatError, ChatResult, Notifier, RoleManager};
