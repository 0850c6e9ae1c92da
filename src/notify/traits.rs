//! Chat platform trait abstractions.
//!
//! The admission core never talks to a chat backend directly; it goes
//! through these traits so the whole pipeline is testable against mocks
//! (see `notify::mock`).

use crate::member::{CommunityId, MemberId, RoleId};
use async_trait::async_trait;

/// Result type for chat operations.
pub type ChatResult<T> = Result<T, ChatError>;

/// Chat platform errors.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Network error: {0}")]
    Network(String),

    /// Direct messages disabled or blocked; callers fall back to a visible
    /// in-community announcement.
    #[error("Member unreachable by private message: {0}")]
    Unreachable(MemberId),

    #[error("Member not found: {0}")]
    MemberNotFound(MemberId),

    #[error("Community not found: {0}")]
    CommunityNotFound(CommunityId),

    #[error("Unauthorized operation")]
    Unauthorized,
}

/// Notification delivery: private message first, visible fallback second.
#[async_trait]
pub trait Notifier: Clone + Send + Sync {
    /// Send a direct private message to a member.
    async fn send_private(&self, member: MemberId, content: &str) -> ChatResult<()>;

    /// Post a visible in-community announcement addressed to the member,
    /// used when private delivery fails.
    async fn send_fallback(
        &self,
        community: CommunityId,
        member: MemberId,
        content: &str,
    ) -> ChatResult<()>;

    /// Deliver an escalation to the community's staff surface.
    async fn send_staff(&self, community: CommunityId, content: &str) -> ChatResult<()>;
}

/// Membership and role primitive.
#[async_trait]
pub trait RoleManager: Clone + Send + Sync {
    async fn assign_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> ChatResult<()>;

    async fn remove_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> ChatResult<()>;

    async fn kick(&self, community: CommunityId, member: MemberId, reason: &str)
        -> ChatResult<()>;
}

/// Whether a chat error is transient and worth retrying.
pub fn is_chat_error_retryable(err: &ChatError) -> bool {
    matches!(err, ChatError::Network(_))
}
