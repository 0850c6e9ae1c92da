//! Mock chat clients shared by unit and integration tests.

use crate::member::{CommunityId, MemberId, RoleId};
use crate::notify::traits::{ChatError, ChatResult, Notifier, RoleManager};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};

/// Recording notifier with switchable private-delivery failure.
#[derive(Clone, Default)]
pub struct MockNotifier {
    private: Arc<Mutex<Vec<(MemberId, String)>>>,
    fallback: Arc<Mutex<Vec<(CommunityId, MemberId, String)>>>,
    staff: Arc<Mutex<Vec<(CommunityId, String)>>>,
    fail_private: Arc<Mutex<bool>>,
    fail_fallback: Arc<Mutex<bool>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `send_private` return `Unreachable` until cleared.
    pub fn set_fail_private(&self, fail: bool) {
        *self.fail_private.lock().unwrap() = fail;
    }

    /// Make `send_fallback` fail too (member fully unreachable).
    pub fn set_fail_fallback(&self, fail: bool) {
        *self.fail_fallback.lock().unwrap() = fail;
    }

    pub fn private_messages(&self) -> Vec<(MemberId, String)> {
        self.private.lock().unwrap().clone()
    }

    pub fn fallback_messages(&self) -> Vec<(CommunityId, MemberId, String)> {
        self.fallback.lock().unwrap().clone()
    }

    pub fn staff_messages(&self) -> Vec<(CommunityId, String)> {
        self.staff.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_private(&self, member: MemberId, content: &str) -> ChatResult<()> {
        if *self.fail_private.lock().unwrap() {
            return Err(ChatError::Unreachable(member));
        }
        self.private
            .lock()
            .unwrap()
            .push((member, content.to_string()));
        Ok(())
    }

    async fn send_fallback(
        &self,
        community: CommunityId,
        member: MemberId,
        content: &str,
    ) -> ChatResult<()> {
        if *self.fail_fallback.lock().unwrap() {
            return Err(ChatError::CommunityNotFound(community));
        }
        self.fallback
            .lock()
            .unwrap()
            .push((community, member, content.to_string()));
        Ok(())
    }

    async fn send_staff(&self, community: CommunityId, content: &str) -> ChatResult<()> {
        self.staff
            .lock()
            .unwrap()
            .push((community, content.to_string()));
        Ok(())
    }
}

/// Recording role manager.
#[derive(Clone, Default)]
pub struct MockRoleManager {
    assigned: Arc<Mutex<Vec<(CommunityId, MemberId, RoleId)>>>,
    removed: Arc<Mutex<Vec<(CommunityId, MemberId, RoleId)>>>,
    kicked: Arc<Mutex<Vec<(CommunityId, MemberId, String)>>>,
    fail_assign: Arc<Mutex<bool>>,
}

impl MockRoleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `assign_role` return `MemberNotFound` until cleared.
    pub fn set_fail_assign(&self, fail: bool) {
        *self.fail_assign.lock().unwrap() = fail;
    }

    pub fn assigned_roles(&self) -> Vec<(CommunityId, MemberId, RoleId)> {
        self.assigned.lock().unwrap().clone()
    }

    pub fn removed_roles(&self) -> Vec<(CommunityId, MemberId, RoleId)> {
        self.removed.lock().unwrap().clone()
    }

    pub fn kicked_members(&self) -> Vec<(CommunityId, MemberId, String)> {
        self.kicked.lock().unwrap().clone()
    }
}

#[async_trait]
impl RoleManager for MockRoleManager {
    async fn assign_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> ChatResult<()> {
        if *self.fail_assign.lock().unwrap() {
            return Err(ChatError::MemberNotFound(member));
        }
        self.assigned
            .lock()
            .unwrap()
            .push((community, member, role));
        Ok(())
    }

    async fn remove_role(
        &self,
        community: CommunityId,
        member: MemberId,
        role: RoleId,
    ) -> ChatResult<()> {
        self.removed.lock().unwrap().push((community, member, role));
        Ok(())
    }

    async fn kick(
        &self,
        community: CommunityId,
        member: MemberId,
        reason: &str,
    ) -> ChatResult<()> {
        self.kicked
            .lock()
            .unwrap()
            .push((community, member, reason.to_string()));
        Ok(())
    }
}
