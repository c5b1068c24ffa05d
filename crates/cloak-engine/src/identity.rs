//! The signed-in user, threaded explicitly into every engine call.

use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{CloakError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: Uuid,
    pub handle: String,
}

impl Identity {
    pub fn new(user_id: Uuid, handle: impl Into<String>) -> Self {
        Self {
            user_id,
            handle: handle.into(),
        }
    }
}

/// Fail with `Unauthenticated` when no one is signed in.
pub fn require(actor: Option<&Identity>) -> Result<&Identity> {
    actor.ok_or(CloakError::Unauthenticated)
}

/// One session's identity slot. Every login and logout is observable
/// through [`SessionContext::changes`].
#[derive(Debug)]
pub struct SessionContext {
    tx: watch::Sender<Option<Identity>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    pub fn current_user(&self) -> Option<Identity> {
        self.tx.borrow().clone()
    }

    pub fn changes(&self) -> watch::Receiver<Option<Identity>> {
        self.tx.subscribe()
    }

    pub(crate) fn set(&self, identity: Identity) {
        self.tx.send_replace(Some(identity));
    }

    pub fn sign_out(&self) {
        self.tx.send_replace(None);
    }
}
