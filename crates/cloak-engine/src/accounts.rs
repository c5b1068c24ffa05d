use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use tracing::{debug, info};
use uuid::Uuid;

use cloak_db::{Database, time};
use cloak_gateway::Dispatcher;
use cloak_types::events::GatewayEvent;
use cloak_types::models::{PLACEHOLDER_HANDLE, User};

use crate::convert;
use crate::error::{CloakError, Result, ValidationError};
use crate::identity::{Identity, SessionContext};

const MIN_PASSWORD_LEN: usize = 6;

/// Local identity provider: registration, credential checks and the
/// suspended-account sign-in rule.
#[derive(Clone)]
pub struct Accounts {
    db: Arc<Database>,
    dispatcher: Dispatcher,
}

impl Accounts {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher) -> Self {
        Self { db, dispatcher }
    }

    pub fn register(&self, handle: &str, password: &str) -> Result<Identity> {
        let handle = handle.trim();
        validate_handle(handle)?;
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::WeakPassword { min: MIN_PASSWORD_LEN }.into());
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
            .to_string();

        let user_id = Uuid::new_v4();
        if !self
            .db
            .create_user(&user_id.to_string(), handle, &password_hash, &time::now())?
        {
            return Err(CloakError::HandleTaken);
        }

        info!(user_id = %user_id, "Registered {}", handle);
        Ok(Identity::new(user_id, handle))
    }

    /// Check a handle/password pair without touching any session. Returns
    /// the identity and whether the account is suspended.
    pub fn verify_credentials(&self, handle: &str, password: &str) -> Result<(Identity, bool)> {
        let row = self
            .db
            .get_user_by_username(handle.trim())?
            .ok_or(CloakError::InvalidCredentials)?;

        let parsed_hash = PasswordHash::new(&row.password)
            .map_err(|e| anyhow::anyhow!("stored hash unreadable: {}", e))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| CloakError::InvalidCredentials)?;

        let user_id = convert::id(&row.id)?;
        Ok((Identity::new(user_id, row.username), row.is_suspended))
    }

    /// Sign in to `session`. A suspended account is admitted and then
    /// immediately signed out, and every live connection it holds is told
    /// the session is revoked.
    pub fn sign_in(&self, session: &SessionContext, handle: &str, password: &str) -> Result<Identity> {
        let (identity, suspended) = self.verify_credentials(handle, password)?;

        session.set(identity.clone());
        if suspended {
            session.sign_out();
            self.dispatcher.broadcast(GatewayEvent::SessionRevoked {
                user_id: identity.user_id,
            });
            info!(user_id = %identity.user_id, "Sign-in refused, account suspended");
            return Err(CloakError::AccountSuspended);
        }

        debug!(user_id = %identity.user_id, "Signed in");
        Ok(identity)
    }

    /// Per-request gate: the account must exist and not be suspended.
    pub fn check_active(&self, user_id: Uuid) -> Result<Identity> {
        let row = self
            .db
            .get_user_by_id(&user_id.to_string())?
            .ok_or(CloakError::Unauthenticated)?;
        if row.is_suspended {
            return Err(CloakError::AccountSuspended);
        }
        Ok(Identity::new(user_id, row.username))
    }

    pub fn get_user(&self, user_id: Uuid) -> Result<User> {
        let row = self
            .db
            .get_user_by_id(&user_id.to_string())?
            .ok_or(CloakError::NotFound("user"))?;
        Ok(convert::user(row)?)
    }
}

fn validate_handle(handle: &str) -> Result<()> {
    let len = handle.chars().count();
    let charset_ok = handle
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
    if !(3..=32).contains(&len) || !charset_ok || handle.eq_ignore_ascii_case(PLACEHOLDER_HANDLE) {
        return Err(ValidationError::InvalidHandle.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accounts() -> Accounts {
        Accounts::new(Arc::new(Database::open_in_memory().unwrap()), Dispatcher::new())
    }

    #[test]
    fn handle_rules() {
        assert!(validate_handle("code_ninja").is_ok());
        assert!(validate_handle("a.b").is_ok());
        assert!(validate_handle("ab").is_err());
        assert!(validate_handle("has space").is_err());
        assert!(validate_handle("Anonymous").is_err());
        assert!(validate_handle(&"x".repeat(33)).is_err());
    }

    #[test]
    fn register_then_sign_in() {
        let accounts = accounts();
        let alice = accounts.register("alice", "secret1").unwrap();
        assert!(matches!(
            accounts.register("ALICE", "secret1"),
            Err(CloakError::HandleTaken)
        ));

        let session = SessionContext::new();
        let signed_in = accounts.sign_in(&session, "alice", "secret1").unwrap();
        assert_eq!(signed_in, alice);
        assert_eq!(session.current_user(), Some(alice));

        assert!(matches!(
            accounts.sign_in(&SessionContext::new(), "alice", "wrong"),
            Err(CloakError::InvalidCredentials)
        ));
        assert!(matches!(
            accounts.sign_in(&SessionContext::new(), "nobody", "secret1"),
            Err(CloakError::InvalidCredentials)
        ));
    }

    #[test]
    fn short_password_is_rejected() {
        assert!(matches!(
            accounts().register("alice", "12345"),
            Err(CloakError::Validation(ValidationError::WeakPassword { min: 6 }))
        ));
    }

    #[test]
    fn check_active_rejects_unknown_users() {
        assert!(matches!(
            accounts().check_active(Uuid::new_v4()),
            Err(CloakError::Unauthenticated)
        ));
    }
}
