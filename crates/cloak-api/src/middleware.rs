use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use cloak_engine::CloakError;
use cloak_types::api::Claims;

use crate::error::{ApiError, run_blocking};
use crate::state::AppState;

/// Validate the Bearer JWT, then check the account is still active, so
/// tokens issued before a suspension stop working. Inserts the caller's
/// `Identity` as a request extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(CloakError::Unauthenticated)?;

    let claims = decode_token(&state.jwt_secret, bearer.token()).ok_or(CloakError::Unauthenticated)?;

    let accounts = state.engine.accounts.clone();
    let identity = run_blocking(move || accounts.check_active(claims.sub)).await?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

pub fn create_token(secret: &str, user_id: Uuid, username: &str) -> anyhow::Result<String> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn decode_token(secret: &str, token: &str) -> Option<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .ok()
    .map(|data| data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip_and_wrong_secret() {
        let id = Uuid::new_v4();
        let token = create_token("secret-a", id, "alice").unwrap();
        let claims = decode_token("secret-a", &token).unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.username, "alice");
        assert!(decode_token("secret-b", &token).is_none());
    }
}
