use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::convert::Infallible;
use tracing::debug;
use uuid::Uuid;

use crate::models::user::Claims;
use crate::state::AppState;

/// Caller identity from an optional `Authorization: Bearer` token.
///
/// Payments are open to guests, so a missing or invalid token yields `None`
/// instead of rejecting the request.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionalCaller(pub Option<Uuid>);

pub fn decode_caller(token: &str, secret: &str) -> Option<Uuid> {
    let decoding_key = DecodingKey::from_secret(secret.as_ref());

    let token_data = decode::<Claims>(token, &decoding_key, &Validation::new(Algorithm::HS256))
        .map_err(|e| debug!(error = %e, "Ignoring invalid bearer token"))
        .ok()?;

    Uuid::parse_str(&token_data.claims.user_id).ok()
}

#[async_trait]
impl<S> FromRequestParts<S> for OptionalCaller
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "));

        let Some(token) = token else {
            return Ok(OptionalCaller(None));
        };

        let state = AppState::from_ref(state);
        Ok(OptionalCaller(decode_caller(token, &state.settings.jwt_secret)))
    }
}
