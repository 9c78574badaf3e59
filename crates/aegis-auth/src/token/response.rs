//! Token response generation.
//!
//! Turns a [`TokenRequestValidationResult`] into the wire-level token
//! response: access token always, refresh token when `offline_access` was
//! granted, identity token when `openid` was granted and a subject exists.

use std::sync::Arc;

use tracing::debug;

use crate::AuthResult;
use crate::oauth::token_request::{TokenRequestValidationResult, TokenResponse};
use crate::token::creation::TokenCreationService;
use crate::token::refresh::RefreshTokenService;
use crate::types::ProofType;

/// Builds token responses for validated requests.
pub struct TokenResponseGenerator {
    creation: Arc<TokenCreationService>,
    refresh: Arc<RefreshTokenService>,
}

impl TokenResponseGenerator {
    /// Creates a new response generator.
    #[must_use]
    pub fn new(creation: Arc<TokenCreationService>, refresh: Arc<RefreshTokenService>) -> Self {
        Self { creation, refresh }
    }

    /// Generates the response for a validated token request.
    ///
    /// For the refresh_token grant, rotation/extension of the presented
    /// handle happens here; other grants mint a fresh refresh token when
    /// `offline_access` was granted.
    ///
    /// # Errors
    ///
    /// Returns an error if token creation, signing, or the refresh token
    /// store fails.
    pub async fn process(
        &self,
        result: &TokenRequestValidationResult,
    ) -> AuthResult<TokenResponse> {
        let request = &result.validated;

        let access_token = self.creation.create_access_token(request);
        let expires_in = access_token.lifetime_secs;
        let scope = access_token.scope_claim();
        let serialized_access_token = self.creation.serialize(&access_token).await?;

        let refresh_token = if request.resources.offline_access {
            match (&request.refresh_token, &request.refresh_token_handle) {
                (Some(token), Some(handle)) => Some(
                    self.refresh
                        .update_refresh_token(handle, token, &request.client)
                        .await?,
                ),
                _ => Some(self.refresh.create_refresh_token(request).await?),
            }
        } else {
            None
        };

        let id_token = if request.subject_id.is_some()
            && request
                .resources
                .identity_resources
                .iter()
                .any(|resource| resource.name == "openid")
        {
            let token = self.creation.create_id_token(request)?;
            Some(self.creation.serialize(&token).await?)
        } else {
            None
        };

        let token_type = match request.proof_type {
            Some(ProofType::Dpop) => "DPoP".to_string(),
            _ => "Bearer".to_string(),
        };

        debug!(
            client_id = %request.client.client_id,
            grant_type = %request.grant_type,
            "Token response generated"
        );

        Ok(TokenResponse {
            access_token: serialized_access_token,
            token_type,
            expires_in,
            scope,
            refresh_token,
            id_token,
        })
    }
}
