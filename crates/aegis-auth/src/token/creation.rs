//! Token creation: claims assembly, signing, and serialization.
//!
//! [`TokenCreationService`] turns a fully validated request into abstract
//! [`Token`]s and serializes them — signed JWTs for self-contained tokens,
//! opaque stored handles for reference tokens. Signing keys come from the
//! rotating [`KeyMaterialService`], restricted by the per-request
//! algorithm allow-list.

use std::sync::Arc;

use jsonwebtoken::Header;
use serde_json::{Map, Value, json};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::oauth::token_request::ValidatedTokenRequest;
use crate::storage::{ReferenceTokenStore, StoredReferenceToken};
use crate::token::keys::KeyMaterialService;
use crate::types::grants::generate_handle;
use crate::types::{AccessTokenType, Token, TokenType};

/// JWT `typ` header for access tokens (RFC 9068).
const ACCESS_TOKEN_TYP: &str = "at+jwt";

/// Configuration for token creation.
#[derive(Debug, Clone)]
pub struct TokenCreationConfig {
    /// Issuer URL for the `iss` claim.
    pub issuer: String,

    /// Default access token lifetime in seconds, overridable per client.
    pub access_token_lifetime_secs: u64,

    /// Identity token lifetime in seconds.
    pub id_token_lifetime_secs: u64,
}

/// Builds and serializes tokens for validated requests.
pub struct TokenCreationService {
    keys: Arc<dyn KeyMaterialService>,
    reference_store: Arc<dyn ReferenceTokenStore>,
    config: TokenCreationConfig,
}

impl TokenCreationService {
    /// Creates a new token creation service.
    #[must_use]
    pub fn new(
        keys: Arc<dyn KeyMaterialService>,
        reference_store: Arc<dyn ReferenceTokenStore>,
        config: TokenCreationConfig,
    ) -> Self {
        Self {
            keys,
            reference_store,
            config,
        }
    }

    /// Builds the access token for a validated request.
    #[must_use]
    pub fn create_access_token(&self, request: &ValidatedTokenRequest) -> Token {
        let client = &request.client;

        Token {
            token_type: TokenType::Access,
            issuer: self.config.issuer.clone(),
            audiences: request.resources.api_resource_names(),
            subject_id: request.subject_id.clone(),
            client_id: client.client_id.clone(),
            session_id: request.session_id.clone(),
            scopes: request.resources.scope_names(),
            confirmation: request.confirmation.clone(),
            extra_claims: Map::new(),
            lifetime_secs: client.access_token_lifetime_or(self.config.access_token_lifetime_secs),
            allowed_signing_algorithms: merge_allow_lists(
                &request.resources.signing_algorithms(),
                &client.allowed_signing_algorithms,
            ),
            access_token_type: client.access_token_type,
        }
    }

    /// Builds the identity token for a validated request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request carries no subject.
    pub fn create_id_token(&self, request: &ValidatedTokenRequest) -> AuthResult<Token> {
        let subject_id = request
            .subject_id
            .clone()
            .ok_or_else(|| AuthError::internal("Identity token requested without a subject"))?;

        let mut extra_claims = Map::new();
        if let Some(nonce) = &request.nonce {
            extra_claims.insert("nonce".to_string(), json!(nonce));
        }

        Ok(Token {
            token_type: TokenType::Identity,
            issuer: self.config.issuer.clone(),
            audiences: vec![request.client.client_id.clone()],
            subject_id: Some(subject_id),
            client_id: request.client.client_id.clone(),
            session_id: request.session_id.clone(),
            scopes: vec![],
            confirmation: None,
            extra_claims,
            lifetime_secs: self.config.id_token_lifetime_secs,
            allowed_signing_algorithms: request.client.allowed_signing_algorithms.clone(),
            access_token_type: AccessTokenType::Jwt,
        })
    }

    /// Serializes a token: a signed JWT, or a stored reference handle for
    /// reference-typed access tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if signing or the reference store fails.
    pub async fn serialize(&self, token: &Token) -> AuthResult<String> {
        match (token.token_type, token.access_token_type) {
            (TokenType::Access, AccessTokenType::Reference) => {
                let handle = generate_handle();
                let stored = StoredReferenceToken {
                    token: token.clone(),
                    created_at: OffsetDateTime::now_utc(),
                };
                self.reference_store.store(&handle, &stored).await?;
                Ok(handle)
            }
            _ => self.sign_jwt(token).await,
        }
    }

    async fn sign_jwt(&self, token: &Token) -> AuthResult<String> {
        let key = self
            .keys
            .get_signing_key(&token.allowed_signing_algorithms)
            .await?;

        let mut header = Header::new(key.algorithm);
        header.kid = Some(key.kid.clone());
        if token.token_type == TokenType::Access {
            header.typ = Some(ACCESS_TOKEN_TYP.to_string());
        }

        let claims = self.build_claims(token);
        jsonwebtoken::encode(&header, &claims, &key.encoding_key)
            .map_err(|e| AuthError::internal(format!("Token signing failed: {e}")))
    }

    fn build_claims(&self, token: &Token) -> Map<String, Value> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let mut claims = Map::new();

        claims.insert("iss".to_string(), json!(token.issuer));
        claims.insert("iat".to_string(), json!(now));
        claims.insert("nbf".to_string(), json!(now));
        claims.insert(
            "exp".to_string(),
            json!(now + token.lifetime_secs as i64),
        );
        claims.insert("jti".to_string(), json!(Uuid::new_v4().to_string()));
        claims.insert("client_id".to_string(), json!(token.client_id));

        match token.audiences.len() {
            0 => {}
            1 => {
                claims.insert("aud".to_string(), json!(token.audiences[0]));
            }
            _ => {
                claims.insert("aud".to_string(), json!(token.audiences));
            }
        }

        if let Some(subject_id) = &token.subject_id {
            claims.insert("sub".to_string(), json!(subject_id));
        }
        if let Some(session_id) = &token.session_id {
            claims.insert("sid".to_string(), json!(session_id));
        }
        if !token.scopes.is_empty() {
            claims.insert("scope".to_string(), json!(token.scope_claim()));
        }
        if let Some(confirmation) = &token.confirmation
            && !confirmation.is_empty()
        {
            claims.insert(
                "cnf".to_string(),
                serde_json::to_value(confirmation).unwrap_or(Value::Null),
            );
        }

        for (name, value) in &token.extra_claims {
            claims.insert(name.clone(), value.clone());
        }

        claims
    }
}

/// Intersects two algorithm allow-lists, treating empty as unconstrained.
fn merge_allow_lists(resources: &[String], client: &[String]) -> Vec<String> {
    match (resources.is_empty(), client.is_empty()) {
        (true, true) => Vec::new(),
        (false, true) => resources.to_vec(),
        (true, false) => client.to_vec(),
        (false, false) => resources
            .iter()
            .filter(|alg| client.contains(alg))
            .cloned()
            .collect(),
    }
}
