//! Inbound token validation.
//!
//! Validates access tokens presented to resource servers and the
//! introspection path: self-contained JWTs are verified against the
//! rotating validation keys, opaque reference tokens are resolved through
//! the reference token store. Both paths then check client activity,
//! subject activity, and — for session-coordinated clients — server-side
//! session liveness.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value};
use time::Duration;
use tracing::debug;

use crate::AuthResult;
use crate::error::AuthError;
use crate::profile::ProfileService;
use crate::session::SessionCoordinationService;
use crate::storage::{ClientStore, ReferenceTokenStore};
use crate::token::keys::KeyMaterialService;
use crate::types::Confirmation;

/// Configuration for inbound token validation.
#[derive(Debug, Clone)]
pub struct TokenValidatorConfig {
    /// Expected issuer.
    pub issuer: String,

    /// Allowed clock skew for expiry checks.
    pub clock_skew: std::time::Duration,
}

/// A successfully validated access token.
#[derive(Debug, Clone)]
pub struct ValidatedAccessToken {
    /// The full claims set.
    pub claims: Map<String, Value>,

    /// Client the token was issued to.
    pub client_id: String,

    /// Subject, absent for machine tokens.
    pub subject_id: Option<String>,

    /// Server-side session id, if any.
    pub session_id: Option<String>,

    /// Granted scopes.
    pub scopes: Vec<String>,

    /// Proof-of-possession confirmation, if any.
    pub confirmation: Option<Confirmation>,
}

/// Validates inbound access tokens.
pub struct TokenValidator {
    keys: Arc<dyn KeyMaterialService>,
    reference_store: Arc<dyn ReferenceTokenStore>,
    client_store: Arc<dyn ClientStore>,
    profile: Arc<dyn ProfileService>,
    sessions: Arc<SessionCoordinationService>,
    config: TokenValidatorConfig,
}

impl TokenValidator {
    /// Creates a new token validator.
    #[must_use]
    pub fn new(
        keys: Arc<dyn KeyMaterialService>,
        reference_store: Arc<dyn ReferenceTokenStore>,
        client_store: Arc<dyn ClientStore>,
        profile: Arc<dyn ProfileService>,
        sessions: Arc<SessionCoordinationService>,
        config: TokenValidatorConfig,
    ) -> Self {
        Self {
            keys,
            reference_store,
            client_store,
            profile,
            sessions,
            config,
        }
    }

    /// Validates an access token, JWT or reference.
    ///
    /// # Arguments
    ///
    /// * `token` - The presented token
    /// * `expected_scope` - Scope the caller requires, if any
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for signature/expiry/issuer/scope
    /// failures and inactive clients or subjects, and `AuthError::InvalidGrant`
    /// when session coordination invalidates the token.
    pub async fn validate_access_token(
        &self,
        token: &str,
        expected_scope: Option<&str>,
    ) -> AuthResult<ValidatedAccessToken> {
        let claims = if looks_like_jwt(token) {
            self.validate_jwt(token).await?
        } else {
            self.validate_reference(token).await?
        };

        let validated = extract_token_facts(claims)?;

        // Client must still exist and be active.
        let client = self
            .client_store
            .find_by_client_id(&validated.client_id)
            .await?
            .ok_or_else(|| AuthError::invalid_token("Unknown client"))?;
        if !client.active {
            debug!(client_id = %client.client_id, "Token for inactive client");
            return Err(AuthError::invalid_token("Client is no longer active"));
        }

        // Subject must still be active.
        if let Some(subject_id) = &validated.subject_id {
            if !self.profile.is_active(subject_id, &client).await? {
                debug!("Token subject is no longer active");
                return Err(AuthError::invalid_token("Subject is no longer active"));
            }

            // Session-coordinated clients additionally require the
            // server-side session to be alive.
            self.sessions
                .validate_session(&client, subject_id, validated.session_id.as_deref())
                .await?;
        }

        if let Some(required) = expected_scope
            && !validated.scopes.iter().any(|scope| scope == required)
        {
            return Err(AuthError::invalid_token(format!(
                "Token is missing required scope {required}"
            )));
        }

        Ok(validated)
    }

    async fn validate_jwt(&self, token: &str) -> AuthResult<Map<String, Value>> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|_| AuthError::invalid_token("Malformed token"))?;

        let keys = self.keys.get_validation_keys().await?;
        let candidates: Vec<_> = match header.kid.as_deref() {
            Some(kid) => keys.iter().filter(|key| key.kid == kid).collect(),
            None => keys.iter().collect(),
        };

        let mut validation = jsonwebtoken::Validation::new(header.alg);
        validation.leeway = self.config.clock_skew.as_secs();
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::from(["exp".to_string(), "iss".to_string()]);
        validation.set_issuer(&[&self.config.issuer]);

        for key in candidates {
            if key.algorithm != header.alg {
                continue;
            }
            if let Ok(data) = jsonwebtoken::decode::<Map<String, Value>>(
                token,
                &key.decoding_key,
                &validation,
            ) {
                return Ok(data.claims);
            }
        }

        debug!("Access token failed JWT validation");
        Err(AuthError::invalid_token("Token validation failed"))
    }

    async fn validate_reference(&self, handle: &str) -> AuthResult<Map<String, Value>> {
        let stored = self
            .reference_store
            .find(handle)
            .await?
            .ok_or_else(|| AuthError::invalid_token("Unknown token"))?;

        let skew = Duration::seconds(self.config.clock_skew.as_secs() as i64);
        if time::OffsetDateTime::now_utc() > stored.expires_at() + skew {
            // Best-effort cleanup of the dead handle.
            self.reference_store.remove(handle).await?;
            return Err(AuthError::invalid_token("Token has expired"));
        }

        let token = &stored.token;
        let mut claims = Map::new();
        claims.insert("iss".to_string(), Value::String(token.issuer.clone()));
        claims.insert(
            "client_id".to_string(),
            Value::String(token.client_id.clone()),
        );
        if let Some(subject_id) = &token.subject_id {
            claims.insert("sub".to_string(), Value::String(subject_id.clone()));
        }
        if let Some(session_id) = &token.session_id {
            claims.insert("sid".to_string(), Value::String(session_id.clone()));
        }
        if !token.scopes.is_empty() {
            claims.insert("scope".to_string(), Value::String(token.scope_claim()));
        }
        if let Some(confirmation) = &token.confirmation
            && !confirmation.is_empty()
        {
            claims.insert(
                "cnf".to_string(),
                serde_json::to_value(confirmation).unwrap_or(Value::Null),
            );
        }
        match token.audiences.len() {
            0 => {}
            1 => {
                claims.insert("aud".to_string(), Value::String(token.audiences[0].clone()));
            }
            _ => {
                claims.insert(
                    "aud".to_string(),
                    Value::Array(
                        token
                            .audiences
                            .iter()
                            .map(|a| Value::String(a.clone()))
                            .collect(),
                    ),
                );
            }
        }

        Ok(claims)
    }
}

fn looks_like_jwt(token: &str) -> bool {
    token.chars().filter(|c| *c == '.').count() == 2
}

fn extract_token_facts(claims: Map<String, Value>) -> AuthResult<ValidatedAccessToken> {
    let client_id = claims
        .get("client_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AuthError::invalid_token("Token is missing client_id"))?;

    let subject_id = claims
        .get("sub")
        .and_then(Value::as_str)
        .map(str::to_string);
    let session_id = claims
        .get("sid")
        .and_then(Value::as_str)
        .map(str::to_string);
    let scopes = claims
        .get("scope")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    let confirmation = claims
        .get("cnf")
        .and_then(|value| serde_json::from_value(value.clone()).ok());

    Ok(ValidatedAccessToken {
        claims,
        client_id,
        subject_id,
        session_id,
        scopes,
        confirmation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::oauth::token_request::ValidatedTokenRequest;
    use crate::profile::AllowAllProfiles;
    use crate::session::{BackChannelLogoutNotifier, BackChannelLogoutRequest, ServerSideSession};
    use crate::storage::{RefreshTokenStore, ServerSideSessionStore, StoredReferenceToken};
    use crate::token::creation::{TokenCreationConfig, TokenCreationService};
    use crate::token::keys::InMemoryKeyMaterial;
    use crate::types::{
        AccessTokenType, ApiResource, Client, GrantType, RefreshToken, RefreshTokenExpiration,
        RefreshTokenUsage, Resources,
    };
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use time::OffsetDateTime;
    use uuid::Uuid;

    struct TestReferenceTokenStore {
        tokens: Mutex<HashMap<String, StoredReferenceToken>>,
    }

    #[async_trait]
    impl ReferenceTokenStore for TestReferenceTokenStore {
        async fn store(&self, handle: &str, token: &StoredReferenceToken) -> AuthResult<()> {
            self.tokens
                .lock()
                .unwrap()
                .insert(handle.to_string(), token.clone());
            Ok(())
        }

        async fn find(&self, handle: &str) -> AuthResult<Option<StoredReferenceToken>> {
            Ok(self.tokens.lock().unwrap().get(handle).cloned())
        }

        async fn remove(&self, handle: &str) -> AuthResult<()> {
            self.tokens.lock().unwrap().remove(handle);
            Ok(())
        }

        async fn cleanup_expired(&self) -> AuthResult<u64> {
            Ok(0)
        }
    }

    struct TestClientStore {
        clients: Mutex<HashMap<String, Client>>,
    }

    #[async_trait]
    impl ClientStore for TestClientStore {
        async fn find_by_client_id(&self, client_id: &str) -> AuthResult<Option<Client>> {
            Ok(self.clients.lock().unwrap().get(client_id).cloned())
        }
    }

    struct TestSessionStore {
        sessions: Mutex<HashMap<(String, String), ServerSideSession>>,
    }

    #[async_trait]
    impl ServerSideSessionStore for TestSessionStore {
        async fn store(&self, session: &ServerSideSession) -> AuthResult<()> {
            self.sessions.lock().unwrap().insert(
                (session.subject_id.clone(), session.session_id.clone()),
                session.clone(),
            );
            Ok(())
        }

        async fn find_by_subject_and_session(
            &self,
            subject_id: &str,
            session_id: &str,
        ) -> AuthResult<Option<ServerSideSession>> {
            Ok(self
                .sessions
                .lock()
                .unwrap()
                .get(&(subject_id.to_string(), session_id.to_string()))
                .cloned())
        }

        async fn update(&self, session: &ServerSideSession) -> AuthResult<()> {
            self.store(session).await
        }

        async fn delete(&self, subject_id: &str, session_id: &str) -> AuthResult<()> {
            self.sessions
                .lock()
                .unwrap()
                .remove(&(subject_id.to_string(), session_id.to_string()));
            Ok(())
        }

        async fn take_expired(&self, _limit: usize) -> AuthResult<Vec<ServerSideSession>> {
            Ok(vec![])
        }
    }

    struct NullRefreshTokenStore;

    #[async_trait]
    impl RefreshTokenStore for NullRefreshTokenStore {
        async fn store(&self, _token: &RefreshToken) -> AuthResult<()> {
            Ok(())
        }
        async fn find_by_handle_hash(&self, _hash: &str) -> AuthResult<Option<RefreshToken>> {
            Ok(None)
        }
        async fn update(&self, _token: &RefreshToken) -> AuthResult<()> {
            Ok(())
        }
        async fn remove_by_handle_hash(&self, _hash: &str) -> AuthResult<()> {
            Ok(())
        }
        async fn remove_by_id(&self, _id: Uuid) -> AuthResult<()> {
            Ok(())
        }
        async fn remove_by_session(
            &self,
            _subject_id: &str,
            _session_id: &str,
            _client_ids: &[String],
        ) -> AuthResult<u64> {
            Ok(0)
        }
        async fn cleanup_expired(&self) -> AuthResult<u64> {
            Ok(0)
        }
    }

    struct NullNotifier;

    #[async_trait]
    impl BackChannelLogoutNotifier for NullNotifier {
        async fn send(&self, _request: &BackChannelLogoutRequest) -> AuthResult<()> {
            Ok(())
        }
    }

    const ISSUER: &str = "https://id.example.com";

    struct Harness {
        validator: TokenValidator,
        creation: TokenCreationService,
        client_store: Arc<TestClientStore>,
        session_store: Arc<TestSessionStore>,
    }

    fn test_client(coordinate: bool) -> Client {
        Client {
            client_id: "app".to_string(),
            protocol_type: "oidc".to_string(),
            secrets: vec![],
            name: "Test App".to_string(),
            grant_types: vec![GrantType::AuthorizationCode],
            allowed_scopes: vec!["api1.read".to_string()],
            allow_offline_access: true,
            active: true,
            access_token_lifetime: None,
            access_token_type: AccessTokenType::Jwt,
            refresh_token_usage: RefreshTokenUsage::OneTimeOnly,
            refresh_token_expiration: RefreshTokenExpiration::Absolute,
            absolute_refresh_token_lifetime: 2_592_000,
            sliding_refresh_token_lifetime: 1_296_000,
            require_dpop: false,
            coordinate_lifetime_with_user_session: Some(coordinate),
            allowed_signing_algorithms: vec![],
            jwks: None,
            back_channel_logout_uri: None,
        }
    }

    fn harness(client: Client) -> Harness {
        let keys = Arc::new(InMemoryKeyMaterial::new().unwrap());
        let reference_store = Arc::new(TestReferenceTokenStore {
            tokens: Mutex::new(HashMap::new()),
        });
        let client_store = Arc::new(TestClientStore {
            clients: Mutex::new(HashMap::from([(client.client_id.clone(), client)])),
        });
        let session_store = Arc::new(TestSessionStore {
            sessions: Mutex::new(HashMap::new()),
        });

        let sessions = Arc::new(SessionCoordinationService::new(
            session_store.clone(),
            Arc::new(NullRefreshTokenStore),
            client_store.clone(),
            Arc::new(NullNotifier),
            ISSUER,
            SessionConfig::default(),
        ));

        let creation = TokenCreationService::new(
            keys.clone(),
            reference_store.clone(),
            TokenCreationConfig {
                issuer: ISSUER.to_string(),
                access_token_lifetime_secs: 3600,
                id_token_lifetime_secs: 300,
            },
        );

        let validator = TokenValidator::new(
            keys,
            reference_store,
            client_store.clone(),
            Arc::new(AllowAllProfiles),
            sessions,
            TokenValidatorConfig {
                issuer: ISSUER.to_string(),
                clock_skew: std::time::Duration::from_secs(300),
            },
        );

        Harness {
            validator,
            creation,
            client_store,
            session_store,
        }
    }

    fn validated_request(client: Client) -> ValidatedTokenRequest {
        let mut request = ValidatedTokenRequest::new(client, GrantType::AuthorizationCode);
        request.subject_id = Some("alice".to_string());
        request.session_id = Some("sess-1".to_string());
        request.resources = Resources {
            identity_resources: vec![],
            api_scopes: vec![crate::types::ApiScope {
                name: "api1.read".to_string(),
                user_claims: vec![],
                enabled: true,
            }],
            api_resources: vec![ApiResource {
                name: "api1".to_string(),
                scopes: vec!["api1.read".to_string()],
                require_resource_indicator: false,
                allowed_signing_algorithms: vec![],
                enabled: true,
            }],
            offline_access: false,
        };
        request
    }

    async fn issue_jwt(harness: &Harness, client: Client) -> String {
        let token = harness
            .creation
            .create_access_token(&validated_request(client));
        harness.creation.serialize(&token).await.unwrap()
    }

    #[tokio::test]
    async fn test_valid_jwt_accepted() {
        let client = test_client(false);
        let harness = harness(client.clone());
        let jwt = issue_jwt(&harness, client).await;

        let validated = harness
            .validator
            .validate_access_token(&jwt, Some("api1.read"))
            .await
            .unwrap();
        assert_eq!(validated.client_id, "app");
        assert_eq!(validated.subject_id.as_deref(), Some("alice"));
        assert_eq!(validated.session_id.as_deref(), Some("sess-1"));
    }

    #[tokio::test]
    async fn test_missing_scope_rejected() {
        let client = test_client(false);
        let harness = harness(client.clone());
        let jwt = issue_jwt(&harness, client).await;

        let result = harness
            .validator
            .validate_access_token(&jwt, Some("api2.write"))
            .await;
        assert!(matches!(result, Err(AuthError::InvalidToken { .. })));
    }

    #[tokio::test]
    async fn test_tampered_jwt_rejected() {
        let client = test_client(false);
        let harness = harness(client.clone());
        let jwt = issue_jwt(&harness, client).await;

        let mut tampered = jwt.clone();
        tampered.replace_range(jwt.len() - 4..jwt.len(), "AAAA");
        let result = harness
            .validator
            .validate_access_token(&tampered, None)
            .await;
        assert!(matches!(result, Err(AuthError::InvalidToken { .. })));
    }

    #[tokio::test]
    async fn test_inactive_client_rejected() {
        let client = test_client(false);
        let harness = harness(client.clone());
        let jwt = issue_jwt(&harness, client.clone()).await;

        let mut inactive = client;
        inactive.active = false;
        harness
            .client_store
            .clients
            .lock()
            .unwrap()
            .insert(inactive.client_id.clone(), inactive);

        let result = harness.validator.validate_access_token(&jwt, None).await;
        assert!(matches!(result, Err(AuthError::InvalidToken { .. })));
    }

    #[tokio::test]
    async fn test_reference_token_roundtrip() {
        let mut client = test_client(false);
        client.access_token_type = AccessTokenType::Reference;
        let harness = harness(client.clone());

        let token = harness
            .creation
            .create_access_token(&validated_request(client));
        let handle = harness.creation.serialize(&token).await.unwrap();

        let validated = harness
            .validator
            .validate_access_token(&handle, Some("api1.read"))
            .await
            .unwrap();
        assert_eq!(validated.client_id, "app");
        assert_eq!(validated.scopes, vec!["api1.read"]);
    }

    #[tokio::test]
    async fn test_unknown_reference_rejected() {
        let client = test_client(false);
        let harness = harness(client);

        let result = harness
            .validator
            .validate_access_token("opaque-unknown", None)
            .await;
        assert!(matches!(result, Err(AuthError::InvalidToken { .. })));
    }

    #[tokio::test]
    async fn test_session_coordination_gates_token() {
        let client = test_client(true);
        let harness = harness(client.clone());
        let jwt = issue_jwt(&harness, client).await;

        // No server-side session exists yet: the token is invalid.
        let result = harness.validator.validate_access_token(&jwt, None).await;
        assert!(matches!(result, Err(AuthError::InvalidGrant { .. })));

        // Create the session: the same token validates.
        let now = OffsetDateTime::now_utc();
        harness
            .session_store
            .store(&ServerSideSession {
                subject_id: "alice".to_string(),
                session_id: "sess-1".to_string(),
                issuer: ISSUER.to_string(),
                client_ids: vec!["app".to_string()],
                created_at: now,
                renewed_at: now,
                expires_at: Some(now + time::Duration::minutes(30)),
            })
            .await
            .unwrap();

        assert!(harness.validator.validate_access_token(&jwt, None).await.is_ok());

        // Delete the session again: invalid once more.
        harness.session_store.delete("alice", "sess-1").await.unwrap();
        let result = harness.validator.validate_access_token(&jwt, None).await;
        assert!(matches!(result, Err(AuthError::InvalidGrant { .. })));
    }
}
