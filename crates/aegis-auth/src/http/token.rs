//! OAuth 2.0 / OIDC token endpoint handler.
//!
//! A deliberately thin layer: parse the form, authenticate the client
//! through the secret validators, run the validation pipeline, serialize
//! the outcome. All protocol logic lives in the pipeline.
//!
//! # Example
//!
//! ```ignore
//! POST /connect/token
//! Content-Type: application/x-www-form-urlencoded
//! DPoP: eyJ0eXAiOiJkcG9wK2p3dCIs...
//!
//! grant_type=authorization_code
//! &code=SplxlOBeZQQYbYS6WxSbIA
//! &redirect_uri=https://app.example.com/callback
//! &code_verifier=dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk
//! &client_id=my-app
//! ```

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::oauth::secrets::{PrivateKeyJwtValidator, SharedSecretValidator};
use crate::oauth::token_request::{
    ClientValidationResult, TokenRequestError, TokenRequestParams,
};
use crate::oauth::token_request_validator::TokenRequestValidator;
use crate::storage::ClientStore;
use crate::token::response::TokenResponseGenerator;
use crate::types::secret::{ParsedSecret, SecretType};
use crate::types::Client;

/// RFC 7523 client assertion type.
const JWT_BEARER_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// State required by the token endpoint.
#[derive(Clone)]
pub struct TokenState {
    validator: Arc<TokenRequestValidator>,
    response_generator: Arc<TokenResponseGenerator>,
    client_store: Arc<dyn ClientStore>,
    assertion_validator: Arc<PrivateKeyJwtValidator>,
}

impl TokenState {
    /// Creates the token endpoint state.
    #[must_use]
    pub fn new(
        validator: Arc<TokenRequestValidator>,
        response_generator: Arc<TokenResponseGenerator>,
        client_store: Arc<dyn ClientStore>,
        assertion_validator: Arc<PrivateKeyJwtValidator>,
    ) -> Self {
        Self {
            validator,
            response_generator,
            client_store,
            assertion_validator,
        }
    }
}

/// The raw token endpoint form: grant parameters plus client credentials.
///
/// Kept flat (no nested deserialization) because urlencoded forms don't
/// support flattened structs.
#[derive(Debug, Deserialize)]
pub struct TokenEndpointRequest {
    grant_type: String,

    #[serde(default)]
    code: Option<String>,

    #[serde(default)]
    redirect_uri: Option<String>,

    #[serde(default)]
    code_verifier: Option<String>,

    #[serde(default)]
    refresh_token: Option<String>,

    #[serde(default)]
    device_code: Option<String>,

    #[serde(default)]
    auth_req_id: Option<String>,

    #[serde(default)]
    username: Option<String>,

    #[serde(default)]
    password: Option<String>,

    #[serde(default)]
    scope: Option<String>,

    #[serde(default)]
    resource: Option<String>,

    #[serde(default)]
    client_id: Option<String>,

    #[serde(default)]
    client_secret: Option<String>,

    #[serde(default)]
    client_assertion_type: Option<String>,

    #[serde(default)]
    client_assertion: Option<String>,
}

impl TokenEndpointRequest {
    fn into_params(self) -> (TokenRequestParams, ClientCredentials) {
        let params = TokenRequestParams {
            grant_type: self.grant_type,
            code: self.code,
            redirect_uri: self.redirect_uri,
            code_verifier: self.code_verifier,
            refresh_token: self.refresh_token,
            device_code: self.device_code,
            auth_req_id: self.auth_req_id,
            username: self.username,
            password: self.password,
            scope: self.scope,
            resource: self.resource.into_iter().collect(),
            dpop_proof_token: None,
        };
        let credentials = ClientCredentials {
            client_id: self.client_id,
            client_secret: self.client_secret,
            client_assertion_type: self.client_assertion_type,
            client_assertion: self.client_assertion,
        };
        (params, credentials)
    }
}

/// Client credentials extracted from the request body.
#[derive(Debug)]
struct ClientCredentials {
    client_id: Option<String>,
    client_secret: Option<String>,
    client_assertion_type: Option<String>,
    client_assertion: Option<String>,
}

/// Wire shape of a failed token request.
#[derive(Debug, Serialize)]
struct TokenErrorBody {
    error: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    error_description: Option<String>,
}

/// Token endpoint handler.
///
/// Accepts `application/x-www-form-urlencoded` POSTs with an optional
/// `DPoP` header (exactly one occurrence). Emits a `DPoP-Nonce` response
/// header when nonce-based freshness requires a fresh nonce.
pub async fn token_handler(
    State(state): State<TokenState>,
    headers: HeaderMap,
    Form(request): Form<TokenEndpointRequest>,
) -> Response {
    let (mut params, credentials) = request.into_params();

    debug!(grant_type = %params.grant_type, "Processing token request");

    // Exactly one DPoP header is accepted.
    let dpop_headers: Vec<_> = headers.get_all("dpop").iter().collect();
    match dpop_headers.len() {
        0 => {}
        1 => match dpop_headers[0].to_str() {
            Ok(value) => params.dpop_proof_token = Some(value.to_string()),
            Err(_) => {
                return error_response(
                    &AuthError::invalid_request("Malformed DPoP header").into(),
                );
            }
        },
        _ => {
            return error_response(
                &AuthError::invalid_request("Multiple DPoP headers are not allowed").into(),
            );
        }
    }

    // Authenticate the client.
    let client = match authenticate_client(&state, &headers, &credentials).await {
        Ok(client) => client,
        Err(error) => {
            warn!(error = %error, "Client authentication failed");
            return error_response(&error.into());
        }
    };

    let client_result = ClientValidationResult {
        client,
        certificate_thumbprint: None,
    };

    // Run the pipeline and serialize the outcome.
    match state.validator.validate_request(&params, &client_result).await {
        Ok(result) => match state.response_generator.process(&result).await {
            Ok(response) => (StatusCode::OK, Json(response)).into_response(),
            Err(error) => error_response(&error.into()),
        },
        Err(error) => error_response(&error),
    }
}

/// Resolves and authenticates the requesting client.
///
/// Supported methods, in precedence order: HTTP Basic, body
/// `client_id`/`client_secret`, `private_key_jwt` assertion, and bare
/// `client_id` for public clients (no registered secrets).
async fn authenticate_client(
    state: &TokenState,
    headers: &HeaderMap,
    credentials: &ClientCredentials,
) -> Result<Client, AuthError> {
    let basic = parse_basic_auth(headers);

    let client_id = basic
        .as_ref()
        .map(|(id, _)| id.clone())
        .or_else(|| credentials.client_id.clone())
        .or_else(|| {
            // private_key_jwt: the assertion issuer names the client.
            credentials
                .client_assertion
                .as_deref()
                .and_then(assertion_issuer)
        })
        .ok_or_else(|| AuthError::invalid_client("No client identification provided"))?;

    let client = state
        .client_store
        .find_by_client_id(&client_id)
        .await?
        .ok_or_else(|| AuthError::invalid_client("Unknown client"))?;

    if let Some(assertion) = &credentials.client_assertion {
        if credentials.client_assertion_type.as_deref() != Some(JWT_BEARER_ASSERTION_TYPE) {
            return Err(AuthError::invalid_client(
                "Unsupported client_assertion_type",
            ));
        }
        let parsed = ParsedSecret {
            id: client_id,
            credential: assertion.clone(),
            secret_type: SecretType::JwtBearer,
        };
        state.assertion_validator.validate(&parsed, &client).await?;
        return Ok(client);
    }

    let secret = basic
        .map(|(_, secret)| secret)
        .or_else(|| credentials.client_secret.clone());
    if let Some(secret) = secret {
        let parsed = ParsedSecret {
            id: client_id,
            credential: secret,
            secret_type: SecretType::SharedSecret,
        };
        SharedSecretValidator.validate(&parsed, &client)?;
        return Ok(client);
    }

    // Public client: acceptable only when no credentials are registered.
    if client.secrets.is_empty() {
        return Ok(client);
    }
    Err(AuthError::invalid_client("Client authentication required"))
}

/// Parses `Authorization: Basic <base64(client_id:client_secret)>`.
fn parse_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get("authorization")?.to_str().ok()?;
    let encoded = value.strip_prefix("Basic ")?;
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (id, secret) = decoded.split_once(':')?;
    Some((id.to_string(), secret.to_string()))
}

/// Extracts the unverified `iss` claim from a client assertion, used only
/// to locate the client registration before real validation runs.
fn assertion_issuer(assertion: &str) -> Option<String> {
    let payload = assertion.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value.get("iss")?.as_str().map(str::to_string)
}

/// Converts a pipeline error into the wire response.
///
/// Internal detail never leaks: only the registered error code and a
/// terse description are returned; everything else was already logged.
fn error_response(error: &TokenRequestError) -> Response {
    let status =
        StatusCode::from_u16(error.error.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
    let body = TokenErrorBody {
        error: error.error.oauth_error_code(),
        error_description: match &error.error {
            AuthError::AuthorizationPending | AuthError::SlowDown | AuthError::UseDpopNonce => {
                None
            }
            other if other.is_server_error() => None,
            other => Some(other.to_string()),
        },
    };

    let mut response = (status, Json(body)).into_response();
    if let Some(nonce) = &error.dpop_nonce
        && let Ok(value) = nonce.parse()
    {
        response.headers_mut().insert("DPoP-Nonce", value);
    }
    response
}
