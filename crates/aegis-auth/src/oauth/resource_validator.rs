//! Requested scope and resource-indicator validation.
//!
//! Resolves raw scope strings against registered resources and enforces
//! RFC 8707 resource-indicator isolation. The contract is all-or-nothing
//! per call: any invalid scope or unmatched indicator clears every
//! accumulated valid resource, so a partially-granted request can never
//! slip through.

use std::sync::Arc;

use tracing::debug;

use crate::AuthResult;
use crate::storage::ResourceStore;
use crate::types::{Client, Resources};

/// A raw scope string parsed into name and optional parameter.
///
/// Supports the resource-qualified syntax `name:parameter`
/// (e.g. `payment:abc123`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedScopeValue {
    /// The raw value as requested.
    pub raw: String,

    /// The scope name used for registration lookup.
    pub name: String,

    /// The parameter portion, if the raw value was qualified.
    pub parameter: Option<String>,
}

impl ParsedScopeValue {
    /// Parses one raw scope string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.split_once(':') {
            Some((name, parameter)) if !name.is_empty() && !parameter.is_empty() => Self {
                raw: raw.to_string(),
                name: name.to_string(),
                parameter: Some(parameter.to_string()),
            },
            _ => Self {
                raw: raw.to_string(),
                name: raw.to_string(),
                parameter: None,
            },
        }
    }
}

/// Outcome of resolving requested scopes and indicators.
#[derive(Debug, Default)]
pub struct ResourceValidationResult {
    /// The matched resources. Empty when validation failed.
    pub resources: Resources,

    /// Parsed forms of every granted scope.
    pub parsed_scopes: Vec<ParsedScopeValue>,

    /// Raw scope values that failed validation.
    pub invalid_scopes: Vec<String>,

    /// Resource indicators that failed validation.
    pub invalid_resource_indicators: Vec<String>,
}

impl ResourceValidationResult {
    /// Returns `true` if every scope and indicator validated.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.invalid_scopes.is_empty() && self.invalid_resource_indicators.is_empty()
    }
}

/// The validation request: client, raw scopes, raw resource indicators.
#[derive(Debug)]
pub struct ResourceValidationRequest<'a> {
    /// The requesting client.
    pub client: &'a Client,

    /// Raw scope values.
    pub scopes: &'a [String],

    /// Raw RFC 8707 resource indicator values.
    pub resource_indicators: &'a [String],
}

/// Resolves requested scopes against registered resources.
pub struct ResourceValidator {
    store: Arc<dyn ResourceStore>,
}

impl ResourceValidator {
    /// Creates a new resource validator.
    #[must_use]
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    /// Validates the requested scopes and resource indicators.
    ///
    /// # Algorithm
    ///
    /// 1. Parse raw scope strings (resource-qualified syntax supported)
    /// 2. Look up all registered resources satisfying the scope names
    /// 3. With indicators: every indicator must name a registered, enabled
    ///    API resource, and the audience set is intersected with the
    ///    requested indicators. Without indicators: API resources marked
    ///    `require_resource_indicator` are excluded from the audience set
    /// 4. Each scope must be in the client's allow-list and registered;
    ///    `offline_access` additionally requires `allow_offline_access`
    /// 5. Any failure clears all accumulated resources (fail closed)
    ///
    /// # Errors
    ///
    /// Returns an error only on store failures; domain failures are
    /// reported through the result.
    pub async fn validate_requested_resources(
        &self,
        request: &ResourceValidationRequest<'_>,
    ) -> AuthResult<ResourceValidationResult> {
        let mut result = ResourceValidationResult::default();

        let parsed: Vec<ParsedScopeValue> = request
            .scopes
            .iter()
            .map(|raw| ParsedScopeValue::parse(raw))
            .collect();

        let lookup_names: Vec<String> = parsed
            .iter()
            .filter(|scope| scope.name != "offline_access")
            .map(|scope| scope.name.clone())
            .collect();
        let universe = self
            .store
            .find_resources_by_scope_names(&lookup_names)
            .await?;

        // Indicator filtering decides which API resources may become
        // audiences at all.
        let candidate_api_resources = if request.resource_indicators.is_empty() {
            universe
                .api_resources
                .iter()
                .filter(|resource| !resource.require_resource_indicator)
                .cloned()
                .collect::<Vec<_>>()
        } else {
            let registered = self
                .store
                .find_api_resources_by_names(request.resource_indicators)
                .await?;
            for indicator in request.resource_indicators {
                if !registered
                    .iter()
                    .any(|resource| resource.enabled && resource.name == *indicator)
                {
                    result.invalid_resource_indicators.push(indicator.clone());
                }
            }
            universe
                .api_resources
                .iter()
                .filter(|resource| request.resource_indicators.contains(&resource.name))
                .cloned()
                .collect()
        };

        for scope in &parsed {
            if scope.name == "offline_access" {
                if request.client.allow_offline_access {
                    result.resources.offline_access = true;
                    result.parsed_scopes.push(scope.clone());
                } else {
                    result.invalid_scopes.push(scope.raw.clone());
                }
                continue;
            }

            if !request.client.is_scope_allowed(&scope.name) {
                result.invalid_scopes.push(scope.raw.clone());
                continue;
            }

            if let Some(identity) = universe
                .identity_resources
                .iter()
                .find(|resource| resource.enabled && resource.name == scope.name)
            {
                result.resources.identity_resources.push(identity.clone());
                result.parsed_scopes.push(scope.clone());
            } else if let Some(api_scope) = universe
                .api_scopes
                .iter()
                .find(|registered| registered.enabled && registered.name == scope.name)
            {
                result.resources.api_scopes.push(api_scope.clone());
                result.parsed_scopes.push(scope.clone());
                for resource in candidate_api_resources
                    .iter()
                    .filter(|resource| resource.scopes.contains(&scope.name))
                {
                    if !result
                        .resources
                        .api_resources
                        .iter()
                        .any(|existing| existing.name == resource.name)
                    {
                        result.resources.api_resources.push(resource.clone());
                    }
                }
            } else {
                result.invalid_scopes.push(scope.raw.clone());
            }
        }

        // A requested indicator that matched nothing the request actually
        // granted is an error, not a silent omission.
        for indicator in request.resource_indicators {
            if !result.invalid_resource_indicators.contains(indicator)
                && !result
                    .resources
                    .api_resources
                    .iter()
                    .any(|resource| resource.name == *indicator)
            {
                result.invalid_resource_indicators.push(indicator.clone());
            }
        }

        // Fail closed: no partial grants.
        if !result.succeeded() {
            debug!(
                client_id = %request.client.client_id,
                invalid_scopes = ?result.invalid_scopes,
                invalid_resource_indicators = ?result.invalid_resource_indicators,
                "Resource validation failed"
            );
            result.resources.clear();
            result.parsed_scopes.clear();
        }

        Ok(result)
    }
}
