//! Protected resource registration types.
//!
//! Scopes are resolved against three kinds of registrations: identity
//! resources (claim bundles like `openid`/`profile`), API scopes, and API
//! resources that group scopes and become token audiences. API resources
//! may demand an explicit RFC 8707 `resource` indicator before they are
//! ever included in a token.

use serde::{Deserialize, Serialize};

/// An identity resource: a named bundle of user claims requested via scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityResource {
    /// Scope name (e.g. `openid`, `profile`).
    pub name: String,

    /// User claim types included when this scope is granted.
    #[serde(default)]
    pub user_claims: Vec<String>,

    /// Whether this resource can currently be requested.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// An API scope: a named unit of API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiScope {
    /// Scope name (e.g. `api1.read`).
    pub name: String,

    /// User claim types included in access tokens carrying this scope.
    #[serde(default)]
    pub user_claims: Vec<String>,

    /// Whether this scope can currently be requested.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

/// An API resource: a protected API that appears as a token audience.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResource {
    /// Resource name; used as the `aud` value and as the RFC 8707
    /// resource indicator.
    pub name: String,

    /// Names of the API scopes this resource covers.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// When `true`, this resource is only included in a token if the
    /// request carried `resource=<name>` explicitly.
    #[serde(default)]
    pub require_resource_indicator: bool,

    /// JWS algorithms acceptable for tokens addressed to this resource.
    /// Empty means any configured server algorithm.
    #[serde(default)]
    pub allowed_signing_algorithms: Vec<String>,

    /// Whether this resource is currently active.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

/// The set of resources matched during scope resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resources {
    /// Matched identity resources.
    pub identity_resources: Vec<IdentityResource>,

    /// Matched API scopes.
    pub api_scopes: Vec<ApiScope>,

    /// Matched API resources.
    pub api_resources: Vec<ApiResource>,

    /// Whether `offline_access` was granted.
    pub offline_access: bool,
}

impl Resources {
    /// Returns `true` if nothing was matched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.identity_resources.is_empty()
            && self.api_scopes.is_empty()
            && self.api_resources.is_empty()
            && !self.offline_access
    }

    /// Clears every accumulated resource. Used by the fail-closed path.
    pub fn clear(&mut self) {
        self.identity_resources.clear();
        self.api_scopes.clear();
        self.api_resources.clear();
        self.offline_access = false;
    }

    /// All granted scope names, `offline_access` included.
    #[must_use]
    pub fn scope_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .identity_resources
            .iter()
            .map(|r| r.name.clone())
            .chain(self.api_scopes.iter().map(|s| s.name.clone()))
            .collect();
        if self.offline_access {
            names.push("offline_access".to_string());
        }
        names
    }

    /// Names of the matched API resources (token audiences).
    #[must_use]
    pub fn api_resource_names(&self) -> Vec<String> {
        self.api_resources.iter().map(|r| r.name.clone()).collect()
    }

    /// Intersection of the per-resource signing-algorithm allow-lists.
    ///
    /// Resources with an empty list accept anything and don't constrain
    /// the result. Returns an empty list when unconstrained.
    #[must_use]
    pub fn signing_algorithms(&self) -> Vec<String> {
        let mut result: Option<Vec<String>> = None;
        for resource in &self.api_resources {
            if resource.allowed_signing_algorithms.is_empty() {
                continue;
            }
            result = Some(match result {
                None => resource.allowed_signing_algorithms.clone(),
                Some(current) => current
                    .into_iter()
                    .filter(|alg| resource.allowed_signing_algorithms.contains(alg))
                    .collect(),
            });
        }
        result.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_resource(name: &str, algs: &[&str]) -> ApiResource {
        ApiResource {
            name: name.to_string(),
            scopes: vec![],
            require_resource_indicator: false,
            allowed_signing_algorithms: algs.iter().map(|s| s.to_string()).collect(),
            enabled: true,
        }
    }

    #[test]
    fn test_scope_names_include_offline_access() {
        let resources = Resources {
            identity_resources: vec![IdentityResource {
                name: "openid".to_string(),
                user_claims: vec!["sub".to_string()],
                enabled: true,
            }],
            api_scopes: vec![ApiScope {
                name: "api1.read".to_string(),
                user_claims: vec![],
                enabled: true,
            }],
            api_resources: vec![],
            offline_access: true,
        };

        let names = resources.scope_names();
        assert_eq!(names, vec!["openid", "api1.read", "offline_access"]);
    }

    #[test]
    fn test_clear_empties_everything() {
        let mut resources = Resources {
            identity_resources: vec![],
            api_scopes: vec![ApiScope {
                name: "s".to_string(),
                user_claims: vec![],
                enabled: true,
            }],
            api_resources: vec![api_resource("api1", &[])],
            offline_access: true,
        };

        resources.clear();
        assert!(resources.is_empty());
    }

    #[test]
    fn test_signing_algorithms_intersection() {
        let resources = Resources {
            identity_resources: vec![],
            api_scopes: vec![],
            api_resources: vec![
                api_resource("a", &["RS256", "PS256"]),
                api_resource("b", &["PS256", "ES256"]),
                api_resource("c", &[]), // unconstrained
            ],
            offline_access: false,
        };

        assert_eq!(resources.signing_algorithms(), vec!["PS256"]);
    }

    #[test]
    fn test_signing_algorithms_unconstrained() {
        let resources = Resources {
            identity_resources: vec![],
            api_scopes: vec![],
            api_resources: vec![api_resource("a", &[]), api_resource("b", &[])],
            offline_access: false,
        };

        assert!(resources.signing_algorithms().is_empty());
    }
}
