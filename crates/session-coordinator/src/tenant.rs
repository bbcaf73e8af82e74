//! Tenant resolution from the navigation path.
//!
//! The active organization is never stored; it is recomputed from the path
//! every time. [`resolve_slug`] is a pure function of its inputs, so a path
//! always maps to the same tenant and a captured [`TenantContext`] can be
//! reused safely when a request is replayed.

use url::form_urlencoded;

/// Query parameter that carries the cached branding hint on login redirects.
pub const BRANDING_QUERY_PARAM: &str = "branding";

/// Resolve the tenant slug for `path`.
///
/// - `/{keyword}/...` is the global management area → `None`
/// - `/{slug}/{keyword}/...` is a tenant's management area → `Some(slug)`
/// - anything else → `None`
///
/// Query strings and fragments are ignored.
pub fn resolve_slug(path: &str, keyword: &str) -> Option<String> {
    let path = path.split(['?', '#']).next().unwrap_or_default();
    let mut segments = path.split('/').filter(|segment| !segment.is_empty());

    match (segments.next(), segments.next()) {
        (Some(first), _) if first == keyword => None,
        (Some(first), Some(second)) if second == keyword => Some(first.to_string()),
        _ => None,
    }
}

/// Tenant a request or redirect belongs to. `slug == None` is global scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantContext {
    slug: Option<String>,
}

impl TenantContext {
    pub fn global() -> Self {
        Self { slug: None }
    }

    pub fn tenant(slug: impl Into<String>) -> Self {
        Self {
            slug: Some(slug.into()),
        }
    }

    pub fn slug(&self) -> Option<&str> {
        self.slug.as_deref()
    }

    pub fn is_global(&self) -> bool {
        self.slug.is_none()
    }

    /// Stamp an API path with this tenant: `/{slug}{path}`, or `path` as-is
    /// in global scope.
    pub fn api_path(&self, path: &str) -> String {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        match &self.slug {
            Some(slug) => format!("/{}{}", slug, path),
            None => path,
        }
    }

    /// Login page for this tenant, carrying the branding hint if one is cached.
    pub fn login_path(&self, branding_hint: Option<&str>) -> String {
        let base = match &self.slug {
            Some(slug) => format!("/{}/login", slug),
            None => "/login".to_string(),
        };

        match branding_hint.filter(|hint| !hint.is_empty()) {
            Some(hint) => {
                let query = form_urlencoded::Serializer::new(String::new())
                    .append_pair(BRANDING_QUERY_PARAM, hint)
                    .finish();
                format!("{}?{}", base, query)
            }
            None => base,
        }
    }
}

/// Per-realm resolver. Realms that are not tenant-aware always resolve to
/// global scope.
#[derive(Debug, Clone)]
pub struct TenantResolver {
    keyword: String,
    tenant_aware: bool,
}

impl TenantResolver {
    pub fn new(keyword: impl Into<String>, tenant_aware: bool) -> Self {
        Self {
            keyword: keyword.into(),
            tenant_aware,
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    pub fn resolve(&self, path: &str) -> TenantContext {
        if !self.tenant_aware {
            return TenantContext::global();
        }
        TenantContext {
            slug: resolve_slug(path, &self.keyword),
        }
    }
}
