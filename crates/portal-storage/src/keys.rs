//! Storage key constants.

/// Keys written by the session layer. They are cleared together, never one
/// at a time.
pub struct StorageKeys;

impl StorageKeys {
    /// Opaque signed access token
    pub const SESSION_TOKEN: &'static str = "sessionToken";

    /// JSON-serialized principal
    pub const SESSION_PRINCIPAL: &'static str = "sessionPrincipal";

    /// Non-authoritative tenant branding hint (plain string)
    pub const TENANT_BRANDING_HINT: &'static str = "tenantBrandingHint";

    /// Every session key, in the order they are cleared.
    pub const ALL: [&'static str; 3] = [
        Self::SESSION_TOKEN,
        Self::SESSION_PRINCIPAL,
        Self::TENANT_BRANDING_HINT,
    ];
}
