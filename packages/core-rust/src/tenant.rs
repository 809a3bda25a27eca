use serde::{Deserialize, Serialize};

/// Tenant id used when a route resolves no tenant.
pub const SYSTEM_TENANT_ID: &str = "Global";

/// User id paired with [`SYSTEM_TENANT_ID`].
pub const SYSTEM_USER_ID: &str = "system";

/// Tenant scope of a request: which tenant, and which user acting within it.
///
/// Both parts are always set. Partial identities are rejected at
/// construction, so an identity either exists whole or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantIdentity {
    id: String,
    user_id: String,
}

impl TenantIdentity {
    /// Builds an identity, or `None` if either part is empty.
    #[must_use]
    pub fn new(id: impl Into<String>, user_id: impl Into<String>) -> Option<Self> {
        let id = id.into();
        let user_id = user_id.into();
        if id.is_empty() || user_id.is_empty() {
            return None;
        }
        Some(Self { id, user_id })
    }

    /// The global system tenant.
    #[must_use]
    pub fn system() -> Self {
        Self {
            id: SYSTEM_TENANT_ID.to_string(),
            user_id: SYSTEM_USER_ID.to_string(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    #[must_use]
    pub fn is_system(&self) -> bool {
        self.id == SYSTEM_TENANT_ID && self.user_id == SYSTEM_USER_ID
    }
}

impl Default for TenantIdentity {
    fn default() -> Self {
        Self::system()
    }
}
