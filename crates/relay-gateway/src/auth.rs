use crate::ws_handler::ListenQuery;

#[derive(Debug, Clone)]
pub struct AuthedIdentity {
    pub uid: String,
}

pub trait AuthProvider: Send + Sync + 'static {
    fn authenticate(&self, query: &ListenQuery) -> Option<AuthedIdentity>;
}

/// Accepts whatever `uid` the client sends, for local development only.
#[derive(Debug, Clone)]
pub struct DevAuthProvider;

impl AuthProvider for DevAuthProvider {
    fn authenticate(&self, query: &ListenQuery) -> Option<AuthedIdentity> {
        if query.uid.trim().is_empty() {
            return None;
        }
        Some(AuthedIdentity { uid: query.uid.clone() })
    }
}

/// Requires both a non-empty `uid` and a bearer `token` query parameter,
/// standing in for the real identity-provider verification a deployment
/// wires in; the actual token verification service is an external
/// collaborator out of scope for this crate.
#[derive(Debug, Clone)]
pub struct TokenAuthProvider;

impl AuthProvider for TokenAuthProvider {
    fn authenticate(&self, query: &ListenQuery) -> Option<AuthedIdentity> {
        if query.uid.trim().is_empty() {
            return None;
        }
        let token = query.token.as_deref().unwrap_or("").trim();
        if token.is_empty() {
            return None;
        }
        Some(AuthedIdentity { uid: query.uid.clone() })
    }
}
