use assurance_auth::Principal;
use assurance_core::CompanyId;

/// Authenticated caller for a request.
///
/// Inserted by the auth middleware and present on every protected route.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal: Principal,
}

impl PrincipalContext {
    pub fn new(principal: Principal) -> Self {
        Self { principal }
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// `None` only for super-admins.
    pub fn company_id(&self) -> Option<CompanyId> {
        self.principal.company_id
    }
}
