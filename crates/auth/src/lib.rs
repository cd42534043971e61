//! `assurance-auth`: pure authentication/authorization boundary.
//!
//! Roles, the role-permission table, the scope resolver and token claims.
//! This crate is intentionally decoupled from HTTP and storage.

pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;
pub mod scope;
pub mod user;

pub use authorize::{
    AuthorizationExplanation, AuthzError, DecisionStep, PrincipalState, authorize,
    explain_role_permission,
};
pub use claims::{Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError, validate_claims};
pub use permissions::{Action, Permission, ResourceType};
pub use policy::{Grant, PolicyLoadError, RolePermissionTable};
pub use principal::Principal;
pub use roles::{Role, ScopeLevel};
pub use scope::{Scope, in_scope};
pub use user::{NewUser, UserAccount, ensure_no_escalation};
