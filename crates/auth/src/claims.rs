use std::collections::BTreeSet;

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use assurance_core::{CompanyId, DepartmentId, SubDepartmentId, UserId};

use crate::{Principal, Role};

/// JWT claims model.
///
/// Carries everything the access checks need about the caller, so no lookup
/// happens between authentication and authorization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtClaims {
    /// Subject / user identifier.
    pub sub: UserId,

    pub role: Role,

    /// `None` only for super-admins.
    #[serde(default)]
    pub company_id: Option<CompanyId>,

    #[serde(default)]
    pub department_ids: BTreeSet<DepartmentId>,

    #[serde(default)]
    pub sub_department_ids: BTreeSet<SubDepartmentId>,

    /// Issued-at (seconds since epoch).
    pub iat: i64,

    /// Expiration (seconds since epoch).
    pub exp: i64,
}

impl JwtClaims {
    pub fn for_principal(principal: &Principal, issued_at: DateTime<Utc>, expires_at: DateTime<Utc>) -> Self {
        Self {
            sub: principal.user_id,
            role: principal.role,
            company_id: principal.company_id,
            department_ids: principal.departments.clone(),
            sub_department_ids: principal.sub_departments.clone(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        }
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.iat, 0).single()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    pub fn into_principal(self) -> Principal {
        Principal {
            user_id: self.sub,
            role: self.role,
            company_id: self.company_id,
            departments: self.department_ids,
            sub_departments: self.sub_department_ids,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,

    #[error("only super-admins may act without a company")]
    MissingCompany,

    #[error("malformed or unsigned token: {0}")]
    Malformed(String),
}

/// Deterministically validate JWT claims.
///
/// This validates the *claims* only; signature checks live in [`JwtValidator`]
/// implementations.
pub fn validate_claims(claims: &JwtClaims, now: DateTime<Utc>) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    if now.timestamp() < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now.timestamp() >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    if claims.company_id.is_none() && !claims.role.is_super_admin() {
        return Err(TokenValidationError::MissingCompany);
    }
    Ok(())
}

/// Decodes and verifies a bearer token into claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError>;
}

/// HMAC-SHA256 validator (shared secret).
pub struct Hs256JwtValidator {
    decoding: DecodingKey,
    encoding: EncodingKey,
}

impl Hs256JwtValidator {
    pub fn new(secret: Vec<u8>) -> Self {
        Self {
            decoding: DecodingKey::from_secret(&secret),
            encoding: EncodingKey::from_secret(&secret),
        }
    }

    /// Sign claims with the same secret (used by the login flow and tests).
    pub fn issue(&self, claims: &JwtClaims) -> Result<String, TokenValidationError> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, TokenValidationError> {
        let mut validation = Validation::new(Algorithm::HS256);
        // Time checks are done deterministically against `now` below.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = jsonwebtoken::decode::<JwtClaims>(token, &self.decoding, &validation)
            .map_err(|e| TokenValidationError::Malformed(e.to_string()))?;

        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn claims(role: Role, company: Option<CompanyId>) -> JwtClaims {
        let now = Utc::now();
        let principal = Principal::new(UserId::new(), role, company);
        JwtClaims::for_principal(&principal, now - Duration::minutes(1), now + Duration::minutes(10))
    }

    #[test]
    fn signed_token_round_trips_to_principal() {
        let validator = Hs256JwtValidator::new(b"secret".to_vec());
        let company = CompanyId::new();
        let dept = DepartmentId::new();
        let mut c = claims(Role::DepartmentManager, Some(company));
        c.department_ids.insert(dept);

        let token = validator.issue(&c).unwrap();
        let decoded = validator.validate(&token, Utc::now()).unwrap();
        let principal = decoded.into_principal();

        assert_eq!(principal.role, Role::DepartmentManager);
        assert_eq!(principal.company_id, Some(company));
        assert!(principal.belongs_to_department(dept));
    }

    #[test]
    fn wrong_secret_is_malformed() {
        let token = Hs256JwtValidator::new(b"a".to_vec())
            .issue(&claims(Role::Admin, Some(CompanyId::new())))
            .unwrap();
        let err = Hs256JwtValidator::new(b"b".to_vec())
            .validate(&token, Utc::now())
            .unwrap_err();
        assert!(matches!(err, TokenValidationError::Malformed(_)));
    }

    #[test]
    fn expired_and_future_tokens_are_rejected() {
        let c = claims(Role::Admin, Some(CompanyId::new()));
        assert_eq!(
            validate_claims(&c, Utc::now() + Duration::hours(1)),
            Err(TokenValidationError::Expired)
        );
        assert_eq!(
            validate_claims(&c, Utc::now() - Duration::hours(1)),
            Err(TokenValidationError::NotYetValid)
        );
    }

    #[test]
    fn companyless_tokens_are_reserved_for_super_admins() {
        assert!(validate_claims(&claims(Role::SuperAdmin, None), Utc::now()).is_ok());
        assert_eq!(
            validate_claims(&claims(Role::Assessor, None), Utc::now()),
            Err(TokenValidationError::MissingCompany)
        );
    }
}
