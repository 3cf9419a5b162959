//! Identity Resolver.
//!
//! # Responsibilities
//! - Pick the single credential a request carries
//! - Map it to a user id and registration status
//! - Issue cookies for new installs, reuse them for known unique devices
//! - Check registration codes for `Verify-Registration-Code`
//!
//! # Data Flow
//! ```text
//! ParsedRequest
//!     → Credential::from_request (exactly one of Cookie / Get-Cookie / Registration-Code)
//!     → IdentityResolver::resolve
//!         Cookie            → find_by_cookie
//!         Registration-Code → find_by_reg_code
//!         Get-Cookie        → DeviceInfo::parse
//!                           → find_by_device_info (unique devices only)
//!                           → create_user with a fresh cookie (retry on collision)
//!     → Identity { user_id, registered } (+ cookie to send back)
//! ```
//!
//! # Design Decisions
//! - Cookie uniqueness is optimistic: generate, check, insert-if-absent, and
//!   roll again if another session won the race
//! - A registration bound through `Verify-Registration-Code` sticks to the
//!   user row, so later cookie requests are registered too

pub mod cookie;

use std::sync::Arc;

use crate::protocol::{FieldName, ParsedRequest, ProtocolResult, RequestField, ServerError};
use crate::protocol::DeviceInfo;
use crate::storage::{NewUser, UserId, UserRecord, UserStore};

pub use cookie::generate_cookie;

/// Attempts at finding a free cookie before giving up.
const MAX_COOKIE_ATTEMPTS: usize = 16;

/// Who is making the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub registered: bool,
}

impl Identity {
    fn of(user: &UserRecord) -> Self {
        Self {
            user_id: user.user_id,
            registered: user.is_registered(),
        }
    }
}

/// The one credential in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    Cookie(&'a str),
    GetCookie(&'a str),
    RegistrationCode(&'a str),
}

impl<'a> Credential<'a> {
    /// Extract the credential. None, or more than one, is malformed.
    pub fn from_request(request: &'a ParsedRequest) -> ProtocolResult<Self> {
        let mut found = None;
        for field in request.identity_fields() {
            if found.is_some() {
                return Err(ServerError::MalformedRequest);
            }
            found = Some(match field {
                RequestField::Cookie(v) => Credential::Cookie(v),
                RequestField::GetCookie(v) => Credential::GetCookie(v),
                RequestField::RegistrationCode(v) => Credential::RegistrationCode(v),
                _ => return Err(ServerError::MalformedRequest),
            });
        }
        found.ok_or(ServerError::MalformedRequest)
    }

    pub fn field(&self) -> FieldName {
        match self {
            Credential::Cookie(_) => FieldName::Cookie,
            Credential::GetCookie(_) => FieldName::GetCookie,
            Credential::RegistrationCode(_) => FieldName::RegistrationCode,
        }
    }
}

/// Outcome of resolving a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub identity: Identity,
    /// Cookie to send back, set on the `Get-Cookie` path.
    pub cookie: Option<String>,
}

/// Maps credentials to users.
#[derive(Clone)]
pub struct IdentityResolver {
    users: Arc<dyn UserStore>,
}

impl std::fmt::Debug for IdentityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver").finish_non_exhaustive()
    }
}

impl IdentityResolver {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    pub async fn resolve(&self, credential: Credential<'_>) -> ProtocolResult<Resolved> {
        match credential {
            Credential::Cookie(cookie) => {
                let user = self
                    .users
                    .find_by_cookie(cookie)
                    .await?
                    .ok_or(ServerError::InvalidCookie)?;
                Ok(Resolved {
                    identity: active(&user)?,
                    cookie: None,
                })
            }
            Credential::RegistrationCode(code) => {
                let user = self
                    .users
                    .find_by_reg_code(code)
                    .await?
                    .ok_or(ServerError::InvalidRegCode)?;
                let mut identity = active(&user)?;
                identity.registered = true;
                Ok(Resolved {
                    identity,
                    cookie: None,
                })
            }
            Credential::GetCookie(token) => self.get_cookie(token).await,
        }
    }

    async fn get_cookie(&self, token: &str) -> ProtocolResult<Resolved> {
        let device = DeviceInfo::parse(token).map_err(|e| {
            tracing::debug!(device_info = %token, "Unsupported device info");
            e
        })?;

        if device.is_unique_identifying() {
            if let Some(user) = self.users.find_by_device_info(device.token()).await? {
                tracing::debug!(user_id = %user.user_id, "Reissuing cookie for known device");
                return Ok(Resolved {
                    identity: active(&user)?,
                    cookie: Some(user.cookie),
                });
            }
        }

        let user = self.create_user(&device).await?;
        tracing::info!(user_id = %user.user_id, unique = device.is_unique_identifying(), "Issued cookie");
        Ok(Resolved {
            identity: Identity::of(&user),
            cookie: Some(user.cookie),
        })
    }

    async fn create_user(&self, device: &DeviceInfo) -> ProtocolResult<UserRecord> {
        for _ in 0..MAX_COOKIE_ATTEMPTS {
            let cookie = generate_cookie(&mut rand::thread_rng());
            if self.users.cookie_exists(&cookie).await? {
                continue;
            }
            let new_user = NewUser {
                cookie,
                device_info: device.token().to_owned(),
                user_name: device.hotsync_name(),
            };
            if let Some(user) = self.users.create_user(new_user).await? {
                return Ok(user);
            }
        }
        tracing::error!(attempts = MAX_COOKIE_ATTEMPTS, "Could not find a free cookie");
        Err(ServerError::ServerFailure)
    }

    /// Handle `Verify-Registration-Code`: report whether `code` is valid for
    /// this user and, if so, make them registered. A code already bound to
    /// another user is not valid.
    pub async fn verify_registration_code(
        &self,
        identity: &mut Identity,
        code: &str,
    ) -> ProtocolResult<bool> {
        if !self.users.is_valid_reg_code(code).await? {
            tracing::debug!(user_id = %identity.user_id, "Registration code rejected");
            return Ok(false);
        }
        if !self.users.mark_registered(identity.user_id, code).await? {
            tracing::info!(user_id = %identity.user_id, "Registration code bound to another user");
            return Ok(false);
        }
        identity.registered = true;
        tracing::info!(user_id = %identity.user_id, "User registered");
        Ok(true)
    }
}

fn active(user: &UserRecord) -> ProtocolResult<Identity> {
    if user.disabled {
        tracing::info!(user_id = %user.user_id, "Request from disabled user");
        return Err(ServerError::UserDisabled);
    }
    Ok(Identity::of(user))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryUserStore;

    const EXAMPLE_DEVICE: &str = "HS50616C6D204F5320456D756C61746F72:OC70616C6D:OD00000000:PL3030";
    const UNIQUE_DEVICE: &str = "PN50616C6D204F5320456D756C61746F72:PL3030";
    const VALID_CODE: &str = "2345";

    fn setup() -> (Arc<MemoryUserStore>, IdentityResolver) {
        let users = Arc::new(MemoryUserStore::new());
        users.add_reg_code(VALID_CODE);
        let resolver = IdentityResolver::new(users.clone());
        (users, resolver)
    }

    fn request(fields: &[(FieldName, &str)]) -> ParsedRequest {
        let mut request = ParsedRequest::new();
        for (name, value) in fields {
            request
                .insert(RequestField::new(*name, Some((*value).to_owned())).unwrap())
                .unwrap();
        }
        request
    }

    #[test]
    fn exactly_one_credential() {
        let none = request(&[(FieldName::TransactionId, "1")]);
        assert_eq!(Credential::from_request(&none), Err(ServerError::MalformedRequest));

        let two = request(&[(FieldName::Cookie, "abc"), (FieldName::GetCookie, "PL3030")]);
        assert_eq!(Credential::from_request(&two), Err(ServerError::MalformedRequest));

        let one = request(&[(FieldName::RegistrationCode, "1")]);
        assert_eq!(
            Credential::from_request(&one),
            Ok(Credential::RegistrationCode("1"))
        );
    }

    #[tokio::test]
    async fn get_cookie_then_cookie() {
        let (_, resolver) = setup();
        let issued = resolver.resolve(Credential::GetCookie("PL3030")).await.unwrap();
        let cookie = issued.cookie.unwrap();
        assert_eq!(cookie.len(), cookie::COOKIE_LEN);
        assert!(!issued.identity.registered);

        let again = resolver.resolve(Credential::Cookie(&cookie)).await.unwrap();
        assert_eq!(again.identity, issued.identity);
        assert!(again.cookie.is_none());

        assert_eq!(
            resolver.resolve(Credential::Cookie("nope")).await,
            Err(ServerError::InvalidCookie)
        );
    }

    #[tokio::test]
    async fn unique_device_reuses_cookie() {
        let (users, resolver) = setup();
        let first = resolver.resolve(Credential::GetCookie(UNIQUE_DEVICE)).await.unwrap();
        let second = resolver.resolve(Credential::GetCookie(UNIQUE_DEVICE)).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn non_unique_device_gets_new_user() {
        let (users, resolver) = setup();
        let first = resolver.resolve(Credential::GetCookie(EXAMPLE_DEVICE)).await.unwrap();
        let second = resolver.resolve(Credential::GetCookie(EXAMPLE_DEVICE)).await.unwrap();
        assert_ne!(first.cookie, second.cookie);
        assert_ne!(first.identity.user_id, second.identity.user_id);
        assert_eq!(users.len(), 2);
    }

    #[tokio::test]
    async fn invalid_device_is_unsupported() {
        let (users, resolver) = setup();
        assert_eq!(
            resolver.resolve(Credential::GetCookie("PL:blaha")).await,
            Err(ServerError::UnsupportedDevice)
        );
        assert!(users.is_empty());
    }

    #[tokio::test]
    async fn verify_registers_user() {
        let (users, resolver) = setup();
        let issued = resolver.resolve(Credential::GetCookie("PL3030")).await.unwrap();
        let mut identity = issued.identity;

        assert!(!resolver.verify_registration_code(&mut identity, "0000").await.unwrap());
        assert!(!identity.registered);

        assert!(resolver.verify_registration_code(&mut identity, VALID_CODE).await.unwrap());
        assert!(identity.registered);
        assert!(users.get(identity.user_id).unwrap().is_registered());

        let by_code = resolver
            .resolve(Credential::RegistrationCode(VALID_CODE))
            .await
            .unwrap();
        assert_eq!(by_code.identity.user_id, identity.user_id);
        assert!(by_code.identity.registered);

        let cookie = issued.cookie.unwrap();
        let by_cookie = resolver.resolve(Credential::Cookie(&cookie)).await.unwrap();
        assert!(by_cookie.identity.registered);
    }

    #[tokio::test]
    async fn reg_code_binds_to_one_user() {
        let (users, resolver) = setup();
        let first = resolver.resolve(Credential::GetCookie(EXAMPLE_DEVICE)).await.unwrap();
        let second = resolver.resolve(Credential::GetCookie(EXAMPLE_DEVICE)).await.unwrap();
        let mut alice = first.identity;
        let mut bob = second.identity;

        assert!(resolver.verify_registration_code(&mut alice, VALID_CODE).await.unwrap());
        assert!(!resolver.verify_registration_code(&mut bob, VALID_CODE).await.unwrap());
        assert!(!bob.registered);
        assert!(!users.get(bob.user_id).unwrap().is_registered());

        // The owner may verify again.
        assert!(resolver.verify_registration_code(&mut alice, VALID_CODE).await.unwrap());

        let by_code = resolver
            .resolve(Credential::RegistrationCode(VALID_CODE))
            .await
            .unwrap();
        assert_eq!(by_code.identity.user_id, alice.user_id);
    }

    #[tokio::test]
    async fn unbound_or_unknown_reg_code_is_invalid() {
        let (_, resolver) = setup();
        // Sold but never bound to a user.
        assert_eq!(
            resolver.resolve(Credential::RegistrationCode(VALID_CODE)).await,
            Err(ServerError::InvalidRegCode)
        );
        assert_eq!(
            resolver.resolve(Credential::RegistrationCode("0000")).await,
            Err(ServerError::InvalidRegCode)
        );
    }

    #[tokio::test]
    async fn disabled_user_is_rejected() {
        let (users, resolver) = setup();
        let issued = resolver.resolve(Credential::GetCookie(UNIQUE_DEVICE)).await.unwrap();
        users.set_disabled(issued.identity.user_id, true);
        let cookie = issued.cookie.unwrap();
        assert_eq!(
            resolver.resolve(Credential::Cookie(&cookie)).await,
            Err(ServerError::UserDisabled)
        );
        assert_eq!(
            resolver.resolve(Credential::GetCookie(UNIQUE_DEVICE)).await,
            Err(ServerError::UserDisabled)
        );
    }
}
