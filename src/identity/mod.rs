//! Accounts, sessions and role-based access.
//! Keep the public surface thin and split implementation across sub-modules.

mod account;
mod admin;
mod authorizer;
mod credentials;
mod error;
mod principal;
mod provider;
mod registration;
mod request_context;
mod resolver;
mod roles;
mod session;

pub use account::{AccountService, UserPatch};
pub use admin::AccountAdmin;
pub use authorizer::{authorize, can_view_contact_details, CONTACT_VIEWER_ROLES};
pub use credentials::CredentialStore;
pub use error::{AuthError, AuthResult};
pub use principal::{AccountStatus, ExpertProfile, Gender, Principal, ReviewStatus, VolunteerProfile, WorkStatus};
pub use provider::{AuthProvider, LocalAuthProvider, LoginRequest, LoginResponse};
pub use registration::{ExpertProfileInput, RegistrationRequest, RegistrationWorkflow, VolunteerProfileInput};
pub use request_context::{CarrierKind, CredentialCarrier, RequestContext};
pub use resolver::IdentityResolver;
pub use roles::{Role, RoleSet, StoredRoles, UnknownRole};
pub use session::{Session, SessionManager, SessionToken};
