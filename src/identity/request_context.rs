use super::principal::Principal;
use super::session::Session;

/// Which carrier delivered the session token for this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarrierKind {
    Cookie,
    Header,
}

/// Session token candidates lifted from a request. The cookie wins when both are present.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialCarrier {
    pub cookie: Option<String>,
    pub header: Option<String>,
}

impl CredentialCarrier {
    pub fn from_cookie(token: impl Into<String>) -> Self { Self { cookie: Some(token.into()), header: None } }
    pub fn from_header(token: impl Into<String>) -> Self { Self { cookie: None, header: Some(token.into()) } }

    /// The authoritative token, ignoring blank values.
    pub fn token(&self) -> Option<(CarrierKind, &str)> {
        fn present(v: &Option<String>) -> Option<&str> { v.as_deref().map(str::trim).filter(|s| !s.is_empty()) }
        present(&self.cookie)
            .map(|t| (CarrierKind::Cookie, t))
            .or_else(|| present(&self.header).map(|t| (CarrierKind::Header, t)))
    }
}

/// Outcome of a successful resolution, scoped to one request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Principal,
    pub session: Session,
    pub carrier: CarrierKind,
}
