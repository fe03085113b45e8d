use crate::service::ServerId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// Stable id of this catalog, assigned on first start
    pub(crate) server_id: ServerId,
    /// Whether the terms have been accepted. Set once by bootstrap.
    pub(crate) terms_accepted: bool,
}

impl ServerInfo {
    #[must_use]
    pub fn new(server_id: ServerId, terms_accepted: bool) -> Self {
        Self {
            server_id,
            terms_accepted,
        }
    }

    #[must_use]
    pub fn server_id(&self) -> ServerId {
        self.server_id
    }

    /// A catalog is bootstrapped once the terms have been accepted.
    #[must_use]
    pub fn is_bootstrapped(&self) -> bool {
        self.terms_accepted
    }
}
