use super::CatalogData;
use crate::service::ServerInfo;

pub(super) fn get_server_info(data: &CatalogData) -> ServerInfo {
    ServerInfo::new(data.server_id, data.terms_accepted)
}

/// Returns `false` if the terms were accepted before.
pub(super) fn bootstrap(terms_accepted: bool, data: &mut CatalogData) -> bool {
    if data.terms_accepted {
        return false;
    }
    data.terms_accepted = terms_accepted;
    tracing::info!(server_id = %data.server_id, "Bootstrapped catalog");
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_runs_once() {
        let mut data = CatalogData::new();
        assert!(!get_server_info(&data).is_bootstrapped());
        assert!(bootstrap(true, &mut data));
        assert!(!bootstrap(true, &mut data));
        let info = get_server_info(&data);
        assert!(info.is_bootstrapped());
        assert_eq!(info.server_id(), data.server_id);
    }
}
