use super::{ResolvedWarehouse, TabularInfo};

/// A table or view removed by the expiration sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgedTabular {
    pub tabular: TabularInfo,
    /// Whether the data below the tabular location should be removed.
    pub remove_data: bool,
}

/// Entities removed from the store in one purge. Their storage still exists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PurgedEntities {
    /// Purged warehouses. Tabulars purged along with a warehouse are not listed in
    /// `tabulars`; removing the warehouse base location covers them.
    pub warehouses: Vec<ResolvedWarehouse>,
    /// Tabulars purged on their own. Their warehouse is still active.
    pub tabulars: Vec<(ResolvedWarehouse, PurgedTabular)>,
}

impl PurgedEntities {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.warehouses.is_empty() && self.tabulars.is_empty()
    }
}
