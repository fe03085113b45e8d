use chrono::{DateTime, Utc};

use super::{CatalogData, tabular::expired_tabulars};
use crate::{
    WarehouseId,
    service::{PurgedEntities, PurgedTabular, WarehouseStatus},
};

/// Remove every warehouse and tabular whose soft-deletion expired at `now`.
pub(super) fn purge_expired(now: DateTime<Utc>, data: &mut CatalogData) -> PurgedEntities {
    let mut purged = PurgedEntities::default();

    let expired_warehouses: Vec<WarehouseId> = data
        .warehouses
        .iter()
        .filter(|(_, w)| {
            w.status == WarehouseStatus::Deleted && w.deletion.is_some_and(|d| d.is_expired(now))
        })
        .map(|(id, _)| *id)
        .collect();
    for warehouse_id in expired_warehouses {
        if let Some(warehouse) = data.remove_warehouse_tree(warehouse_id) {
            tracing::info!(%warehouse_id, name = %warehouse.name, "Purged expired warehouse");
            purged.warehouses.push(warehouse.resolve(warehouse_id));
        }
    }

    for id in expired_tabulars(data, now) {
        let Some(record) = data.tabulars.remove(&id) else {
            continue;
        };
        let Some(warehouse) = data
            .warehouses
            .get(&record.warehouse_id)
            .map(|w| w.resolve(record.warehouse_id))
        else {
            continue;
        };
        let remove_data = record.deletion.is_some_and(|d| d.purge_requested);
        let tabular = record.to_info(id);
        tracing::info!(
            warehouse_id = %warehouse.warehouse_id,
            tabular_id = %tabular.tabular_id,
            tabular = %tabular.tabular_ident.name,
            remove_data,
            "Purged expired tabular"
        );
        purged.tabulars.push((warehouse, PurgedTabular {
            tabular,
            remove_data,
        }));
    }

    purged
}
