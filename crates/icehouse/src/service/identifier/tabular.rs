use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{TableId, ViewId};

/// Id of a table or a view.
#[derive(Hash, PartialOrd, Ord, PartialEq, Debug, Clone, Copy, Eq, Deserialize, Serialize)]
#[serde(tag = "type", content = "id", rename_all = "kebab-case")]
pub enum TabularId {
    Table(TableId),
    View(ViewId),
}

impl TabularId {
    #[must_use]
    pub fn typ_str(&self) -> &'static str {
        match self {
            TabularId::Table(_) => "Table",
            TabularId::View(_) => "View",
        }
    }

    #[must_use]
    pub fn uuid(&self) -> Uuid {
        match self {
            TabularId::Table(id) => **id,
            TabularId::View(id) => **id,
        }
    }
}

impl From<TableId> for TabularId {
    fn from(id: TableId) -> Self {
        TabularId::Table(id)
    }
}

impl From<ViewId> for TabularId {
    fn from(id: ViewId) -> Self {
        TabularId::View(id)
    }
}

impl Display for TabularId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.typ_str(), self.uuid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tabular_id_wire_format() {
        let id = TabularId::View(ViewId::new(Uuid::nil()));
        assert_eq!(
            serde_json::to_value(id).unwrap(),
            serde_json::json!({"type": "view", "id": "00000000-0000-0000-0000-000000000000"})
        );
    }
}
