use std::str::FromStr;

use icehouse::{
    ProjectId,
    service::{Actor, NamespaceId, ServerId, TableId, UserId, ViewId, WarehouseId},
};
use serde::{Deserialize, Serialize};

use crate::{
    ObjectType,
    error::{RelationsError, RelationsResult},
};

const EVERYONE: &str = "*";

/// A node of the authorization hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "kebab-case")]
pub enum Object {
    Server(ServerId),
    Project(ProjectId),
    Warehouse(WarehouseId),
    Namespace(NamespaceId),
    Table(TableId),
    View(ViewId),
}

impl Object {
    #[must_use]
    pub fn object_type(&self) -> ObjectType {
        match self {
            Object::Server(_) => ObjectType::Server,
            Object::Project(_) => ObjectType::Project,
            Object::Warehouse(_) => ObjectType::Warehouse,
            Object::Namespace(_) => ObjectType::Namespace,
            Object::Table(_) => ObjectType::Table,
            Object::View(_) => ObjectType::View,
        }
    }

    /// `<type>:<id>` as stored in tuples.
    #[must_use]
    pub fn to_tuple_string(&self) -> String {
        let id = match self {
            Object::Server(id) => id.to_string(),
            Object::Project(id) => id.to_string(),
            Object::Warehouse(id) => id.to_string(),
            Object::Namespace(id) => id.to_string(),
            Object::Table(id) => id.to_string(),
            Object::View(id) => id.to_string(),
        };
        format!("{}:{id}", self.object_type())
    }

    /// Build an object from a type and the id as it appears in a URL path.
    pub fn from_type_and_id(object_type: ObjectType, id: &str) -> RelationsResult<Self> {
        let object = match object_type {
            ObjectType::Server => Object::Server(ServerId::from_str_or_bad_request(id)?),
            ObjectType::Project => Object::Project(ProjectId::try_new(id.to_string())?),
            ObjectType::Warehouse => Object::Warehouse(WarehouseId::from_str_or_bad_request(id)?),
            ObjectType::Namespace => Object::Namespace(NamespaceId::from_str_or_bad_request(id)?),
            ObjectType::Table => Object::Table(TableId::from_str_or_bad_request(id)?),
            ObjectType::View => Object::View(ViewId::from_str_or_bad_request(id)?),
            ObjectType::User => {
                return Err(RelationsError::UnexpectedObjectType {
                    expected: "server, project, warehouse, namespace, table or view",
                    actual: ObjectType::User,
                });
            }
        };
        Ok(object)
    }

    pub(crate) fn parse_tuple_string(s: &str) -> RelationsResult<Self> {
        let (r#type, id) = split_tuple_string(s)?;
        Self::from_type_and_id(r#type, id).map_err(|_| RelationsError::InvalidEntity(s.to_string()))
    }
}

/// Who a role is granted to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "kebab-case")]
pub enum Subject {
    User(UserId),
    /// Every caller, authenticated or not.
    Everyone,
}

impl Subject {
    /// `user:<url-encoded id>` or `user:*`.
    #[must_use]
    pub fn to_tuple_string(&self) -> String {
        match self {
            Subject::User(user_id) => {
                format!("{}:{}", ObjectType::User, urlencoding::encode(user_id.as_str()))
            }
            Subject::Everyone => format!("{}:{EVERYONE}", ObjectType::User),
        }
    }

    pub(crate) fn parse_tuple_string(s: &str) -> RelationsResult<Self> {
        let (r#type, id) = split_tuple_string(s)?;
        if r#type != ObjectType::User {
            return Err(RelationsError::UnexpectedObjectType {
                expected: "user",
                actual: r#type,
            });
        }
        if id == EVERYONE {
            return Ok(Subject::Everyone);
        }
        let decoded =
            urlencoding::decode(id).map_err(|_| RelationsError::InvalidEntity(s.to_string()))?;
        UserId::try_new(decoded.into_owned())
            .map(Subject::User)
            .map_err(|_| RelationsError::InvalidEntity(s.to_string()))
    }

    /// Tuple subjects that match `actor`, most specific first.
    pub(crate) fn tuple_strings_for_actor(actor: &Actor) -> Vec<String> {
        match actor {
            Actor::Principal(user_id) => vec![
                Subject::User(user_id.clone()).to_tuple_string(),
                Subject::Everyone.to_tuple_string(),
            ],
            Actor::Anonymous => vec![Subject::Everyone.to_tuple_string()],
        }
    }
}

fn split_tuple_string(s: &str) -> RelationsResult<(ObjectType, &str)> {
    let (r#type, id) = s
        .split_once(':')
        .ok_or_else(|| RelationsError::InvalidEntity(s.to_string()))?;
    let r#type =
        ObjectType::from_str(r#type).map_err(|_| RelationsError::UnknownType(r#type.to_string()))?;
    if id.is_empty() {
        return Err(RelationsError::InvalidEntity(s.to_string()));
    }
    Ok((r#type, id))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_object_tuple_string() {
        let warehouse_id = WarehouseId::new_random();
        let object = Object::Warehouse(warehouse_id);
        let s = object.to_tuple_string();
        assert_eq!(s, format!("warehouse:{warehouse_id}"));
        assert_eq!(Object::parse_tuple_string(&s).unwrap(), object);

        let project = Object::Project(ProjectId::try_new("analytics".to_string()).unwrap());
        assert_eq!(project.to_tuple_string(), "project:analytics");
    }

    #[test]
    fn test_object_parse_rejects_garbage() {
        assert!(matches!(
            Object::parse_tuple_string("warehouse"),
            Err(RelationsError::InvalidEntity(_))
        ));
        assert!(matches!(
            Object::parse_tuple_string("bucket:abc"),
            Err(RelationsError::UnknownType(_))
        ));
        assert!(matches!(
            Object::parse_tuple_string("table:not-a-uuid"),
            Err(RelationsError::InvalidEntity(_))
        ));
    }

    #[test]
    fn test_subject_round_trips_special_characters() {
        let subject = Subject::User(UserId::try_new("svc:etl/*").unwrap());
        let s = subject.to_tuple_string();
        assert_ne!(s, "user:*");
        assert_eq!(Subject::parse_tuple_string(&s).unwrap(), subject);
        assert_eq!(
            Subject::parse_tuple_string("user:*").unwrap(),
            Subject::Everyone
        );
    }

    #[test]
    fn test_anonymous_only_matches_everyone() {
        assert_eq!(
            Subject::tuple_strings_for_actor(&Actor::Anonymous),
            vec!["user:*".to_string()]
        );
        let alice = Actor::Principal(UserId::try_new("alice").unwrap());
        assert_eq!(
            Subject::tuple_strings_for_actor(&alice),
            vec!["user:alice".to_string(), "user:*".to_string()]
        );
    }

    #[test]
    fn test_subject_serde() {
        let subject: Subject =
            serde_json::from_value(serde_json::json!({"type": "user", "id": "bob"})).unwrap();
        assert_eq!(subject, Subject::User(UserId::try_new("bob").unwrap()));
        let everyone: Subject =
            serde_json::from_value(serde_json::json!({"type": "everyone"})).unwrap();
        assert_eq!(everyone, Subject::Everyone);
    }
}
