//! Cache key construction.
//!
//! Two kinds of keys exist:
//!
//! - **Point keys** address one entity by primary key and never change for
//!   that identity: `{type}/GetById/{name}={value}`.
//! - **Query keys** address a materialized query or command result and embed
//!   the entity type's current generation: `{type}/{generation}/{hash}`.
//!   Bumping the generation makes every older query key unreachable without
//!   enumerating them.

use sha2::{Digest, Sha256};

use crate::query::{canonical_predicate, Command, Expr, Query, Result};
use crate::storage::EntityId;

/// Number of digest bytes kept in query keys (128 bits).
const HASH_BYTES: usize = 16;

/// Operation tag of point keys.
pub const GET_BY_ID: &str = "GetById";

/// Returns the key holding the generation counter of an entity type.
pub fn generation_key(entity_type: &str) -> String {
    format!("{}/Generation", entity_type)
}

/// Returns the point key for a single entity.
///
/// Composite keys are joined with [`EntityId::SEPARATOR`]. Components without
/// a matching name fall back to their position.
pub fn point_key(entity_type: &str, names: &[String], id: &EntityId) -> String {
    let pairs = id
        .values()
        .iter()
        .enumerate()
        .map(|(i, value)| match names.get(i) {
            Some(name) => format!("{name}={value}"),
            None => format!("{i}={value}"),
        })
        .collect::<Vec<_>>()
        .join(&EntityId::SEPARATOR.to_string());
    format!("{}/{}/{}", entity_type, GET_BY_ID, pairs)
}

/// Hashes canonical query text down to a fixed-length hex digest.
pub fn hash_canonical(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    hex::encode(&digest[..HASH_BYTES])
}

/// Returns the generation-stamped key for a `FindAll` query.
pub fn query_key(entity_type: &str, query: &Query, generation: u64) -> Result<String> {
    let canonical = query.canonical_text("FindAll")?;
    Ok(stamped_key(entity_type, generation, &canonical))
}

/// Returns the generation-stamped key for a `Count` query.
pub fn count_key(entity_type: &str, predicate: Option<&Expr>, generation: u64) -> Result<String> {
    let canonical = format!("Count|where={}", canonical_predicate(predicate)?);
    Ok(stamped_key(entity_type, generation, &canonical))
}

/// Returns the generation-stamped key for a raw command.
pub fn command_key(entity_type: &str, command: &Command, generation: u64) -> String {
    stamped_key(entity_type, generation, &command.canonical_text())
}

fn stamped_key(entity_type: &str, generation: u64, canonical: &str) -> String {
    format!(
        "{}/{}/{}",
        entity_type,
        generation,
        hash_canonical(canonical)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::KeyValue;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_generation_key() {
        assert_eq!(generation_key("Customer"), "Customer/Generation");
    }

    #[test]
    fn test_point_key() {
        let key = point_key("Customer", &names(&["id"]), &EntityId::from(42));
        assert_eq!(key, "Customer/GetById/id=42");
    }

    #[test]
    fn test_composite_point_key() {
        let id = EntityId::new(vec![KeyValue::from("eu"), KeyValue::from(7)]);
        let key = point_key("Order", &names(&["region", "number"]), &id);
        assert_eq!(key, "Order/GetById/region=eu,number=7");
    }

    #[test]
    fn test_point_key_without_names_uses_positions() {
        let key = point_key("Order", &[], &EntityId::from(7));
        assert_eq!(key, "Order/GetById/0=7");
    }

    #[test]
    fn test_query_key_shape() {
        let query = Query::filter(Expr::field("active").equals(true));
        let key = query_key("Customer", &query, 1).unwrap();

        let parts: Vec<&str> = key.split('/').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "Customer");
        assert_eq!(parts[1], "1");
        assert_eq!(parts[2].len(), HASH_BYTES * 2);
        assert!(parts[2].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_query_key_is_deterministic_across_construction_paths() {
        let active = true;
        let literal = Query::filter(Expr::field("active").equals(true)).take(20);
        let captured =
            Query::filter(Expr::field("active").equals(Expr::captured("active", active))).take(20);
        let composed = Query::filter(
            Expr::always().and(Expr::field("active").equals(Expr::deferred(move || active.into()))),
        )
        .take(20);

        let expected = query_key("Customer", &literal, 3).unwrap();
        assert_eq!(query_key("Customer", &captured, 3).unwrap(), expected);
        assert_eq!(query_key("Customer", &composed, 3).unwrap(), expected);
    }

    #[test]
    fn test_query_key_changes_with_generation() {
        let query = Query::filter(Expr::field("active").equals(true));
        assert_ne!(
            query_key("Customer", &query, 1).unwrap(),
            query_key("Customer", &query, 2).unwrap()
        );
    }

    #[test]
    fn test_query_key_differs_per_entity_type() {
        let query = Query::all();
        assert_ne!(
            query_key("Customer", &query, 1).unwrap(),
            query_key("Order", &query, 1).unwrap()
        );
    }

    #[test]
    fn test_count_key_differs_from_query_key() {
        let predicate = Expr::field("active").equals(true);
        let query = Query::filter(predicate.clone());
        assert_ne!(
            count_key("Customer", Some(&predicate), 1).unwrap(),
            query_key("Customer", &query, 1).unwrap()
        );
    }

    #[test]
    fn test_command_key_ignores_param_order() {
        let a = Command::new("by_region").param("region", "eu").param("limit", 5);
        let b = Command::new("by_region").param("limit", 5).param("region", "eu");
        assert_eq!(
            command_key("Customer", &a, 1),
            command_key("Customer", &b, 1)
        );
    }

    #[test]
    fn test_command_key_depends_on_text() {
        let a = Command::new("by_region").param("region", "eu");
        let b = Command::new("by_country").param("region", "eu");
        assert_ne!(
            command_key("Customer", &a, 1),
            command_key("Customer", &b, 1)
        );
    }

    #[test]
    fn test_invalid_predicate_is_reported() {
        let query = Query::filter(Expr::field("score").gt(Expr::value("a").times(2)));
        assert!(query_key("Customer", &query, 1).is_err());
    }
}
