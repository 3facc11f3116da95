use serde::{Deserialize, Serialize};
use serde_json::Value;

use repocache::storage::InMemoryRepository;
use repocache_core::storage::{Entity, RepositoryError};

/// Customer record used by the walkthrough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub city: String,
    pub active: bool,
}

impl Entity for Customer {
    fn entity_type() -> &'static str {
        "Customer"
    }
}

impl Customer {
    pub fn new(id: i64, name: &str, city: &str, active: bool) -> Self {
        Self {
            id,
            name: name.to_string(),
            city: city.to_string(),
            active,
        }
    }
}

/// Generates the starting customer set.
pub fn generate_mock_customers() -> Vec<Customer> {
    vec![
        Customer::new(1, "Ada Lovelace", "London", true),
        Customer::new(2, "Charles Babbage", "London", false),
        Customer::new(3, "Grace Hopper", "New York", true),
        Customer::new(4, "Alan Turing", "Manchester", true),
        Customer::new(5, "Edsger Dijkstra", "Amsterdam", false),
    ]
}

/// Creates a customer repository keyed by `id` with an `in_city` raw command.
pub fn customer_repository() -> InMemoryRepository<Customer> {
    InMemoryRepository::new(["id"]).with_command("in_city", |command, rows: &[Customer]| {
        let city = command
            .get("city")
            .and_then(Value::as_str)
            .ok_or_else(|| RepositoryError::QueryFailed("in_city needs a city".to_string()))?;
        Ok(rows.iter().filter(|c| c.city == city).cloned().collect())
    })
}
