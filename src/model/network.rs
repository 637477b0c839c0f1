use std::collections::HashMap;

use bollard::models::Network;

/// Networks every engine ships with; they can never be removed.
pub const BUILTIN_NETWORKS: [&str; 3] = ["bridge", "host", "none"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkRecord {
    pub id: String,
    pub name: String,
    pub driver: String,
    pub scope: String,
    pub labels: HashMap<String, String>,
}

impl NetworkRecord {
    pub fn from_network(n: &Network) -> Self {
        let name = n.name.clone().unwrap_or_default();
        Self {
            id: n.id.clone().unwrap_or_else(|| name.clone()),
            driver: n.driver.clone().unwrap_or_default(),
            scope: n.scope.clone().unwrap_or_else(|| "local".to_string()),
            labels: n.labels.clone().unwrap_or_default(),
            name,
        }
    }

    pub fn is_builtin(&self) -> bool {
        is_builtin_network(&self.name)
    }
}

pub fn is_builtin_network(name: &str) -> bool {
    BUILTIN_NETWORKS.contains(&name)
}
