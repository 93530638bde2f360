use crate::mock_api::{MockApiConfig, MockApiDefinition, MockApiStatus};
use crate::repository::MockApiRepository;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// In-memory implementation of MockApiRepository
///
/// Holds mock API definitions keyed by id. Used directly by tests and wrapped by
/// `FileRepository`, which adds persistence to disk.
#[derive(Default)]
pub struct InMemoryRepository {
    apis: RwLock<BTreeMap<String, MockApiDefinition>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_definitions(definitions: impl IntoIterator<Item = MockApiDefinition>) -> Self {
        let repo = Self::new();
        for definition in definitions {
            repo.insert(definition);
        }
        repo
    }

    /// Insert or replace a definition.
    pub fn insert(&self, definition: MockApiDefinition) {
        self.apis
            .write()
            .insert(definition.config.id.clone(), definition);
    }

    /// Insert an inactive definition with no port for `config`.
    pub fn insert_config(&self, config: MockApiConfig) {
        self.insert(MockApiDefinition {
            config,
            status: MockApiStatus::Inactive,
            port: None,
        });
    }

    pub fn get(&self, id: &str) -> Option<MockApiDefinition> {
        self.apis.read().get(id).cloned()
    }

    pub fn status(&self, id: &str) -> Option<MockApiStatus> {
        self.apis.read().get(id).map(|d| d.status)
    }

    pub fn definitions(&self) -> Vec<MockApiDefinition> {
        self.apis.read().values().cloned().collect()
    }

    fn update<F>(&self, id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut MockApiDefinition),
    {
        let mut apis = self.apis.write();
        let definition = apis
            .get_mut(id)
            .ok_or_else(|| anyhow!("mock API {id} not found"))?;
        f(definition);
        Ok(())
    }
}

#[async_trait]
impl MockApiRepository for InMemoryRepository {
    async fn find_mock_api_with_endpoints_and_scenarios(
        &self,
        id: &str,
    ) -> Result<Option<MockApiConfig>> {
        Ok(self.apis.read().get(id).map(|d| d.config.clone()))
    }

    async fn set_status(&self, id: &str, status: MockApiStatus) -> Result<()> {
        self.update(id, |d| d.status = status)
    }

    async fn list_active_mock_apis(&self) -> Result<Vec<String>> {
        Ok(self
            .apis
            .read()
            .values()
            .filter(|d| d.status == MockApiStatus::Active)
            .map(|d| d.config.id.clone())
            .collect())
    }

    async fn find_port_assignment(&self, id: &str) -> Result<Option<u16>> {
        Ok(self.apis.read().get(id).and_then(|d| d.port))
    }

    async fn list_port_assignments(&self) -> Result<Vec<(String, u16)>> {
        Ok(self
            .apis
            .read()
            .values()
            .filter_map(|d| d.port.map(|p| (d.config.id.clone(), p)))
            .collect())
    }

    async fn save_port_assignment(&self, id: &str, port: u16) -> Result<()> {
        self.update(id, |d| d.port = Some(port))
    }
}
