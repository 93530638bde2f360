//! File-backed mock API repository.
//!
//! Definitions are read from a YAML or JSON document at startup and kept in memory.
//! Status and port changes are written back by serializing the whole document to a
//! sibling temp file and renaming it over the original.

use super::inmemory::InMemoryRepository;
use crate::mock_api::{MockApiConfig, MockApiDefinition, MockApiStatus};
use crate::repository::MockApiRepository;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MockApiDocument {
    #[serde(default)]
    mock_apis: Vec<MockApiDefinition>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    Yaml,
    Json,
}

impl DocumentFormat {
    fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => DocumentFormat::Json,
            _ => DocumentFormat::Yaml,
        }
    }
}

pub struct FileRepository {
    path: PathBuf,
    format: DocumentFormat,
    inner: InMemoryRepository,
    /// Serializes write-backs so two updates cannot interleave their renames
    write_lock: Mutex<()>,
}

impl FileRepository {
    /// Load definitions from `path`. A missing file starts an empty repository.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let format = DocumentFormat::from_path(&path);

        let document = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("reading mock API file {}", path.display()))?;
            match format {
                DocumentFormat::Json => serde_json::from_str(&contents)
                    .with_context(|| format!("parsing {}", path.display()))?,
                DocumentFormat::Yaml => serde_yaml::from_str(&contents)
                    .with_context(|| format!("parsing {}", path.display()))?,
            }
        } else {
            debug!("Mock API file {:?} does not exist, starting empty", path);
            MockApiDocument::default()
        };

        let count = document.mock_apis.len();
        let inner = InMemoryRepository::with_definitions(document.mock_apis);
        info!("Loaded {} mock API definitions from {:?}", count, path);

        Ok(Self {
            path,
            format,
            inner,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn definitions(&self) -> Vec<MockApiDefinition> {
        self.inner.definitions()
    }

    async fn persist(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let document = MockApiDocument {
            mock_apis: self.inner.definitions(),
        };
        let contents = match self.format {
            DocumentFormat::Json => serde_json::to_string_pretty(&document)?,
            DocumentFormat::Yaml => serde_yaml::to_string(&document)?,
        };

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, contents)
            .await
            .with_context(|| format!("writing {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("replacing {}", self.path.display()))?;
        debug!("Persisted mock API file {:?}", self.path);
        Ok(())
    }
}

#[async_trait]
impl MockApiRepository for FileRepository {
    async fn find_mock_api_with_endpoints_and_scenarios(
        &self,
        id: &str,
    ) -> Result<Option<MockApiConfig>> {
        self.inner.find_mock_api_with_endpoints_and_scenarios(id).await
    }

    async fn set_status(&self, id: &str, status: MockApiStatus) -> Result<()> {
        if self.inner.status(id) == Some(status) {
            return Ok(());
        }
        self.inner.set_status(id, status).await?;
        self.persist().await
    }

    async fn list_active_mock_apis(&self) -> Result<Vec<String>> {
        self.inner.list_active_mock_apis().await
    }

    async fn find_port_assignment(&self, id: &str) -> Result<Option<u16>> {
        self.inner.find_port_assignment(id).await
    }

    async fn list_port_assignments(&self) -> Result<Vec<(String, u16)>> {
        self.inner.list_port_assignments().await
    }

    async fn save_port_assignment(&self, id: &str, port: u16) -> Result<()> {
        self.inner.save_port_assignment(id, port).await?;
        self.persist().await
    }
}
