pub mod cache;
pub mod encode;
pub mod german;
pub mod loaders;
pub mod providers;
pub mod split;

pub use cache::*;
pub use encode::*;
pub use german::*;
pub use loaders::*;
pub use providers::*;
pub use split::*;

use bt_types::{BtResult, Dataset, Schema};
use std::path::{Path, PathBuf};
use tracing::info;

/// Dataset manager: makes the raw file available locally, then parses it
#[derive(Debug)]
pub struct DataManager {
    pub data_dir: PathBuf,
    pub file_name: String,
    pub schema: Schema,
    pub loader: loaders::DelimitedLoader,
    pub provider: Box<dyn providers::DatasetProvider>,
}

impl DataManager {
    pub fn new<P: AsRef<Path>>(
        data_dir: P,
        file_name: &str,
        schema: Schema,
        provider: Box<dyn providers::DatasetProvider>,
    ) -> BtResult<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)?;

        Ok(Self {
            data_dir,
            file_name: file_name.to_string(),
            schema,
            loader: loaders::DelimitedLoader::whitespace(),
            provider,
        })
    }

    /// German Credit data fetched from `url` into `data_dir` when absent.
    pub fn german_credit<P: AsRef<Path>>(data_dir: P, url: &str) -> BtResult<Self> {
        Self::new(
            data_dir,
            german::GERMAN_CREDIT_FILE,
            german::german_credit_schema(),
            Box::new(providers::HttpDatasetProvider::new(url)),
        )
    }

    pub fn local_path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }

    pub async fn load(&self) -> BtResult<Dataset> {
        let path = self.provider.ensure_local(&self.local_path()).await?;
        let dataset = self.loader.load_file(&path, &self.schema)?;
        info!(
            "Loaded {} records from {} (positive rate {:.3})",
            dataset.len(),
            path.display(),
            dataset.positive_rate()
        );
        Ok(dataset)
    }
}
