//! Loader for REST-API shaped JSON files (`restapi-files`).

use std::path::Path;

use log::{debug, info};

use super::{json_files, IndexSource};
use crate::error::{Error, Result};
use crate::index::{IndexConfig, IndexDocument};

/// Reads one file, or every `.json` file below a directory, identity-merging
/// them into one document.
pub struct FilesSource;

impl FilesSource {
    pub fn load_path(description: &str, path: &Path) -> Result<IndexDocument> {
        if !path.exists() {
            return Err(Error::SourceNotFound {
                description: description.to_string(),
                path: path.display().to_string(),
            });
        }

        info!("Loading {} from path {}...", description, path.display());
        let mut document = IndexDocument::default();
        for file in json_files(path, &[])? {
            debug!("Loading json file {}", file.display());
            document.merge(IndexDocument::from_file(&file)?)?;
        }
        Ok(document)
    }
}

impl IndexSource for FilesSource {
    fn load(&self, config: &IndexConfig, _branch: Option<&str>) -> Result<IndexDocument> {
        Self::load_path(&config.description, Path::new(&config.url))
    }
}
