use crate::api::{ApiResult, SkewError};
use std::fs::File;
use std::io::Read;
use std::time::Duration;

/// Opens the raw byte stream behind a source identifier.
pub trait SequenceFetcher: Send + Sync {
    fn fetch(&self, identifier: &str) -> ApiResult<Box<dyn Read + Send>>;
}

pub fn is_remote(identifier: &str) -> bool {
    identifier.starts_with("http://") || identifier.starts_with("https://")
}

/// Fetches URLs over HTTP and everything else from the local filesystem.
pub struct SourceFetcher {
    client: reqwest::blocking::Client,
}

impl SourceFetcher {
    pub fn new(timeout: Duration) -> ApiResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }
}

impl SequenceFetcher for SourceFetcher {
    fn fetch(&self, identifier: &str) -> ApiResult<Box<dyn Read + Send>> {
        if is_remote(identifier) {
            log::debug!("Downloading {}", identifier);
            let resp = self.client.get(identifier).send()?;
            if !resp.status().is_success() {
                return Err(SkewError::SourceUnavailable(format!(
                    "{} returned status {}",
                    identifier,
                    resp.status()
                )));
            }
            Ok(Box::new(resp))
        } else {
            let file = File::open(identifier).map_err(|e| {
                SkewError::SourceUnavailable(format!("{}: {}", identifier, e))
            })?;
            Ok(Box::new(file))
        }
    }
}
