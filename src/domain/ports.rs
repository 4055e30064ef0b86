use crate::domain::model::{BoundingBox, CleanedPoint, Source, SourceBatch};
use crate::domain::report::RunReport;
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// Human readable location of `path`, used in logs and reports.
    fn describe(&self, path: &str) -> String;
}

/// One remote source of charging points.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> Source;

    /// Pages through the source for `bbox`. Network or API failure yields
    /// `EtlError::SourceUnavailable`; an empty batch means the source had nothing.
    async fn fetch(&self, bbox: &BoundingBox) -> Result<SourceBatch>;
}

/// Consumer of the final dataset.
#[async_trait]
pub trait PointSink: Send + Sync {
    /// Returns the location the dataset was written to.
    async fn write(&self, points: &[CleanedPoint], report: &RunReport) -> Result<String>;
}
