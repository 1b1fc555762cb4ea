use crate::domain::model::{AnalysisReport, Table};
use crate::utils::error::Result;
use async_trait::async_trait;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    /// Location of `path` as shown to the user.
    fn display_path(&self, path: &str) -> String;
}

/// One analysis: fetch its data, then fit and report.
#[async_trait]
pub trait Analysis: Send + Sync {
    fn name(&self) -> &str;
    async fn extract(&self) -> Result<Table>;
    async fn analyze(&self, table: Table) -> Result<AnalysisReport>;
}
