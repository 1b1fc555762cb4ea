use crate::domain::model::Table;
use crate::utils::error::{AnalysisError, Result};
use reqwest::Client;
use std::path::PathBuf;
use url::Url;

/// Where an analysis reads its CSV from.
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    Local(PathBuf),
    Remote(Url),
}

impl DataSource {
    pub fn parse(source: &str) -> Result<Self> {
        if source.contains("://") {
            crate::utils::validation::validate_url("source", source)?;
            let url = Url::parse(source).map_err(|e| AnalysisError::InvalidConfigValueError {
                field: "source".to_string(),
                value: source.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Self::Remote(url))
        } else {
            crate::utils::validation::validate_path("source", source)?;
            Ok(Self::Local(PathBuf::from(source)))
        }
    }

    pub async fn read(&self, client: &Client) -> Result<Vec<u8>> {
        match self {
            Self::Local(path) => {
                tracing::debug!("Reading CSV from {}", path.display());
                Ok(tokio::fs::read(path).await?)
            }
            Self::Remote(url) => {
                tracing::debug!("Downloading CSV from {}", url);
                let response = client.get(url.clone()).send().await?;
                let status = response.status();
                tracing::debug!("Source response status: {}", status);
                if !status.is_success() {
                    return Err(AnalysisError::SourceStatusError {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                }
                Ok(response.bytes().await?.to_vec())
            }
        }
    }

    pub async fn load_table(&self, client: &Client) -> Result<Table> {
        let bytes = self.read(client).await?;
        let table = Table::from_csv_bytes(&bytes)?;
        if table.is_empty() {
            return Err(AnalysisError::data(format!("{} contains no data rows", self)));
        }
        tracing::info!("Loaded {} rows from {}", table.len(), self);
        Ok(table)
    }
}

impl std::fmt::Display for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(path) => write!(f, "{}", path.display()),
            Self::Remote(url) => write!(f, "{}", url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_parse_source_kinds() {
        assert_eq!(
            DataSource::parse("testscoresdata.csv").unwrap(),
            DataSource::Local(PathBuf::from("testscoresdata.csv"))
        );
        assert!(matches!(
            DataSource::parse("https://data.example.com/conjoint.csv").unwrap(),
            DataSource::Remote(_)
        ));
        assert!(DataSource::parse("s3://bucket/file.csv").is_err());
    }

    #[tokio::test]
    async fn test_load_local_table() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"a,b\n1,2\n3,4\n").unwrap();

        let source = DataSource::Local(file.path().to_path_buf());
        let table = source.load_table(&Client::new()).await.unwrap();
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_load_remote_table() {
        let server = MockServer::start();
        let csv_mock = server.mock(|when, then| {
            when.method(GET).path("/scores.csv");
            then.status(200)
                .header("Content-Type", "text/csv")
                .body("math,reading\n80,70\n60,65\n");
        });

        let source = DataSource::parse(&server.url("/scores.csv")).unwrap();
        let table = source.load_table(&Client::new()).await.unwrap();

        csv_mock.assert();
        assert_eq!(table.headers, vec!["math", "reading"]);
        assert_eq!(table.numeric_column("math").unwrap(), vec![80.0, 60.0]);
    }

    #[tokio::test]
    async fn test_remote_failure_status() {
        let server = MockServer::start();
        let csv_mock = server.mock(|when, then| {
            when.method(GET).path("/missing.csv");
            then.status(404);
        });

        let source = DataSource::parse(&server.url("/missing.csv")).unwrap();
        let err = source.load_table(&Client::new()).await.unwrap_err();

        csv_mock.assert();
        assert!(matches!(err, AnalysisError::SourceStatusError { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_header_only_file_is_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"a,b\n").unwrap();
        let source = DataSource::Local(file.path().to_path_buf());
        assert!(source.load_table(&Client::new()).await.is_err());
    }
}
