use crate::core::{Analysis, AnalysisReport, Artifact, Storage};
use crate::utils::error::Result;
use std::io::Write;
use std::time::Instant;
use zip::write::{FileOptions, ZipWriter};

/// What a finished analysis left behind.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub name: String,
    pub summary: String,
    pub location: String,
    pub files: Vec<String>,
}

pub struct AnalysisEngine<S: Storage> {
    storage: S,
    compress: bool,
}

impl<S: Storage> AnalysisEngine<S> {
    pub fn new(storage: S, compress: bool) -> Self {
        Self { storage, compress }
    }

    pub async fn run(&self, analysis: &dyn Analysis) -> Result<RunOutcome> {
        let started = Instant::now();
        tracing::info!("Starting {} analysis...", analysis.name());

        // Extract
        let table = analysis.extract().await?;
        tracing::info!("Extracted {} rows", table.len());

        // Analyze
        tracing::info!("Fitting {} model...", analysis.name());
        let report = analysis.analyze(table).await?;
        tracing::info!("Produced {} artifacts", report.artifacts.len());

        // Publish
        let outcome = self.publish(report).await?;
        tracing::info!(
            "{} analysis finished in {:.2?}, output saved to: {}",
            outcome.name,
            started.elapsed(),
            outcome.location
        );

        Ok(outcome)
    }

    /// Writes summary, JSON report and artifacts either as one zip or as
    /// individual files under `<name>/`.
    pub async fn publish(&self, mut report: AnalysisReport) -> Result<RunOutcome> {
        if let Some(object) = report.json.as_object_mut() {
            object.insert(
                "generated_at".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }

        let mut artifacts = vec![
            Artifact::text("summary.txt", report.summary.clone()),
            Artifact {
                file_name: "report.json".to_string(),
                bytes: serde_json::to_vec_pretty(&report.json)?,
            },
        ];
        artifacts.append(&mut report.artifacts);
        let files: Vec<String> = artifacts.iter().map(|a| a.file_name.clone()).collect();

        let location = if self.compress {
            let archive = format!("{}_report.zip", report.name);
            tracing::debug!("Creating ZIP file with {} files", artifacts.len());

            // 打包所有輸出
            let zip_data = {
                let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
                for artifact in &artifacts {
                    zip.start_file::<_, ()>(artifact.file_name.as_str(), FileOptions::default())?;
                    zip.write_all(&artifact.bytes)?;
                }
                let cursor = zip.finish()?;
                cursor.into_inner()
            };

            tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
            self.storage.write_file(&archive, &zip_data).await?;
            self.storage.display_path(&archive)
        } else {
            for artifact in &artifacts {
                let path = format!("{}/{}", report.name, artifact.file_name);
                tracing::debug!("Writing {} ({} bytes)", path, artifact.bytes.len());
                self.storage.write_file(&path, &artifact.bytes).await?;
            }
            self.storage.display_path(&report.name)
        };

        Ok(RunOutcome {
            name: report.name,
            summary: report.summary,
            location,
            files,
        })
    }
}
