use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Remote source returned status {status}: {url}")]
    SourceStatusError { url: String, status: u16 },

    #[error("Data error: {message}")]
    DataError { message: String },

    #[error("Model error: {message}")]
    ModelError { message: String },

    #[error("Plot rendering error: {message}")]
    PlotError { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Input,
    Estimation,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AnalysisError {
    pub fn data(message: impl Into<String>) -> Self {
        Self::DataError {
            message: message.into(),
        }
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::ModelError {
            message: message.into(),
        }
    }

    pub fn plot(message: impl std::fmt::Display) -> Self {
        Self::PlotError {
            message: message.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Configuration,
            Self::HttpError(_)
            | Self::CsvError(_)
            | Self::SourceStatusError { .. }
            | Self::DataError { .. } => ErrorCategory::Input,
            Self::ModelError { .. } => ErrorCategory::Estimation,
            Self::ZipError(_)
            | Self::IoError(_)
            | Self::SerializationError(_)
            | Self::PlotError { .. } => ErrorCategory::Output,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::PlotError { .. } => ErrorSeverity::Low,
            Self::HttpError(_) | Self::SourceStatusError { .. } => ErrorSeverity::Medium,
            Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. }
            | Self::CsvError(_)
            | Self::DataError { .. }
            | Self::ModelError { .. } => ErrorSeverity::High,
            Self::ZipError(_) | Self::IoError(_) | Self::SerializationError(_) => {
                ErrorSeverity::Critical
            }
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::ConfigValidationError { .. } | Self::InvalidConfigValueError { .. } => {
                "Check the analysis configuration file against the documented sections"
            }
            Self::MissingConfigError { .. } => "Add the missing key to the configuration file",
            Self::HttpError(_) | Self::SourceStatusError { .. } => {
                "Verify the source URL is reachable, or download the CSV and use a local path"
            }
            Self::CsvError(_) => "Make sure the source is a comma-separated file with a header row",
            Self::DataError { .. } => {
                "Check column names, reference levels and blank cells in the input data"
            }
            Self::ModelError { .. } => {
                "Drop collinear or perfectly separating predictors and re-run the analysis"
            }
            Self::PlotError { .. } => "Disable plots with `plots = false` in the [report] section",
            Self::ZipError(_) | Self::IoError(_) | Self::SerializationError(_) => {
                "Check that the output directory exists and is writable"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::Input => format!("Could not read the input data: {}", self),
            ErrorCategory::Estimation => format!("Model estimation failed: {}", self),
            ErrorCategory::Output => format!("Could not write the report: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, AnalysisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_and_severity() {
        let err = AnalysisError::model("information matrix is singular");
        assert_eq!(err.category(), ErrorCategory::Estimation);
        assert_eq!(err.severity(), ErrorSeverity::High);
        assert!(err.user_friendly_message().starts_with("Model estimation failed"));

        let err = AnalysisError::MissingConfigError {
            field: "churn.response".to_string(),
        };
        assert_eq!(err.category(), ErrorCategory::Configuration);
        assert_eq!(
            err.to_string(),
            "Missing required configuration: churn.response"
        );
    }

    #[test]
    fn test_plot_errors_are_low_severity() {
        let err = AnalysisError::plot("font unavailable");
        assert_eq!(err.severity(), ErrorSeverity::Low);
        assert!(err.severity() < ErrorSeverity::Critical);
    }
}
