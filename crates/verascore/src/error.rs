use crate::config::ConfigError;
use crate::scoring::{
    ConfigValidationError, DefinitionSourceError, ScoringError, SourceError, UniverseLoadError,
};
use crate::telemetry::TelemetryError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Definitions(DefinitionSourceError),
    Validation(ConfigValidationError),
    Scoring(ScoringError),
    Universe(UniverseLoadError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Definitions(err) => write!(f, "definition error: {}", err),
            AppError::Validation(err) => write!(f, "validation error: {}", err),
            AppError::Scoring(err) => write!(f, "scoring error: {}", err),
            AppError::Universe(err) => write!(f, "universe error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Definitions(err) => Some(err),
            AppError::Validation(err) => Some(err),
            AppError::Scoring(err) => Some(err),
            AppError::Universe(err) => Some(err),
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Definitions(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Scoring(
                ScoringError::UnknownFactor(_)
                | ScoringError::UnknownPersona(_)
                | ScoringError::NoDefaultPersona
                | ScoringError::Source(SourceError::NotFound(_)),
            ) => StatusCode::NOT_FOUND,
            AppError::Scoring(ScoringError::Source(SourceError::Unavailable(_))) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Universe(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            AppError::Validation(err) => {
                let issues: Vec<_> = err
                    .issues()
                    .iter()
                    .map(|issue| {
                        json!({
                            "scope": issue.scope.to_string(),
                            "message": issue.kind.to_string(),
                        })
                    })
                    .collect();
                json!({ "error": self.to_string(), "issues": issues })
            }
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<DefinitionSourceError> for AppError {
    fn from(value: DefinitionSourceError) -> Self {
        Self::Definitions(value)
    }
}

impl From<ConfigValidationError> for AppError {
    fn from(value: ConfigValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<ScoringError> for AppError {
    fn from(value: ScoringError) -> Self {
        Self::Scoring(value)
    }
}

impl From<UniverseLoadError> for AppError {
    fn from(value: UniverseLoadError) -> Self {
        Self::Universe(value)
    }
}
