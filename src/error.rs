use serde::Serialize;
use thiserror::Error;

/// Stable codes carried by `ParrotError::Translation`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u16)]
pub enum TranslationErrorCode {
    TranslationFailed = 1000,
    ModelNotLoaded = 1001,
    EmptyOutput = 1002,
    UnsupportedOperation = 1003,
}

impl TranslationErrorCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Message shown to callers. Collaborator error text is logged, never returned.
    pub fn public_message(self) -> &'static str {
        match self {
            Self::TranslationFailed => "An error occurred during translation",
            Self::ModelNotLoaded => "Model not loaded. Load a model before translating",
            Self::EmptyOutput => "The model produced an empty translation",
            Self::UnsupportedOperation => "The loaded model does not support this operation",
        }
    }
}

#[derive(Error, Debug)]
pub enum ParrotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load model '{model}': {message}")]
    Load { model: String, message: String },

    #[error("{0}")]
    Language(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("[ErrorCode {}] {message}", .code.as_u16())]
    Translation {
        code: TranslationErrorCode,
        message: String,
    },

    #[error("Terminology error: {0}")]
    Terminology(String),

    #[error("Cache error: {0}")]
    Cache(String),
}

impl ParrotError {
    pub fn translation(code: TranslationErrorCode) -> Self {
        Self::Translation {
            code,
            message: code.public_message().to_string(),
        }
    }

    pub fn load(model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Load {
            model: model.into(),
            message: message.into(),
        }
    }

    /// Numeric code exposed at the HTTP boundary.
    pub fn code(&self) -> u16 {
        match self {
            Self::Translation { code, .. } => code.as_u16(),
            Self::Language(_) => 1100,
            Self::InvalidRequest(_) => 1101,
            Self::Load { .. } => 1200,
            Self::Config(_) => 1300,
            _ => TranslationErrorCode::TranslationFailed.as_u16(),
        }
    }

    /// Collapse anything raised while producing a translation into the
    /// unified `Translation` variant. Validation errors pass through.
    pub fn into_translation_error(self) -> Self {
        match self {
            Self::Translation { .. } | Self::Language(_) | Self::InvalidRequest(_) => self,
            other => {
                tracing::warn!("Translation failed: {}", other);
                Self::translation(TranslationErrorCode::TranslationFailed)
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, ParrotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translation_error_display_carries_code() {
        let err = ParrotError::translation(TranslationErrorCode::TranslationFailed);
        assert_eq!(
            err.to_string(),
            "[ErrorCode 1000] An error occurred during translation"
        );
        assert_eq!(err.code(), 1000);
    }

    #[test]
    fn test_into_translation_error_hides_collaborator_text() {
        let raw = ParrotError::Terminology("socket closed at 10.0.0.3".to_string());
        let wrapped = raw.into_translation_error();
        assert!(matches!(
            wrapped,
            ParrotError::Translation { code: TranslationErrorCode::TranslationFailed, .. }
        ));
        assert!(!wrapped.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn test_validation_errors_pass_through() {
        let err = ParrotError::Language("Unsupported source language: french".to_string());
        let err = err.into_translation_error();
        assert!(matches!(err, ParrotError::Language(_)));
        assert_eq!(err.code(), 1100);
    }
}
