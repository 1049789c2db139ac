use thiserror::Error;

/// Categories for every failure the pipeline core can surface.
///
/// Data-level problems (a missing journal variable, a failed solver run) are
/// handled as skip-and-continue by callers and never reach this type;
/// everything here is either a malformed document or a misconfiguration that
/// must stop the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ace3pErrorCategory {
    InputValidation,
    MalformedDocument,
    UnknownOutputPath,
    IoSystem,
    ExternalProcess,
    Configuration,
}

impl Ace3pErrorCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InputValidation => "input-validation",
            Self::MalformedDocument => "malformed-document",
            Self::UnknownOutputPath => "unknown-output-path",
            Self::IoSystem => "io-system",
            Self::ExternalProcess => "external-process",
            Self::Configuration => "configuration",
        }
    }
}

/// Shared error type for the pipeline core.
///
/// Every error carries a stable placeholder code (e.g. `PARSE.ACE3P_BRACE`)
/// so drivers and tests can assert on the failure site without matching
/// message text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{placeholder}] {message}")]
pub struct Ace3pError {
    category: Ace3pErrorCategory,
    placeholder: String,
    message: String,
}

impl Ace3pError {
    fn new(
        category: Ace3pErrorCategory,
        placeholder: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder: placeholder.into(),
            message: message.into(),
        }
    }

    pub fn input_validation(placeholder: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Ace3pErrorCategory::InputValidation, placeholder, message)
    }

    pub fn malformed_document(placeholder: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Ace3pErrorCategory::MalformedDocument, placeholder, message)
    }

    pub fn unknown_output_path(placeholder: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Ace3pErrorCategory::UnknownOutputPath, placeholder, message)
    }

    pub fn io_system(placeholder: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Ace3pErrorCategory::IoSystem, placeholder, message)
    }

    pub fn external_process(placeholder: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Ace3pErrorCategory::ExternalProcess, placeholder, message)
    }

    pub fn configuration(placeholder: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(Ace3pErrorCategory::Configuration, placeholder, message)
    }

    pub fn category(&self) -> Ace3pErrorCategory {
        self.category
    }

    pub fn placeholder(&self) -> &str {
        &self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exit_code(&self) -> i32 {
        match self.category {
            Ace3pErrorCategory::InputValidation => 2,
            Ace3pErrorCategory::MalformedDocument => 3,
            Ace3pErrorCategory::UnknownOutputPath => 4,
            Ace3pErrorCategory::IoSystem => 5,
            Ace3pErrorCategory::ExternalProcess => 6,
            Ace3pErrorCategory::Configuration => 7,
        }
    }

    pub fn diagnostic_line(&self) -> String {
        format!(
            "lume-ace3p error ({}): [{}] {}",
            self.category.as_str(),
            self.placeholder,
            self.message
        )
    }
}

pub type Ace3pResult<T> = Result<T, Ace3pError>;
