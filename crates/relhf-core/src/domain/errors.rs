use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RelhfResult<T> = Result<T, RelhfError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelhfErrorCategory {
    Success,
    InputValidationError,
    IoSystemError,
    ComputationError,
    InternalError,
}

impl RelhfErrorCategory {
    pub const fn exit_placeholder(self) -> ExitPlaceholder {
        match self {
            Self::Success => ExitPlaceholder {
                exit_code: 0,
                label: "Success",
                severity: "OK",
            },
            Self::InputValidationError => ExitPlaceholder {
                exit_code: 2,
                label: "InputValidationError",
                severity: "INPUT_FATAL",
            },
            Self::IoSystemError => ExitPlaceholder {
                exit_code: 3,
                label: "IoSystemError",
                severity: "IO_FATAL",
            },
            Self::ComputationError => ExitPlaceholder {
                exit_code: 4,
                label: "ComputationError",
                severity: "RUN_FATAL",
            },
            Self::InternalError => ExitPlaceholder {
                exit_code: 5,
                label: "InternalError",
                severity: "SYS_FATAL",
            },
        }
    }

    pub const fn exit_code(self) -> i32 {
        self.exit_placeholder().exit_code
    }

    pub const fn label(self) -> &'static str {
        self.exit_placeholder().label
    }

    pub const fn is_fatal(self) -> bool {
        !matches!(self, Self::Success)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitPlaceholder {
    pub exit_code: i32,
    pub label: &'static str,
    pub severity: &'static str,
}

/// Categorised error surfaced at the library boundary.
///
/// Module-level errors convert into this type; the category decides the
/// process exit code of the command-line front end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelhfError {
    category: RelhfErrorCategory,
    placeholder: &'static str,
    message: String,
}

impl RelhfError {
    pub fn new(
        category: RelhfErrorCategory,
        placeholder: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            category,
            placeholder,
            message: message.into(),
        }
    }

    pub fn input_validation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(
            RelhfErrorCategory::InputValidationError,
            placeholder,
            message,
        )
    }

    pub fn io_system(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(RelhfErrorCategory::IoSystemError, placeholder, message)
    }

    pub fn computation(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(RelhfErrorCategory::ComputationError, placeholder, message)
    }

    pub fn internal(placeholder: &'static str, message: impl Into<String>) -> Self {
        Self::new(RelhfErrorCategory::InternalError, placeholder, message)
    }

    pub const fn category(&self) -> RelhfErrorCategory {
        self.category
    }

    pub const fn placeholder(&self) -> &'static str {
        self.placeholder
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn exit_code(&self) -> i32 {
        self.category.exit_code()
    }

    pub fn diagnostic_line(&self) -> String {
        let severity = if self.category.is_fatal() {
            "ERROR"
        } else {
            "INFO"
        };
        format!("{}: [{}] {}", severity, self.placeholder, self.message)
    }

    pub fn fatal_exit_line(&self) -> Option<String> {
        self.category
            .is_fatal()
            .then(|| format!("FATAL EXIT CODE: {}", self.exit_code()))
    }
}

impl Display for RelhfError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.category.label(),
            self.placeholder,
            self.message
        )
    }
}

impl Error for RelhfError {}
