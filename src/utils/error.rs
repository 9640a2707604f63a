use thiserror::Error;

#[derive(Error, Debug)]
pub enum PingError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Unexpected HTTP status {status} from {url}")]
    StatusError { status: u16, url: String },

    #[error("Timed out during {phase} after {millis}ms")]
    TimeoutError { phase: String, millis: u128 },

    #[error("Decode error: {message}")]
    DecodeError { message: String },

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Data,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl PingError {
    pub fn decode(message: impl Into<String>) -> Self {
        PingError::DecodeError {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            PingError::HttpError(_) | PingError::StatusError { .. } | PingError::TimeoutError { .. } => {
                ErrorCategory::Network
            }
            PingError::SerializationError(_) | PingError::DecodeError { .. } => ErrorCategory::Data,
            PingError::ConfigValidationError { .. } | PingError::InvalidConfigValueError { .. } => {
                ErrorCategory::Configuration
            }
            PingError::IoError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            // 網路錯誤通常下一輪排程即可恢復
            ErrorCategory::Network => ErrorSeverity::Medium,
            ErrorCategory::Data => ErrorSeverity::High,
            ErrorCategory::Configuration => ErrorSeverity::High,
            ErrorCategory::System => ErrorSeverity::Critical,
        }
    }

    /// 下一次排程可望自行恢復的錯誤
    pub fn is_transient(&self) -> bool {
        self.severity() <= ErrorSeverity::Medium
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            PingError::HttpError(_) => "Check that the ping server is running and reachable",
            PingError::StatusError { .. } => "Verify the request path and parameters",
            PingError::TimeoutError { .. } => "Increase the client timeouts or reduce the requested delay",
            PingError::DecodeError { .. } | PingError::SerializationError(_) => {
                "Make sure the server speaks JSON or NDJSON batches of pong records"
            }
            PingError::ConfigValidationError { .. } | PingError::InvalidConfigValueError { .. } => {
                "Fix the configuration file or command line flags"
            }
            PingError::IoError(_) => "Check file permissions and that the port is free",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Network => format!("Could not talk to the ping server: {}", self),
            ErrorCategory::Data => format!("Received data could not be understood: {}", self),
            ErrorCategory::Configuration => format!("Invalid configuration: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }

    /// 依嚴重程度決定程式結束碼
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }
}

pub type Result<T> = std::result::Result<T, PingError>;
