use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    DirectoryDoesNotExist(String),
    NotInRange(String),
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::DirectoryDoesNotExist(e) => write!(f, "Directory error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::InvalidValue(e) => write!(f, "Invalid value: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug)]
pub enum StorageError {
    ConnectionFailed,
    WriteFailed,
    ReadFailed,
    NotFound(String),
    InvalidKey(String),
    SerializationFailed(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed => write!(f, "Storage connection failed"),
            StorageError::WriteFailed => write!(f, "Storage write failed"),
            StorageError::ReadFailed => write!(f, "Storage read failed"),
            StorageError::NotFound(key) => write!(f, "Storage key not found: {}", key),
            StorageError::InvalidKey(key) => write!(f, "Invalid storage key: {}", key),
            StorageError::SerializationFailed(e) => write!(f, "Storage serialization failed: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

/// Failures of the external annotation service.
///
/// These never reach the detail panel as text: the coordinator maps every
/// variant onto the fixed `Failed` message.
#[derive(Debug)]
pub enum AnnotationError {
    MissingApiKey,
    HttpError(reqwest::Error),
    BadStatus(u16),
    EmptyResponse,
    Timeout,
}

impl fmt::Display for AnnotationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationError::MissingApiKey => write!(f, "API key not found"),
            AnnotationError::HttpError(e) => write!(f, "Annotation HTTP error: {}", e),
            AnnotationError::BadStatus(code) => {
                write!(f, "Annotation service answered with status {}", code)
            }
            AnnotationError::EmptyResponse => write!(f, "Annotation service returned no text"),
            AnnotationError::Timeout => write!(f, "Annotation request timed out"),
        }
    }
}

impl std::error::Error for AnnotationError {}

impl From<reqwest::Error> for AnnotationError {
    fn from(err: reqwest::Error) -> Self {
        AnnotationError::HttpError(err)
    }
}

#[derive(Debug)]
pub enum AuthError {
    InvalidCredentials,
    NotAuthenticated,
    Forbidden,
    UserNotFound(String),
    DuplicateEmail(String),
    CannotDeleteSelf,
    StorageError(StorageError),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::InvalidCredentials => write!(f, "Invalid email or password"),
            AuthError::NotAuthenticated => write!(f, "No user is logged in"),
            AuthError::Forbidden => write!(f, "Operation requires an administrator"),
            AuthError::UserNotFound(id) => write!(f, "User not found: {}", id),
            AuthError::DuplicateEmail(email) => write!(f, "Email already registered: {}", email),
            AuthError::CannotDeleteSelf => write!(f, "The current user cannot delete itself"),
            AuthError::StorageError(e) => write!(f, "Auth storage error: {}", e),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::StorageError(err)
    }
}

#[derive(Debug)]
pub enum MonitorError {
    UnknownInterface(String),
    RecordNotFound(u64),
    ExportFailed(String),
}

impl fmt::Display for MonitorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorError::UnknownInterface(id) => write!(f, "Unknown capture interface: {}", id),
            MonitorError::RecordNotFound(seq) => write!(f, "No record with sequence {}", seq),
            MonitorError::ExportFailed(e) => write!(f, "Record export failed: {}", e),
        }
    }
}

impl std::error::Error for MonitorError {}

#[derive(Debug)]
pub enum WebError {
    BindFailed(String),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BindFailed(e) => write!(f, "Web server bind failed: {}", e),
        }
    }
}

impl std::error::Error for WebError {}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    StorageError(StorageError),
    AuthError(AuthError),
    MonitorError(MonitorError),
    WebError(WebError),
    InitializationFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::StorageError(e) => write!(f, "Storage error: {}", e),
            ControllerError::AuthError(e) => write!(f, "Auth error: {}", e),
            ControllerError::MonitorError(e) => write!(f, "Monitor error: {}", e),
            ControllerError::WebError(e) => write!(f, "Web error: {}", e),
            ControllerError::InitializationFailed(e) => write!(f, "Initialization failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<StorageError> for ControllerError {
    fn from(err: StorageError) -> Self {
        ControllerError::StorageError(err)
    }
}

impl From<AuthError> for ControllerError {
    fn from(err: AuthError) -> Self {
        ControllerError::AuthError(err)
    }
}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<MonitorError> for ControllerError {
    fn from(err: MonitorError) -> Self {
        ControllerError::MonitorError(err)
    }
}

impl From<WebError> for ControllerError {
    fn from(err: WebError) -> Self {
        ControllerError::WebError(err)
    }
}
