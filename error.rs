use thiserror::Error;

/// Error taxonomy for the shelter pipelines.
///
/// Every variant carries a stable wire code and HTTP status so callers can
/// branch on the variant instead of inspecting error sources. Traversal is a
/// distinct variant internally but shares the not-found wire code.
#[derive(Debug, Error)]
pub enum ShelterError {
    #[error("request is not multipart/form-data")]
    NotFormData,

    #[error("secret not provided")]
    MissingSecret,

    #[error("secret is not valid")]
    InvalidSecret,

    #[error("file not provided")]
    MissingFile,

    #[error("unsupported extension: {0:?}")]
    UnsupportedExtension(String),

    /// Key string is not valid URL-safe base64, or not 256 bits once decoded.
    #[error("bad key format")]
    MalformedKey,

    /// Decryption produced invalid padding: the supplied key was wrong.
    #[error("invalid key")]
    InvalidKey,

    #[error("file does not exist")]
    NotFound,

    /// Resolved path escapes the storage root. Answered on the wire exactly
    /// like a missing file.
    #[error("requested name escapes the storage root")]
    Traversal,

    #[error("file is not readable")]
    ReadPermission,

    #[error("file read failed: {0}")]
    FileRead(String),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    #[error("unexpected error: {0}")]
    Unexpected(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),
}

impl ShelterError {
    pub fn file_read(msg: impl Into<String>) -> Self {
        Self::FileRead(msg.into())
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::Unexpected(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Stable machine-readable code reported in JSON error responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFormData => "NOT_FORM_DATA",
            Self::MissingSecret => "MISSING_SECRET",
            Self::InvalidSecret => "INVALID_SECRET",
            Self::MissingFile => "MISSING_FILE",
            Self::UnsupportedExtension(_) => "WRONG_EXTENSION",
            Self::MalformedKey => "BAD_KEY_FORMAT",
            Self::InvalidKey => "INVALID_KEY",
            Self::NotFound | Self::Traversal => "FILE_DOES_NOT_EXIST",
            Self::ReadPermission => "READ_PERMISSION",
            Self::FileRead(_) => "FILE_READ_ERROR",
            Self::KeyGeneration(_) | Self::Unexpected(_) | Self::Storage(_) | Self::Config(_) => {
                "UNEXPECTED_ERROR"
            }
        }
    }

    /// HTTP status the code maps to.
    pub fn status(&self) -> u16 {
        match self {
            Self::NotFormData
            | Self::MissingSecret
            | Self::MissingFile
            | Self::UnsupportedExtension(_)
            | Self::MalformedKey
            | Self::InvalidKey => 400,
            Self::InvalidSecret => 403,
            Self::NotFound | Self::Traversal => 404,
            Self::ReadPermission
            | Self::FileRead(_)
            | Self::KeyGeneration(_)
            | Self::Unexpected(_)
            | Self::Storage(_)
            | Self::Config(_) => 500,
        }
    }

    /// Client-facing message. Internal detail stays in the server logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::NotFormData => "The request's type is not multipart/form-data.".into(),
            Self::MissingSecret => "Secret not provided.".into(),
            Self::InvalidSecret => "Secret is not valid.".into(),
            Self::MissingFile => "File not provided.".into(),
            Self::UnsupportedExtension(ext) => format!("Wrong extension ({}).", ext),
            Self::MalformedKey => "Bad key format.".into(),
            Self::InvalidKey => "Invalid key provided!".into(),
            Self::NotFound | Self::Traversal => "This file does not exist.".into(),
            Self::ReadPermission => "File is not readable.".into(),
            Self::FileRead(_) => "Could not read the file!".into(),
            Self::KeyGeneration(_) | Self::Unexpected(_) | Self::Storage(_) | Self::Config(_) => {
                "Unexpected server error.".into()
            }
        }
    }
}

impl From<std::io::Error> for ShelterError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
