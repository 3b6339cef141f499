use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecantError {
    #[error("I/O error: {0}")]
    Io(Box<std::io::Error>),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Sqlite(Box<rusqlite::Error>),

    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("Unsupported package format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt collection database: {0}")]
    CorruptDatabase(String),

    #[error("Note {0} has no usable content")]
    EmptyNote(i64),

    #[error("Import cancelled")]
    Cancelled,

    #[error("DecantError: {0}")]
    Custom(String),
}

impl From<std::io::Error> for DecantError {
    fn from(error: std::io::Error) -> Self {
        DecantError::Io(Box::new(error))
    }
}

impl From<rusqlite::Error> for DecantError {
    fn from(error: rusqlite::Error) -> Self {
        DecantError::Sqlite(Box::new(error))
    }
}

impl From<zip::result::ZipError> for DecantError {
    fn from(error: zip::result::ZipError) -> Self {
        DecantError::CorruptArchive(error.to_string())
    }
}
