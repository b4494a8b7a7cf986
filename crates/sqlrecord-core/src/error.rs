//! Error types for sqlrecord operations.

use std::fmt;

/// The primary error type for all sqlrecord operations.
#[derive(Debug)]
pub enum Error {
    /// Malformed input caught before any I/O
    Compilation(CompilationError),
    /// Strict lookups and relation resolution failures
    NotFound(NotFoundError),
    /// Missing or inconsistent configuration
    Config(ConfigError),
    /// Connection-related errors reported by the driver
    Connection(ConnectionError),
    /// Statement execution errors reported by the driver
    Query(QueryError),
    /// Transaction errors reported by the driver
    Transaction(TransactionError),
    /// Row value conversion errors
    Type(TypeError),
    /// Serialization/deserialization errors
    Serde(String),
    /// Custom error with message
    Custom(String),
}

#[derive(Debug)]
pub struct CompilationError {
    pub message: String,
    /// SQL fragment being compiled when the error was detected, if any.
    pub fragment: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    /// No row matched a strict lookup
    Record,
    /// A relation name is not declared on the model
    Relation,
}

#[derive(Debug)]
pub struct NotFoundError {
    pub kind: NotFoundKind,
    /// Table or model the lookup ran against
    pub table: String,
    pub message: String,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug)]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionErrorKind {
    /// Failed to establish connection
    Connect,
    /// Authentication failed
    Authentication,
    /// Connection lost during operation
    Disconnected,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub sqlstate: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Syntax error in SQL
    Syntax,
    /// Constraint violation (unique, foreign key, etc.)
    Constraint,
    /// Table or column not found
    NotFound,
    /// Other database error
    Database,
}

#[derive(Debug)]
pub struct TransactionError {
    pub kind: TransactionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionErrorKind {
    /// BEGIN failed
    Begin,
    /// COMMIT failed
    Commit,
    /// ROLLBACK failed
    Rollback,
    /// Savepoint handling failed
    Savepoint,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

impl Error {
    /// Build a compilation error from a message.
    pub fn compilation(message: impl Into<String>) -> Self {
        Error::Compilation(CompilationError {
            message: message.into(),
            fragment: None,
        })
    }

    /// Build a configuration error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config(ConfigError {
            message: message.into(),
            source: None,
        })
    }

    /// Build a "no matching record" error for a table.
    pub fn record_not_found(table: impl Into<String>, message: impl Into<String>) -> Self {
        Error::NotFound(NotFoundError {
            kind: NotFoundKind::Record,
            table: table.into(),
            message: message.into(),
        })
    }

    /// Build an "unknown relation" error for a table.
    pub fn relation_not_found(table: impl Into<String>, relation: &str) -> Self {
        let table = table.into();
        let message = format!("relation '{}' is not declared on '{}'", relation, table);
        Error::NotFound(NotFoundError {
            kind: NotFoundKind::Relation,
            table,
            message,
        })
    }

    /// Is this an opaque error that came back from the driver?
    pub fn is_driver_error(&self) -> bool {
        matches!(
            self,
            Error::Connection(_) | Error::Query(_) | Error::Transaction(_)
        )
    }

    /// Is this a compilation error?
    pub fn is_compilation_error(&self) -> bool {
        matches!(self, Error::Compilation(_))
    }

    /// Is this a not-found error?
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Is this a configuration error?
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_))
    }

    /// Get SQLSTATE if available (e.g., "23505" for unique violation)
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sqlstate.as_deref(),
            _ => None,
        }
    }

    /// Get the SQL that caused this error, if available
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            Error::Compilation(c) => c.fragment.as_deref(),
            _ => None,
        }
    }
}

impl QueryError {
    /// Is this a unique constraint violation?
    pub fn is_unique_violation(&self) -> bool {
        self.sqlstate.as_deref() == Some("23505")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Compilation(e) => write!(f, "Compilation error: {}", e),
            Error::NotFound(e) => write!(f, "Not found: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
            Error::Connection(e) => write!(f, "Connection error: {}", e.message),
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Transaction(e) => write!(f, "Transaction error: {}", e.message),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Serde(msg) => write!(f, "Serialization error: {}", msg),
            Error::Custom(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Connection(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for CompilationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fragment {
            Some(fragment) => write!(f, "{} (in `{}`)", self.message, fragment),
            None => write!(f, "{}", self.message),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sqlstate) = &self.sqlstate {
            write!(f, "{} (SQLSTATE {})", self.message, sqlstate)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl From<CompilationError> for Error {
    fn from(err: CompilationError) -> Self {
        Error::Compilation(err)
    }
}

impl From<NotFoundError> for Error {
    fn from(err: NotFoundError) -> Self {
        Error::NotFound(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<ConnectionError> for Error {
    fn from(err: ConnectionError) -> Self {
        Error::Connection(err)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TransactionError> for Error {
    fn from(err: TransactionError) -> Self {
        Error::Transaction(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serde(err.to_string())
    }
}

/// Result type alias for sqlrecord operations.
pub type Result<T> = std::result::Result<T, Error>;
