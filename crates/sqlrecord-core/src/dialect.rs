//! SQL dialects.
//!
//! The dialect travels next to the connection inside a session and governs
//! compilation only: identifier quoting, placeholder style and the spelling of
//! the few functions that differ between servers.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// A named SQL variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    /// PostgreSQL (uses $1, $2 placeholders)
    #[default]
    Postgres,
    /// MySQL (uses ? placeholders, backtick quoting)
    Mysql,
    /// MariaDB (MySQL-compatible, a few function differences)
    Mariadb,
    /// SQLite (uses ? placeholders)
    Sqlite,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    ///
    /// Only Postgres uses the index; the other dialects bind positionally.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Mysql | Dialect::Mariadb | Dialect::Sqlite => "?".to_string(),
        }
    }

    /// Whether the dialect belongs to the MySQL family.
    pub const fn is_mysql_family(self) -> bool {
        matches!(self, Dialect::Mysql | Dialect::Mariadb)
    }

    /// Check if this dialect supports ILIKE.
    pub const fn supports_ilike(self) -> bool {
        matches!(self, Dialect::Postgres)
    }

    /// Quote an identifier for this dialect.
    ///
    /// Embedded quote characters are escaped by doubling them:
    /// - For Postgres/SQLite: `"` becomes `""`
    /// - For MySQL/MariaDB: `` ` `` becomes ``` `` ```
    pub fn quote_identifier(self, name: &str) -> String {
        if self.is_mysql_family() {
            format!("`{}`", name.replace('`', "``"))
        } else {
            format!("\"{}\"", name.replace('"', "\"\""))
        }
    }

    /// Quote a possibly table-qualified column reference.
    ///
    /// `posts.user_id` becomes `"posts"."user_id"`; a `*` segment is left bare.
    pub fn quote_column(self, path: &str) -> String {
        path.split('.')
            .map(|segment| {
                if segment == "*" {
                    "*".to_string()
                } else {
                    self.quote_identifier(segment)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Canonical lowercase name.
    pub const fn name(self) -> &'static str {
        match self {
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
            Dialect::Mariadb => "mariadb",
            Dialect::Sqlite => "sqlite",
        }
    }

    /// Infer the dialect from a connection URL scheme.
    ///
    /// ```
    /// use sqlrecord_core::Dialect;
    ///
    /// assert_eq!(Dialect::from_url("postgres://localhost/app").unwrap(), Dialect::Postgres);
    /// assert_eq!(Dialect::from_url("sqlite::memory:").unwrap(), Dialect::Sqlite);
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url
            .split_once(':')
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| Error::config(format!("connection url '{}' has no scheme", url)))?;
        scheme.parse()
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::Mysql),
            "mariadb" => Ok(Dialect::Mariadb),
            "sqlite" | "sqlite3" => Ok(Dialect::Sqlite),
            other => Err(Error::config(format!("unknown SQL dialect '{}'", other))),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::Mysql.placeholder(3), "?");
        assert_eq!(Dialect::Mariadb.placeholder(3), "?");
        assert_eq!(Dialect::Sqlite.placeholder(3), "?");
    }

    #[test]
    fn test_quoting_escapes_embedded_quotes() {
        assert_eq!(Dialect::Postgres.quote_identifier("users"), "\"users\"");
        assert_eq!(Dialect::Sqlite.quote_identifier("a\"b"), "\"a\"\"b\"");
        assert_eq!(Dialect::Mysql.quote_identifier("a`b"), "`a``b`");
        assert_eq!(Dialect::Mariadb.quote_identifier("users"), "`users`");
    }

    #[test]
    fn test_quote_column_paths() {
        assert_eq!(Dialect::Postgres.quote_column("posts.user_id"), "\"posts\".\"user_id\"");
        assert_eq!(Dialect::Mysql.quote_column("posts.*"), "`posts`.*");
        assert_eq!(Dialect::Sqlite.quote_column("*"), "*");
    }

    #[test]
    fn test_parse_names_and_urls() {
        assert_eq!("PostgreSQL".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("sqlite3".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert_eq!(Dialect::from_url("mariadb://db/app").unwrap(), Dialect::Mariadb);
        assert!("oracle".parse::<Dialect>().unwrap_err().is_config_error());
        assert!(Dialect::from_url("no-scheme").is_err());
    }
}
