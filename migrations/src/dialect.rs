//! SQL dialects and schema-tracking table statements

use std::fmt;

/// SQL dialect spoken by the target database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    Postgres,
    Mysql,
    SqlServer,
    Sqlite,
}

impl Dialect {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Mysql => "mysql",
            Self::SqlServer => "sqlserver",
            Self::Sqlite => "sqlite",
        }
    }

    /// Quote one identifier
    pub fn quote_ident(self, ident: &str) -> String {
        match self {
            Self::Postgres | Self::Sqlite => format!("\"{}\"", ident.replace('"', "\"\"")),
            Self::Mysql => format!("`{}`", ident.replace('`', "``")),
            Self::SqlServer => format!("[{}]", ident.replace(']', "]]")),
        }
    }

    /// Quote a possibly schema-qualified table name (`schema.table`)
    pub fn quote_table(self, table: &str) -> String {
        let (schema, name) = split_table(table);
        match schema {
            Some(schema) => format!("{}.{}", self.quote_ident(schema), self.quote_ident(name)),
            None => self.quote_ident(name),
        }
    }

    /// Query returning one row when the table exists
    pub fn table_exists_sql(self, table: &str) -> String {
        let (schema, name) = split_table(table);
        let name = literal(name);
        match (self, schema) {
            (Self::Postgres, Some(schema)) => format!(
                "SELECT 1 FROM information_schema.tables WHERE table_schema = {} AND table_name = {name}",
                literal(schema)
            ),
            (Self::Postgres, None) => format!(
                "SELECT 1 FROM information_schema.tables WHERE table_schema = current_schema() AND table_name = {name}"
            ),
            (Self::Mysql, Some(schema)) => format!(
                "SELECT 1 FROM information_schema.tables WHERE table_schema = {} AND table_name = {name}",
                literal(schema)
            ),
            (Self::Mysql, None) => format!(
                "SELECT 1 FROM information_schema.tables WHERE table_schema = DATABASE() AND table_name = {name}"
            ),
            (Self::SqlServer, Some(schema)) => format!(
                "SELECT 1 FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {name}",
                literal(schema)
            ),
            (Self::SqlServer, None) => {
                format!("SELECT 1 FROM INFORMATION_SCHEMA.TABLES WHERE TABLE_NAME = {name}")
            }
            (Self::Sqlite, _) => {
                format!("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = {name}")
            }
        }
    }

    pub fn create_table_sql(self, table: &str) -> String {
        let table = self.quote_table(table);
        match self {
            Self::Postgres => format!(
                "CREATE TABLE {table} (version BIGINT PRIMARY KEY, name TEXT DEFAULT '', checksum TEXT DEFAULT '', run_at TIMESTAMP WITH TIME ZONE DEFAULT now())"
            ),
            Self::Mysql => format!(
                "CREATE TABLE {table} (version BIGINT PRIMARY KEY, name TEXT, checksum VARCHAR(64) DEFAULT '', run_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP)"
            ),
            Self::SqlServer => format!(
                "CREATE TABLE {table} (version BIGINT PRIMARY KEY, name NVARCHAR(MAX), checksum NVARCHAR(64) DEFAULT '', run_at DATETIME DEFAULT GETDATE())"
            ),
            Self::Sqlite => format!(
                "CREATE TABLE {table} (version INTEGER PRIMARY KEY, name TEXT DEFAULT '', checksum TEXT DEFAULT '', run_at TEXT DEFAULT CURRENT_TIMESTAMP)"
            ),
        }
    }

    pub fn select_applied_sql(self, table: &str) -> String {
        format!(
            "SELECT version, checksum FROM {} ORDER BY version",
            self.quote_table(table)
        )
    }

    pub fn record_sql(self, table: &str, version: u64, name: &str, checksum: &str) -> String {
        format!(
            "INSERT INTO {} (version, name, checksum) VALUES ({version}, {}, {})",
            self.quote_table(table),
            literal(name),
            literal(checksum)
        )
    }

    pub fn forget_sql(self, table: &str, version: u64) -> String {
        format!(
            "DELETE FROM {} WHERE version = {version}",
            self.quote_table(table)
        )
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn split_table(table: &str) -> (Option<&str>, &str) {
    match table.split_once('.') {
        Some((schema, name)) if !schema.is_empty() && !name.is_empty() => (Some(schema), name),
        _ => (None, table),
    }
}

fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
