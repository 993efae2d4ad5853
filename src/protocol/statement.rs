//! SQL subset understood by the reference server.
//!
//! Only the statements a client test suite needs are recognized:
//!
//! - `SHOW SCHEMAS`, `SHOW TABLES FROM s`, `SHOW CREATE TABLE s.t`
//! - `SELECT * FROM s.t`
//! - `CREATE SCHEMA [IF NOT EXISTS] s`, `DROP SCHEMA [IF EXISTS] s`
//! - `CREATE TABLE s.t (col TYPE [NOT NULL], ...)`
//! - `CREATE VIEW s.v AS SELECT * FROM s.t`
//! - `DROP TABLE|VIEW [IF EXISTS] s.t`
//!
//! Keywords are case-insensitive; identifiers may be quoted with backticks.
use thiserror::Error;

use crate::value::{Column, ColumnType};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StatementError {
    #[error("unsupported statement near '{0}'")]
    Unsupported(String),

    #[error("expected {expected}, found '{found}'")]
    Unexpected { expected: String, found: String },

    #[error("unexpected end of statement, expected {0}")]
    Truncated(String),

    #[error("'{0}' must be qualified with a schema")]
    Unqualified(String),

    #[error("unknown column type '{0}'")]
    UnknownType(String),

    #[error("view '{view}' must be created in the schema of its base table '{base}'")]
    CrossSchemaView { view: String, base: String },
}

/// Parsed statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    ShowSchemas,
    ShowTables {
        schema: String,
    },
    ShowCreateTable {
        schema: String,
        name: String,
    },
    Select {
        schema: String,
        table: String,
    },
    CreateSchema {
        name: String,
        if_not_exists: bool,
    },
    DropSchema {
        name: String,
        if_exists: bool,
    },
    CreateTable {
        schema: String,
        name: String,
        columns: Vec<Column>,
    },
    CreateView {
        schema: String,
        name: String,
        base: String,
    },
    DropTable {
        schema: String,
        name: String,
        if_exists: bool,
    },
    DropView {
        schema: String,
        name: String,
        if_exists: bool,
    },
}

impl TryFrom<&str> for Statement {
    type Error = StatementError;

    fn try_from(text: &str) -> Result<Self, Self::Error> {
        let mut tokens = Tokens::new(text);
        let statement = match tokens.keyword()?.as_str() {
            "SHOW" => match tokens.keyword()?.as_str() {
                "SCHEMAS" | "DATABASES" => Statement::ShowSchemas,
                "TABLES" => {
                    tokens.expect("FROM")?;
                    Statement::ShowTables {
                        schema: tokens.identifier()?,
                    }
                }
                "CREATE" => {
                    tokens.expect("TABLE")?;
                    let (schema, name) = tokens.qualified()?;
                    Statement::ShowCreateTable { schema, name }
                }
                other => return Err(StatementError::Unsupported(format!("SHOW {other}"))),
            },
            "SELECT" => {
                let (schema, table) = tokens.select_all()?;
                Statement::Select { schema, table }
            }
            "CREATE" => match tokens.keyword()?.as_str() {
                "SCHEMA" | "DATABASE" => {
                    let if_not_exists = tokens.if_not_exists()?;
                    Statement::CreateSchema {
                        name: tokens.identifier()?,
                        if_not_exists,
                    }
                }
                "TABLE" => {
                    let (schema, name) = tokens.qualified()?;
                    Statement::CreateTable {
                        schema,
                        name,
                        columns: tokens.column_list()?,
                    }
                }
                "VIEW" => {
                    let (schema, name) = tokens.qualified()?;
                    tokens.expect("AS")?;
                    tokens.expect("SELECT")?;
                    let (base_schema, base) = tokens.select_all()?;
                    if base_schema != schema {
                        return Err(StatementError::CrossSchemaView {
                            view: format!("{schema}.{name}"),
                            base: format!("{base_schema}.{base}"),
                        });
                    }
                    Statement::CreateView { schema, name, base }
                }
                other => return Err(StatementError::Unsupported(format!("CREATE {other}"))),
            },
            "DROP" => {
                let kind = tokens.keyword()?;
                let if_exists = tokens.if_exists()?;
                match kind.as_str() {
                    "SCHEMA" | "DATABASE" => Statement::DropSchema {
                        name: tokens.identifier()?,
                        if_exists,
                    },
                    "TABLE" => {
                        let (schema, name) = tokens.qualified()?;
                        Statement::DropTable {
                            schema,
                            name,
                            if_exists,
                        }
                    }
                    "VIEW" => {
                        let (schema, name) = tokens.qualified()?;
                        Statement::DropView {
                            schema,
                            name,
                            if_exists,
                        }
                    }
                    other => return Err(StatementError::Unsupported(format!("DROP {other}"))),
                }
            }
            other => return Err(StatementError::Unsupported(other.to_string())),
        };
        tokens.finish()?;
        Ok(statement)
    }
}

struct Tokens {
    tokens: Vec<String>,
    position: usize,
}

impl Tokens {
    fn new(text: &str) -> Self {
        let spaced = text
            .trim()
            .trim_end_matches(';')
            .replace('(', " ( ")
            .replace(')', " ) ")
            .replace(',', " , ");
        Self {
            tokens: spaced.split_whitespace().map(str::to_string).collect(),
            position: 0,
        }
    }

    fn next(&mut self, expected: &str) -> Result<String, StatementError> {
        let token = self
            .tokens
            .get(self.position)
            .cloned()
            .ok_or_else(|| StatementError::Truncated(expected.to_string()))?;
        self.position += 1;
        Ok(token)
    }

    fn peek_keyword(&self) -> Option<String> {
        self.tokens.get(self.position).map(|t| t.to_uppercase())
    }

    fn keyword(&mut self) -> Result<String, StatementError> {
        self.next("a keyword").map(|t| t.to_uppercase())
    }

    fn expect(&mut self, keyword: &str) -> Result<(), StatementError> {
        let found = self.next(keyword)?;
        if !found.eq_ignore_ascii_case(keyword) {
            return Err(StatementError::Unexpected {
                expected: keyword.to_string(),
                found,
            });
        }
        Ok(())
    }

    /// Consumes `keywords` if they come next; they must then appear in full.
    fn optional(&mut self, keywords: &[&str]) -> Result<bool, StatementError> {
        if self.peek_keyword().as_deref() != keywords.first().copied() {
            return Ok(false);
        }
        for keyword in keywords {
            self.expect(keyword)?;
        }
        Ok(true)
    }

    fn if_exists(&mut self) -> Result<bool, StatementError> {
        self.optional(&["IF", "EXISTS"])
    }

    fn if_not_exists(&mut self) -> Result<bool, StatementError> {
        self.optional(&["IF", "NOT", "EXISTS"])
    }

    fn identifier(&mut self) -> Result<String, StatementError> {
        let token = self.next("an identifier")?;
        Ok(token.trim_matches('`').to_string())
    }

    fn qualified(&mut self) -> Result<(String, String), StatementError> {
        let token = self.next("a qualified name")?;
        match token.split_once('.') {
            Some((schema, name)) => Ok((
                schema.trim_matches('`').to_string(),
                name.trim_matches('`').to_string(),
            )),
            None => Err(StatementError::Unqualified(token)),
        }
    }

    /// `* FROM s.t`, after `SELECT`.
    fn select_all(&mut self) -> Result<(String, String), StatementError> {
        self.expect("*")?;
        self.expect("FROM")?;
        self.qualified()
    }

    fn column_list(&mut self) -> Result<Vec<Column>, StatementError> {
        self.expect("(")?;
        let mut columns = Vec::new();
        loop {
            columns.push(self.column()?);
            match self.next("',' or ')'")?.as_str() {
                "," => continue,
                ")" => return Ok(columns),
                found => {
                    return Err(StatementError::Unexpected {
                        expected: "',' or ')'".into(),
                        found: found.to_string(),
                    });
                }
            }
        }
    }

    fn column(&mut self) -> Result<Column, StatementError> {
        let name = self.identifier()?;
        let type_name = self.keyword()?;
        let mut column_type = match type_name.as_str() {
            "INT" | "INTEGER" | "BIGINT" | "SMALLINT" | "TINYINT" => ColumnType::Int,
            "DOUBLE" | "FLOAT" | "REAL" | "DECIMAL" => ColumnType::Double,
            "TEXT" | "VARCHAR" | "CHAR" => ColumnType::Text,
            "BLOB" | "VARBINARY" | "BINARY" => ColumnType::Bytes,
            "JSON" => ColumnType::Json,
            _ => return Err(StatementError::UnknownType(type_name)),
        };

        // Length or precision arguments are accepted and ignored.
        if self.peek_keyword().as_deref() == Some("(") {
            while self.next("')'")? != ")" {}
        }
        if column_type == ColumnType::Int && self.optional(&["UNSIGNED"])? {
            column_type = ColumnType::UInt;
        }

        let column = Column::new(name, column_type);
        if self.optional(&["NOT", "NULL"])? {
            return Ok(column.not_null());
        }
        self.optional(&["NULL"])?;
        Ok(column)
    }

    fn finish(&self) -> Result<(), StatementError> {
        match self.tokens.get(self.position) {
            Some(extra) => Err(StatementError::Unexpected {
                expected: "end of statement".into(),
                found: extra.clone(),
            }),
            None => Ok(()),
        }
    }
}
