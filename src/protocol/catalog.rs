//! In-memory catalog served by the reference server.
//!
//! Every request is answered with the complete frame sequence of its reply, so the catalog
//! can sit behind a TCP listener or an in-process channel alike.
use std::collections::BTreeMap;

use log::debug;

use crate::{
    error::codes,
    protocol::{
        ObjectKind, Request, ServerMessage, Status,
        statement::{Statement, StatementError},
    },
    value::{Column, ColumnType, Value},
};

type Reply = Vec<ServerMessage>;

/// A failure that becomes an `Error` frame.
struct Failure {
    code: u32,
    sql_state: &'static str,
    message: String,
}

impl Failure {
    fn new(code: u32, sql_state: &'static str, message: String) -> Self {
        Self {
            code,
            sql_state,
            message,
        }
    }

    fn unknown_schema(schema: &str) -> Self {
        Self::new(codes::BAD_DB, "42000", format!("Unknown database '{schema}'"))
    }

    fn no_such_table(schema: &str, name: &str) -> Self {
        Self::new(
            codes::NO_SUCH_TABLE,
            "42S02",
            format!("Table '{schema}.{name}' doesn't exist"),
        )
    }

    fn unknown_table(schema: &str, name: &str) -> Self {
        Self::new(codes::BAD_TABLE, "42S02", format!("Unknown table '{schema}.{name}'"))
    }

    fn table_exists(name: &str) -> Self {
        Self::new(codes::TABLE_EXISTS, "42S01", format!("Table '{name}' already exists"))
    }
}

impl From<Failure> for ServerMessage {
    fn from(value: Failure) -> Self {
        ServerMessage::error(value.code, value.sql_state, value.message)
    }
}

impl From<StatementError> for Failure {
    fn from(value: StatementError) -> Self {
        Failure::new(
            codes::PARSE_ERROR,
            "42000",
            format!("You have an error in your SQL syntax; {value}"),
        )
    }
}

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone)]
enum Object {
    Table(Table),
    /// Reads through to a table of the same schema.
    View {
        base: String,
    },
    Collection(Vec<serde_json::Value>),
}

impl Object {
    fn kind(&self) -> ObjectKind {
        match self {
            Object::Table(_) => ObjectKind::Table,
            Object::View { .. } => ObjectKind::View,
            Object::Collection(_) => ObjectKind::Collection,
        }
    }
}

type Schema = BTreeMap<String, Object>;

/// Schemas, tables, views and collections, all in memory.
#[derive(Debug, Default)]
pub struct Catalog {
    schemas: BTreeMap<String, Schema>,
    next_document_id: u64,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers one request with every frame of its reply.
    pub fn handle(&mut self, request: Request) -> Reply {
        debug!("catalog handling {} request", request.kind());
        let reply = match request {
            Request::CreateSchema {
                name,
                if_not_exists,
            } => self.create_schema(name, if_not_exists),
            Request::DropSchema { name } => self.drop_schema(&name, false),
            Request::ListSchemas => Ok(self.list_schemas()),
            Request::CheckObject { kind, schema, name } => {
                self.check_object(kind, &schema, name.as_deref())
            }
            Request::ListObjects { schema } => self.list_objects(&schema),
            Request::CreateTable {
                schema,
                name,
                columns,
            } => self.create_table(&schema, name, columns),
            Request::DropTable { schema, name } => {
                self.drop_object(ObjectKind::Table, &schema, &name, false)
            }
            Request::CreateView { schema, name, base } => self.create_view(&schema, name, base),
            Request::DropView { schema, name } => {
                self.drop_object(ObjectKind::View, &schema, &name, false)
            }
            Request::CreateCollection {
                schema,
                name,
                if_not_exists,
            } => self.create_collection(&schema, name, if_not_exists),
            Request::DropCollection { schema, name } => {
                self.drop_object(ObjectKind::Collection, &schema, &name, false)
            }
            Request::InsertRows {
                schema,
                table,
                rows,
            } => self.insert_rows(&schema, &table, rows),
            Request::Select { schema, table } => self.select(&schema, &table),
            Request::AddDocuments {
                schema,
                collection,
                documents,
            } => self.add_documents(&schema, &collection, documents),
            Request::Find { schema, collection } => self.find(&schema, &collection),
            Request::Sql { text } => self.sql(&text),
            Request::Ping => Ok(ack(0)),
            Request::Close => Ok(vec![ServerMessage::Closed]),
        };
        reply.unwrap_or_else(|failure| vec![failure.into()])
    }

    fn sql(&mut self, text: &str) -> Result<Reply, Failure> {
        match Statement::try_from(text)? {
            Statement::ShowSchemas => Ok(self.list_schemas()),
            Statement::ShowTables { schema } => {
                let names = self
                    .schema(&schema)?
                    .keys()
                    .map(|name| vec![Value::Text(name.clone())])
                    .collect();
                let column = Column::new(format!("Tables_in_{schema}"), ColumnType::Text);
                Ok(rows(vec![column.not_null()], names))
            }
            Statement::ShowCreateTable { schema, name } => self.show_create(&schema, &name),
            Statement::Select { schema, table } => self.select(&schema, &table),
            Statement::CreateSchema {
                name,
                if_not_exists,
            } => self.create_schema(name, if_not_exists),
            Statement::DropSchema { name, if_exists } => self.drop_schema(&name, if_exists),
            Statement::CreateTable {
                schema,
                name,
                columns,
            } => self.create_table(&schema, name, columns),
            Statement::CreateView { schema, name, base } => self.create_view(&schema, name, base),
            Statement::DropTable {
                schema,
                name,
                if_exists,
            } => self.drop_object(ObjectKind::Table, &schema, &name, if_exists),
            Statement::DropView {
                schema,
                name,
                if_exists,
            } => self.drop_object(ObjectKind::View, &schema, &name, if_exists),
        }
    }

    fn schema(&self, name: &str) -> Result<&Schema, Failure> {
        self.schemas
            .get(name)
            .ok_or_else(|| Failure::unknown_schema(name))
    }

    fn schema_mut(&mut self, name: &str) -> Result<&mut Schema, Failure> {
        self.schemas
            .get_mut(name)
            .ok_or_else(|| Failure::unknown_schema(name))
    }

    /// The table behind `name`, following a view to its base.
    fn table(&self, schema: &str, name: &str) -> Result<&Table, Failure> {
        let objects = self.schema(schema)?;
        match objects.get(name) {
            Some(Object::Table(table)) => Ok(table),
            Some(Object::View { base }) => match objects.get(base) {
                Some(Object::Table(table)) => Ok(table),
                _ => Err(Failure::new(
                    codes::NO_SUCH_TABLE,
                    "HY000",
                    format!("View '{schema}.{name}' references invalid table '{base}'"),
                )),
            },
            _ => Err(Failure::no_such_table(schema, name)),
        }
    }

    fn create_schema(&mut self, name: String, if_not_exists: bool) -> Result<Reply, Failure> {
        if self.schemas.contains_key(&name) {
            let message = format!("Can't create database '{name}'; database exists");
            if if_not_exists {
                return Ok(warned(codes::DB_CREATE_EXISTS, message, 0));
            }
            return Err(Failure::new(codes::DB_CREATE_EXISTS, "HY000", message));
        }
        self.schemas.insert(name, Schema::new());
        Ok(ack(1))
    }

    fn drop_schema(&mut self, name: &str, if_exists: bool) -> Result<Reply, Failure> {
        match self.schemas.remove(name) {
            Some(objects) => Ok(ack(objects.len() as u64)),
            None => {
                let message = format!("Can't drop database '{name}'; database doesn't exist");
                if if_exists {
                    return Ok(warned(codes::DB_DROP_EXISTS, message, 0));
                }
                Err(Failure::new(codes::DB_DROP_EXISTS, "HY000", message))
            }
        }
    }

    fn list_schemas(&self) -> Reply {
        let names = self
            .schemas
            .keys()
            .map(|name| vec![Value::Text(name.clone())])
            .collect();
        rows(vec![Column::new("name", ColumnType::Text).not_null()], names)
    }

    fn check_object(
        &self,
        kind: ObjectKind,
        schema: &str,
        name: Option<&str>,
    ) -> Result<Reply, Failure> {
        let objects = self.schema(schema)?;
        match (kind, name) {
            (ObjectKind::Schema, _) => Ok(ack(0)),
            (kind, Some(name)) => match objects.get(name) {
                Some(object) if object.kind() == kind => Ok(ack(0)),
                _ => Err(Failure::no_such_table(schema, name)),
            },
            (kind, None) => Err(Failure::new(
                codes::PARSE_ERROR,
                "42000",
                format!("{} check requires a name", kind.as_str()),
            )),
        }
    }

    fn list_objects(&self, schema: &str) -> Result<Reply, Failure> {
        let objects = self
            .schema(schema)?
            .iter()
            .map(|(name, object)| {
                vec![
                    Value::Text(name.clone()),
                    Value::Text(object.kind().as_str().to_string()),
                ]
            })
            .collect();
        let columns = vec![
            Column::new("name", ColumnType::Text).not_null(),
            Column::new("type", ColumnType::Text).not_null(),
        ];
        Ok(rows(columns, objects))
    }

    fn create_table(
        &mut self,
        schema: &str,
        name: String,
        columns: Vec<Column>,
    ) -> Result<Reply, Failure> {
        let objects = self.schema_mut(schema)?;
        if objects.contains_key(&name) {
            return Err(Failure::table_exists(&name));
        }
        if columns.is_empty() {
            return Err(Failure::new(
                codes::PARSE_ERROR,
                "42000",
                "A table must have at least 1 column".into(),
            ));
        }
        objects.insert(
            name,
            Object::Table(Table {
                columns,
                rows: Vec::new(),
            }),
        );
        Ok(ack(0))
    }

    fn create_view(&mut self, schema: &str, name: String, base: String) -> Result<Reply, Failure> {
        let objects = self.schema_mut(schema)?;
        if objects.contains_key(&name) {
            return Err(Failure::table_exists(&name));
        }
        if !matches!(objects.get(&base), Some(Object::Table(_))) {
            return Err(Failure::no_such_table(schema, &base));
        }
        objects.insert(name, Object::View { base });
        Ok(ack(0))
    }

    fn create_collection(
        &mut self,
        schema: &str,
        name: String,
        if_not_exists: bool,
    ) -> Result<Reply, Failure> {
        let objects = self.schema_mut(schema)?;
        match objects.get(&name) {
            Some(Object::Collection(_)) if if_not_exists => Ok(warned(
                codes::TABLE_EXISTS,
                format!("Table '{name}' already exists"),
                0,
            )),
            Some(_) => Err(Failure::table_exists(&name)),
            None => {
                objects.insert(name, Object::Collection(Vec::new()));
                Ok(ack(0))
            }
        }
    }

    fn drop_object(
        &mut self,
        kind: ObjectKind,
        schema: &str,
        name: &str,
        if_exists: bool,
    ) -> Result<Reply, Failure> {
        let objects = match self.schema_mut(schema) {
            Ok(objects) => objects,
            Err(_) if if_exists => {
                return Ok(warned(
                    codes::BAD_DB,
                    format!("Unknown database '{schema}'"),
                    0,
                ));
            }
            Err(failure) => return Err(failure),
        };

        if objects.get(name).is_some_and(|object| object.kind() == kind) {
            objects.remove(name);
            return Ok(ack(0));
        }
        let failure = Failure::unknown_table(schema, name);
        if if_exists {
            return Ok(warned(failure.code, failure.message, 0));
        }
        Err(failure)
    }

    fn insert_rows(
        &mut self,
        schema: &str,
        name: &str,
        new_rows: Vec<Vec<Value>>,
    ) -> Result<Reply, Failure> {
        let objects = self.schema_mut(schema)?;
        let target = match objects.get(name) {
            Some(Object::View { base }) => base.clone(),
            _ => name.to_string(),
        };
        let Some(Object::Table(table)) = objects.get_mut(&target) else {
            return Err(Failure::no_such_table(schema, name));
        };

        for (index, row) in new_rows.iter().enumerate() {
            if row.len() != table.columns.len() {
                return Err(Failure::new(
                    codes::WRONG_VALUE_COUNT,
                    "21S01",
                    format!("Column count doesn't match value count at row {}", index + 1),
                ));
            }
            for (column, value) in table.columns.iter().zip(row) {
                if !column.nullable && value.is_null() {
                    return Err(Failure::new(
                        codes::BAD_NULL,
                        "23000",
                        format!("Column '{}' cannot be null", column.name),
                    ));
                }
            }
        }

        let count = new_rows.len() as u64;
        table.rows.extend(new_rows);
        Ok(ack(count))
    }

    fn select(&self, schema: &str, name: &str) -> Result<Reply, Failure> {
        if let Some(Object::Collection(documents)) = self.schema(schema)?.get(name) {
            let columns = vec![
                Column::new("doc", ColumnType::Json),
                Column::new("_id", ColumnType::Text).not_null(),
            ];
            let records = documents
                .iter()
                .map(|doc| {
                    let id = doc.get("_id").and_then(|v| v.as_str()).unwrap_or_default();
                    vec![Value::Json(doc.to_string()), Value::Text(id.to_string())]
                })
                .collect();
            return Ok(rows(columns, records));
        }

        let table = self.table(schema, name)?;
        Ok(rows(table.columns.clone(), table.rows.clone()))
    }

    fn show_create(&self, schema: &str, name: &str) -> Result<Reply, Failure> {
        let objects = self.schema(schema)?;
        let definition = match objects.get(name) {
            Some(Object::View { base }) => {
                format!("CREATE VIEW `{name}` AS SELECT * FROM `{schema}`.`{base}`")
            }
            Some(Object::Table(table)) => {
                let columns = table
                    .columns
                    .iter()
                    .map(|c| {
                        let null = if c.nullable { "" } else { " NOT NULL" };
                        format!("  `{}` {}{null}", c.name, c.column_type.sql_name())
                    })
                    .collect::<Vec<_>>()
                    .join(",\n");
                format!("CREATE TABLE `{name}` (\n{columns}\n)")
            }
            _ => return Err(Failure::no_such_table(schema, name)),
        };

        let columns = vec![
            Column::new("Table", ColumnType::Text).not_null(),
            Column::new("Create Table", ColumnType::Text).not_null(),
        ];
        Ok(rows(
            columns,
            vec![vec![Value::Text(name.to_string()), Value::Text(definition)]],
        ))
    }

    fn add_documents(
        &mut self,
        schema: &str,
        name: &str,
        documents: Vec<String>,
    ) -> Result<Reply, Failure> {
        let mut parsed = Vec::with_capacity(documents.len());
        for text in &documents {
            match serde_json::from_str::<serde_json::Value>(text) {
                Ok(serde_json::Value::Object(fields)) => parsed.push(fields),
                _ => {
                    return Err(Failure::new(
                        codes::INVALID_JSON,
                        "22032",
                        "Invalid JSON text: document must be a JSON object".into(),
                    ));
                }
            }
        }

        let mut next_id = self.next_document_id;
        let Some(Object::Collection(stored)) = self.schema_mut(schema)?.get_mut(name) else {
            return Err(Failure::no_such_table(schema, name));
        };
        let count = parsed.len() as u64;
        for mut fields in parsed {
            if !fields.contains_key("_id") {
                next_id += 1;
                fields.insert("_id".into(), format!("{next_id:016x}").into());
            }
            stored.push(serde_json::Value::Object(fields));
        }
        self.next_document_id = next_id;
        Ok(ack(count))
    }

    fn find(&self, schema: &str, name: &str) -> Result<Reply, Failure> {
        let Some(Object::Collection(documents)) = self.schema(schema)?.get(name) else {
            return Err(Failure::no_such_table(schema, name));
        };
        let mut reply = vec![ServerMessage::DocumentStart];
        reply.extend(documents.iter().map(|d| ServerMessage::Document(d.to_string())));
        reply.push(ServerMessage::FetchDone);
        reply.push(ServerMessage::StatementOk(Status::default()));
        Ok(reply)
    }
}

fn ack(affected: u64) -> Reply {
    vec![ServerMessage::Ok(Status::affected(affected))]
}

fn warned(code: u32, message: String, affected: u64) -> Reply {
    vec![
        ServerMessage::notice(code, message),
        ServerMessage::Ok(Status::affected(affected)),
    ]
}

fn rows(columns: Vec<Column>, records: Vec<Vec<Value>>) -> Reply {
    let mut reply = vec![ServerMessage::ColumnMeta(columns)];
    reply.extend(records.into_iter().map(ServerMessage::Row));
    reply.push(ServerMessage::FetchDone);
    reply.push(ServerMessage::StatementOk(Status::default()));
    reply
}
