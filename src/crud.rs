//! Schema, table and collection handles.
//!
//! Each operation builds one request and hands it to the session. Handles are cheap and hold
//! no server state; a handle to a missing object is only detected when it is used, or when
//! it is fetched with `check_existence`.
use log::debug;

use crate::{
    error::{Error, Result, codes},
    protocol::{ObjectKind, Request},
    session::{DocResult, ExecResult, RowResult, Session},
    value::{Column, Row, Value},
};

impl Session {
    /// Creates a schema. With `reuse_existing`, an existing schema is returned instead of
    /// failing with error 1007.
    pub fn create_schema(&self, name: &str, reuse_existing: bool) -> Result<Schema<'_>> {
        self.execute(Request::CreateSchema {
            name: name.to_string(),
            if_not_exists: reuse_existing,
        })?;
        Ok(Schema::new(self, name))
    }

    pub fn get_schema(&self, name: &str, check_existence: bool) -> Result<Schema<'_>> {
        let schema = Schema::new(self, name);
        if check_existence {
            self.check(ObjectKind::Schema, name, None)?;
        }
        Ok(schema)
    }

    pub fn schemas(&self) -> Result<Vec<Schema<'_>>> {
        let mut schemas = Vec::new();
        for row in self.query(Request::ListSchemas)? {
            schemas.push(Schema::new(self, text(&row?, 0)?));
        }
        Ok(schemas)
    }

    /// Drops a schema. A missing schema is handled by the session's [`DropPolicy`].
    ///
    /// [`DropPolicy`]: crate::session::DropPolicy
    pub fn drop_schema(&self, name: &str) -> Result<()> {
        self.drop_object(
            ObjectKind::Schema,
            Request::DropSchema {
                name: name.to_string(),
            },
        )
    }

    fn check(&self, kind: ObjectKind, schema: &str, name: Option<&str>) -> Result<()> {
        self.execute(Request::CheckObject {
            kind,
            schema: schema.to_string(),
            name: name.map(str::to_string),
        })
        .map(|_| ())
    }

    fn drop_object(&self, kind: ObjectKind, request: Request) -> Result<()> {
        match self.execute(request) {
            Ok(_) => Ok(()),
            Err(e) if self.options().drop_policy.suppresses(kind, &e) => {
                debug!("drop of missing {} ignored: {e}", kind.as_str());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

fn text(row: &Row, index: usize) -> Result<String> {
    row.get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::Protocol(format!("expected text in column {index}")))
}

/// Handle to a schema.
#[derive(Debug, Clone)]
pub struct Schema<'a> {
    session: &'a Session,
    name: String,
}

impl<'a> Schema<'a> {
    fn new(session: &'a Session, name: impl Into<String>) -> Self {
        Self {
            session,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn session(&self) -> &'a Session {
        self.session
    }

    pub fn exists_in_database(&self) -> Result<bool> {
        exists(self.session.check(ObjectKind::Schema, &self.name, None))
    }

    pub fn create_table(&self, name: &str, columns: Vec<Column>) -> Result<Table<'a>> {
        self.session.execute(Request::CreateTable {
            schema: self.name.clone(),
            name: name.to_string(),
            columns,
        })?;
        Ok(self.table(name))
    }

    /// Handle to a table or view. With `check_existence`, a missing one fails with
    /// error 1146.
    pub fn get_table(&self, name: &str, check_existence: bool) -> Result<Table<'a>> {
        let table = self.table(name);
        if check_existence {
            let found = self.session.check(ObjectKind::Table, &self.name, Some(name));
            if let Err(e) = found {
                if !e.is_server_error(codes::NO_SUCH_TABLE) {
                    return Err(e);
                }
                self.session
                    .check(ObjectKind::View, &self.name, Some(name))?;
            }
        }
        Ok(table)
    }

    /// Tables and views, in name order.
    pub fn tables(&self) -> Result<Vec<Table<'a>>> {
        Ok(self
            .objects()?
            .into_iter()
            .filter(|(_, kind)| kind == "TABLE" || kind == "VIEW")
            .map(|(name, _)| self.table(&name))
            .collect())
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        self.session.drop_object(
            ObjectKind::Table,
            Request::DropTable {
                schema: self.name.clone(),
                name: name.to_string(),
            },
        )
    }

    /// Creates a view reading every row of `base`, a table of this schema.
    pub fn create_view(&self, name: &str, base: &str) -> Result<Table<'a>> {
        self.session.execute(Request::CreateView {
            schema: self.name.clone(),
            name: name.to_string(),
            base: base.to_string(),
        })?;
        Ok(self.table(name))
    }

    pub fn drop_view(&self, name: &str) -> Result<()> {
        self.session.drop_object(
            ObjectKind::View,
            Request::DropView {
                schema: self.name.clone(),
                name: name.to_string(),
            },
        )
    }

    pub fn create_collection(&self, name: &str, reuse_existing: bool) -> Result<Collection<'a>> {
        self.session.execute(Request::CreateCollection {
            schema: self.name.clone(),
            name: name.to_string(),
            if_not_exists: reuse_existing,
        })?;
        Ok(self.collection(name))
    }

    pub fn get_collection(&self, name: &str, check_existence: bool) -> Result<Collection<'a>> {
        if check_existence {
            self.session
                .check(ObjectKind::Collection, &self.name, Some(name))?;
        }
        Ok(self.collection(name))
    }

    pub fn collections(&self) -> Result<Vec<Collection<'a>>> {
        Ok(self
            .collection_names()?
            .iter()
            .map(|name| self.collection(name))
            .collect())
    }

    pub fn collection_names(&self) -> Result<Vec<String>> {
        Ok(self
            .objects()?
            .into_iter()
            .filter(|(_, kind)| kind == "COLLECTION")
            .map(|(name, _)| name)
            .collect())
    }

    pub fn drop_collection(&self, name: &str) -> Result<()> {
        self.session.drop_object(
            ObjectKind::Collection,
            Request::DropCollection {
                schema: self.name.clone(),
                name: name.to_string(),
            },
        )
    }

    /// `(name, kind)` of every object in the schema.
    fn objects(&self) -> Result<Vec<(String, String)>> {
        let listed = self.session.query(Request::ListObjects {
            schema: self.name.clone(),
        })?;
        let mut objects = Vec::new();
        for row in listed {
            let row = row?;
            objects.push((text(&row, 0)?, text(&row, 1)?));
        }
        Ok(objects)
    }

    fn table(&self, name: &str) -> Table<'a> {
        Table {
            session: self.session,
            schema: self.name.clone(),
            name: name.to_string(),
        }
    }

    fn collection(&self, name: &str) -> Collection<'a> {
        Collection {
            session: self.session,
            schema: self.name.clone(),
            name: name.to_string(),
        }
    }
}

/// Maps a failed existence check to `false`.
fn exists(checked: Result<()>) -> Result<bool> {
    match checked {
        Ok(()) => Ok(true),
        Err(e) if e.is_server_error(codes::BAD_DB) || e.is_server_error(codes::NO_SUCH_TABLE) => {
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Handle to a table or a view.
#[derive(Debug, Clone)]
pub struct Table<'a> {
    session: &'a Session,
    schema: String,
    name: String,
}

impl Table<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema_name(&self) -> &str {
        &self.schema
    }

    pub fn exists_in_database(&self) -> Result<bool> {
        match exists(self.session.check(ObjectKind::Table, &self.schema, Some(&self.name)))? {
            true => Ok(true),
            false => self.is_view(),
        }
    }

    pub fn is_view(&self) -> Result<bool> {
        exists(self.session.check(ObjectKind::View, &self.schema, Some(&self.name)))
    }

    pub fn insert(&self, rows: Vec<Vec<Value>>) -> Result<ExecResult> {
        self.session.execute(Request::InsertRows {
            schema: self.schema.clone(),
            table: self.name.clone(),
            rows,
        })
    }

    pub fn select(&self) -> Result<RowResult> {
        self.session.query(Request::Select {
            schema: self.schema.clone(),
            table: self.name.clone(),
        })
    }
}

/// Handle to a document collection.
#[derive(Debug, Clone)]
pub struct Collection<'a> {
    session: &'a Session,
    schema: String,
    name: String,
}

impl Collection<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema_name(&self) -> &str {
        &self.schema
    }

    pub fn exists_in_database(&self) -> Result<bool> {
        exists(
            self.session
                .check(ObjectKind::Collection, &self.schema, Some(&self.name)),
        )
    }

    /// Adds JSON documents. Documents without an `_id` get one assigned by the server.
    pub fn add<I>(&self, documents: I) -> Result<ExecResult>
    where
        I: IntoIterator,
        I::Item: ToString,
    {
        self.session.execute(Request::AddDocuments {
            schema: self.schema.clone(),
            collection: self.name.clone(),
            documents: documents.into_iter().map(|d| d.to_string()).collect(),
        })
    }

    pub fn find(&self) -> Result<DocResult> {
        self.session.query_documents(Request::Find {
            schema: self.schema.clone(),
            collection: self.name.clone(),
        })
    }

    /// Rows of `(doc, _id)`, as a table query would see the collection.
    pub fn select(&self) -> Result<RowResult> {
        self.session.query(Request::Select {
            schema: self.schema.clone(),
            table: self.name.clone(),
        })
    }
}
