use bincode::{Decode, Encode};

use crate::value::{Column, Value};

/// Kind of catalog object a request refers to.
#[derive(Debug, Clone, Copy, Encode, Decode, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Schema,
    Table,
    View,
    Collection,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Schema => "SCHEMA",
            ObjectKind::Table => "TABLE",
            ObjectKind::View => "VIEW",
            ObjectKind::Collection => "COLLECTION",
        }
    }
}

/// A request written onto the wire. Every request produces exactly one reply.
#[derive(Debug, Clone, Encode, Decode, PartialEq)]
pub enum Request {
    CreateSchema {
        name: String,
        if_not_exists: bool,
    },
    DropSchema {
        name: String,
    },
    ListSchemas,
    /// Acknowledged when the object exists, answered with an error otherwise.
    CheckObject {
        kind: ObjectKind,
        schema: String,
        name: Option<String>,
    },
    /// Row stream of `(name, type)` for every object in a schema.
    ListObjects {
        schema: String,
    },
    CreateTable {
        schema: String,
        name: String,
        columns: Vec<Column>,
    },
    DropTable {
        schema: String,
        name: String,
    },
    CreateView {
        schema: String,
        name: String,
        base: String,
    },
    DropView {
        schema: String,
        name: String,
    },
    CreateCollection {
        schema: String,
        name: String,
        if_not_exists: bool,
    },
    DropCollection {
        schema: String,
        name: String,
    },
    InsertRows {
        schema: String,
        table: String,
        rows: Vec<Vec<Value>>,
    },
    Select {
        schema: String,
        table: String,
    },
    AddDocuments {
        schema: String,
        collection: String,
        documents: Vec<String>,
    },
    Find {
        schema: String,
        collection: String,
    },
    Sql {
        text: String,
    },
    Ping,
    Close,
}

impl Request {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Request::CreateSchema { .. } => "create-schema",
            Request::DropSchema { .. } => "drop-schema",
            Request::ListSchemas => "list-schemas",
            Request::CheckObject { .. } => "check-object",
            Request::ListObjects { .. } => "list-objects",
            Request::CreateTable { .. } => "create-table",
            Request::DropTable { .. } => "drop-table",
            Request::CreateView { .. } => "create-view",
            Request::DropView { .. } => "drop-view",
            Request::CreateCollection { .. } => "create-collection",
            Request::DropCollection { .. } => "drop-collection",
            Request::InsertRows { .. } => "insert-rows",
            Request::Select { .. } => "select",
            Request::AddDocuments { .. } => "add-documents",
            Request::Find { .. } => "find",
            Request::Sql { .. } => "sql",
            Request::Ping => "ping",
            Request::Close => "close",
        }
    }
}
