//! End-to-end tests: sessions against the reference catalog, in-process and over TCP.
use std::{thread, time::Duration};

use crate::{
    error::codes,
    protocol::{CatalogServer, LoopbackChannel, Request, ServerMessage},
    session::{Session, SessionOptions},
    value::{Column, ColumnType, Row, Value},
};

fn loopback() -> Session {
    Session::open(LoopbackChannel::standalone(), SessionOptions::default())
}

fn items_table(session: &Session, schema: &str, ids: &[i64]) {
    let schema = session.create_schema(schema, true).unwrap();
    let table = schema
        .create_table(
            "items",
            vec![
                Column::new("id", ColumnType::Int).not_null(),
                Column::new("label", ColumnType::Text),
            ],
        )
        .unwrap();
    let rows = ids
        .iter()
        .map(|id| vec![Value::Int(*id), Value::Text(format!("item-{id}"))])
        .collect();
    table.insert(rows).unwrap();
}

fn ids(rows: &[Row]) -> Vec<i64> {
    rows.iter()
        .map(|row| row.get(0).and_then(Value::as_i64).unwrap())
        .collect()
}

fn select_items(schema: &str) -> Request {
    Request::Select {
        schema: schema.into(),
        table: "items".into(),
    }
}

#[test]
fn create_list_and_drop_schema() {
    let session = loopback();
    let schema = session.create_schema("scenario_a", false).unwrap();
    schema
        .create_table(
            "t",
            vec![
                Column::new("a", ColumnType::Int),
                Column::new("b", ColumnType::Text),
            ],
        )
        .unwrap();

    let tables: Vec<String> = schema
        .tables()
        .unwrap()
        .iter()
        .map(|t| t.name().to_string())
        .collect();
    assert_eq!(tables, vec!["t".to_string()]);

    session.drop_schema("scenario_a").unwrap();
    let err = session.get_schema("scenario_a", true).err().unwrap();
    assert!(err.is_server_error(codes::BAD_DB));
}

#[test]
fn unread_collection_rows_survive_interleaved_query() {
    let session = loopback();
    let schema = session.create_schema("scenario_b", false).unwrap();
    let collection = schema.create_collection("c", false).unwrap();
    collection.add([r#"{"_id": "1", "name": "New Guy!"}"#]).unwrap();

    let mut first = collection.select().unwrap();
    let mut unrelated = session.sql("SHOW SCHEMAS").unwrap();
    let schema_row = unrelated.fetch_one().unwrap().unwrap();
    assert_eq!(schema_row.get(0).and_then(Value::as_str), Some("scenario_b"));
    assert_eq!(session.pending_replies().unwrap(), 1);

    let cached = first.fetch_all().unwrap();
    let fresh = collection.select().unwrap().fetch_all().unwrap();
    assert_eq!(cached.len(), 1);
    assert_eq!(cached, fresh);
    assert_eq!(cached[0].get_by_name("_id").and_then(Value::as_str), Some("1"));
}

#[test]
fn replies_follow_submission_order() {
    let session = loopback();
    items_table(&session, "p1", &[1]);

    let before = session.submit(select_items("p1")).unwrap();
    let insert = session
        .submit(Request::InsertRows {
            schema: "p1".into(),
            table: "items".into(),
            rows: vec![vec![Value::Int(2), Value::Null]],
        })
        .unwrap();
    let after = session.submit(select_items("p1")).unwrap();
    assert_eq!(session.pending_replies().unwrap(), 3);

    let mut after = after.into_rows().unwrap();
    let mut before = before.into_rows().unwrap();
    let insert = insert.into_ack().unwrap();

    assert_eq!(ids(&after.fetch_all().unwrap()), vec![1, 2]);
    assert_eq!(ids(&before.fetch_all().unwrap()), vec![1]);
    assert_eq!(insert.affected_items_count(), 1);
    assert_eq!(session.pending_replies().unwrap(), 0);
}

#[test]
fn forced_close_caches_remaining_rows() {
    let session = loopback();
    items_table(&session, "p2", &[1, 2, 3]);

    let mut result = session.query(select_items("p2")).unwrap();
    let r1 = result.fetch_one().unwrap().unwrap();
    session.sql("CREATE TABLE p2.other (x INT)").unwrap();

    let r2 = result.fetch_one().unwrap().unwrap();
    let r3 = result.fetch_one().unwrap().unwrap();
    assert_eq!(ids(&[r1, r2, r3]), vec![1, 2, 3]);
    assert!(result.fetch_one().unwrap().is_none());
    assert!(result.fetch_one().unwrap().is_none());
}

#[test]
fn show_create_result_survives_drop_collection() {
    let session = loopback();
    session.drop_schema("bugs").unwrap();
    let schema = session.create_schema("bugs", false).unwrap();
    session
        .sql("CREATE TABLE bugs.bugs_table (c0 JSON, c1 INT)")
        .unwrap();
    assert!(schema.get_table("bugs_table", true).is_ok());
    schema.create_collection("coll", false).unwrap();

    let mut result = session.sql("SHOW CREATE TABLE bugs.bugs_table").unwrap();
    let row = result.fetch_one().unwrap().unwrap();
    assert_eq!(row.get(0).and_then(Value::as_str), Some("bugs_table"));

    schema.drop_collection("coll").unwrap();
    assert!(result.fetch_one().unwrap().is_none());
    assert_eq!(schema.collection_names().unwrap(), Vec::<String>::new());
}

#[test]
fn repeated_close_is_harmless() {
    let session = loopback();
    items_table(&session, "p3", &[1, 2, 3]);

    let mut result = session.query(select_items("p3")).unwrap();
    result.fetch_one().unwrap();
    result.close().unwrap();
    result.close().unwrap();

    let mut docs = session
        .get_schema("p3", false)
        .unwrap()
        .create_collection("c", false)
        .unwrap()
        .find()
        .unwrap();
    docs.close().unwrap();
    docs.close().unwrap();

    assert_eq!(session.pending_replies().unwrap(), 0);
    let rows = session.query(select_items("p3")).unwrap().fetch_all().unwrap();
    assert_eq!(ids(&rows), vec![1, 2, 3]);
}

#[test]
fn dropping_missing_objects_succeeds() {
    let session = loopback();
    let schema = session.create_schema("p4", false).unwrap();

    session.drop_schema("p4_missing").unwrap();
    schema.drop_collection("missing").unwrap();
    schema.drop_table("missing").unwrap();
    schema.drop_view("missing").unwrap();

    assert!(
        session
            .get_schema("p4_missing", true)
            .err()
            .unwrap()
            .is_server_error(codes::BAD_DB)
    );
    assert!(
        schema
            .get_collection("missing", true)
            .err()
            .unwrap()
            .is_server_error(codes::NO_SUCH_TABLE)
    );
    assert!(
        schema
            .get_table("missing", true)
            .err()
            .unwrap()
            .is_server_error(codes::NO_SUCH_TABLE)
    );
}

#[test]
fn metadata_is_stable() {
    let session = loopback();
    items_table(&session, "p5", &[1, 2, 3]);

    let mut result = session.query(select_items("p5")).unwrap();
    let columns = result.columns().to_vec();
    assert_eq!(columns[0], Column::new("id", ColumnType::Int).not_null());

    result.fetch_one().unwrap();
    assert_eq!(result.columns(), columns.as_slice());
    session.ping().unwrap();
    assert_eq!(result.columns(), columns.as_slice());
    result.fetch_one().unwrap();
    assert_eq!(result.columns(), columns.as_slice());
    result.close().unwrap();
    assert_eq!(result.columns(), columns.as_slice());
}

#[test]
fn results_outlive_closed_session() {
    let session = loopback();
    items_table(&session, "late", &[4, 5]);

    let mut rows = session.query(select_items("late")).unwrap();
    let pending = session.submit(select_items("late")).unwrap();
    session.close().unwrap();

    assert_eq!(ids(&rows.fetch_all().unwrap()), vec![4, 5]);
    assert_eq!(ids(&pending.into_rows().unwrap().fetch_all().unwrap()), vec![4, 5]);
    assert!(session.ping().is_err());
}

#[test]
fn sessions_share_a_catalog() {
    let channel = LoopbackChannel::standalone();
    let first = Session::open(channel.clone(), SessionOptions::default());
    let second = Session::open(channel, SessionOptions::default());

    first.create_schema("shared", false).unwrap();
    assert!(second.get_schema("shared", true).is_ok());
}

#[test]
fn session_over_tcp() {
    let server = CatalogServer::bind("127.0.0.1:0", 2).unwrap();
    let address = server.local_addr().unwrap();
    let catalog = server.catalog();
    thread::spawn(move || server.listen());

    let options = SessionOptions::default()
        .with_read_timeout(Duration::from_secs(5))
        .with_write_timeout(Duration::from_secs(5));
    let session = Session::connect(address, options).unwrap();
    items_table(&session, "tcp", &[1, 2, 3]);

    let mut first = session.query(select_items("tcp")).unwrap();
    assert_eq!(ids(&[first.fetch_one().unwrap().unwrap()]), vec![1]);
    let second = session.submit(select_items("tcp")).unwrap();
    session.drop_schema("tcp").unwrap();

    assert_eq!(ids(&first.fetch_all().unwrap()), vec![2, 3]);
    assert_eq!(ids(&second.into_rows().unwrap().fetch_all().unwrap()), vec![1, 2, 3]);
    assert!(
        session
            .get_schema("tcp", true)
            .err()
            .unwrap()
            .is_server_error(codes::BAD_DB)
    );
    session.close().unwrap();

    let listed = catalog.lock().unwrap().handle(Request::ListSchemas);
    assert!(!listed.iter().any(|m| matches!(m, ServerMessage::Row(_))));
}
