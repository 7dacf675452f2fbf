use rusqlite::types::Value;
use rusqlite::Row;
use std::path::Path;
use txscope_core::{
    DataError, DataResult, Database, DbSettings, Entity, EntityRepository, Existence, Filter,
    Order, Session, UsageError,
};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
struct Item {
    id: Option<i64>,
    name: String,
    tag: Option<String>,
    uuid: Uuid,
}

impl Item {
    fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            tag: None,
            uuid: Uuid::new_v4(),
        }
    }

    fn tagged(name: &str, tag: &str) -> Self {
        Self {
            tag: Some(tag.to_string()),
            ..Self::new(name)
        }
    }
}

impl Entity for Item {
    const TABLE: &'static str = "items";

    fn key(&self) -> Option<i64> {
        self.id
    }

    fn assign_key(&mut self, key: i64) {
        self.id = Some(key);
    }

    fn values(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("name", Value::Text(self.name.clone())),
            ("tag", self.tag.clone().into()),
            ("uuid", Value::Text(self.uuid.to_string())),
        ]
    }

    fn from_row(row: &Row<'_>) -> DataResult<Self> {
        let raw_uuid: String = row.get("uuid")?;
        let uuid = Uuid::parse_str(&raw_uuid).map_err(|err| DataError::InvalidData {
            item_type: Self::item_type().to_string(),
            message: format!("uuid `{raw_uuid}`: {err}"),
        })?;
        Ok(Self {
            id: Some(row.get("id")?),
            name: row.get("name")?,
            tag: row.get("tag")?,
            uuid,
        })
    }
}

fn open_session(dir: &Path) -> Session {
    let mut session = Session::new(Database::file(dir.join("items.db"), DbSettings::default()));
    session.enter().unwrap();
    session
        .transaction(|t| {
            t.execute_batch(
                "CREATE TABLE IF NOT EXISTS items (
                    id INTEGER PRIMARY KEY,
                    name TEXT NOT NULL,
                    tag TEXT,
                    uuid TEXT NOT NULL
                );",
            )
        })
        .unwrap();
    session
}

#[test]
fn add_assigns_key_and_row_is_visible_before_commit() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let mut tx = session.begin_transaction().unwrap();

    let mut item = Item::new("first");
    tx.add(&mut item).unwrap();
    let id = item.id.expect("add should assign a key");

    let loaded = tx.repo::<Item>().fetch_by_id(id).unwrap();
    assert_eq!(loaded, item);
    tx.commit().unwrap();
}

#[test]
fn add_keeps_an_explicit_key() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let tx = session.begin_transaction().unwrap();

    let mut item = Item {
        id: Some(40),
        ..Item::new("explicit")
    };
    tx.add(&mut item).unwrap();

    assert_eq!(item.id, Some(40));
    assert_eq!(tx.repo::<Item>().fetch_by_id(40).unwrap().name, "explicit");
}

#[test]
fn fetch_by_unknown_id_reports_field_and_value() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let tx = session.begin_transaction().unwrap();

    let err = tx.repo::<Item>().fetch_by_id(999).unwrap_err();
    assert!(err.is_unknown_item());
    assert_eq!(err.to_string(), "unknown 'items' item, no id with value '999'");

    let item_err = err.as_item().unwrap();
    assert_eq!(item_err.item_type(), "items");
    assert_eq!(item_err.field(), Some("id"));
    assert_eq!(item_err.value(), Some("999"));
}

#[test]
fn fetch_one_rejects_duplicates_and_fetch_first_does_not() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let tx = session.begin_transaction().unwrap();
    let mut items = vec![Item::new("dup"), Item::new("dup"), Item::new("single")];
    tx.add_all(&mut items).unwrap();
    let repo = tx.repo::<Item>();

    let err = repo
        .fetch_one(&Filter::all().eq("name", "dup".to_string()))
        .unwrap_err();
    assert!(err.is_duplicate_item());
    assert_eq!(
        err.to_string(),
        "duplicate 'items' item with value 'dup' for name"
    );

    let first = repo
        .fetch_first(
            &Filter::all().eq("name", "dup".to_string()),
            Some(&Order::desc("id")),
        )
        .unwrap();
    assert_eq!(first.id, items[1].id);

    let single = repo
        .fetch_one(&Filter::all().eq("name", "single".to_string()))
        .unwrap();
    assert_eq!(single.uuid, items[2].uuid);
}

#[test]
fn fetch_by_tag_and_uuid() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let tx = session.begin_transaction().unwrap();
    let mut tagged = Item::tagged("tagged", "alpha");
    let mut plain = Item::new("plain");
    tx.add(&mut tagged).unwrap();
    tx.add(&mut plain).unwrap();
    let repo = tx.repo::<Item>();

    assert_eq!(repo.fetch_by_tag("alpha").unwrap(), tagged);
    assert_eq!(repo.fetch_by_uuid(plain.uuid).unwrap(), plain);

    let err = repo.fetch_by_tag("beta").unwrap_err();
    assert_eq!(err.to_string(), "unknown 'items' item, no tag with value 'beta'");
    assert!(repo.fetch_by_uuid(Uuid::new_v4()).unwrap_err().is_unknown_item());
}

#[test]
fn fetch_all_and_count_honor_filter_and_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let tx = session.begin_transaction().unwrap();
    let mut items = vec![
        Item::tagged("b", "x"),
        Item::tagged("a", "x"),
        Item::new("c"),
    ];
    tx.add_all(&mut items).unwrap();
    let repo = tx.repo::<Item>();

    let tagged = repo
        .fetch_all(&Filter::all().is_not_null("tag"), Some(&Order::asc("name")))
        .unwrap();
    let names: Vec<&str> = tagged.iter().map(|item| item.name.as_str()).collect();
    assert_eq!(names, ["a", "b"]);

    assert_eq!(repo.count(&Filter::all()).unwrap(), 3);
    assert_eq!(repo.count(&Filter::all().is_null("tag")).unwrap(), 1);
    assert_eq!(
        repo.count(&Filter::all().in_list("name", ["a".to_string(), "c".to_string()]))
            .unwrap(),
        2
    );
    assert!(repo
        .fetch_all(&Filter::all().eq("name", "zzz".to_string()), None)
        .unwrap()
        .is_empty());
}

#[test]
fn changed_writes_values_and_refresh_reloads_them() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let tx = session.begin_transaction().unwrap();
    let mut item = Item::new("draft");
    tx.add(&mut item).unwrap();

    item.name = "final".to_string();
    item.tag = Some("done".to_string());
    tx.changed(&item).unwrap();
    assert_eq!(tx.repo::<Item>().fetch_by_tag("done").unwrap().name, "final");

    tx.execute("UPDATE items SET name = 'external' WHERE id = ?1", [item.id])
        .unwrap();
    tx.refresh(&mut item).unwrap();
    assert_eq!(item.name, "external");
}

#[test]
fn changed_and_delete_of_missing_rows_are_unknown_items() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let tx = session.begin_transaction().unwrap();
    let mut item = Item::new("gone");
    tx.add(&mut item).unwrap();

    tx.delete(&item).unwrap();
    assert!(tx.delete(&item).unwrap_err().is_unknown_item());
    assert!(tx.changed(&item).unwrap_err().is_unknown_item());
    assert!(tx.refresh(&mut item).unwrap_err().is_unknown_item());
}

#[test]
fn unpersisted_entities_are_usage_errors() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let tx = session.begin_transaction().unwrap();
    let item = Item::new("never added");

    let err = tx.changed(&item).unwrap_err();
    assert!(matches!(
        err,
        DataError::Usage(UsageError::UnpersistedEntity { ref item_type }) if item_type == "items"
    ));
    assert!(tx.delete(&item).unwrap_err().is_usage());
}

#[test]
fn delete_one_respects_existence() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let tx = session.begin_transaction().unwrap();
    let mut item = Item::tagged("only", "solo");
    tx.add(&mut item).unwrap();
    let repo = tx.repo::<Item>();

    assert!(repo.delete_by_tag("solo", Existence::Required).unwrap());
    assert!(!repo.delete_by_tag("solo", Existence::Optional).unwrap());

    let err = repo.delete_by_tag("solo", Existence::Required).unwrap_err();
    assert_eq!(err.to_string(), "unknown 'items' item, no tag with value 'solo'");
    assert!(!repo.delete_by_uuid(Uuid::new_v4(), Existence::Optional).unwrap());
}

#[test]
fn delete_one_with_duplicates_removes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let tx = session.begin_transaction().unwrap();
    let mut items = vec![Item::tagged("a", "twin"), Item::tagged("b", "twin")];
    tx.add_all(&mut items).unwrap();
    let repo = tx.repo::<Item>();

    let err = repo.delete_by_tag("twin", Existence::Optional).unwrap_err();
    assert!(err.is_duplicate_item());
    assert_eq!(repo.count(&Filter::all()).unwrap(), 2);

    assert!(repo
        .delete_by_id(items[0].id.unwrap(), Existence::Required)
        .unwrap());
    assert_eq!(repo.count(&Filter::all()).unwrap(), 1);
}

#[test]
fn delete_one_accepts_numbered_raw_placeholders() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let tx = session.begin_transaction().unwrap();
    let mut items = vec![Item::tagged("x", "keep"), Item::tagged("y", "keep")];
    tx.add_all(&mut items).unwrap();
    let repo = tx.repo::<Item>();

    let filter = Filter::all()
        .eq("tag", "keep".to_string())
        .raw("name = ?2", vec![Value::Text("x".to_string())]);
    assert_eq!(repo.fetch_one(&filter).unwrap().name, "x");
    assert!(repo.delete_one(&filter, Existence::Required).unwrap());
    assert!(!repo.delete_one(&filter, Existence::Optional).unwrap());

    let only_name = Filter::all().raw("name = ?1", vec![Value::Text("y".to_string())]);
    assert!(repo.delete_one(&only_name, Existence::Required).unwrap());
    assert_eq!(repo.count(&Filter::all()).unwrap(), 0);
}

#[test]
fn delete_all_returns_removed_count() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let tx = session.begin_transaction().unwrap();
    let mut items = vec![Item::new("a"), Item::new("ab"), Item::new("b")];
    tx.add_all(&mut items).unwrap();
    let repo = tx.repo::<Item>();

    assert_eq!(
        repo.delete_all(&Filter::all().like("name", "a%")).unwrap(),
        2
    );
    assert_eq!(repo.delete_all(&Filter::all()).unwrap(), 1);
    assert_eq!(repo.count(&Filter::all()).unwrap(), 0);
}

#[test]
fn rolled_back_rows_are_not_seen_by_a_new_session() {
    let dir = tempfile::tempdir().unwrap();
    let mut kept = Item::new("kept");
    let mut lost = Item::new("lost");
    {
        let mut session = open_session(dir.path());
        session.transaction(|t| t.add(&mut kept)).unwrap();

        let mut tx = session.begin_transaction().unwrap();
        tx.add(&mut lost).unwrap();
        tx.rollback().unwrap();
        drop(tx);
        session.exit().unwrap();
    }

    let mut session = open_session(dir.path());
    let tx = session.begin_transaction().unwrap();
    let repo = tx.repo::<Item>();
    assert_eq!(repo.fetch_by_uuid(kept.uuid).unwrap().name, "kept");
    assert!(repo.fetch_by_uuid(lost.uuid).unwrap_err().is_unknown_item());
}

#[test]
fn invalid_persisted_data_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let tx = session.begin_transaction().unwrap();
    tx.execute(
        "INSERT INTO items (id, name, uuid) VALUES (1, 'broken', 'not-a-uuid')",
        [],
    )
    .unwrap();

    let err = tx.repo::<Item>().fetch_by_id(1).unwrap_err();
    assert!(matches!(err, DataError::InvalidData { ref item_type, .. } if item_type == "items"));
}

#[test]
fn repository_after_commit_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = open_session(dir.path());
    let mut tx = session.begin_transaction().unwrap();
    tx.commit().unwrap();

    let err = tx.repo::<Item>().count(&Filter::all()).unwrap_err();
    assert!(err.is_usage());
}
