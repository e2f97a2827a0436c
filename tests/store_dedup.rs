// tests/store_dedup.rs
//
// The same dedupe/ordering contract, checked against both backends.

use chrono::{DateTime, TimeZone, Utc};
use post_archiver::ingest::types::NormalizedPost;
use post_archiver::store::{
    ListQuery, MemoryStore, PersistOutcome, SortKey, SqliteStore, Store, StoreConnection,
};

fn post(identity: &str, text: &str, published: Option<DateTime<Utc>>) -> NormalizedPost {
    NormalizedPost {
        source_id: Some("42".into()),
        identity: identity.into(),
        text: text.into(),
        raw_timestamp: "raw".into(),
        published_at: published,
    }
}

fn day(d: u32) -> Option<DateTime<Utc>> {
    Some(Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap())
}

fn with_each_store(check: impl Fn(Box<dyn StoreConnection>)) {
    check(MemoryStore::new().connect().unwrap());

    let dir = tempfile::tempdir().unwrap();
    let sqlite = SqliteStore::open(dir.path().join("archive.db")).unwrap();
    check(sqlite.connect().unwrap());
}

#[test]
fn same_pair_twice_is_created_then_duplicate() {
    with_each_store(|mut conn| {
        let first = conn.persist(&post("alice", "hello", day(1))).unwrap();
        assert!(matches!(first, PersistOutcome::Created(ref s) if s.id > 0));
        assert_eq!(conn.count().unwrap(), 1);

        // Different timestamp, same key: still a duplicate and the row is untouched.
        let second = conn.persist(&post("alice", "hello", day(9))).unwrap();
        assert_eq!(second, PersistOutcome::Duplicate);
        assert_eq!(conn.count().unwrap(), 1);
        let rows = conn.list(&ListQuery::default()).unwrap();
        assert_eq!(rows[0].published_at, day(1));
        conn.close().unwrap();
    });
}

#[test]
fn uniqueness_is_on_the_pair_not_either_field() {
    with_each_store(|mut conn| {
        conn.persist(&post("alice", "hello", None)).unwrap();
        let other_text = conn.persist(&post("alice", "bye", None)).unwrap();
        let other_identity = conn.persist(&post("bob", "hello", None)).unwrap();
        assert!(matches!(other_text, PersistOutcome::Created(_)));
        assert!(matches!(other_identity, PersistOutcome::Created(_)));
        assert_eq!(conn.count().unwrap(), 3);

        // card link line makes it a distinct text
        let linked = conn
            .persist(&post("alice", "hello\nhttps://x.test", None))
            .unwrap();
        assert!(matches!(linked, PersistOutcome::Created(_)));
        conn.close().unwrap();
    });
}

#[test]
fn list_orders_by_publication_with_undated_last() {
    with_each_store(|mut conn| {
        conn.persist(&post("a", "mid", day(10))).unwrap();
        conn.persist(&post("a", "undated", None)).unwrap();
        conn.persist(&post("a", "new", day(20))).unwrap();
        conn.persist(&post("a", "old", day(1))).unwrap();

        let texts: Vec<String> = conn
            .list(&ListQuery::sorted_by(SortKey::Published))
            .unwrap()
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(texts, vec!["new", "mid", "old", "undated"]);
        conn.close().unwrap();
    });
}

#[test]
fn list_by_ingestion_is_newest_first() {
    with_each_store(|mut conn| {
        for t in ["first", "second", "third"] {
            conn.persist(&post("a", t, None)).unwrap();
        }
        let rows = conn.list(&ListQuery::sorted_by(SortKey::Ingested)).unwrap();
        assert_eq!(rows[0].text, "third");
        assert_eq!(rows[2].text, "first");
        assert!(rows[0].ingested_at >= rows[2].ingested_at);

        let limited = conn
            .list(&ListQuery::sorted_by(SortKey::Ingested).with_limit(2))
            .unwrap();
        assert_eq!(limited.len(), 2);
        conn.close().unwrap();
    });
}

#[test]
fn search_is_case_insensitive_over_text_or_identity() {
    with_each_store(|mut conn| {
        conn.persist(&post("alice", "xxABCxx", day(2))).unwrap();
        conn.persist(&post("abcdef", "nothing here", day(3))).unwrap();
        conn.persist(&post("carol", "unrelated", day(4))).unwrap();
        conn.persist(&post("dave", "lower abc", day(1))).unwrap();

        let rows = conn
            .list(&ListQuery::sorted_by(SortKey::Published).with_search("abc"))
            .unwrap();
        let texts: Vec<&str> = rows.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["nothing here", "xxABCxx", "lower abc"]);

        let all = conn.list(&ListQuery::default().with_search("  ")).unwrap();
        assert_eq!(all.len(), 4);
        conn.close().unwrap();
    });
}
