//! Unit tests for worksheet-core

#[cfg(test)]
mod store_tests {
    use crate::{CoreError, NewPage, PageStore, StoreOverrides, TagSet};
    use tempfile::TempDir;

    pub(super) fn create_test_store() -> (PageStore, TempDir) {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let base_path = temp_dir.path().to_path_buf();

        let store = PageStore::initialize(StoreOverrides {
            base_root: Some(base_path.clone()),
            db_path: Some(base_path.join("test.db")),
        })
        .expect("Failed to initialize store");

        (store, temp_dir)
    }

    pub(super) fn new_page(source: &str, page_number: u32, text: &str, tags: &str) -> NewPage {
        NewPage {
            source_name: source.into(),
            page_number,
            text: text.into(),
            tags: TagSet::parse(tags),
            ..NewPage::default()
        }
    }

    #[test]
    fn test_initialize_creates_database() {
        let (store, temp_dir) = create_test_store();
        assert!(store.db_path().exists(), "Database file should exist");
        assert!(store.db_path().to_string_lossy().contains("test.db"));
        drop(temp_dir);
    }

    #[test]
    fn test_initialize_idempotent() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let overrides = StoreOverrides {
            base_root: Some(temp_dir.path().to_path_buf()),
            db_path: None,
        };

        // Initialize twice - should not fail
        let store1 = PageStore::initialize(overrides.clone()).expect("First init failed");
        let store2 = PageStore::initialize(overrides).expect("Second init failed");
        assert_eq!(store1.db_path(), &temp_dir.path().join("pages.db"));
        assert_eq!(store1.db_path(), store2.db_path());
    }

    #[test]
    fn test_create_and_get_page() {
        let (store, _temp) = create_test_store();

        let page = store
            .create(new_page("unit1.pdf", 1, "Count the apples", "Addition, grade1"))
            .expect("Failed to create page");

        assert!(page.id > 0);
        assert_eq!(page.page_number, 1);
        assert_eq!(page.tags.to_store_string(), "addition, grade1");
        assert!(page.embedding.is_none());
        assert!(!page.created_at.is_empty());

        let fetched = store.get(page.id).unwrap().expect("page should exist");
        assert_eq!(fetched, page);
    }

    #[test]
    fn test_get_missing_page() {
        let (store, _temp) = create_test_store();
        assert!(store.get(42).unwrap().is_none());
        assert!(matches!(store.require(42), Err(CoreError::NotFound(42))));
    }

    #[test]
    fn test_create_rejects_duplicates_and_bad_input() {
        let (store, _temp) = create_test_store();
        store.create(new_page("unit1.pdf", 1, "text", "")).unwrap();

        let err = store.create(new_page("unit1.pdf", 1, "other", "")).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert!(store.create(new_page("  ", 1, "text", "")).is_err());
        assert!(store.create(new_page("unit1.pdf", 0, "text", "")).is_err());
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_update_page() {
        let (store, _temp) = create_test_store();
        let mut page = store.create(new_page("unit1.pdf", 1, "draft", "")).unwrap();

        page.text = "Final worksheet text".into();
        page.tags = TagSet::parse("shapes");
        page.embedding = Some(vec![0.25, -1.5, 3.0]);
        page.derived_summary = Some("Triangles and squares".into());
        store.update(&page).unwrap();

        let fetched = store.require(page.id).unwrap();
        assert_eq!(fetched.text, "Final worksheet text");
        assert!(fetched.tags.contains("shapes"));
        assert_eq!(fetched.embedding, Some(vec![0.25, -1.5, 3.0]));
        assert_eq!(fetched.derived_summary.as_deref(), Some("Triangles and squares"));
    }

    #[test]
    fn test_update_missing_page() {
        let (store, _temp) = create_test_store();
        let mut page = store.create(new_page("unit1.pdf", 1, "text", "")).unwrap();
        page.id = 999;
        assert!(matches!(store.update(&page), Err(CoreError::NotFound(999))));
        assert!(matches!(store.set_embedding(999, None), Err(CoreError::NotFound(999))));
    }

    #[test]
    fn test_set_embedding_round_trip() {
        let (store, _temp) = create_test_store();
        let page = store.create(new_page("unit1.pdf", 1, "text", "")).unwrap();

        store.set_embedding(page.id, Some(&[1.0, 0.5, -0.125])).unwrap();
        let fetched = store.require(page.id).unwrap();
        assert!(fetched.has_embedding());
        assert_eq!(fetched.embedding.as_deref(), Some(&[1.0, 0.5, -0.125][..]));

        store.set_embedding(page.id, None).unwrap();
        assert!(!store.require(page.id).unwrap().has_embedding());
    }

    #[test]
    fn test_set_tags_returns_updated_page() {
        let (store, _temp) = create_test_store();
        let page = store.create(new_page("unit1.pdf", 1, "text", "old")).unwrap();

        let updated = store.set_tags(page.id, &TagSet::parse("New, other")).unwrap();
        assert_eq!(updated.tags.to_store_string(), "new, other");
        assert!(!updated.tags.contains("old"));
    }

    #[test]
    fn test_list_by_source_orders_by_page_number() {
        let (store, _temp) = create_test_store();
        store.create(new_page("unit1.pdf", 3, "three", "")).unwrap();
        store.create(new_page("unit2.pdf", 1, "other", "")).unwrap();
        store.create(new_page("unit1.pdf", 1, "one", "")).unwrap();

        let pages = store.list_by_source("unit1.pdf").unwrap();
        let numbers: Vec<u32> = pages.iter().map(|p| p.page_number).collect();
        assert_eq!(numbers, vec![1, 3]);

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[test]
    fn test_list_tags_and_top_tags() {
        let (store, _temp) = create_test_store();
        store.create(new_page("a.pdf", 1, "", "Shapes, grade1")).unwrap();
        store.create(new_page("a.pdf", 2, "", "shapes, addition")).unwrap();
        store.create(new_page("a.pdf", 3, "", "SHAPES")).unwrap();

        assert_eq!(store.list_tags().unwrap(), vec!["addition", "grade1", "shapes"]);

        let top = store.top_tags(2).unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].tag, "shapes");
        assert_eq!(top[0].count, 3);
        assert_eq!(top[1].tag, "addition");
    }

    #[test]
    fn test_list_sources() {
        let (store, _temp) = create_test_store();
        store.create(new_page("a.pdf", 1, "", "image-heavy")).unwrap();
        store.create(new_page("a.pdf", 2, "", "")).unwrap();
        store.create(new_page("b.pdf", 1, "", "")).unwrap();

        let sources = store.list_sources().unwrap();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].source_name, "a.pdf");
        assert_eq!(sources[0].page_count, 2);
        assert_eq!(sources[0].image_heavy_count, 1);
        assert_eq!(sources[1].page_count, 1);
    }

    #[test]
    fn test_backfill_folder_tags() {
        let (store, _temp) = create_test_store();
        let nested = store.create(new_page("1st Grade/Unit 2/week3.pdf", 1, "", "")).unwrap();
        let tagged = store.create(new_page("1st Grade/week4.pdf", 1, "", "keep")).unwrap();
        store.create(new_page("loose.pdf", 1, "", "")).unwrap();

        assert_eq!(store.backfill_folder_tags().unwrap(), 1);
        assert_eq!(
            store.require(nested.id).unwrap().tags.to_store_string(),
            "1st grade, unit 2"
        );
        assert_eq!(store.require(tagged.id).unwrap().tags.to_store_string(), "keep");
    }

    #[test]
    fn test_reset_never_reuses_ids() {
        let (store, _temp) = create_test_store();
        store.create(new_page("a.pdf", 1, "", "")).unwrap();
        let last = store.create(new_page("a.pdf", 2, "", "")).unwrap();

        assert_eq!(store.reset().unwrap(), 2);
        assert_eq!(store.count().unwrap(), 0);

        let fresh = store.create(new_page("a.pdf", 1, "", "")).unwrap();
        assert!(fresh.id > last.id);
    }

    #[test]
    fn test_reopen_keeps_pages() {
        let (store, temp) = create_test_store();
        let page = store.create(new_page("a.pdf", 1, "persisted", "kept")).unwrap();
        store.set_embedding(page.id, Some(&[1.0, 2.0])).unwrap();
        drop(store);

        let reopened = PageStore::open(temp.path().join("test.db")).unwrap();
        let fetched = reopened.require(page.id).unwrap();
        assert_eq!(fetched.text, "persisted");
        assert_eq!(fetched.embedding, Some(vec![1.0, 2.0]));
    }
}

#[cfg(test)]
mod migration_tests {
    use crate::PageStore;
    use rusqlite::Connection;
    use tempfile::TempDir;

    #[test]
    fn test_open_adds_derived_summary_column() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("old.db");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(
                "CREATE TABLE pages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    source_name TEXT NOT NULL,
                    source_path TEXT,
                    page_number INTEGER NOT NULL,
                    text TEXT NOT NULL DEFAULT '',
                    tags TEXT NOT NULL DEFAULT '',
                    embedding BLOB,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );
                INSERT INTO pages (source_name, page_number, text, tags, created_at, updated_at)
                VALUES ('old.pdf', 1, 'legacy text', 'Legacy', '2024-01-01T00:00:00Z', '2024-01-01T00:00:00Z');",
            )
            .unwrap();
        }

        let store = PageStore::open(db_path).expect("migration failed");
        let pages = store.list_all().unwrap();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].text, "legacy text");
        assert!(pages[0].tags.contains("legacy"));
        assert!(pages[0].derived_summary.is_none());

        store.set_derived_summary(pages[0].id, Some("A summary")).unwrap();
        assert_eq!(
            store.require(pages[0].id).unwrap().derived_summary.as_deref(),
            Some("A summary")
        );
    }
}

#[cfg(test)]
mod graph_store_tests {
    use super::store_tests::{create_test_store, new_page};

    #[test]
    fn test_tag_graph_from_store() {
        let (store, _temp) = create_test_store();
        store.create(new_page("a.pdf", 1, "", "shapes, grade1")).unwrap();
        store.create(new_page("a.pdf", 2, "", "shapes, grade1")).unwrap();
        store.create(new_page("a.pdf", 3, "", "reading")).unwrap();

        let graph = store.tag_graph().unwrap();
        let neighbors = graph.neighbors("shapes");
        assert_eq!(neighbors.len(), 1);
        assert_eq!(neighbors[0].0, "grade1");
        assert_eq!(neighbors[0].1, 2);
    }
}
