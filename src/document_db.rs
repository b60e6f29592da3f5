use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use crate::error::Result;

const DOCUMENTS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("documents");
const SETTINGS: TableDefinition<&str, &str> = TableDefinition::new("settings");

/// Who besides the owner and collaborators may read a document.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    #[default]
    Private,
    Public,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Private => f.write_str("private"),
            Visibility::Public => f.write_str("public"),
        }
    }
}

/// A knowledge-base document as persisted in `documents.redb`.
///
/// The embedding lives in the vector database under the same numeric key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// External identifier chosen by the caller.
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub owner: String,
    #[serde(default)]
    pub collaborators: Vec<String>,
    #[serde(default)]
    pub visibility: Visibility,
    /// Fingerprint of `content` at the time its vector was computed.
    pub content_hash: u64,
    /// Seconds since the Unix epoch.
    pub updated_at: u64,
}

pub struct DocumentDb {
    db: Database,
}

impl DocumentDb {
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        // Ensure all tables exist by opening them in a write transaction.
        let txn = db.begin_write()?;
        txn.open_table(DOCUMENTS)?;
        txn.open_table(SETTINGS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    // -- Documents --

    pub fn put(&self, doc_id: u64, doc: &StoredDocument) -> Result<()> {
        let bytes = serde_json::to_vec(doc)?;
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DOCUMENTS)?;
            table.insert(doc_id, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get(&self, doc_id: u64) -> Result<Option<StoredDocument>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        match table.get(doc_id)? {
            Some(v) => Ok(Some(serde_json::from_slice(v.value())?)),
            None => Ok(None),
        }
    }

    pub fn remove(&self, doc_id: u64) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(DOCUMENTS)?;
            table.remove(doc_id)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Remove multiple documents in a single transaction.
    pub fn batch_remove(&self, doc_ids: &[u64]) -> Result<()> {
        if doc_ids.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(DOCUMENTS)?;
            for &doc_id in doc_ids {
                table.remove(doc_id)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    pub fn list_ids(&self) -> Result<Vec<u64>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, _v) = entry?;
            result.push(k.value());
        }
        Ok(result)
    }

    /// Return all `(doc_id, document)` pairs in a single read transaction.
    pub fn list(&self) -> Result<Vec<(u64, StoredDocument)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(DOCUMENTS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value(), serde_json::from_slice(v.value())?));
        }
        Ok(result)
    }

    // -- Settings --

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(SETTINGS)?;
            table.insert(key, value)?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        Ok(table.get(key)?.map(|v| v.value().to_string()))
    }

    /// Get a setting, returning the default if not set.
    pub fn get_setting_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_setting(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    pub fn list_settings(&self) -> Result<Vec<(String, String)>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(SETTINGS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, v) = entry?;
            result.push((k.value().to_string(), v.value().to_string()));
        }
        Ok(result)
    }
}

impl std::fmt::Debug for DocumentDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentDb").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, DocumentDb) {
        let tmp = tempfile::tempdir().unwrap();
        let db = DocumentDb::open(&tmp.path().join("documents.redb")).unwrap();
        (tmp, db)
    }

    fn sample(id: &str) -> StoredDocument {
        StoredDocument {
            id: id.to_string(),
            title: "Deploy guide".to_string(),
            content: "Run the pipeline, then tag the release.".to_string(),
            tags: vec!["ops".to_string()],
            owner: "alice".to_string(),
            collaborators: vec!["bob".to_string()],
            visibility: Visibility::Private,
            content_hash: 7,
            updated_at: 1_700_000_000,
        }
    }

    #[test]
    fn documents_crud() {
        let (_tmp, db) = test_db();

        assert!(db.get(1).unwrap().is_none());

        let doc = sample("deploy");
        db.put(1, &doc).unwrap();
        assert_eq!(db.get(1).unwrap(), Some(doc.clone()));
        assert_eq!(db.list_ids().unwrap(), vec![1]);

        let listed = db.list().unwrap();
        assert_eq!(listed, vec![(1, doc)]);

        assert!(db.remove(1).unwrap());
        assert!(!db.remove(1).unwrap());
        assert!(db.get(1).unwrap().is_none());
    }

    #[test]
    fn batch_remove_documents() {
        let (_tmp, db) = test_db();
        db.put(1, &sample("a")).unwrap();
        db.put(2, &sample("b")).unwrap();
        db.put(3, &sample("c")).unwrap();

        db.batch_remove(&[1, 2]).unwrap();
        assert_eq!(db.list_ids().unwrap(), vec![3]);
    }

    #[test]
    fn missing_optional_fields_use_defaults() {
        let json = br#"{"id":"x","title":"t","content":"c","owner":"o",
            "content_hash":1,"updated_at":2}"#;
        let doc: StoredDocument = serde_json::from_slice(json).unwrap();
        assert!(doc.tags.is_empty());
        assert!(doc.collaborators.is_empty());
        assert_eq!(doc.visibility, Visibility::Private);
    }

    #[test]
    fn settings_crud() {
        let (_tmp, db) = test_db();

        assert_eq!(db.get_setting("dimension").unwrap(), None);
        assert_eq!(db.get_setting_or("dimension", "384").unwrap(), "384");

        db.set_setting("dimension", "128").unwrap();
        assert_eq!(
            db.get_setting("dimension").unwrap(),
            Some("128".to_string())
        );
        assert_eq!(
            db.list_settings().unwrap(),
            vec![("dimension".to_string(), "128".to_string())]
        );
    }

    #[test]
    fn reopen_preserves_data() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("documents.redb");

        {
            let db = DocumentDb::open(&path).unwrap();
            db.put(9, &sample("kept")).unwrap();
            db.set_setting("threshold", "0.6").unwrap();
        }

        {
            let db = DocumentDb::open(&path).unwrap();
            assert_eq!(db.get(9).unwrap().unwrap().id, "kept");
            assert_eq!(
                db.get_setting("threshold").unwrap(),
                Some("0.6".to_string())
            );
        }
    }
}
