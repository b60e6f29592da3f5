use std::{collections::BTreeMap, path::Path};

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::error::Result;

const VECTORS: TableDefinition<u64, &[u8]> = TableDefinition::new("vectors");

/// Header size: 4 bytes dimension.
const HEADER_SIZE: usize = 4;

/// Stores one embedding vector per document, keyed by numeric document ID.
///
/// Binary format per entry:
/// - 4 bytes: dimension D (u32 LE)
/// - D * 4 bytes: f32 LE values
///
/// Writing a vector replaces the previous one for that document.
pub struct VectorDb {
    db: Database,
}

impl VectorDb {
    /// Open or create a vector database at the given path.
    ///
    /// # Examples
    ///
    /// ```
    /// # let tmp = tempfile::tempdir().unwrap();
    /// use kbsearch::VectorDb;
    ///
    /// let db = VectorDb::open(&tmp.path().join("vectors.redb")).unwrap();
    /// assert!(db.list_ids().unwrap().is_empty());
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        txn.open_table(VECTORS)?;
        txn.commit()?;

        Ok(Self { db })
    }

    /// Store the vector for a document.
    pub fn store(&self, doc_id: u64, vector: &[f32]) -> Result<()> {
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(VECTORS)?;
            let bytes = encode(vector);
            table.insert(doc_id, bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    /// Retrieve the vector for a document, or `None` if absent or malformed.
    pub fn load(&self, doc_id: u64) -> Result<Option<Vec<f32>>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(VECTORS)?;

        let Some(guard) = table.get(doc_id)? else {
            return Ok(None);
        };
        Ok(decode(guard.value()))
    }

    /// Remove a vector entry.
    pub fn remove(&self, doc_id: u64) -> Result<bool> {
        let txn = self.db.begin_write()?;
        let removed = {
            let mut table = txn.open_table(VECTORS)?;
            table.remove(doc_id)?.is_some()
        };
        txn.commit()?;
        Ok(removed)
    }

    /// Remove multiple vector entries in a single transaction.
    pub fn batch_remove(&self, doc_ids: &[u64]) -> Result<()> {
        if doc_ids.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(VECTORS)?;
            for &doc_id in doc_ids {
                table.remove(doc_id)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Store multiple vectors in a single transaction.
    pub fn batch_store(&self, entries: &[(u64, Vec<f32>)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let txn = self.db.begin_write()?;
        {
            let mut table = txn.open_table(VECTORS)?;
            for (doc_id, vector) in entries {
                let bytes = encode(vector);
                table.insert(*doc_id, bytes.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    /// Load multiple vectors in a single transaction.
    ///
    /// Returns `(doc_id, Option<vector>)` pairs in input order.
    pub fn batch_load(
        &self,
        doc_ids: &[u64],
    ) -> Result<Vec<(u64, Option<Vec<f32>>)>> {
        if doc_ids.is_empty() {
            return Ok(Vec::new());
        }

        let txn = self.db.begin_read()?;
        let table = txn.open_table(VECTORS)?;

        let mut results = Vec::with_capacity(doc_ids.len());
        for &doc_id in doc_ids {
            let vector = table.get(doc_id)?.and_then(|g| decode(g.value()));
            results.push((doc_id, vector));
        }

        Ok(results)
    }

    /// List all stored document IDs.
    pub fn list_ids(&self) -> Result<Vec<u64>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(VECTORS)?;
        let mut result = Vec::new();
        for entry in table.iter()? {
            let (k, _) = entry?;
            result.push(k.value());
        }
        Ok(result)
    }

    /// Count stored vectors per dimension.
    ///
    /// More than one key means an embedding-scheme change left stale
    /// vectors behind.
    pub fn dimension_counts(&self) -> Result<BTreeMap<u32, usize>> {
        let txn = self.db.begin_read()?;
        let table = txn.open_table(VECTORS)?;
        let mut counts = BTreeMap::new();
        for entry in table.iter()? {
            let (_, v) = entry?;
            let bytes = v.value();
            if let Some(header) = bytes.get(..HEADER_SIZE) {
                let dimension = u32::from_le_bytes([
                    header[0], header[1], header[2], header[3],
                ]);
                *counts.entry(dimension).or_default() += 1;
            }
        }
        Ok(counts)
    }
}

impl std::fmt::Debug for VectorDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorDb").finish_non_exhaustive()
    }
}

fn encode(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_SIZE + vector.len() * 4);
    bytes.extend_from_slice(&(vector.len() as u32).to_le_bytes());
    for x in vector {
        bytes.extend_from_slice(&x.to_le_bytes());
    }
    bytes
}

fn decode(bytes: &[u8]) -> Option<Vec<f32>> {
    let (header, body) = bytes.split_at_checked(HEADER_SIZE)?;
    let dimension =
        u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if body.len() != dimension as usize * 4 {
        return None;
    }

    // redb values are not guaranteed to be 4-byte aligned.
    if cfg!(target_endian = "little")
        && let Ok(floats) = bytemuck::try_cast_slice::<u8, f32>(body)
    {
        return Some(floats.to_vec());
    }

    Some(
        body.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}
