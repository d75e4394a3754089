//! Embedding Store: durable persistence for photos and faces.
//!
//! Backed by SQLite via diesel. `embedding` and `encoding` columns hold
//! raw little-endian `float32` bytes; `metadata` and `bbox` are opaque
//! JSON text the store never interprets. Writes are serialized through a
//! `Mutex<SqliteConnection>` — the corpus has exactly one writer at a
//! time, matching the single-writer SQLite connection the rest of the
//! corpus's CLI apps open.

use crate::error::{CoreError, CoreResult};
use crate::models::{
    FaceRow, ImageRow, NewFaceRow, NewImageRow, NewSearchHistoryRow, SearchHistoryRow,
};
use diesel::prelude::*;
use diesel::sql_query;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::warn;

/// A fully materialized photo row plus its face records' person names.
#[derive(Debug, Clone, PartialEq)]
pub struct Photo {
    pub id: i32,
    pub source_ref: String,
    pub thumbnail_ref: Option<String>,
    pub uploaded_at: String,
    pub taken_at: Option<String>,
    pub gps: Option<(f64, f64)>,
    pub location_name: Option<String>,
    pub embedding: Vec<f32>,
    pub metadata: String,
}

impl Photo {
    fn from_row(row: ImageRow) -> CoreResult<Self> {
        let embedding = decode_embedding(&row.embedding)?;
        let gps = match (row.gps_lat, row.gps_lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        };
        Ok(Photo {
            id: row.id.expect("queried row always has an id"),
            source_ref: row.source_ref,
            thumbnail_ref: row.thumbnail_ref,
            uploaded_at: row.uploaded_at,
            taken_at: row.taken_at,
            gps,
            location_name: row.location_name,
            embedding,
            metadata: row.metadata,
        })
    }
}

/// Decode a little-endian `float32` byte blob into a vector.
pub fn decode_embedding(bytes: &[u8]) -> CoreResult<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(CoreError::CorruptEmbedding {
            id: -1,
            expected: 0,
            actual: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Encode a vector into its little-endian `float32` byte representation.
pub fn encode_embedding(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for x in v {
        out.extend_from_slice(&x.to_le_bytes());
    }
    out
}

/// Durable SQLite-backed embedding store for one corpus.
pub struct Store {
    conn: Mutex<SqliteConnection>,
}

const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS images (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_ref TEXT NOT NULL UNIQUE,
    thumbnail_ref TEXT,
    uploaded_at TEXT NOT NULL,
    taken_at TEXT,
    gps_lat REAL,
    gps_lon REAL,
    location_name TEXT,
    embedding BLOB NOT NULL,
    metadata TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS faces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    image_id INTEGER NOT NULL REFERENCES images(id),
    bbox TEXT NOT NULL,
    encoding BLOB,
    person_name TEXT,
    confidence REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS search_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    query TEXT NOT NULL,
    results TEXT NOT NULL,
    ts TEXT NOT NULL
);
"#;

impl Store {
    /// Open (creating if absent) the corpus file at `path` and ensure its
    /// schema exists.
    pub fn open(path: &str) -> CoreResult<Self> {
        let mut conn = SqliteConnection::establish(path)?;
        run_migrations(&mut conn)?;
        Ok(Store {
            conn: Mutex::new(conn),
        })
    }

    /// Insert-or-replace a photo keyed by `source_ref`. Returns the
    /// assigned `PhotoId`.
    pub fn put(
        &self,
        source_ref: &str,
        uploaded_at: &str,
        taken_at: Option<&str>,
        gps: Option<(f64, f64)>,
        location_name: Option<&str>,
        embedding: &[f32],
        metadata: &str,
    ) -> CoreResult<i32> {
        use crate::schema::images::dsl as img;

        let row = NewImageRow {
            source_ref: source_ref.to_string(),
            thumbnail_ref: None,
            uploaded_at: uploaded_at.to_string(),
            taken_at: taken_at.map(|s| s.to_string()),
            gps_lat: gps.map(|(lat, _)| lat),
            gps_lon: gps.map(|(_, lon)| lon),
            location_name: location_name.map(|s| s.to_string()),
            embedding: encode_embedding(embedding),
            metadata: metadata.to_string(),
        };

        let mut conn = self
            .conn
            .lock()
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;

        conn.transaction(|conn| {
            diesel::replace_into(img::images)
                .values(&row)
                .execute(conn)?;
            img::images
                .filter(img::source_ref.eq(source_ref))
                .select(img::id)
                .first::<i32>(conn)
        })
        .map_err(CoreError::from)
    }

    /// Fetch a single photo by id.
    pub fn get(&self, id: i32) -> CoreResult<Photo> {
        use crate::schema::images::dsl;

        let mut conn = self
            .conn
            .lock()
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        let row: ImageRow = dsl::images
            .filter(dsl::id.eq(id))
            .select(ImageRow::as_select())
            .first(&mut *conn)
            .optional()?
            .ok_or_else(|| CoreError::NotFound(format!("photo {id}")))?;
        Photo::from_row(row)
    }

    /// Full scan of the store, skipping (and warning on) rows whose
    /// embedding blob has the wrong length.
    pub fn scan(&self) -> CoreResult<Vec<Photo>> {
        use crate::schema::images::dsl;

        let mut conn = self
            .conn
            .lock()
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        let rows: Vec<ImageRow> = dsl::images.select(ImageRow::as_select()).load(&mut *conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id.unwrap_or(-1);
            match Photo::from_row(row) {
                Ok(photo) => out.push(photo),
                Err(CoreError::CorruptEmbedding { expected, actual, .. }) => {
                    warn!(id, expected, actual, "skipping row with corrupt embedding");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Number of rows currently in `images`.
    pub fn count(&self) -> CoreResult<i64> {
        use crate::schema::images::dsl;

        let mut conn = self
            .conn
            .lock()
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(dsl::images.count().get_result(&mut *conn)?)
    }

    /// Attach a face record to an already-stored photo.
    pub fn put_face(
        &self,
        image_id: i32,
        bbox: &str,
        encoding: Option<&[f32]>,
        person_name: Option<&str>,
        confidence: f64,
    ) -> CoreResult<()> {
        use crate::schema::faces::dsl;

        let row = NewFaceRow {
            image_id,
            bbox: bbox.to_string(),
            encoding: encoding.map(encode_embedding),
            person_name: person_name.map(|s| s.to_string()),
            confidence,
        };

        let mut conn = self
            .conn
            .lock()
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        diesel::insert_into(dsl::faces).values(&row).execute(&mut *conn)?;
        Ok(())
    }

    /// Distinct, non-null person names attached to a photo's faces.
    pub fn persons_for(&self, image_id: i32) -> CoreResult<HashSet<String>> {
        use crate::schema::faces::dsl;

        let mut conn = self
            .conn
            .lock()
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        let rows: Vec<FaceRow> = dsl::faces
            .filter(dsl::image_id.eq(image_id))
            .select(FaceRow::as_select())
            .load(&mut *conn)?;
        Ok(rows.into_iter().filter_map(|r| r.person_name).collect())
    }

    /// Record a completed search for later analysis.
    pub fn record_search(&self, query: &str, results: &str, ts: &str) -> CoreResult<()> {
        use crate::schema::search_history::dsl;

        let row = NewSearchHistoryRow {
            query: query.to_string(),
            results: results.to_string(),
            ts: ts.to_string(),
        };

        let mut conn = self
            .conn
            .lock()
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        diesel::insert_into(dsl::search_history)
            .values(&row)
            .execute(&mut *conn)?;
        Ok(())
    }

    /// Most recent search history rows, newest first.
    pub fn recent_searches(&self, limit: i64) -> CoreResult<Vec<SearchHistoryRow>> {
        use crate::schema::search_history::dsl;

        let mut conn = self
            .conn
            .lock()
            .map_err(|e| CoreError::StoreUnavailable(e.to_string()))?;
        Ok(dsl::search_history
            .order(dsl::id.desc())
            .limit(limit)
            .select(SearchHistoryRow::as_select())
            .load(&mut *conn)?)
    }
}

fn run_migrations(conn: &mut SqliteConnection) -> CoreResult<()> {
    for statement in CREATE_TABLES_SQL.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        sql_query(statement).execute(conn).map_err(CoreError::from)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_store() -> (Store, tempfile::NamedTempFile) {
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = Store::open(file.path().to_str().unwrap()).unwrap();
        (store, file)
    }

    fn unit_vector(seed: f32) -> Vec<f32> {
        let v = vec![seed, 1.0 - seed, 0.0, 0.0];
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / norm).collect()
    }

    #[test]
    fn test_put_and_get_roundtrip() {
        let (store, _file) = scratch_store();
        let emb = unit_vector(0.3);
        let id = store
            .put(
                "file:///a.jpg",
                "2024-01-01T00:00:00Z",
                Some("2024-06-15T10:00:00Z"),
                Some((40.71, -74.01)),
                Some("New York"),
                &emb,
                "{}",
            )
            .unwrap();

        let photo = store.get(id).unwrap();
        assert_eq!(photo.source_ref, "file:///a.jpg");
        assert_eq!(photo.gps, Some((40.71, -74.01)));
        assert_eq!(photo.embedding.len(), emb.len());
    }

    #[test]
    fn test_put_replaces_by_source_ref() {
        let (store, _file) = scratch_store();
        let emb = unit_vector(0.1);
        let id1 = store
            .put("file:///a.jpg", "2024-01-01T00:00:00Z", None, None, None, &emb, "{}")
            .unwrap();
        let id2 = store
            .put("file:///a.jpg", "2024-02-01T00:00:00Z", None, None, None, &emb, "{}")
            .unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.count().unwrap(), 1);
    }

    #[test]
    fn test_get_unknown_id_is_not_found() {
        let (store, _file) = scratch_store();
        match store.get(999) {
            Err(CoreError::NotFound(_)) => {}
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_scan_skips_corrupt_embedding() {
        let (store, _file) = scratch_store();
        let good = unit_vector(0.5);
        store
            .put("file:///good.jpg", "2024-01-01T00:00:00Z", None, None, None, &good, "{}")
            .unwrap();

        // Insert a row with a deliberately truncated embedding blob directly.
        use crate::schema::images::dsl as img;
        let mut conn = store.conn.lock().unwrap();
        diesel::insert_into(img::images)
            .values(NewImageRow {
                source_ref: "file:///bad.jpg".to_string(),
                thumbnail_ref: None,
                uploaded_at: "2024-01-01T00:00:00Z".to_string(),
                taken_at: None,
                gps_lat: None,
                gps_lon: None,
                location_name: None,
                embedding: vec![1, 2, 3],
                metadata: "{}".to_string(),
            })
            .execute(&mut *conn)
            .unwrap();
        drop(conn);

        let photos = store.scan().unwrap();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].source_ref, "file:///good.jpg");
    }

    #[test]
    fn test_faces_and_persons_for() {
        let (store, _file) = scratch_store();
        let emb = unit_vector(0.2);
        let id = store
            .put("file:///fam.jpg", "2024-01-01T00:00:00Z", None, None, None, &emb, "{}")
            .unwrap();
        store.put_face(id, "[0,0,10,10]", None, Some("엄마"), 0.9).unwrap();
        store.put_face(id, "[10,10,20,20]", None, Some("아빠"), 0.8).unwrap();
        store.put_face(id, "[20,20,30,30]", None, None, 0.5).unwrap();

        let persons = store.persons_for(id).unwrap();
        assert!(persons.contains("엄마"));
        assert!(persons.contains("아빠"));
        assert_eq!(persons.len(), 2);
    }

    #[test]
    fn test_record_and_recent_searches() {
        let (store, _file) = scratch_store();
        store.record_search("q1", "[]", "2024-01-01T00:00:00Z").unwrap();
        store.record_search("q2", "[]", "2024-01-02T00:00:00Z").unwrap();

        let recent = store.recent_searches(1).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].query, "q2");
    }

    #[test]
    fn test_embedding_roundtrip_encoding() {
        let v = vec![0.1f32, -0.2, 0.3, 0.0];
        let bytes = encode_embedding(&v);
        assert_eq!(bytes.len(), 16);
        let decoded = decode_embedding(&bytes).unwrap();
        assert_eq!(decoded, v);
    }
}
