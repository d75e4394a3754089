//! Diesel ORM models for the three persisted tables: `images`, `faces`,
//! `search_history`. `embedding` and `encoding` are raw little-endian
//! `float32` bytes; `metadata` and `bbox` are opaque JSON text.
use diesel::prelude::*;

#[derive(Queryable, Identifiable, Insertable, Debug, Selectable, Clone)]
#[diesel(table_name = crate::schema::images)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ImageRow {
    #[diesel(deserialize_as = i32)]
    pub id: Option<i32>,
    pub source_ref: String,
    pub thumbnail_ref: Option<String>,
    pub uploaded_at: String,
    pub taken_at: Option<String>,
    pub gps_lat: Option<f64>,
    pub gps_lon: Option<f64>,
    pub location_name: Option<String>,
    pub embedding: Vec<u8>,
    pub metadata: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::images)]
pub struct NewImageRow {
    pub source_ref: String,
    pub thumbnail_ref: Option<String>,
    pub uploaded_at: String,
    pub taken_at: Option<String>,
    pub gps_lat: Option<f64>,
    pub gps_lon: Option<f64>,
    pub location_name: Option<String>,
    pub embedding: Vec<u8>,
    pub metadata: String,
}

#[derive(Queryable, Identifiable, Associations, Insertable, Debug, Selectable, Clone)]
#[diesel(belongs_to(ImageRow, foreign_key = image_id))]
#[diesel(table_name = crate::schema::faces)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct FaceRow {
    #[diesel(deserialize_as = i32)]
    pub id: Option<i32>,
    pub image_id: i32,
    pub bbox: String,
    pub encoding: Option<Vec<u8>>,
    pub person_name: Option<String>,
    pub confidence: f64,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::faces)]
pub struct NewFaceRow {
    pub image_id: i32,
    pub bbox: String,
    pub encoding: Option<Vec<u8>>,
    pub person_name: Option<String>,
    pub confidence: f64,
}

#[derive(Queryable, Identifiable, Insertable, Debug, Selectable, Clone)]
#[diesel(table_name = crate::schema::search_history)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SearchHistoryRow {
    #[diesel(deserialize_as = i32)]
    pub id: Option<i32>,
    pub query: String,
    pub results: String,
    pub ts: String,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::search_history)]
pub struct NewSearchHistoryRow {
    pub query: String,
    pub results: String,
    pub ts: String,
}
