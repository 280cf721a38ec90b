//! Memory entity

use sea_orm::entity::prelude::*;

/// One stored memory. Tags and metadata are kept as JSON text.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "memories")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
    pub id: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text")]
    pub content: String,

    #[sea_orm(column_type = "Text")]
    pub label: String,

    /// JSON array of strings
    #[sea_orm(column_type = "Text")]
    pub tags: String,

    /// JSON object
    #[sea_orm(column_type = "Text")]
    pub metadata: String,

    /// Little-endian f32 vector, present when an embedder was configured
    #[sea_orm(column_type = "Blob", nullable)]
    pub embedding: Option<Vec<u8>>,

    /// RFC 3339 UTC, millisecond precision
    #[sea_orm(column_type = "Text")]
    pub created_at: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
