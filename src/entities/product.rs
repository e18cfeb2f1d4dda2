use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Product entity for the drop catalog
///
/// Rows are immutable once listed; a catalog refresh replaces them wholesale.
/// Color variants and the size run are descriptive JSON lists, there is no
/// per-variant stock count.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,
    pub name: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub price: i64,
    #[sea_orm(column_type = "Json")]
    pub variants: Json,
    #[sea_orm(column_type = "Json")]
    pub sizes: Json,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order::Entity")]
    Orders,
}

impl Related<super::order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Orders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// A color/image variant within a product listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variant {
    pub color: String,
    pub image: String,
}

impl Model {
    /// Decodes the JSON variants column into the ordered variant list
    pub fn variant_list(&self) -> Vec<Variant> {
        serde_json::from_value(self.variants.clone()).unwrap_or_default()
    }

    /// Decodes the JSON sizes column into the ordered size run
    pub fn size_list(&self) -> Vec<i32> {
        serde_json::from_value(self.sizes.clone()).unwrap_or_default()
    }
}
