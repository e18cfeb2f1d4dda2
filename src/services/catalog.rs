use crate::{
    db::DbPool,
    entities::product::{self, Entity as Product},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, PaginatorTrait, QueryOrder, Set};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Read side of the drop catalog plus one-time seeding
pub struct CatalogService {
    db_pool: Arc<DbPool>,
}

impl CatalogService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Lists the catalog in listing order
    #[instrument(skip(self))]
    pub async fn list(&self) -> Result<Vec<product::Model>, ServiceError> {
        let db = &*self.db_pool;

        let products = Product::find()
            .order_by_asc(product::Column::Id)
            .all(db)
            .await
            .map_err(|e| {
                error!(error = %e, "Database error when listing products");
                ServiceError::DatabaseError(e)
            })?;

        Ok(products)
    }

    /// Fetches a single product by id
    #[instrument(skip(self))]
    pub async fn get(&self, product_id: i32) -> Result<Option<product::Model>, ServiceError> {
        let db = &*self.db_pool;

        let found = Product::find_by_id(product_id)
            .one(db)
            .await
            .map_err(|e| {
                error!(product_id = %product_id, error = %e, "Database error when fetching product");
                ServiceError::DatabaseError(e)
            })?;

        Ok(found)
    }

    /// Inserts the built-in drop catalog when the products table is empty
    ///
    /// Idempotent across restarts: a non-empty table means another instance
    /// (or a previous run) already seeded, so nothing is written. Returns the
    /// number of products inserted.
    #[instrument(skip(self))]
    pub async fn seed_if_empty(&self, price_rub: i64) -> Result<u64, ServiceError> {
        let db = &*self.db_pool;

        let existing = Product::find().count(db).await.map_err(|e| {
            error!(error = %e, "Database error when counting products");
            ServiceError::DatabaseError(e)
        })?;
        if existing > 0 {
            return Ok(0);
        }

        let mut inserted = 0u64;
        for entry in seed_catalog() {
            let model = product::ActiveModel {
                id: Set(entry.id),
                name: Set(entry.name.to_string()),
                description: Set(entry.description.to_string()),
                price: Set(price_rub),
                variants: Set(entry.variants),
                sizes: Set(json!([39, 40, 41, 42, 43, 44, 45, 46])),
                created_at: Set(Utc::now()),
            };
            model.insert(db).await.map_err(|e| {
                error!(error = %e, "Failed to insert seed product");
                ServiceError::DatabaseError(e)
            })?;
            inserted += 1;
        }

        info!(count = inserted, "Seeded initial drop catalog");
        Ok(inserted)
    }
}

struct SeedProduct {
    id: i32,
    name: &'static str,
    description: &'static str,
    variants: serde_json::Value,
}

fn seed_catalog() -> Vec<SeedProduct> {
    vec![
        SeedProduct {
            id: 1001,
            name: "Axis",
            description: "Кеды с точкой равновесия: строгие линии и универсальность. \
                Axis держит баланс между спортивной динамикой и кэжуальной простотой.",
            variants: json!([
                {"color": "белый/чёрный", "image": "axis1.jpg"},
                {"color": "хаки/бежевый", "image": "axis2.jpg"},
                {"color": "серый/белый", "image": "axis3.jpg"},
                {"color": "чёрный/белый", "image": "axis4.jpg"}
            ]),
        },
        SeedProduct {
            id: 1002,
            name: "Urban",
            description: "Лаконичные кеды на каждый день. Urban — сдержанная эстетика \
                и комфорт. Чистая форма легко садится к джинсам, брюкам и шортам.",
            variants: json!([
                {"color": "бежевый/зелёный", "image": "urban1.jpg"},
                {"color": "чёрный", "image": "urban2.jpg"},
                {"color": "белый", "image": "urban3.jpg"},
                {"color": "серый/белый", "image": "urban4.jpg"}
            ]),
        },
        SeedProduct {
            id: 1003,
            name: "Flow",
            description: "Кроссовки для активного дня: гибкая посадка, плавный перекат \
                и уверенное сцепление, от офиса до прогулок.",
            variants: json!([
                {"color": "светло-бежевый/зелёный", "image": "flow1.jpg"},
                {"color": "оранжевый/чёрный", "image": "flow2.jpg"},
                {"color": "чёрный/серый", "image": "flow3.jpg"},
                {"color": "белый", "image": "flow4.jpg"}
            ]),
        },
        SeedProduct {
            id: 1004,
            name: "Rise",
            description: "Rise вдохновляют на движение к целям. Лёгкая амортизация \
                смягчает шаг, продуманная посадка поддерживает стопу в активном дне.",
            variants: json!([
                {"color": "коричневый/бежевый", "image": "rise1.jpg"},
                {"color": "чёрный/серый", "image": "rise2.jpg"},
                {"color": "светло-коричневый/светло-серый", "image": "rise3.jpg"},
                {"color": "белый/светло-серый", "image": "rise4.jpg"}
            ]),
        },
        SeedProduct {
            id: 1005,
            name: "Shift",
            description: "Shift — про свободу сценариев: офис, прогулка, короткая \
                тренировка. Стабильная опора и комфортная фиксация дают уверенность \
                в каждом шаге.",
            variants: json!([
                {"color": "светло-коричневый/молочный", "image": "shift1.jpg"},
                {"color": "светло-бежевый/бордо", "image": "shift2.jpg"},
                {"color": "белый", "image": "shift3.jpg"},
                {"color": "чёрный", "image": "shift4.jpg"}
            ]),
        },
    ]
}
