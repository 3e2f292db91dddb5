//! # Data Repository Layer
//!
//! This module provides repository traits and PostgreSQL implementations
//! for all entities: orders, order items, photos, status logs, settlement
//! transactions, and the catalog read model.
//! Each repository supports both regular and transactional operations
//! for integration with service/business logic.

use async_trait::async_trait;
use model::{Order, OrderItem, OrderLog, OrderPhoto, OrderStatus, Product};
use thiserror::Error;
use tokio_postgres::{Client, Row, Transaction};

/// # RepositoryError
///
/// Error types that can occur during repository operations.
///
/// This enum represents the various error conditions that might arise
/// when interacting with the data storage layer.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database-related errors, wrapping the underlying PostgreSQL error
    #[error("Database error: {0}")]
    Db(#[from] tokio_postgres::Error),
    /// No result found.
    #[error("Not found")]
    NotFound,
    /// A guarded update matched no row: the row changed under us.
    #[error("Concurrent update conflict")]
    Conflict,
}

fn order_from_row(row: &Row) -> Order {
    Order {
        id: row.get("id"),
        client_id: row.get("client_id"),
        store_id: row.get("store_id"),
        courier_id: row.get("courier_id"),
        status: row.get("status"),
        total_amount: row.get("total_amount"),
        delivery_fee: row.get("delivery_fee"),
        address: row.get("address"),
        comment: row.get("comment"),
        items: Vec::new(), // To be filled by service
        created_at: row.get("created_at"),
    }
}


/// # OrdersRepository
///
/// Repository interface for the order aggregate root.
///
/// Besides plain inserts and lookups this trait carries the guarded status
/// update used by the lifecycle engine: the row is only written when it still
/// holds the status the caller read, which makes concurrent transitions on
/// the same order resolve to exactly one winner.
#[async_trait]
pub trait OrdersRepository: Send + Sync {
    /// Insert the order row in a transaction (items are stored separately).
    async fn insert_tx(&self, tx: &Transaction<'_>, order: &Order) -> Result<(), RepositoryError>;

    /// Get an order by its ID (items left empty).
    async fn get_by_id(&self, order_id: &str) -> Result<Order, RepositoryError>;

    /// Move the order from `from` to `to`, optionally binding a courier.
    ///
    /// The update is conditional on the row still being in `from` (and, when
    /// binding, on no courier being set yet). Returns
    /// [`RepositoryError::Conflict`] if the row no longer matches.
    async fn update_status_tx(
        &self,
        tx: &Transaction<'_>,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        bind_courier: Option<&str>,
    ) -> Result<(), RepositoryError>;

    /// All orders placed by the given client, newest first.
    async fn list_by_client(&self, client_id: &str) -> Result<Vec<Order>, RepositoryError>;

    /// All orders placed at the given store, newest first.
    async fn list_by_store(&self, store_id: &str) -> Result<Vec<Order>, RepositoryError>;

    /// All orders bound to the given courier, newest first.
    async fn list_by_courier(&self, courier_id: &str) -> Result<Vec<Order>, RepositoryError>;

    /// Unassigned orders waiting for a courier.
    async fn list_waiting_courier(&self) -> Result<Vec<Order>, RepositoryError>;
}

/// PostgreSQL implementation of the OrdersRepository trait.
pub struct PgOrdersRepository {
    /// PostgreSQL client for database operations
    db: Client,
}

impl PgOrdersRepository {
    pub fn new(db: Client) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrdersRepository for PgOrdersRepository {
    async fn insert_tx(&self, tx: &Transaction<'_>, order: &Order) -> Result<(), RepositoryError> {
        let query = r#"
            INSERT INTO orders (
                id, client_id, store_id, courier_id, status, total_amount,
                delivery_fee, address, comment, created_at
            ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
        "#;
        tx.execute(
            query,
            &[
                &order.id,
                &order.client_id,
                &order.store_id,
                &order.courier_id,
                &order.status,
                &order.total_amount,
                &order.delivery_fee,
                &order.address,
                &order.comment,
                &order.created_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_by_id(&self, order_id: &str) -> Result<Order, RepositoryError> {
        let query = r#"
            SELECT id, client_id, store_id, courier_id, status, total_amount,
                   delivery_fee, address, comment, created_at
            FROM orders WHERE id = $1
        "#;
        let row = self.db.query_opt(query, &[&order_id]).await?;
        match row {
            Some(row) => Ok(order_from_row(&row)),
            None => Err(RepositoryError::NotFound),
        }
    }

    async fn update_status_tx(
        &self,
        tx: &Transaction<'_>,
        order_id: &str,
        from: OrderStatus,
        to: OrderStatus,
        bind_courier: Option<&str>,
    ) -> Result<(), RepositoryError> {
        let rows = match bind_courier {
            Some(courier_id) => {
                // First courier to accept wins: the guard on courier_id IS NULL
                // makes the second writer match no row.
                let query = r#"
                    UPDATE orders SET status = $3, courier_id = $4
                    WHERE id = $1 AND status = $2 AND courier_id IS NULL
                "#;
                tx.execute(query, &[&order_id, &from, &to, &courier_id])
                    .await?
            }
            None => {
                let query = r#"
                    UPDATE orders SET status = $3
                    WHERE id = $1 AND status = $2
                "#;
                tx.execute(query, &[&order_id, &from, &to]).await?
            }
        };
        if rows == 0 {
            return Err(RepositoryError::Conflict);
        }
        Ok(())
    }

    async fn list_by_client(&self, client_id: &str) -> Result<Vec<Order>, RepositoryError> {
        let query = r#"
            SELECT id, client_id, store_id, courier_id, status, total_amount,
                   delivery_fee, address, comment, created_at
            FROM orders WHERE client_id = $1 ORDER BY created_at DESC
        "#;
        let rows = self.db.query(query, &[&client_id]).await?;
        Ok(rows.iter().map(order_from_row).collect())
    }

    async fn list_by_store(&self, store_id: &str) -> Result<Vec<Order>, RepositoryError> {
        let query = r#"
            SELECT id, client_id, store_id, courier_id, status, total_amount,
                   delivery_fee, address, comment, created_at
            FROM orders WHERE store_id = $1 ORDER BY created_at DESC
        "#;
        let rows = self.db.query(query, &[&store_id]).await?;
        Ok(rows.iter().map(order_from_row).collect())
    }

    async fn list_by_courier(&self, courier_id: &str) -> Result<Vec<Order>, RepositoryError> {
        let query = r#"
            SELECT id, client_id, store_id, courier_id, status, total_amount,
                   delivery_fee, address, comment, created_at
            FROM orders WHERE courier_id = $1 ORDER BY created_at DESC
        "#;
        let rows = self.db.query(query, &[&courier_id]).await?;
        Ok(rows.iter().map(order_from_row).collect())
    }

    async fn list_waiting_courier(&self) -> Result<Vec<Order>, RepositoryError> {
        let query = r#"
            SELECT id, client_id, store_id, courier_id, status, total_amount,
                   delivery_fee, address, comment, created_at
            FROM orders WHERE status = $1 AND courier_id IS NULL
            ORDER BY created_at DESC
        "#;
        let rows = self
            .db
            .query(query, &[&OrderStatus::WaitingCourier])
            .await?;
        Ok(rows.iter().map(order_from_row).collect())
    }
}

/// # OrderItemsRepository
///
/// Repository interface for order line items.
/// Items are created once together with their order and never mutated.
#[async_trait]
pub trait OrderItemsRepository: Send + Sync {
    async fn insert_tx(
        &self,
        tx: &Transaction<'_>,
        items: &[OrderItem],
        order_id: &str,
    ) -> Result<(), RepositoryError>;
    async fn get_by_order_id(&self, order_id: &str) -> Result<Vec<OrderItem>, RepositoryError>;
}

/// PostgreSQL implementation of the OrderItemsRepository trait.
pub struct PgOrderItemsRepository {
    /// PostgreSQL client for database operations
    db: Client,
}

impl PgOrderItemsRepository {
    pub fn new(db: Client) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderItemsRepository for PgOrderItemsRepository {
    async fn insert_tx(
        &self,
        tx: &Transaction<'_>,
        items: &[OrderItem],
        order_id: &str,
    ) -> Result<(), RepositoryError> {
        let query = r#"
            INSERT INTO order_items (order_id, product_id, quantity, price)
            VALUES ($1, $2, $3, $4)
        "#;
        for it in items {
            tx.execute(query, &[&order_id, &it.product_id, &it.quantity, &it.price])
                .await?;
        }
        Ok(())
    }

    async fn get_by_order_id(&self, order_id: &str) -> Result<Vec<OrderItem>, RepositoryError> {
        let query = r#"
            SELECT product_id, quantity, price
            FROM order_items WHERE order_id = $1 ORDER BY id
        "#;
        let rows = self.db.query(query, &[&order_id]).await?;
        let mut items = Vec::new();
        for row in rows {
            items.push(OrderItem {
                product_id: row.get("product_id"),
                quantity: row.get("quantity"),
                price: row.get("price"),
            });
        }
        Ok(items)
    }
}

/// # OrderPhotosRepository
///
/// Repository interface for photographic evidence. Photos are append-only:
/// several photos of the same type may coexist and none is ever deleted.
#[async_trait]
pub trait OrderPhotosRepository: Send + Sync {
    async fn insert(&self, photo: &OrderPhoto) -> Result<(), RepositoryError>;
    async fn get_by_order_id(&self, order_id: &str) -> Result<Vec<OrderPhoto>, RepositoryError>;
}

/// PostgreSQL implementation of the OrderPhotosRepository trait.
pub struct PgOrderPhotosRepository {
    /// PostgreSQL client for database operations
    db: Client,
}

impl PgOrderPhotosRepository {
    pub fn new(db: Client) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderPhotosRepository for PgOrderPhotosRepository {
    async fn insert(&self, photo: &OrderPhoto) -> Result<(), RepositoryError> {
        let query = r#"
            INSERT INTO order_photos (order_id, url, type, created_at)
            VALUES ($1, $2, $3, $4)
        "#;
        self.db
            .execute(
                query,
                &[&photo.order_id, &photo.url, &photo.kind, &photo.created_at],
            )
            .await?;
        Ok(())
    }

    async fn get_by_order_id(&self, order_id: &str) -> Result<Vec<OrderPhoto>, RepositoryError> {
        let query = r#"
            SELECT order_id, url, type, created_at
            FROM order_photos WHERE order_id = $1 ORDER BY id
        "#;
        let rows = self.db.query(query, &[&order_id]).await?;
        let mut photos = Vec::new();
        for row in rows {
            photos.push(OrderPhoto {
                order_id: row.get("order_id"),
                url: row.get("url"),
                kind: row.get("type"),
                created_at: row.get("created_at"),
            });
        }
        Ok(photos)
    }
}

/// # OrderLogsRepository
///
/// Repository interface for the append-only audit trail. The ordered log
/// sequence for an order reconstructs its full status history; entries are
/// never mutated after insertion. A NULL user_id marks a system transition.
#[async_trait]
pub trait OrderLogsRepository: Send + Sync {
    async fn insert_tx(&self, tx: &Transaction<'_>, log: &OrderLog) -> Result<(), RepositoryError>;
    async fn get_by_order_id(&self, order_id: &str) -> Result<Vec<OrderLog>, RepositoryError>;
}

/// PostgreSQL implementation of the OrderLogsRepository trait.
pub struct PgOrderLogsRepository {
    /// PostgreSQL client for database operations
    db: Client,
}

impl PgOrderLogsRepository {
    pub fn new(db: Client) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderLogsRepository for PgOrderLogsRepository {
    async fn insert_tx(&self, tx: &Transaction<'_>, log: &OrderLog) -> Result<(), RepositoryError> {
        let query = r#"
            INSERT INTO order_logs (order_id, from_status, to_status, user_id, meta_lat, meta_lon, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#;
        let user_id = log.actor.user_id();
        let meta_lat = log.metadata.map(|g| g.lat);
        let meta_lon = log.metadata.map(|g| g.lon);
        tx.execute(
            query,
            &[
                &log.order_id,
                &log.from_status,
                &log.to_status,
                &user_id,
                &meta_lat,
                &meta_lon,
                &log.created_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn get_by_order_id(&self, order_id: &str) -> Result<Vec<OrderLog>, RepositoryError> {
        let query = r#"
            SELECT order_id, from_status, to_status, user_id, meta_lat, meta_lon, created_at
            FROM order_logs WHERE order_id = $1 ORDER BY id
        "#;
        let rows = self.db.query(query, &[&order_id]).await?;
        let mut logs = Vec::new();
        for row in rows {
            let lat: Option<f64> = row.get("meta_lat");
            let lon: Option<f64> = row.get("meta_lon");
            let metadata = match (lat, lon) {
                (Some(lat), Some(lon)) => Some(model::GeoPoint { lat, lon }),
                _ => None,
            };
            logs.push(OrderLog {
                order_id: row.get("order_id"),
                from_status: row.get("from_status"),
                to_status: row.get("to_status"),
                actor: model::LogActor::from_user_id(row.get("user_id")),
                metadata,
                created_at: row.get("created_at"),
            });
        }
        Ok(logs)
    }
}

/// # TransactionsRepository
///
/// Repository interface for settlement records (escrow mirror of the order
/// state). Rows are created only as side effects of specific transitions.
#[async_trait]
pub trait TransactionsRepository: Send + Sync {
    async fn insert_tx(
        &self,
        tx: &Transaction<'_>,
        entry: &model::Transaction,
    ) -> Result<(), RepositoryError>;

    /// Full ledger for the admin view, newest first.
    async fn list_all(&self) -> Result<Vec<model::Transaction>, RepositoryError>;
}

/// PostgreSQL implementation of the TransactionsRepository trait.
pub struct PgTransactionsRepository {
    /// PostgreSQL client for database operations
    db: Client,
}

impl PgTransactionsRepository {
    pub fn new(db: Client) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TransactionsRepository for PgTransactionsRepository {
    async fn insert_tx(
        &self,
        tx: &Transaction<'_>,
        entry: &model::Transaction,
    ) -> Result<(), RepositoryError> {
        let query = r#"
            INSERT INTO transactions (id, order_id, type, amount, created_at)
            VALUES ($1, $2, $3, $4, $5)
        "#;
        tx.execute(
            query,
            &[
                &entry.id,
                &entry.order_id,
                &entry.kind,
                &entry.amount,
                &entry.created_at,
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_all(&self) -> Result<Vec<model::Transaction>, RepositoryError> {
        let query = r#"
            SELECT id, order_id, type, amount, created_at
            FROM transactions ORDER BY created_at DESC
        "#;
        let rows = self.db.query(query, &[]).await?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(model::Transaction {
                id: row.get("id"),
                order_id: row.get("order_id"),
                kind: row.get("type"),
                amount: row.get("amount"),
                created_at: row.get("created_at"),
            });
        }
        Ok(entries)
    }
}

/// # ProductsRepository
///
/// Read-only view of the catalog: the lifecycle engine only needs product
/// price and store ownership at order-creation time.
#[async_trait]
pub trait ProductsRepository: Send + Sync {
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Product>, RepositoryError>;
}

/// PostgreSQL implementation of the ProductsRepository trait.
pub struct PgProductsRepository {
    /// PostgreSQL client for database operations
    db: Client,
}

impl PgProductsRepository {
    pub fn new(db: Client) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProductsRepository for PgProductsRepository {
    async fn find_by_ids(&self, ids: &[String]) -> Result<Vec<Product>, RepositoryError> {
        let query = r#"
            SELECT id, name, price, store_id
            FROM products WHERE id = ANY($1)
        "#;
        let rows = self.db.query(query, &[&ids]).await?;
        let mut products = Vec::new();
        for row in rows {
            products.push(Product {
                id: row.get("id"),
                name: row.get("name"),
                price: row.get("price"),
                store_id: row.get("store_id"),
            });
        }
        Ok(products)
    }
}
