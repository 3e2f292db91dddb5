//! Business logic layer: the order lifecycle engine.
//!
//! This module defines the [`OrderService`] trait and its async implementation
//! [`OrderServiceImpl`]. The service owns the full order lifecycle: pricing and
//! creating orders, validating and executing status transitions (including the
//! automatic escrow cascade), appending photographic evidence, and serving the
//! role-scoped read projections.
//!
//! # Features
//! - Atomic multi-table writes in a single transaction; a failure anywhere
//!   (including the payment gateway during creation) rolls everything back.
//! - The transition table, geofence policy, and payment gateway are injected,
//!   keeping the decision core (`fsm` module) pure and unit-testable.
//! - Well-typed error handling via [`ServiceError`].

use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::{Pool, PoolError};
use model::{
    GeoPoint, LogActor, NewOrder, NewOrderItem, Order, OrderItem, OrderLog, OrderPhoto,
    OrderStatus, PhotoType, Product, UserRole,
};
use payment::{PaymentError, PaymentGateway};
use repository::{
    OrderItemsRepository, OrderLogsRepository, OrderPhotosRepository, OrdersRepository,
    ProductsRepository, RepositoryError, TransactionsRepository,
};
use serde::Serialize;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

pub mod fsm;
pub mod geo;

use fsm::{Effect, GeofencePolicy, TransitionTable, plan_transition};

/// Fixed delivery fee charged per order, in currency units.
pub const DELIVERY_FEE: i64 = 200;

/// The main error type for all operations in [`OrderService`] and [`OrderServiceImpl`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed input, missing products, or missing required evidence.
    #[error("Invalid request: {0}")]
    Validation(String),
    /// The referenced order does not exist.
    #[error("Order not found")]
    NotFound,
    /// The actor lacks the role or ownership the transition requires.
    #[error("Forbidden: {0}")]
    Forbidden(&'static str),
    /// The target status is not reachable from the current status.
    #[error("Transition from {from} to {to} is not permitted")]
    IllegalTransition { from: OrderStatus, to: OrderStatus },
    /// The payment gateway failed; the creation transaction is aborted.
    #[error("Payment gateway failure: {0}")]
    Upstream(#[from] PaymentError),
    /// A repository (database) operation failed.
    #[error("Database error: {0}")]
    Db(RepositoryError),
    /// Failed to obtain a database connection from the pool.
    #[error("Pool error: {0}")]
    Pool(#[from] PoolError),
    /// Some unexpected or unhandled error.
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl From<RepositoryError> for ServiceError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => Self::NotFound,
            other => Self::Db(other),
        }
    }
}

/// A freshly created order together with the payment redirect target.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedOrder {
    pub order: Order,
    pub confirmation_url: String,
}

/// Trait describing the order lifecycle operations.
///
/// Implementations are expected to guarantee atomicity: every operation
/// either applies all of its writes (status, logs, settlement) or none.
#[async_trait]
pub trait OrderService: Send + Sync {
    /// Prices and creates an order for the client, advancing it straight to
    /// WAITING_PAYMENT and creating a payment intent.
    ///
    /// No idempotency key is modeled: a retried call creates a second order
    /// and a second payment intent, so callers must submit at most once.
    ///
    /// # Errors
    /// Returns [`ServiceError::Validation`] if any requested product is
    /// unknown, [`ServiceError::Upstream`] if the gateway fails (the whole
    /// creation is rolled back), or [`ServiceError::Db`] for DB-level errors.
    async fn create_order(
        &self,
        client_id: &str,
        req: &NewOrder,
    ) -> Result<CreatedOrder, ServiceError>;

    /// Validates and executes a status transition on behalf of an
    /// authenticated actor, running any automatic cascade in the same
    /// transaction.
    ///
    /// # Errors
    /// [`ServiceError::NotFound`] for an unknown order,
    /// [`ServiceError::Validation`] for missing evidence or geolocation,
    /// [`ServiceError::IllegalTransition`] when the FSM forbids the move, and
    /// [`ServiceError::Forbidden`] when role or ownership checks fail.
    async fn change_status(
        &self,
        order_id: &str,
        next: OrderStatus,
        actor_id: &str,
        role: UserRole,
        metadata: Option<GeoPoint>,
    ) -> Result<Order, ServiceError>;

    /// Records that a photo of the given type exists for the order.
    async fn add_order_photo(
        &self,
        order_id: &str,
        url: &str,
        kind: PhotoType,
    ) -> Result<OrderPhoto, ServiceError>;

    /// Orders placed by the client, newest first, with items.
    async fn get_for_client(&self, client_id: &str) -> Result<Vec<Order>, ServiceError>;

    /// Orders placed at the store, newest first, with items.
    async fn get_for_store(&self, store_id: &str) -> Result<Vec<Order>, ServiceError>;

    /// Orders bound to the courier, newest first, with items.
    async fn get_for_courier(&self, courier_id: &str) -> Result<Vec<Order>, ServiceError>;

    /// Unassigned orders waiting for a courier.
    async fn get_available_for_courier(&self) -> Result<Vec<Order>, ServiceError>;

    /// The full settlement ledger, newest first (admin view).
    async fn get_transactions(&self) -> Result<Vec<model::Transaction>, ServiceError>;
}

/// Prices the requested items against the resolved products.
///
/// Line prices are snapshots of the product price at order time; the total
/// is their quantity-weighted sum. Fails if the resolved product set does
/// not cover the request (no partial orders).
pub fn price_items(
    products: &[Product],
    requested: &[NewOrderItem],
) -> Result<(i64, Vec<OrderItem>), ServiceError> {
    if requested.is_empty() {
        return Err(ServiceError::Validation("order has no items".into()));
    }
    if products.len() != requested.len() {
        return Err(ServiceError::Validation(
            "some products were not found".into(),
        ));
    }

    let mut total_amount = 0i64;
    let mut items = Vec::with_capacity(requested.len());
    for req in requested {
        if req.quantity < 1 {
            return Err(ServiceError::Validation(
                "quantity must be at least 1".into(),
            ));
        }
        let product = products
            .iter()
            .find(|p| p.id == req.product_id)
            .ok_or_else(|| ServiceError::Validation("some products were not found".into()))?;
        total_amount += product.price * i64::from(req.quantity);
        items.push(OrderItem {
            product_id: req.product_id.clone(),
            quantity: req.quantity,
            price: product.price,
        });
    }
    Ok((total_amount, items))
}

/// Async implementation of [`OrderService`] using the repository pattern.
///
/// Wires together the repositories, the payment gateway, the injected
/// transition table and geofence policy, and a Postgres connection pool for
/// transactional scopes.
pub struct OrderServiceImpl<R1, R2, R3, R4, R5, R6, G> {
    db_pool: Pool,
    orders_repo: R1,
    items_repo: R2,
    photos_repo: R3,
    logs_repo: R4,
    transactions_repo: R5,
    products_repo: R6,
    gateway: G,
    transitions: TransitionTable,
    geofence: GeofencePolicy,
}

impl<R1, R2, R3, R4, R5, R6, G> OrderServiceImpl<R1, R2, R3, R4, R5, R6, G>
where
    R1: OrdersRepository + Send + Sync,
    R2: OrderItemsRepository + Send + Sync,
    R3: OrderPhotosRepository + Send + Sync,
    R4: OrderLogsRepository + Send + Sync,
    R5: TransactionsRepository + Send + Sync,
    R6: ProductsRepository + Send + Sync,
    G: PaymentGateway + Send + Sync,
{
    /// Constructs a new [`OrderServiceImpl`] from the provided dependencies.
    ///
    /// This approach enables dependency injection and facilitates
    /// mocking/testing, including substituting an alternate transition table.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db_pool: Pool,
        orders_repo: R1,
        items_repo: R2,
        photos_repo: R3,
        logs_repo: R4,
        transactions_repo: R5,
        products_repo: R6,
        gateway: G,
        transitions: TransitionTable,
        geofence: GeofencePolicy,
    ) -> Self {
        Self {
            db_pool,
            orders_repo,
            items_repo,
            photos_repo,
            logs_repo,
            transactions_repo,
            products_repo,
            gateway,
            transitions,
            geofence,
        }
    }

    async fn fill_items(&self, orders: &mut [Order]) -> Result<(), ServiceError> {
        for order in orders.iter_mut() {
            order.items = self.items_repo.get_by_order_id(&order.id).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<R1, R2, R3, R4, R5, R6, G> OrderService for OrderServiceImpl<R1, R2, R3, R4, R5, R6, G>
where
    R1: OrdersRepository + Send + Sync,
    R2: OrderItemsRepository + Send + Sync,
    R3: OrderPhotosRepository + Send + Sync,
    R4: OrderLogsRepository + Send + Sync,
    R5: TransactionsRepository + Send + Sync,
    R6: ProductsRepository + Send + Sync,
    G: PaymentGateway + Send + Sync,
{
    #[instrument(skip(self, req))]
    async fn create_order(
        &self,
        client_id: &str,
        req: &NewOrder,
    ) -> Result<CreatedOrder, ServiceError> {
        let product_ids: Vec<String> = req.items.iter().map(|i| i.product_id.clone()).collect();
        let products = self.products_repo.find_by_ids(&product_ids).await?;
        let (total_amount, items) = price_items(&products, &req.items)?;

        let order = Order {
            id: Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            store_id: req.store_id.clone(),
            courier_id: None,
            status: OrderStatus::Created,
            total_amount,
            delivery_fee: DELIVERY_FEE,
            address: req.address.clone(),
            comment: req.comment.clone(),
            items,
            created_at: Utc::now(),
        };

        let mut client = self.db_pool.get().await.map_err(ServiceError::from)?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| ServiceError::Unexpected(format!("Begin transaction failed: {e}")))?;

        self.orders_repo.insert_tx(&tx, &order).await?;
        self.items_repo
            .insert_tx(&tx, &order.items, &order.id)
            .await?;
        self.logs_repo
            .insert_tx(
                &tx,
                &OrderLog {
                    order_id: order.id.clone(),
                    from_status: None,
                    to_status: OrderStatus::Created,
                    actor: LogActor::Human(client_id.to_string()),
                    metadata: None,
                    created_at: Utc::now(),
                },
            )
            .await?;

        // The order goes straight to WAITING_PAYMENT; there is nothing for
        // the client to do between creation and payment.
        self.orders_repo
            .update_status_tx(
                &tx,
                &order.id,
                OrderStatus::Created,
                OrderStatus::WaitingPayment,
                None,
            )
            .await?;
        self.logs_repo
            .insert_tx(
                &tx,
                &OrderLog {
                    order_id: order.id.clone(),
                    from_status: Some(OrderStatus::Created),
                    to_status: OrderStatus::WaitingPayment,
                    actor: LogActor::Human(client_id.to_string()),
                    metadata: None,
                    created_at: Utc::now(),
                },
            )
            .await?;

        // A gateway failure returns here and drops the transaction,
        // rolling back the whole creation.
        let grand_total = order.total_amount + order.delivery_fee;
        let intent = self.gateway.create_payment(grand_total, &order.id).await?;

        tx.commit()
            .await
            .map_err(|e| ServiceError::Unexpected(format!("Commit failed: {e}")))?;

        let order = Order {
            status: OrderStatus::WaitingPayment,
            ..order
        };
        Ok(CreatedOrder {
            order,
            confirmation_url: intent.confirmation_url,
        })
    }

    #[instrument(skip(self, metadata))]
    async fn change_status(
        &self,
        order_id: &str,
        next: OrderStatus,
        actor_id: &str,
        role: UserRole,
        metadata: Option<GeoPoint>,
    ) -> Result<Order, ServiceError> {
        let order = self.orders_repo.get_by_id(order_id).await?;
        let photos = self.photos_repo.get_by_order_id(order_id).await?;

        let effects = plan_transition(
            &self.transitions,
            &self.geofence,
            &order,
            &photos,
            next,
            actor_id,
            role,
            metadata,
        )?;

        let mut client = self.db_pool.get().await.map_err(ServiceError::from)?;
        let tx = client
            .transaction()
            .await
            .map_err(|e| ServiceError::Unexpected(format!("Begin transaction failed: {e}")))?;

        for effect in &effects {
            match effect {
                Effect::SetStatus {
                    from,
                    to,
                    bind_courier,
                } => {
                    // The guarded update loses against a concurrent writer;
                    // surface that as the transition no longer being legal.
                    self.orders_repo
                        .update_status_tx(&tx, order_id, *from, *to, bind_courier.as_deref())
                        .await
                        .map_err(|e| match e {
                            RepositoryError::Conflict => ServiceError::IllegalTransition {
                                from: *from,
                                to: *to,
                            },
                            other => ServiceError::from(other),
                        })?;
                }
                Effect::AppendLog {
                    from,
                    to,
                    actor,
                    metadata,
                } => {
                    self.logs_repo
                        .insert_tx(
                            &tx,
                            &OrderLog {
                                order_id: order_id.to_string(),
                                from_status: *from,
                                to_status: *to,
                                actor: actor.clone(),
                                metadata: *metadata,
                                created_at: Utc::now(),
                            },
                        )
                        .await?;
                }
                Effect::RecordTransaction { kind, amount } => {
                    self.transactions_repo
                        .insert_tx(
                            &tx,
                            &model::Transaction {
                                id: Uuid::new_v4().to_string(),
                                order_id: order_id.to_string(),
                                kind: *kind,
                                amount: *amount,
                                created_at: Utc::now(),
                            },
                        )
                        .await?;
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| ServiceError::Unexpected(format!("Commit failed: {e}")))?;

        let mut updated = self.orders_repo.get_by_id(order_id).await?;
        updated.items = self.items_repo.get_by_order_id(order_id).await?;
        Ok(updated)
    }

    #[instrument(skip(self, url))]
    async fn add_order_photo(
        &self,
        order_id: &str,
        url: &str,
        kind: PhotoType,
    ) -> Result<OrderPhoto, ServiceError> {
        // Existence gate only; the media bytes live with the storage collaborator.
        self.orders_repo.get_by_id(order_id).await?;

        let photo = OrderPhoto {
            order_id: order_id.to_string(),
            url: url.to_string(),
            kind,
            created_at: Utc::now(),
        };
        self.photos_repo.insert(&photo).await?;
        Ok(photo)
    }

    #[instrument(skip(self))]
    async fn get_for_client(&self, client_id: &str) -> Result<Vec<Order>, ServiceError> {
        let mut orders = self.orders_repo.list_by_client(client_id).await?;
        self.fill_items(&mut orders).await?;
        Ok(orders)
    }

    #[instrument(skip(self))]
    async fn get_for_store(&self, store_id: &str) -> Result<Vec<Order>, ServiceError> {
        let mut orders = self.orders_repo.list_by_store(store_id).await?;
        self.fill_items(&mut orders).await?;
        Ok(orders)
    }

    #[instrument(skip(self))]
    async fn get_for_courier(&self, courier_id: &str) -> Result<Vec<Order>, ServiceError> {
        let mut orders = self.orders_repo.list_by_courier(courier_id).await?;
        self.fill_items(&mut orders).await?;
        Ok(orders)
    }

    #[instrument(skip(self))]
    async fn get_available_for_courier(&self) -> Result<Vec<Order>, ServiceError> {
        Ok(self.orders_repo.list_waiting_courier().await?)
    }

    #[instrument(skip(self))]
    async fn get_transactions(&self) -> Result<Vec<model::Transaction>, ServiceError> {
        Ok(self.transactions_repo.list_all().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(id: &str, price: i64) -> Product {
        Product {
            id: id.to_string(),
            name: format!("product {id}"),
            price,
            store_id: "store-1".to_string(),
        }
    }

    fn requested(id: &str, quantity: i32) -> NewOrderItem {
        NewOrderItem {
            product_id: id.to_string(),
            quantity,
        }
    }

    #[test]
    fn test_pricing_snapshot() {
        // P1 costs 100, quantity 2: the total is 200 and the line price is
        // the snapshot of the product price.
        let (total, items) = price_items(&[product("P1", 100)], &[requested("P1", 2)]).unwrap();
        assert_eq!(total, 200);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price, 100);
        assert_eq!(items[0].quantity, 2);
    }

    #[test]
    fn test_pricing_multiple_lines() {
        let products = [product("P1", 100), product("P2", 250)];
        let (total, items) =
            price_items(&products, &[requested("P1", 2), requested("P2", 1)]).unwrap();
        assert_eq!(total, 450);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_pricing_rejects_missing_products() {
        // One of two products resolved: no partial order.
        let result = price_items(&[product("P1", 100)], &[requested("P1", 1), requested("P2", 1)]);
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_pricing_rejects_empty_order() {
        let result = price_items(&[], &[]);
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_pricing_rejects_non_positive_quantity() {
        let result = price_items(&[product("P1", 100)], &[requested("P1", 0)]);
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }
}
