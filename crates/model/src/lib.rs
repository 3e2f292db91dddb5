use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use std::fmt;

/// OrderStatus — этапы жизненного цикла заказа.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[postgres(name = "order_status")]
pub enum OrderStatus {
    #[postgres(name = "CREATED")]
    Created,
    #[postgres(name = "WAITING_PAYMENT")]
    WaitingPayment,
    #[postgres(name = "PAID")]
    Paid,
    #[postgres(name = "WAITING_STORE")]
    WaitingStore,
    #[postgres(name = "STORE_ACCEPTED")]
    StoreAccepted,
    #[postgres(name = "STORE_REJECTED")]
    StoreRejected,
    #[postgres(name = "ASSEMBLING")]
    Assembling,
    #[postgres(name = "READY_FOR_PICKUP")]
    ReadyForPickup,
    #[postgres(name = "WAITING_COURIER")]
    WaitingCourier,
    #[postgres(name = "COURIER_ACCEPTED")]
    CourierAccepted,
    #[postgres(name = "PICKED_UP")]
    PickedUp,
    #[postgres(name = "IN_DELIVERY")]
    InDelivery,
    #[postgres(name = "DELIVERED")]
    Delivered,
    #[postgres(name = "COMPLETED")]
    Completed,
    #[postgres(name = "PAYOUT")]
    Payout,
    #[postgres(name = "REFUND")]
    Refund,
    #[postgres(name = "DISPUTE")]
    Dispute,
    #[postgres(name = "ISSUE")]
    Issue,
    #[postgres(name = "CLOSED")]
    Closed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::WaitingPayment => "WAITING_PAYMENT",
            Self::Paid => "PAID",
            Self::WaitingStore => "WAITING_STORE",
            Self::StoreAccepted => "STORE_ACCEPTED",
            Self::StoreRejected => "STORE_REJECTED",
            Self::Assembling => "ASSEMBLING",
            Self::ReadyForPickup => "READY_FOR_PICKUP",
            Self::WaitingCourier => "WAITING_COURIER",
            Self::CourierAccepted => "COURIER_ACCEPTED",
            Self::PickedUp => "PICKED_UP",
            Self::InDelivery => "IN_DELIVERY",
            Self::Delivered => "DELIVERED",
            Self::Completed => "COMPLETED",
            Self::Payout => "PAYOUT",
            Self::Refund => "REFUND",
            Self::Dispute => "DISPUTE",
            Self::Issue => "ISSUE",
            Self::Closed => "CLOSED",
        }
    }

    /// Терминальный статус: дальнейшие переходы невозможны.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// UserRole — роль уже аутентифицированного пользователя.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UserRole {
    Client,
    Store,
    Courier,
    Admin,
}

impl UserRole {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CLIENT" => Some(Self::Client),
            "STORE" => Some(Self::Store),
            "COURIER" => Some(Self::Courier),
            "ADMIN" => Some(Self::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Client => "CLIENT",
            Self::Store => "STORE",
            Self::Courier => "COURIER",
            Self::Admin => "ADMIN",
        }
    }
}

/// PhotoType — тип фото-доказательства, прикрепляемого к заказу.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[postgres(name = "photo_type")]
pub enum PhotoType {
    #[postgres(name = "ASSEMBLY")]
    Assembly,
    #[postgres(name = "PICKUP")]
    Pickup,
    #[postgres(name = "DELIVERY")]
    Delivery,
}

/// TransactionType — вид финансовой операции по заказу.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSql, FromSql)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[postgres(name = "transaction_type")]
pub enum TransactionType {
    #[postgres(name = "PAYMENT")]
    Payment,
    #[postgres(name = "REFUND")]
    Refund,
    #[postgres(name = "PAYOUT")]
    Payout,
}

/// LogActor — кто выполнил переход: пользователь или система.
///
/// Системный актор хранится как NULL в колонке user_id, поэтому он
/// не может совпасть с идентификатором реального пользователя.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogActor {
    Human(String),
    System,
}

impl LogActor {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Self::Human(id) => Some(id),
            Self::System => None,
        }
    }

    pub fn from_user_id(id: Option<String>) -> Self {
        match id {
            Some(id) => Self::Human(id),
            None => Self::System,
        }
    }
}

/// GeoPoint — координаты, передаваемые при переходе (например, курьером).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

/// OrderItem — позиция заказа с ценой, зафиксированной при создании.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: i32,
    pub price: i64,
}

/// Order — основной агрегат заказа.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: String,
    pub client_id: String,
    pub store_id: String,
    pub courier_id: Option<String>,
    pub status: OrderStatus,
    pub total_amount: i64,
    pub delivery_fee: i64,
    pub address: String,
    pub comment: Option<String>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
}

/// OrderPhoto — фото-доказательство; записи только добавляются.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderPhoto {
    pub order_id: String,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: PhotoType,
    pub created_at: DateTime<Utc>,
}

/// OrderLog — запись журнала переходов; одна на каждый переход.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderLog {
    pub order_id: String,
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub actor: LogActor,
    pub metadata: Option<GeoPoint>,
    pub created_at: DateTime<Utc>,
}

/// Transaction — запись о движении средств по заказу.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub id: String,
    pub order_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

/// Product — товар каталога; движку нужны только цена и владелец.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub price: i64,
    pub store_id: String,
}

/// NewOrderItem — запрошенная позиция при создании заказа.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewOrderItem {
    pub product_id: String,
    pub quantity: i32,
}

/// NewOrder — запрос клиента на создание заказа.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewOrder {
    pub store_id: String,
    pub address: String,
    pub comment: Option<String>,
    pub items: Vec<NewOrderItem>,
}
