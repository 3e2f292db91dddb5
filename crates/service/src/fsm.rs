//! The deterministic finite-state machine of the order lifecycle.
//!
//! A transition request is resolved in a fixed sequence: evidence
//! preconditions, FSM legality against the [`TransitionTable`], then
//! role/ownership authorization. A request that passes all three is turned
//! into an explicit list of [`Effect`]s — status write, audit-log append,
//! settlement insert — which the service executes inside one database
//! transaction. Automatic follow-ons (the PAID escrow cascade) are just
//! extra effects in the same list, so there is no hidden control flow.

use std::collections::HashMap;

use model::{
    GeoPoint, LogActor, Order, OrderPhoto, OrderStatus, PhotoType, TransactionType, UserRole,
};

use crate::geo;
use crate::ServiceError;

/// Immutable map of allowed transitions: current status to the set of
/// permitted next statuses. Built once at startup and injected into the
/// engine; tests may substitute an alternate table.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    allowed: HashMap<OrderStatus, Vec<OrderStatus>>,
}

impl TransitionTable {
    pub fn new(allowed: HashMap<OrderStatus, Vec<OrderStatus>>) -> Self {
        Self { allowed }
    }

    /// The production lifecycle table.
    pub fn standard() -> Self {
        use OrderStatus::*;
        Self::new(HashMap::from([
            (Created, vec![WaitingPayment]),
            (WaitingPayment, vec![Paid]),
            (Paid, vec![WaitingStore]),
            (WaitingStore, vec![StoreAccepted, StoreRejected]),
            (StoreAccepted, vec![Assembling]),
            (Assembling, vec![ReadyForPickup]),
            (ReadyForPickup, vec![WaitingCourier]),
            (WaitingCourier, vec![CourierAccepted]),
            (CourierAccepted, vec![PickedUp]),
            (PickedUp, vec![InDelivery]),
            (InDelivery, vec![Delivered]),
            (Delivered, vec![Completed, Dispute]),
            (Completed, vec![Payout]),
            (StoreRejected, vec![Refund]),
            (Refund, vec![Closed]),
            (Payout, vec![Closed]),
            (Dispute, vec![Closed, Refund]),
            (Issue, vec![Dispute]),
            (Closed, vec![]),
        ]))
    }

    pub fn allows(&self, from: OrderStatus, to: OrderStatus) -> bool {
        self.allowed
            .get(&from)
            .is_some_and(|targets| targets.contains(&to))
    }

    pub fn targets(&self, from: OrderStatus) -> &[OrderStatus] {
        self.allowed.get(&from).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Fixed reference point and radius for the courier pickup gate.
#[derive(Debug, Clone, Copy)]
pub struct GeofencePolicy {
    pub store_point: GeoPoint,
    pub radius_m: f64,
}

/// One step of a planned transition, executed inside a single database
/// transaction together with its siblings.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Guarded status write; `bind_courier` additionally claims the order
    /// for a courier (only set when entering COURIER_ACCEPTED).
    SetStatus {
        from: OrderStatus,
        to: OrderStatus,
        bind_courier: Option<String>,
    },
    /// Append an audit-log entry.
    AppendLog {
        from: Option<OrderStatus>,
        to: OrderStatus,
        actor: LogActor,
        metadata: Option<GeoPoint>,
    },
    /// Record a settlement row (escrow mirror of the order state).
    RecordTransaction { kind: TransactionType, amount: i64 },
}

// Which actor class a transition's *target* status belongs to.
const STORE_TARGETS: &[OrderStatus] = &[
    OrderStatus::StoreAccepted,
    OrderStatus::StoreRejected,
    OrderStatus::Assembling,
    OrderStatus::ReadyForPickup,
    OrderStatus::WaitingCourier,
];

const COURIER_TARGETS: &[OrderStatus] = &[
    OrderStatus::CourierAccepted,
    OrderStatus::PickedUp,
    OrderStatus::InDelivery,
    OrderStatus::Delivered,
];

const CLIENT_TARGETS: &[OrderStatus] = &[
    OrderStatus::WaitingPayment,
    OrderStatus::Paid,
    OrderStatus::Completed,
];

fn has_photo(photos: &[OrderPhoto], kind: PhotoType) -> bool {
    photos.iter().any(|p| p.kind == kind)
}

/// Evidence preconditions, checked before the FSM is even consulted.
fn check_evidence(
    geofence: &GeofencePolicy,
    photos: &[OrderPhoto],
    next: OrderStatus,
    metadata: Option<GeoPoint>,
) -> Result<(), ServiceError> {
    match next {
        OrderStatus::ReadyForPickup => {
            if !has_photo(photos, PhotoType::Assembly) {
                return Err(ServiceError::Validation(
                    "an ASSEMBLY photo is required".into(),
                ));
            }
        }
        OrderStatus::PickedUp => {
            let point = metadata
                .ok_or_else(|| ServiceError::Validation("geolocation is required".into()))?;
            let dist = geo::distance_m(point, geofence.store_point);
            if dist > geofence.radius_m {
                return Err(ServiceError::Validation(
                    "you are too far from the store".into(),
                ));
            }
            if !has_photo(photos, PhotoType::Pickup) {
                return Err(ServiceError::Validation(
                    "a PICKUP photo is required".into(),
                ));
            }
        }
        OrderStatus::Delivered => {
            if !has_photo(photos, PhotoType::Delivery) {
                return Err(ServiceError::Validation(
                    "a DELIVERY photo is required".into(),
                ));
            }
        }
        _ => {}
    }
    Ok(())
}

/// Role/ownership authorization keyed by the transition's target status.
fn validate_role(
    next: OrderStatus,
    role: UserRole,
    order: &Order,
    actor_id: &str,
) -> Result<(), ServiceError> {
    if STORE_TARGETS.contains(&next) {
        if role != UserRole::Store || order.store_id != actor_id {
            return Err(ServiceError::Forbidden(
                "only the store that owns the order manages assembly",
            ));
        }
    }

    if COURIER_TARGETS.contains(&next) {
        if role != UserRole::Courier {
            return Err(ServiceError::Forbidden("only a courier manages delivery"));
        }
        // Once a courier is bound, nobody else may drive the delivery.
        if let Some(courier_id) = &order.courier_id {
            if courier_id != actor_id {
                return Err(ServiceError::Forbidden(
                    "the order is assigned to another courier",
                ));
            }
        }
    }

    if CLIENT_TARGETS.contains(&next) {
        if role != UserRole::Client || order.client_id != actor_id {
            return Err(ServiceError::Forbidden(
                "only the client who placed the order manages payment and completion",
            ));
        }
    }

    Ok(())
}

/// Validate a transition request and resolve it into its effect sequence.
///
/// Checks run in the fixed order: evidence preconditions, FSM legality,
/// role/ownership. On success the returned effects carry the primary status
/// write and log entry, plus the automatic cascade where one is defined:
/// entering PAID records a PAYMENT settlement for total + delivery fee and
/// immediately advances the order to WAITING_STORE under the system actor.
#[allow(clippy::too_many_arguments)]
pub fn plan_transition(
    table: &TransitionTable,
    geofence: &GeofencePolicy,
    order: &Order,
    photos: &[OrderPhoto],
    next: OrderStatus,
    actor_id: &str,
    role: UserRole,
    metadata: Option<GeoPoint>,
) -> Result<Vec<Effect>, ServiceError> {
    check_evidence(geofence, photos, next, metadata)?;

    if !table.allows(order.status, next) {
        return Err(ServiceError::IllegalTransition {
            from: order.status,
            to: next,
        });
    }

    validate_role(next, role, order, actor_id)?;

    let bind_courier = (next == OrderStatus::CourierAccepted).then(|| actor_id.to_string());
    let mut effects = vec![
        Effect::SetStatus {
            from: order.status,
            to: next,
            bind_courier,
        },
        Effect::AppendLog {
            from: Some(order.status),
            to: next,
            actor: LogActor::Human(actor_id.to_string()),
            metadata,
        },
    ];

    if next == OrderStatus::Paid {
        effects.push(Effect::RecordTransaction {
            kind: TransactionType::Payment,
            amount: order.total_amount + order.delivery_fee,
        });
        effects.push(Effect::SetStatus {
            from: OrderStatus::Paid,
            to: OrderStatus::WaitingStore,
            bind_courier: None,
        });
        effects.push(Effect::AppendLog {
            from: Some(OrderStatus::Paid),
            to: OrderStatus::WaitingStore,
            actor: LogActor::System,
            metadata: None,
        });
    }

    // TODO: COMPLETED -> PAYOUT and STORE_REJECTED/DISPUTE -> REFUND stay
    // manual until the payout commission is decided; the edges exist in the
    // table but plan no settlement effects here.

    Ok(effects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use model::OrderItem;

    const ALL_STATUSES: &[OrderStatus] = &[
        OrderStatus::Created,
        OrderStatus::WaitingPayment,
        OrderStatus::Paid,
        OrderStatus::WaitingStore,
        OrderStatus::StoreAccepted,
        OrderStatus::StoreRejected,
        OrderStatus::Assembling,
        OrderStatus::ReadyForPickup,
        OrderStatus::WaitingCourier,
        OrderStatus::CourierAccepted,
        OrderStatus::PickedUp,
        OrderStatus::InDelivery,
        OrderStatus::Delivered,
        OrderStatus::Completed,
        OrderStatus::Payout,
        OrderStatus::Refund,
        OrderStatus::Dispute,
        OrderStatus::Issue,
        OrderStatus::Closed,
    ];

    const STORE_POINT: GeoPoint = GeoPoint {
        lat: 54.8886544,
        lon: 47.5303257,
    };

    fn geofence() -> GeofencePolicy {
        GeofencePolicy {
            store_point: STORE_POINT,
            radius_m: 500.0,
        }
    }

    fn sample_order(status: OrderStatus) -> Order {
        Order {
            id: "order-1".to_string(),
            client_id: "client-1".to_string(),
            store_id: "store-1".to_string(),
            courier_id: None,
            status,
            total_amount: 200,
            delivery_fee: 200,
            address: "Ploshad Mira 15".to_string(),
            comment: None,
            items: vec![OrderItem {
                product_id: "P1".to_string(),
                quantity: 2,
                price: 100,
            }],
            created_at: Utc::now(),
        }
    }

    fn photo(kind: PhotoType) -> OrderPhoto {
        OrderPhoto {
            order_id: "order-1".to_string(),
            url: format!("/uploads/{kind:?}.jpg"),
            kind,
            created_at: Utc::now(),
        }
    }

    fn all_photos() -> Vec<OrderPhoto> {
        vec![
            photo(PhotoType::Assembly),
            photo(PhotoType::Pickup),
            photo(PhotoType::Delivery),
        ]
    }

    /// Actor that passes the role check for the given target, so closure
    /// tests exercise the FSM alone.
    fn actor_for(target: OrderStatus) -> (&'static str, UserRole) {
        if STORE_TARGETS.contains(&target) {
            ("store-1", UserRole::Store)
        } else if COURIER_TARGETS.contains(&target) {
            ("courier-1", UserRole::Courier)
        } else if CLIENT_TARGETS.contains(&target) {
            ("client-1", UserRole::Client)
        } else {
            ("client-1", UserRole::Client)
        }
    }

    #[test]
    fn test_standard_table_edges() {
        let table = TransitionTable::standard();
        assert!(table.allows(OrderStatus::Created, OrderStatus::WaitingPayment));
        assert!(table.allows(OrderStatus::Delivered, OrderStatus::Dispute));
        assert!(table.allows(OrderStatus::Dispute, OrderStatus::Refund));
        assert!(!table.allows(OrderStatus::Created, OrderStatus::Paid));
        assert!(table.targets(OrderStatus::Closed).is_empty());
    }

    #[test]
    fn test_fsm_closure() {
        // Every transition outside the table must fail with
        // IllegalTransition, with evidence and role satisfied.
        let table = TransitionTable::standard();
        let photos = all_photos();

        for &from in ALL_STATUSES {
            let mut order = sample_order(from);
            order.courier_id = Some("courier-1".to_string());
            for &to in ALL_STATUSES {
                if table.allows(from, to) {
                    continue;
                }
                let (actor, role) = actor_for(to);
                let result = plan_transition(
                    &table,
                    &geofence(),
                    &order,
                    &photos,
                    to,
                    actor,
                    role,
                    Some(STORE_POINT),
                );
                match result {
                    Err(ServiceError::IllegalTransition { from: f, to: t }) => {
                        assert_eq!(f, from);
                        assert_eq!(t, to);
                    }
                    other => panic!("expected IllegalTransition for {from} -> {to}, got {other:?}"),
                }
            }
        }
    }

    #[test]
    fn test_legal_transitions_plan_effects() {
        let table = TransitionTable::standard();
        let photos = all_photos();

        for &from in ALL_STATUSES {
            let mut order = sample_order(from);
            order.courier_id = Some("courier-1".to_string());
            for &to in table.targets(from) {
                let (actor, role) = actor_for(to);
                let effects = plan_transition(
                    &table,
                    &geofence(),
                    &order,
                    &photos,
                    to,
                    actor,
                    role,
                    Some(STORE_POINT),
                )
                .unwrap_or_else(|e| panic!("{from} -> {to} should plan, got {e:?}"));
                assert!(effects.len() >= 2);
            }
        }
    }

    #[test]
    fn test_assembly_photo_gates_ready_for_pickup() {
        let table = TransitionTable::standard();
        let order = sample_order(OrderStatus::Assembling);

        let missing = plan_transition(
            &table,
            &geofence(),
            &order,
            &[],
            OrderStatus::ReadyForPickup,
            "store-1",
            UserRole::Store,
            None,
        );
        assert!(matches!(missing, Err(ServiceError::Validation(_))));

        // Same transition succeeds once one ASSEMBLY photo exists.
        let effects = plan_transition(
            &table,
            &geofence(),
            &order,
            &[photo(PhotoType::Assembly)],
            OrderStatus::ReadyForPickup,
            "store-1",
            UserRole::Store,
            None,
        )
        .unwrap();
        assert_eq!(effects.len(), 2);
    }

    #[test]
    fn test_pickup_requires_geolocation() {
        let table = TransitionTable::standard();
        let mut order = sample_order(OrderStatus::CourierAccepted);
        order.courier_id = Some("courier-1".to_string());

        let missing = plan_transition(
            &table,
            &geofence(),
            &order,
            &[photo(PhotoType::Pickup)],
            OrderStatus::PickedUp,
            "courier-1",
            UserRole::Courier,
            None,
        );
        assert!(matches!(missing, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_pickup_geofence() {
        let table = TransitionTable::standard();
        let mut order = sample_order(OrderStatus::CourierAccepted);
        order.courier_id = Some("courier-1".to_string());
        let photos = vec![photo(PhotoType::Pickup)];

        // A point a whole degree of latitude away is far outside 500 m.
        let far = GeoPoint {
            lat: STORE_POINT.lat + 1.0,
            lon: STORE_POINT.lon,
        };
        let too_far = plan_transition(
            &table,
            &geofence(),
            &order,
            &photos,
            OrderStatus::PickedUp,
            "courier-1",
            UserRole::Courier,
            Some(far),
        );
        assert!(matches!(too_far, Err(ServiceError::Validation(_))));

        let at_store = plan_transition(
            &table,
            &geofence(),
            &order,
            &photos,
            OrderStatus::PickedUp,
            "courier-1",
            UserRole::Courier,
            Some(STORE_POINT),
        )
        .unwrap();
        assert_eq!(at_store.len(), 2);
        // The reported location ends up in the audit log.
        assert!(matches!(
            &at_store[1],
            Effect::AppendLog {
                metadata: Some(p),
                ..
            } if p.lat == STORE_POINT.lat
        ));
    }

    #[test]
    fn test_pickup_requires_photo() {
        let table = TransitionTable::standard();
        let mut order = sample_order(OrderStatus::CourierAccepted);
        order.courier_id = Some("courier-1".to_string());

        let missing = plan_transition(
            &table,
            &geofence(),
            &order,
            &[],
            OrderStatus::PickedUp,
            "courier-1",
            UserRole::Courier,
            Some(STORE_POINT),
        );
        assert!(matches!(missing, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_delivery_photo_gates_delivered() {
        let table = TransitionTable::standard();
        let mut order = sample_order(OrderStatus::InDelivery);
        order.courier_id = Some("courier-1".to_string());

        let missing = plan_transition(
            &table,
            &geofence(),
            &order,
            &[],
            OrderStatus::Delivered,
            "courier-1",
            UserRole::Courier,
            None,
        );
        assert!(matches!(missing, Err(ServiceError::Validation(_))));
    }

    #[test]
    fn test_role_gating() {
        let table = TransitionTable::standard();
        let order = sample_order(OrderStatus::WaitingStore);

        // A courier cannot accept on behalf of the store, FSM validity aside.
        let courier = plan_transition(
            &table,
            &geofence(),
            &order,
            &[],
            OrderStatus::StoreAccepted,
            "courier-1",
            UserRole::Courier,
            None,
        );
        assert!(matches!(courier, Err(ServiceError::Forbidden(_))));

        // Neither can a different store.
        let other_store = plan_transition(
            &table,
            &geofence(),
            &order,
            &[],
            OrderStatus::StoreAccepted,
            "store-2",
            UserRole::Store,
            None,
        );
        assert!(matches!(other_store, Err(ServiceError::Forbidden(_))));

        // The owning store succeeds.
        let owner = plan_transition(
            &table,
            &geofence(),
            &order,
            &[],
            OrderStatus::StoreAccepted,
            "store-1",
            UserRole::Store,
            None,
        )
        .unwrap();
        assert_eq!(owner.len(), 2);
    }

    #[test]
    fn test_client_cannot_manage_other_clients_order() {
        let table = TransitionTable::standard();
        let order = sample_order(OrderStatus::WaitingPayment);

        let stranger = plan_transition(
            &table,
            &geofence(),
            &order,
            &[],
            OrderStatus::Paid,
            "client-2",
            UserRole::Client,
            None,
        );
        assert!(matches!(stranger, Err(ServiceError::Forbidden(_))));
    }

    #[test]
    fn test_courier_binding() {
        let table = TransitionTable::standard();
        let order = sample_order(OrderStatus::WaitingCourier);

        let effects = plan_transition(
            &table,
            &geofence(),
            &order,
            &[],
            OrderStatus::CourierAccepted,
            "courier-1",
            UserRole::Courier,
            None,
        )
        .unwrap();
        assert_eq!(
            effects[0],
            Effect::SetStatus {
                from: OrderStatus::WaitingCourier,
                to: OrderStatus::CourierAccepted,
                bind_courier: Some("courier-1".to_string()),
            }
        );
    }

    #[test]
    fn test_bound_courier_excludes_others() {
        let table = TransitionTable::standard();
        let mut order = sample_order(OrderStatus::PickedUp);
        order.courier_id = Some("courier-1".to_string());

        let other = plan_transition(
            &table,
            &geofence(),
            &order,
            &[],
            OrderStatus::InDelivery,
            "courier-2",
            UserRole::Courier,
            None,
        );
        assert!(matches!(other, Err(ServiceError::Forbidden(_))));

        let bound = plan_transition(
            &table,
            &geofence(),
            &order,
            &[],
            OrderStatus::InDelivery,
            "courier-1",
            UserRole::Courier,
            None,
        );
        assert!(bound.is_ok());
    }

    #[test]
    fn test_paid_cascade() {
        let table = TransitionTable::standard();
        let order = sample_order(OrderStatus::WaitingPayment);

        let effects = plan_transition(
            &table,
            &geofence(),
            &order,
            &[],
            OrderStatus::Paid,
            "client-1",
            UserRole::Client,
            None,
        )
        .unwrap();

        assert_eq!(
            effects,
            vec![
                Effect::SetStatus {
                    from: OrderStatus::WaitingPayment,
                    to: OrderStatus::Paid,
                    bind_courier: None,
                },
                Effect::AppendLog {
                    from: Some(OrderStatus::WaitingPayment),
                    to: OrderStatus::Paid,
                    actor: LogActor::Human("client-1".to_string()),
                    metadata: None,
                },
                Effect::RecordTransaction {
                    kind: TransactionType::Payment,
                    amount: 400, // total 200 + delivery fee 200
                },
                Effect::SetStatus {
                    from: OrderStatus::Paid,
                    to: OrderStatus::WaitingStore,
                    bind_courier: None,
                },
                Effect::AppendLog {
                    from: Some(OrderStatus::Paid),
                    to: OrderStatus::WaitingStore,
                    actor: LogActor::System,
                    metadata: None,
                },
            ]
        );
    }

    #[test]
    fn test_no_settlement_outside_paid() {
        // The PAYOUT/REFUND edges exist but plan no settlement yet.
        let table = TransitionTable::standard();
        let order = sample_order(OrderStatus::Completed);

        let effects = plan_transition(
            &table,
            &geofence(),
            &order,
            &[],
            OrderStatus::Payout,
            "anyone",
            UserRole::Admin,
            None,
        )
        .unwrap();
        assert!(
            effects
                .iter()
                .all(|e| !matches!(e, Effect::RecordTransaction { .. }))
        );
    }

    #[test]
    fn test_alternate_table_injection() {
        // The engine consults whatever table it was given.
        let table = TransitionTable::new(HashMap::from([(
            OrderStatus::Created,
            vec![OrderStatus::Closed],
        )]));
        let mut order = sample_order(OrderStatus::Created);
        order.client_id = "client-1".to_string();

        assert!(table.allows(OrderStatus::Created, OrderStatus::Closed));
        let effects = plan_transition(
            &table,
            &geofence(),
            &order,
            &[],
            OrderStatus::Closed,
            "client-1",
            UserRole::Client,
            None,
        )
        .unwrap();
        assert_eq!(effects.len(), 2);

        let denied = plan_transition(
            &table,
            &geofence(),
            &order,
            &[],
            OrderStatus::WaitingPayment,
            "client-1",
            UserRole::Client,
            None,
        );
        assert!(matches!(
            denied,
            Err(ServiceError::IllegalTransition { .. })
        ));
    }

    /// Drives the whole happy path through the planner, applying effects to
    /// an in-memory order the way the service applies them to the database.
    #[test]
    fn test_happy_path_scenario() {
        let table = TransitionTable::standard();
        let gf = geofence();
        let mut order = sample_order(OrderStatus::WaitingPayment);
        let mut photos: Vec<OrderPhoto> = Vec::new();
        let mut logs: Vec<(Option<OrderStatus>, OrderStatus, LogActor)> = Vec::new();
        let mut settlements: Vec<(TransactionType, i64)> = Vec::new();

        fn apply(
            order: &mut Order,
            logs: &mut Vec<(Option<OrderStatus>, OrderStatus, LogActor)>,
            settlements: &mut Vec<(TransactionType, i64)>,
            effects: Vec<Effect>,
        ) {
            for effect in effects {
                match effect {
                    Effect::SetStatus {
                        to, bind_courier, ..
                    } => {
                        order.status = to;
                        if let Some(courier) = bind_courier {
                            order.courier_id = Some(courier);
                        }
                    }
                    Effect::AppendLog {
                        from, to, actor, ..
                    } => logs.push((from, to, actor)),
                    Effect::RecordTransaction { kind, amount } => settlements.push((kind, amount)),
                }
            }
        }

        let steps: &[(OrderStatus, &str, UserRole, Option<GeoPoint>)] = &[
            (OrderStatus::Paid, "client-1", UserRole::Client, None),
            (OrderStatus::StoreAccepted, "store-1", UserRole::Store, None),
            (OrderStatus::Assembling, "store-1", UserRole::Store, None),
            (
                OrderStatus::ReadyForPickup,
                "store-1",
                UserRole::Store,
                None,
            ),
            (
                OrderStatus::WaitingCourier,
                "store-1",
                UserRole::Store,
                None,
            ),
            (
                OrderStatus::CourierAccepted,
                "courier-1",
                UserRole::Courier,
                None,
            ),
            (
                OrderStatus::PickedUp,
                "courier-1",
                UserRole::Courier,
                Some(STORE_POINT),
            ),
            (
                OrderStatus::InDelivery,
                "courier-1",
                UserRole::Courier,
                None,
            ),
            (
                OrderStatus::Delivered,
                "courier-1",
                UserRole::Courier,
                None,
            ),
        ];

        for &(next, actor, role, metadata) in steps {
            // The store and courier attach the required evidence as they go.
            match next {
                OrderStatus::ReadyForPickup => photos.push(photo(PhotoType::Assembly)),
                OrderStatus::PickedUp => photos.push(photo(PhotoType::Pickup)),
                OrderStatus::Delivered => photos.push(photo(PhotoType::Delivery)),
                _ => {}
            }
            let effects = plan_transition(
                &table, &gf, &order, &photos, next, actor, role, metadata,
            )
            .unwrap_or_else(|e| panic!("step to {next} failed: {e:?}"));
            apply(&mut order, &mut logs, &mut settlements, effects);
        }

        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.courier_id.as_deref(), Some("courier-1"));
        // Nine requested transitions plus the one automatic cascade.
        assert_eq!(logs.len(), 10);
        assert_eq!(
            logs[2],
            (
                Some(OrderStatus::Paid),
                OrderStatus::WaitingStore,
                LogActor::System
            )
        );
        assert_eq!(settlements, vec![(TransactionType::Payment, 400)]);
    }
}
