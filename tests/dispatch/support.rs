//! Test domain: a small order service wired onto the dispatcher.

use std::collections::HashMap;
use std::error::Error;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sourced_dispatch::events::{ListenerRegistry, RaisedEvents};
use sourced_dispatch::unit_of_work::{ErrorReporter, InMemoryTransactions, UnitOfWork};
use sourced_dispatch::{
    Command, DomainEvent, Failure, HandlerResult, IntegrationEvent, Message, Middleware, Next,
    Query,
};
use tracing_subscriber::EnvFilter;

pub type Log = Arc<Mutex<Vec<String>>>;

pub fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderId(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub id: OrderId,
    pub items: Vec<String>,
    pub paid: bool,
}

// -- Messages ---------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrder {
    pub items: Vec<String>,
}

impl Message for CreateOrder {
    fn message_name() -> &'static str {
        "order.create"
    }
}

impl Command for CreateOrder {
    type Output = OrderId;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOrder {
    pub id: String,
}

impl Message for CancelOrder {
    fn message_name() -> &'static str {
        "order.cancel"
    }
}

impl Command for CancelOrder {
    type Output = ();
}

#[derive(Debug)]
pub struct GetOrder {
    pub id: String,
}

impl Message for GetOrder {
    fn message_name() -> &'static str {
        "order.get"
    }
}

impl Query for GetOrder {
    type Output = Option<Order>;
}

#[derive(Debug, Clone)]
pub struct OrderPlaced {
    pub order_id: String,
    pub at: DateTime<Utc>,
}

impl OrderPlaced {
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            at: Utc::now(),
        }
    }
}

impl Message for OrderPlaced {
    fn message_name() -> &'static str {
        "order.placed"
    }
}

impl DomainEvent for OrderPlaced {
    fn occurred_at(&self) -> DateTime<Utc> {
        self.at
    }
}

#[derive(Debug, Clone)]
pub struct OrderPaid {
    pub order_id: String,
}

impl Message for OrderPaid {
    fn message_name() -> &'static str {
        "order.paid"
    }
}

impl DomainEvent for OrderPaid {
    fn occurred_at(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSettled {
    pub event_id: String,
    pub order_id: String,
    pub at: DateTime<Utc>,
}

impl PaymentSettled {
    pub fn new(event_id: &str, order_id: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            order_id: order_id.to_string(),
            at: Utc::now(),
        }
    }
}

impl Message for PaymentSettled {
    fn message_name() -> &'static str {
        "payment.settled"
    }
}

impl IntegrationEvent for PaymentSettled {
    fn event_id(&self) -> &str {
        &self.event_id
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.at
    }
}

// -- Store ------------------------------------------------------------------

/// In-memory order table with sequential ids.
#[derive(Clone, Default)]
pub struct OrderStore {
    orders: Arc<Mutex<HashMap<String, Order>>>,
    next: Arc<AtomicU32>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, items: &[String]) -> Result<OrderId, Failure> {
        if items.is_empty() {
            return Err(Failure::validation("an order needs at least one item"));
        }
        let id = OrderId(format!("ORD-{}", self.next.fetch_add(1, Ordering::SeqCst) + 1));
        let order = Order {
            id: id.clone(),
            items: items.to_vec(),
            paid: false,
        };
        self.orders.lock().unwrap().insert(id.0.clone(), order);
        Ok(id)
    }

    pub fn get(&self, id: &str) -> Option<Order> {
        self.orders.lock().unwrap().get(id).cloned()
    }

    pub fn mark_paid(&self, id: &str) -> Result<(), Failure> {
        let mut orders = self.orders.lock().unwrap();
        let order = orders
            .get_mut(id)
            .ok_or_else(|| Failure::custom("unknown_order", id))?;
        order.paid = true;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.orders.lock().unwrap().len()
    }
}

// -- Middleware -------------------------------------------------------------

/// Records `<name>-<message>` on the way in.
pub struct Tag {
    pub name: &'static str,
    pub log: Log,
}

impl Middleware<dyn Message, HandlerResult<()>> for Tag {
    fn handle(
        &self,
        message: &dyn Message,
        next: Next<'_, dyn Message, HandlerResult<()>>,
    ) -> HandlerResult<()> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}-{}", self.name, message.name()));
        next(message)
    }
}

impl Middleware<CreateOrder, HandlerResult<OrderId>> for Tag {
    fn handle(
        &self,
        command: &CreateOrder,
        next: Next<'_, CreateOrder, HandlerResult<OrderId>>,
    ) -> HandlerResult<OrderId> {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}-{}", self.name, CreateOrder::message_name()));
        next(command)
    }
}

// -- Wiring -----------------------------------------------------------------

#[derive(Default)]
pub struct Reports {
    pub errors: Mutex<Vec<String>>,
}

impl Reports {
    pub fn all(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl ErrorReporter for Reports {
    fn report(&self, error: &(dyn Error + 'static)) {
        self.errors.lock().unwrap().push(error.to_string());
    }
}

/// Listeners that log placed and paid orders. A settled payment marks the
/// order paid and raises `OrderPaid`.
pub fn listeners(log: &Log, store: &OrderStore) -> ListenerRegistry {
    let (placed, paid) = (Arc::clone(log), Arc::clone(log));
    let store = store.clone();
    ListenerRegistry::new()
        .on(move |event: &OrderPlaced, _: &mut RaisedEvents| {
            placed.lock().unwrap().push(format!("placed-{}", event.order_id));
            Ok(())
        })
        .on(move |event: &OrderPaid, _: &mut RaisedEvents| {
            paid.lock().unwrap().push(format!("paid-{}", event.order_id));
            Ok(())
        })
        .on_integration(move |event: &PaymentSettled, raised: &mut RaisedEvents| {
            store.mark_paid(&event.order_id)?;
            raised.raise(OrderPaid {
                order_id: event.order_id.clone(),
            });
            Ok(())
        })
}

/// Route crate logs to the test writer; `RUST_LOG=debug` to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub struct Harness {
    pub log: Log,
    pub store: OrderStore,
    pub transactions: InMemoryTransactions,
    pub reports: Arc<Reports>,
    pub unit_of_work: UnitOfWork,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        let log: Log = Arc::default();
        let store = OrderStore::new();
        let transactions = InMemoryTransactions::new();
        let reports = Arc::new(Reports::default());
        let unit_of_work = UnitOfWork::new(
            Arc::new(transactions.clone()),
            Arc::new(listeners(&log, &store)),
        )
        .with_reporter(reports.clone());

        Self {
            log,
            store,
            transactions,
            reports,
            unit_of_work,
        }
    }
}
