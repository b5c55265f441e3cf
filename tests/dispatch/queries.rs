//! Query dispatch.

use std::sync::Arc;

use sourced_dispatch::{
    Dispatcher, HandlerResult, InMemoryContainer, Middleware, Next, QueryHandler, Reason,
};

use crate::support::{entries, CreateOrder, GetOrder, Harness, Log, Order, OrderId, OrderStore, Tag};

struct FindOrder {
    store: OrderStore,
}

impl QueryHandler<GetOrder> for FindOrder {
    fn handle(&self, query: &GetOrder) -> HandlerResult<Option<Order>> {
        Ok(self.store.get(&query.id))
    }
}

fn order_dispatcher(harness: &Harness) -> Dispatcher {
    let store = harness.store.clone();
    Dispatcher::builder(harness.unit_of_work.clone())
        .middleware(Arc::new(Tag {
            name: "global",
            log: harness.log.clone(),
        }))
        .command(move |command: &CreateOrder| -> HandlerResult<OrderId> {
            Ok(store.insert(&command.items)?)
        })
        .unwrap()
        .query_handler::<GetOrder>(Arc::new(FindOrder {
            store: harness.store.clone(),
        }))
        .unwrap()
        .build()
}

#[test]
fn query_reads_what_a_command_wrote() {
    let harness = Harness::new();
    let dispatcher = order_dispatcher(&harness);

    let id = dispatcher
        .dispatch_command(CreateOrder {
            items: vec!["SKU-1".into(), "SKU-2".into()],
        })
        .unwrap();
    let order = dispatcher
        .dispatch_query(GetOrder { id: id.0.clone() })
        .unwrap()
        .unwrap();

    assert_eq!(order.items, vec!["SKU-1", "SKU-2"]);
    assert!(!order.paid);
    assert_eq!(entries(&harness.log), vec!["global-order.create", "global-order.get"]);
}

#[test]
fn missing_row_is_a_value_not_a_failure() {
    let harness = Harness::new();
    let dispatcher = order_dispatcher(&harness);

    let found = dispatcher
        .dispatch_query(GetOrder { id: "ORD-404".into() })
        .unwrap();
    assert!(found.is_none());
}

#[test]
fn unregistered_query_is_handler_not_found() {
    let harness = Harness::new();
    let dispatcher = Dispatcher::builder(harness.unit_of_work.clone()).build();

    let failure = dispatcher
        .dispatch_query(GetOrder { id: "ORD-1".into() })
        .unwrap_err();
    assert_eq!(failure.reason, Reason::HandlerNotFound);
}

struct Cached(Log);

impl Middleware<GetOrder, HandlerResult<Option<Order>>> for Cached {
    fn handle(
        &self,
        query: &GetOrder,
        next: Next<'_, GetOrder, HandlerResult<Option<Order>>>,
    ) -> HandlerResult<Option<Order>> {
        if query.id == "ORD-CACHED" {
            self.0.lock().unwrap().push("cache-hit".into());
            return Ok(Some(Order {
                id: OrderId(query.id.clone()),
                items: vec!["SKU-C".into()],
                paid: true,
            }));
        }
        next(query)
    }
}

#[test]
fn query_middleware_may_answer_without_the_handler() {
    let harness = Harness::new();
    let dispatcher = Dispatcher::builder(harness.unit_of_work.clone())
        .query_middleware::<GetOrder>(Arc::new(Cached(harness.log.clone())))
        .query(|_: &GetOrder| -> HandlerResult<Option<Order>> { Ok(None) })
        .unwrap()
        .build();

    let cached = dispatcher
        .dispatch_query(GetOrder {
            id: "ORD-CACHED".into(),
        })
        .unwrap();
    let missed = dispatcher
        .dispatch_query(GetOrder { id: "ORD-1".into() })
        .unwrap();

    assert!(cached.unwrap().paid);
    assert!(missed.is_none());
    assert_eq!(entries(&harness.log), vec!["cache-hit"]);
}

#[test]
fn named_query_handler_is_resolved_per_dispatch() {
    let harness = Harness::new();
    harness.store.insert(&["SKU-1".to_string()]).unwrap();
    let container = InMemoryContainer::new().with(
        "queries.find_order",
        FindOrder {
            store: harness.store.clone(),
        },
    );

    let dispatcher = Dispatcher::builder(harness.unit_of_work.clone())
        .container(Arc::new(container))
        .named_query::<GetOrder, FindOrder>("queries.find_order")
        .unwrap()
        .build();

    let order = dispatcher
        .dispatch_query(GetOrder { id: "ORD-1".into() })
        .unwrap();
    assert!(order.is_some());
}
