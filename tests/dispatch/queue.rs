//! Queued commands and name-based envelope dispatch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sourced_dispatch::bus::{Encoding, Envelope, InMemoryQueue, PublishError};
use sourced_dispatch::{
    Command, DispatchConfig, Dispatcher, HandlerResult, Message, Middleware, Next, Reason,
};

use crate::support::{CreateOrder, Harness, OrderId};

fn queued_dispatcher(harness: &Harness, queue: &InMemoryQueue) -> Dispatcher {
    let store = harness.store.clone();
    Dispatcher::builder(harness.unit_of_work.clone())
        .command(move |command: &CreateOrder| -> HandlerResult<OrderId> {
            Ok(store.insert(&command.items)?)
        })
        .unwrap()
        .queue(Arc::new(queue.clone()), "orders")
        .build()
}

#[test]
fn queue_command_returns_before_the_handler_runs() {
    let harness = Harness::new();
    let queue = InMemoryQueue::new();
    let dispatcher = queued_dispatcher(&harness, &queue);

    dispatcher.queue_command(CreateOrder {
        items: vec!["SKU-1".into()],
    });

    assert_eq!(harness.store.len(), 0);
    let queued = queue.queued("orders");
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].message_type, "order.create");
    assert!(queued[0].id.starts_with("cmd-"));
}

#[test]
fn queued_envelope_dispatches_to_the_handler() {
    let harness = Harness::new();
    let queue = InMemoryQueue::new();
    let dispatcher = queued_dispatcher(&harness, &queue);

    dispatcher.queue_command(CreateOrder {
        items: vec!["SKU-1".into()],
    });
    dispatcher.queue_command(CreateOrder {
        items: vec!["SKU-2".into()],
    });

    let queued = queue.queued("orders");
    assert_ne!(queued[0].id, queued[1].id);
    for envelope in &queued {
        dispatcher.dispatch_envelope(envelope).unwrap();
    }

    assert_eq!(harness.store.len(), 2);
    assert_eq!(harness.store.get("ORD-2").unwrap().items, vec!["SKU-2"]);
}

#[test]
fn missing_queue_is_reported_not_returned() {
    let harness = Harness::new();
    let dispatcher = Dispatcher::builder(harness.unit_of_work.clone()).build();

    dispatcher.queue_command(CreateOrder {
        items: vec!["SKU-1".into()],
    });

    assert_eq!(
        harness.reports.all(),
        vec!["no transport configured for command queue"]
    );
}

#[test]
fn json_encoding_is_readable_on_the_wire() {
    let harness = Harness::new();
    let queue = InMemoryQueue::new();
    let store = harness.store.clone();
    let dispatcher = Dispatcher::builder(harness.unit_of_work.clone())
        .command(move |command: &CreateOrder| -> HandlerResult<OrderId> {
            Ok(store.insert(&command.items)?)
        })
        .unwrap()
        .queue(Arc::new(queue.clone()), "orders")
        .encoding(Encoding::Json)
        .build();

    dispatcher.queue_command(CreateOrder {
        items: vec!["SKU-1".into()],
    });

    let envelope = queue.queued("orders").remove(0);
    assert_eq!(envelope.payload_str(), Some(r#"{"items":["SKU-1"]}"#));
    dispatcher.dispatch_envelope(&envelope).unwrap();
    assert_eq!(harness.store.len(), 1);
}

#[test]
fn config_names_the_command_queue() {
    let harness = Harness::new();
    let queue = InMemoryQueue::new();
    let config = DispatchConfig::from_json(r#"{ "command_queue": "orders.commands" }"#).unwrap();

    let dispatcher = Dispatcher::builder(harness.unit_of_work.clone())
        .queue(Arc::new(queue.clone()), "orders")
        .config(&config)
        .unwrap()
        .build();

    dispatcher.queue_command(CreateOrder {
        items: vec!["SKU-1".into()],
    });
    assert_eq!(dispatcher.queue_name(), "orders.commands");
    assert_eq!(queue.queue_len("orders.commands"), 1);
    assert_eq!(queue.queue_len("orders"), 0);
}

#[test]
fn config_without_a_queue_keeps_the_builder_queue() {
    let harness = Harness::new();
    let queue = InMemoryQueue::new();
    let config = DispatchConfig::from_json(r#"{ "default_attempts": 3 }"#).unwrap();

    let dispatcher = Dispatcher::builder(harness.unit_of_work.clone())
        .queue(Arc::new(queue.clone()), "orders")
        .config(&config)
        .unwrap()
        .build();

    dispatcher.queue_command(CreateOrder {
        items: vec!["SKU-1".into()],
    });
    assert_eq!(dispatcher.queue_name(), "orders");
    assert_eq!(queue.queue_len("orders"), 1);
    assert_eq!(queue.queue_len("commands"), 0);
    assert_eq!(dispatcher.unit_of_work().default_attempts(), 3);
}

#[test]
fn unnamed_queue_defaults_to_commands() {
    let harness = Harness::new();
    let dispatcher = Dispatcher::builder(harness.unit_of_work.clone())
        .config(&DispatchConfig::default())
        .unwrap()
        .build();

    assert_eq!(dispatcher.queue_name(), "commands");
}

struct Stamp;

impl Middleware<Envelope, Result<(), PublishError>> for Stamp {
    fn handle(
        &self,
        envelope: &Envelope,
        next: Next<'_, Envelope, Result<(), PublishError>>,
    ) -> Result<(), PublishError> {
        next(&envelope.clone().with_metadata("tenant", "acme"))
    }
}

#[test]
fn queue_middleware_wraps_every_push() {
    let harness = Harness::new();
    let queue = InMemoryQueue::new();
    let dispatcher = Dispatcher::builder(harness.unit_of_work.clone())
        .queue(Arc::new(queue.clone()), "orders")
        .queue_middleware(Arc::new(Stamp))
        .build();

    dispatcher.queue_command(CreateOrder {
        items: vec!["SKU-1".into()],
    });

    assert_eq!(queue.queued("orders")[0].metadata("tenant"), Some("acme"));
}

// -- Envelope routing -------------------------------------------------------

#[test]
fn unknown_message_type_is_handler_not_found() {
    let harness = Harness::new();
    let queue = InMemoryQueue::new();
    let dispatcher = queued_dispatcher(&harness, &queue);

    let envelope = Envelope::with_string_payload("cmd-1", "order.refund", "{}");
    let failure = dispatcher.dispatch_envelope(&envelope).unwrap_err();
    assert_eq!(failure.reason, Reason::HandlerNotFound);
}

#[test]
fn undecodable_payload_is_decode_failed() {
    let harness = Harness::new();
    let queue = InMemoryQueue::new();
    let dispatcher = queued_dispatcher(&harness, &queue);

    let envelope = Envelope::with_string_payload("cmd-1", "order.create", "not json")
        .with_metadata(sourced_dispatch::bus::CONTENT_TYPE, Encoding::Json.content_type());
    let failure = dispatcher.dispatch_envelope(&envelope).unwrap_err();
    assert_eq!(failure.reason, Reason::DecodeFailed);
    assert_eq!(harness.store.len(), 0);
}

/// A second command type published under the same routing name.
#[derive(Debug, Serialize, Deserialize)]
struct CreateOrderV2 {
    items: Vec<String>,
    priority: bool,
}

impl Message for CreateOrderV2 {
    fn message_name() -> &'static str {
        "order.create"
    }
}

impl Command for CreateOrderV2 {
    type Output = ();
}

#[test]
fn two_types_under_one_name_are_ambiguous() {
    let harness = Harness::new();
    let queue = InMemoryQueue::new();
    let store = harness.store.clone();
    let dispatcher = Dispatcher::builder(harness.unit_of_work.clone())
        .command(move |command: &CreateOrder| -> HandlerResult<OrderId> {
            Ok(store.insert(&command.items)?)
        })
        .unwrap()
        .command(|_: &CreateOrderV2| -> HandlerResult<()> { Ok(()) })
        .unwrap()
        .queue(Arc::new(queue.clone()), "orders")
        .build();

    dispatcher.queue_command(CreateOrder {
        items: vec!["SKU-1".into()],
    });
    let envelope = queue.queued("orders").remove(0);

    let failure = dispatcher.dispatch_envelope(&envelope).unwrap_err();
    assert_eq!(failure.reason, Reason::AmbiguousHandler);
    assert_eq!(harness.store.len(), 0);

    // Typed dispatch is unaffected.
    assert!(dispatcher
        .dispatch_command(CreateOrder {
            items: vec!["SKU-1".into()]
        })
        .is_ok());
}
