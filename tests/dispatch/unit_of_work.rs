//! Units of work run through the dispatcher.

use std::sync::{Arc, Mutex};

use sourced_dispatch::bus::InMemoryQueue;
use sourced_dispatch::outbox::OutboundPublisher;
use sourced_dispatch::unit_of_work::{TransactionError, UnitOfWorkError};
use sourced_dispatch::{DispatchConfig, Dispatcher};

use crate::support::{entries, Harness, OrderPlaced, PaymentSettled};

#[test]
fn transient_failures_retry_until_success() {
    let harness = Harness::new();
    let dispatcher = Dispatcher::builder(harness.unit_of_work.clone()).build();

    // k failures with n attempts runs the body min(k + 1, n) times.
    let cases = [
        (0, 3, 1, true),
        (2, 3, 3, true),
        (3, 3, 3, false),
        (5, 2, 2, false),
    ];
    for (failures, attempts, runs, ok) in cases {
        let mut calls = 0;
        let result = dispatcher.run_unit_of_work_with_attempts(attempts, |_| {
            calls += 1;
            if calls <= failures {
                return Err(TransactionError::retryable("serialization failure"));
            }
            Ok(calls)
        });

        assert_eq!(calls, runs, "failures={} attempts={}", failures, attempts);
        assert_eq!(result.is_ok(), ok);
    }
}

#[test]
fn after_commit_fires_once_for_the_committed_attempt() {
    let harness = Harness::new();
    let dispatcher = Dispatcher::builder(harness.unit_of_work.clone()).build();
    let fired = Arc::new(Mutex::new(Vec::new()));

    dispatcher
        .run_unit_of_work_with_attempts(5, |scope| {
            let fired = Arc::clone(&fired);
            let attempt = scope.attempt();
            scope.after_commit(move || {
                fired.lock().unwrap().push(attempt);
                Ok(())
            });
            if attempt < 3 {
                return Err(TransactionError::retryable("deadlock"));
            }
            Ok(())
        })
        .unwrap();

    assert_eq!(*fired.lock().unwrap(), vec![3]);
    assert_eq!(harness.transactions.begun(), 3);
    assert_eq!(harness.transactions.committed(), 1);
}

#[test]
fn events_from_a_failed_unit_of_work_are_never_seen() {
    let harness = Harness::new();
    let dispatcher = Dispatcher::builder(harness.unit_of_work.clone()).build();

    let err = dispatcher
        .run_unit_of_work(|scope| -> Result<(), TransactionError> {
            scope.raise(OrderPlaced::new("ORD-1"));
            Err(TransactionError::fatal("constraint violated"))
        })
        .unwrap_err();

    assert!(matches!(err, UnitOfWorkError::Fatal { attempts: 1, .. }));
    assert!(entries(&harness.log).is_empty());
}

#[test]
fn forgotten_events_are_dropped() {
    let harness = Harness::new();
    let dispatcher = Dispatcher::builder(harness.unit_of_work.clone()).build();

    dispatcher
        .run_unit_of_work(|scope| {
            scope.raise(OrderPlaced::new("ORD-1"));
            scope.forget_events();
            scope.raise(OrderPlaced::new("ORD-2"));
            Ok(())
        })
        .unwrap();

    assert_eq!(entries(&harness.log), vec!["placed-ORD-2"]);
}

#[test]
fn zero_attempts_never_starts_a_transaction() {
    let harness = Harness::new();
    let dispatcher = Dispatcher::builder(harness.unit_of_work.clone()).build();

    let err = dispatcher
        .run_unit_of_work_with_attempts(0, |_| Ok(()))
        .unwrap_err();

    assert!(matches!(err, UnitOfWorkError::InvalidAttempts(0)));
    assert_eq!(harness.transactions.begun(), 0);
}

#[test]
fn configured_default_attempts_apply_to_run() {
    let harness = Harness::new();
    let config = DispatchConfig {
        default_attempts: 3,
        ..DispatchConfig::default()
    };
    let dispatcher = Dispatcher::builder(harness.unit_of_work.clone())
        .config(&config)
        .unwrap()
        .build();

    let mut calls = 0;
    let out = dispatcher
        .run_unit_of_work(|_| {
            calls += 1;
            if calls < 3 {
                return Err(TransactionError::retryable("timeout"));
            }
            Ok("stored")
        })
        .unwrap();

    assert_eq!(out, "stored");
    assert_eq!(dispatcher.unit_of_work().default_attempts(), 3);
}

#[test]
fn outbound_events_leave_only_after_commit() {
    let harness = Harness::new();
    let dispatcher = Dispatcher::builder(harness.unit_of_work.clone()).build();
    let outbox = InMemoryQueue::new();
    let publisher = OutboundPublisher::new(Arc::new(outbox.clone()));

    let _ = dispatcher.run_unit_of_work(|scope| -> Result<(), TransactionError> {
        publisher.publish_after_commit(scope, &PaymentSettled::new("evt-1", "ORD-1"))?;
        Err(TransactionError::fatal("rolled back"))
    });
    assert!(outbox.is_empty());

    dispatcher
        .run_unit_of_work(|scope| {
            publisher.publish_after_commit(scope, &PaymentSettled::new("evt-2", "ORD-1"))?;
            Ok(())
        })
        .unwrap();

    let published = outbox.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].id, "evt-2");
    assert_eq!(published[0].message_type, "payment.settled");
}
