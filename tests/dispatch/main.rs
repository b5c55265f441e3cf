//! Dispatcher integration tests.

mod support;
mod queries;
mod queue;
mod unit_of_work;
