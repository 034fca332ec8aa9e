//! Domain events emitted by the catalog, client and sales aggregates.

pub mod event;

pub use event::Event;
