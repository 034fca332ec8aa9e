//! Clients domain module (event-sourced).
//!
//! A client's kind decides how it is priced: RP clients always pay default
//! prices, marcher clients may carry per-client overrides.

pub mod client;

pub use client::{
    Client, ClientCommand, ClientCreated, ClientEvent, ClientKind, ClientKindToggled,
    ClientUpdated, CreateClient, ToggleKind, UpdateClient,
};
