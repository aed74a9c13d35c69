//! Domain model: aggregates, value objects, events and the order state machine.
pub mod aggregates;
pub mod events;
pub mod state_machine;
pub mod value_objects;
