//! Domain model: value objects, entities, state rules and the storage ports.

pub mod actor;
pub mod collection;
pub mod job;
pub mod money;
pub mod notification;
pub mod order;
pub mod payment;
pub mod ports;
pub mod status;
pub mod wallet;
