//! Domain layer: entities, value objects, the authorization vocabulary and the
//! ports the application layer talks to.

pub mod bill;
pub mod gate;
pub mod link;
pub mod ports;
pub mod user;
