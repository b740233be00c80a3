//! Domain layer: the order entity, its status machine and the ports the
//! application layer depends on.

pub mod order;
pub mod ports;
pub mod status;
