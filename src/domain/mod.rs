//! Domain model: the transaction lifecycle, parameter handling, gateway
//! capabilities and the ports the lifecycle depends on.

pub mod gateway;
pub mod params;
pub mod ports;
pub mod soap;
pub mod transaction;
