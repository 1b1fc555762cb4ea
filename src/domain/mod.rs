// Domain layer: tabular data, report types and the ports the engine depends on.

pub mod model;
pub mod ports;
