// Domain layer: records and the seams (traits) between client, config and scheduler.

pub mod model;
pub mod ports;
