// Domain layer: charging-point models, the run report and ports (interfaces).

pub mod model;
pub mod ports;
pub mod report;
