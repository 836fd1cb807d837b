// Domain layer: the host value type and ports (interfaces) to the outside world.

pub mod ports;
pub mod value;
