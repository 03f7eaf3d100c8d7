// 領域層：核心模型、事件，以及對瀏覽器/引擎平台的 ports

pub mod channel;
pub mod events;
pub mod model;
pub mod ports;
