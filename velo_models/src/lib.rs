//! `velo_models` 公共模型库 crate。
//!
//! 本 crate 集中定义了 Velo 车队遥测客户端各组件（`rust_websocket_utils` 传输层、
//! `velo_client` 客户端核心）之间共享的设备数据结构，以及把遥测帧解码为强类型记录的编解码器。
//!
//! 主要包含：
//! - **通用枚举 (`enums`)**: 遥测消息种类 `TelemetryKind` 及其线上事件名。
//! - **设备模型 (`device_models`)**: 设备身份 `DeviceIdentity`，以及 Login / Status / GPS 三类记录。
//! - **编解码 (`codec`)**: `decode(kind, raw)`，对身份字段严格校验、对可选字段宽松处理。
//! - **错误 (`error`)**: `DecodeError`，区分身份缺失与字段类型不符。
//!
//! 所有可选字段均以 `Option` 表示，"未上报" 与 "值为 0" 在类型上是可区分的。

pub mod codec;
pub mod device_models;
pub mod enums;
pub mod error;

pub use codec::decode;
pub use device_models::{
    DeviceIdentity, GpsData, GpsRecord, LoginData, LoginRecord, MergedNetworkData, SensorData,
    StatusData, StatusRecord, TelemetryRecord,
};
pub use enums::TelemetryKind;
pub use error::DecodeError;
