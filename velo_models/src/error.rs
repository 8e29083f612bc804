// velo_models/src/error.rs

//! 定义遥测帧解码相关的错误类型。

use thiserror::Error;

/// 遥测帧解码错误。
///
/// 解码错误只影响单个帧：通道会丢弃该帧并发出解码失败事件，连接本身继续运行。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// 设备身份字段 (`imei` / `veloId`) 缺失、为空或不是字符串。
    #[error("设备身份无效: 字段 `{field}` 缺失、为空或不是字符串")]
    MalformedIdentity {
        /// 出问题的身份字段名。
        field: &'static str,
    },

    /// 已识别的字段存在，但类型与约定不符。
    #[error("字段 `{field}` 类型不符: 期望 {expected}")]
    TypeMismatch {
        /// 出问题的字段名 (线上名称)。
        field: &'static str,
        /// 期望的类型描述，例如 "有限数值"。
        expected: &'static str,
    },
}

impl DecodeError {
    /// 返回与错误相关的字段名，便于日志和界面展示。
    pub fn field(&self) -> &'static str {
        match self {
            DecodeError::MalformedIdentity { field } => field,
            DecodeError::TypeMismatch { field, .. } => field,
        }
    }
}
