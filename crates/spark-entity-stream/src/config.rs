//! 实体流配置。
//!
//! # 设计目标（Why）
//! - 传输层通常从宿主配置文件（TOML）中读取流参数后再创建实体流；本模块提供可反序列化的
//!   [`EntityStreamConfig`] 与校验入口，避免各传输实现重复解析。
//!
//! # 契约说明（What）
//! - 全部字段都有默认值，空表即可得到默认配置；
//! - [`EntityStreamConfig::validate`] 拒绝空标签与零信用上限，`from_toml_str` 在解析后自动校验。

use serde::Deserialize;

use crate::error::ConfigError;

/// 默认日志标签。
pub const DEFAULT_LABEL: &str = "entity-stream";

/// 单条实体流的可调参数。
///
/// # 教案式说明
/// - **意图 (Why)**：`label` 作为 `tracing` 事件中的 `stream` 字段，帮助在日志中区分同一进程内的
///   多条流；`credit_limit` 是 `request` 累加信用时的饱和上限。
/// - **契约 (What)**：
///   - `label`：非空字符串，默认 `"entity-stream"`；
///   - `credit_limit`：大于 0，默认 `u32::MAX`；信用累加超过该值时饱和而非回绕，并记录告警。
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EntityStreamConfig {
    pub label: String,
    pub credit_limit: u32,
}

impl Default for EntityStreamConfig {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL.to_owned(),
            credit_limit: u32::MAX,
        }
    }
}

impl EntityStreamConfig {
    /// 以指定标签构造默认配置。
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// 覆盖信用上限。
    pub fn with_credit_limit(mut self, credit_limit: u32) -> Self {
        self.credit_limit = credit_limit;
        self
    }

    /// 解析 TOML 文本并校验。
    ///
    /// ```rust
    /// use spark_entity_stream::EntityStreamConfig;
    ///
    /// let config = EntityStreamConfig::from_toml_str("label = \"upload\"\ncredit_limit = 64").unwrap();
    /// assert_eq!(config.label, "upload");
    /// assert_eq!(config.credit_limit, 64);
    /// ```
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// 校验字段取值。
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.label.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "label",
                reason: "must not be empty",
            });
        }
        if self.credit_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "credit_limit",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = EntityStreamConfig::from_toml_str("").expect("空配置应使用默认值");
        assert_eq!(config, EntityStreamConfig::default());
        assert_eq!(config.credit_limit, u32::MAX);
        assert_eq!(config.label, DEFAULT_LABEL);
    }

    #[test]
    fn zero_credit_limit_is_rejected() {
        let err = EntityStreamConfig::from_toml_str("credit_limit = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "credit_limit",
                ..
            }
        ));
    }

    #[test]
    fn unknown_fields_fail_to_parse() {
        let err = EntityStreamConfig::from_toml_str("window = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)), "未知字段应视为解析错误");
    }

    #[test]
    fn blank_label_is_rejected() {
        let err = EntityStreamConfig::labeled("  ").validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "label", .. }));
    }
}
