//! 配置校验模块
//!
//! 校验规则：
//! - 字段级约束 (`validator` derive：非空字段、timeout_ms >= 1)
//! - rest 发送端至少一个 host，且均为 http(s) URL，不重复
//! - output.key 为合法的事件格式串
//! - suppress_kinds 不含空字符串

use std::collections::HashSet;

use ::validator::Validate;
use contracts::{ContractError, EventFormatString, PublisherConfig, SenderType};
use url::Url;

/// 校验 PublisherConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &PublisherConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_hosts(config)?;
    validate_key_format(config)?;
    validate_routing(config)?;
    Ok(())
}

/// 字段级约束
fn validate_fields(config: &PublisherConfig) -> Result<(), ContractError> {
    config
        .validate()
        .map_err(|e| ContractError::config_validation("config", e.to_string()))
}

/// 校验 host 列表 (仅 rest 发送端)
fn validate_hosts(config: &PublisherConfig) -> Result<(), ContractError> {
    if config.sender.sender_type != SenderType::Rest {
        return Ok(());
    }

    let hosts = &config.output.hosts;
    if hosts.is_empty() {
        return Err(ContractError::config_validation(
            "output.hosts",
            "at least one host is required for the rest sender",
        ));
    }

    let mut seen = HashSet::new();
    for (idx, host) in hosts.iter().enumerate() {
        let field = format!("output.hosts[{idx}]");
        let url = Url::parse(host)
            .map_err(|e| ContractError::config_validation(&field, format!("invalid URL '{host}': {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ContractError::config_validation(
                field,
                format!("scheme must be http or https, got '{}'", url.scheme()),
            ));
        }

        if !seen.insert(url) {
            return Err(ContractError::config_validation(
                field,
                format!("duplicate host '{host}'"),
            ));
        }
    }
    Ok(())
}

/// 校验消息 key 格式串
fn validate_key_format(config: &PublisherConfig) -> Result<(), ContractError> {
    if let Some(key) = &config.output.key {
        EventFormatString::parse(key)
            .map_err(|e| ContractError::config_validation("output.key", e.to_string()))?;
    }
    Ok(())
}

/// 校验路由配置
fn validate_routing(config: &PublisherConfig) -> Result<(), ContractError> {
    for (idx, kind) in config.routing.suppress_kinds.iter().enumerate() {
        if kind.is_empty() {
            return Err(ContractError::config_validation(
                format!("routing.suppress_kinds[{idx}]"),
                "suppressed kind cannot be empty",
            ));
        }
    }
    Ok(())
}
