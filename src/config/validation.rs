//! Configuration validation

use super::Config;
use crate::port::PortId;
use crate::protocol::MacAddr;
use crate::telemetry::is_valid_level;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_interfaces(config, &mut result);
    validate_proxy(config, &mut result);
    validate_multicast(config, &mut result);
    validate_log(config, &mut result);

    result
}

fn validate_interfaces(config: &Config, result: &mut ValidationResult) {
    let interfaces = &config.interfaces;

    for port in PortId::ALL {
        if interfaces.name(port).is_empty() {
            result.error(format!("interfaces.{}: interface name required", port));
        }

        if let Some(addr) = interfaces.link_addr(port) {
            if let Err(e) = addr.parse::<MacAddr>() {
                result.error(format!(
                    "interfaces.{}_link_addr: invalid link-layer address {:?}: {}",
                    port, addr, e
                ));
            }
        }
    }

    if !interfaces.wan.is_empty() && interfaces.wan == interfaces.lan {
        result.error(format!(
            "interfaces: wan and lan must differ (both {})",
            interfaces.wan
        ));
    }
}

fn validate_proxy(config: &Config, result: &mut ValidationResult) {
    let proxy = &config.proxy;

    if proxy.max_entries == 0 {
        result.error("proxy.max_entries: must be greater than 0");
    }

    if proxy.aging_time == 0 {
        result.error("proxy.aging_time: must be greater than 0");
    }

    if proxy.idle_timeout == 0 {
        result.error("proxy.idle_timeout: must be greater than 0");
    } else if proxy.aging_time > 0 && proxy.idle_timeout > proxy.aging_time {
        result.warn(format!(
            "proxy.idle_timeout: {}s exceeds aging_time {}s, entries will outlive their aging time",
            proxy.idle_timeout, proxy.aging_time
        ));
    }

    if proxy.pending_timeout == 0 {
        result.error("proxy.pending_timeout: must be greater than 0");
    }

    if proxy.pending_retries == 0 {
        result.error("proxy.pending_retries: must be greater than 0");
    }

    if proxy.max_pending == 0 {
        result.error("proxy.max_pending: must be greater than 0");
    }
}

fn validate_multicast(config: &Config, result: &mut ValidationResult) {
    for (port, groups) in config.multicast.groups().iter() {
        for group in groups {
            if !group.is_multicast() {
                result.error(format!(
                    "multicast.{}: {} is not a multicast address",
                    port, group
                ));
            }
        }
    }
}

fn validate_log(config: &Config, result: &mut ValidationResult) {
    if !is_valid_level(&config.log.level) {
        result.warn(format!(
            "log.level: unknown level {:?}, using info",
            config.log.level
        ));
    }
}
