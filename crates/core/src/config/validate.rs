use super::{types::Config, ConfigError, PaymentBackend};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Hold TTL and sweep interval are non-zero
/// - The http payment backend has an http section
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    // Hold validation
    if config.holds.ttl_secs == 0 {
        return Err(ConfigError::ValidationError(
            "holds.ttl_secs cannot be 0".to_string(),
        ));
    }
    if config.holds.sweep_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "holds.sweep_interval_secs cannot be 0".to_string(),
        ));
    }

    // Payment validation
    if let Some(ref payment) = config.payment {
        if payment.backend == PaymentBackend::Http && payment.http.is_none() {
            return Err(ConfigError::ValidationError(
                "payment.backend is \"http\" but no [payment.http] section provided".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, HoldConfig, PaymentConfig, ServerConfig};
    use std::net::IpAddr;

    fn valid_config() -> Config {
        Config {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            holds: HoldConfig::default(),
            payment: None,
        }
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let config = Config {
            server: ServerConfig {
                host: "0.0.0.0".parse::<IpAddr>().unwrap(),
                port: 0,
            },
            ..valid_config()
        };
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_ttl_fails() {
        let config = Config {
            holds: HoldConfig {
                ttl_secs: 0,
                sweep_interval_secs: 30,
            },
            ..valid_config()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_http_backend_requires_section() {
        let config = Config {
            payment: Some(PaymentConfig {
                backend: PaymentBackend::Http,
                http: None,
            }),
            ..valid_config()
        };
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }
}
