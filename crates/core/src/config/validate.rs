use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Every queue admits at least one job and runs between 1 and `capacity` jobs
/// - Keepalive interval and event buffer are non-zero
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    // Server validation
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    for (name, queue) in [
        ("image", &config.queues.image),
        ("audio", &config.queues.audio),
        ("video", &config.queues.video),
    ] {
        if queue.capacity == 0 {
            return Err(ConfigError::ValidationError(format!(
                "queues.{}.capacity must be at least 1",
                name
            )));
        }
        if queue.parallelism == 0 || queue.parallelism > queue.capacity {
            return Err(ConfigError::ValidationError(format!(
                "queues.{}.parallelism must be between 1 and capacity ({})",
                name, queue.capacity
            )));
        }
    }

    if config.stream.keepalive_interval_secs == 0 {
        return Err(ConfigError::ValidationError(
            "stream.keepalive_interval_secs cannot be 0".to_string(),
        ));
    }

    if config.stream.event_buffer == 0 {
        return Err(ConfigError::ValidationError(
            "stream.event_buffer cannot be 0".to_string(),
        ));
    }

    Ok(())
}
