//! Channel configuration for orchestrator communication

/// Channel buffer configuration for orchestrator communication
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Diagnostic event channel buffer size (engine -> caller)
    pub events_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            events_buffer: 10_000,
        }
    }
}

impl ChannelConfig {
    /// Create a new channel config with a custom event buffer size
    pub fn with_events_buffer(mut self, size: usize) -> Self {
        self.events_buffer = size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_config_default() {
        let config = ChannelConfig::default();
        assert_eq!(config.events_buffer, 10_000);
    }

    #[test]
    fn test_channel_config_builder() {
        let config = ChannelConfig::default().with_events_buffer(64);
        assert_eq!(config.events_buffer, 64);
    }
}
