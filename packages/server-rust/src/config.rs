/// Configuration for the file chooser mediator.
///
/// Controls request handle naming and the capacity of the assembly worker's queue.
#[derive(Debug, Clone)]
pub struct ChooserConfig {
    /// Object path under which request handles are exported.
    pub request_path_prefix: String,
    /// Bounded queue capacity between backend completions and the assembly worker.
    pub assembly_queue_capacity: usize,
}

impl Default for ChooserConfig {
    fn default() -> Self {
        Self {
            request_path_prefix: "/org/freedesktop/portal/desktop/request".to_string(),
            assembly_queue_capacity: 256,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chooser_config_defaults() {
        let config = ChooserConfig::default();
        assert_eq!(config.request_path_prefix, "/org/freedesktop/portal/desktop/request");
        assert_eq!(config.assembly_queue_capacity, 256);
    }
}
