use super::OutpostConfig;
use tracing::warn;

/// Apply `OUTPOST_*` overrides on top of file/default configuration.
///
/// `lookup` abstracts the environment so overrides can be tested without
/// touching process-wide state. Unparseable values are ignored with a warning.
pub(super) fn apply_overrides(config: &mut OutpostConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("OUTPOST_BIND_ADDR") {
        config.server.bind_addr = v;
    }
    if let Some(v) = lookup("OUTPOST_BROADCAST_CAPACITY") {
        match v.parse::<usize>() {
            Ok(n) if n > 0 => config.broadcast.channel_capacity = n,
            _ => warn!(value = %v, "Ignoring invalid OUTPOST_BROADCAST_CAPACITY"),
        }
    }
    if let Some(v) = lookup("OUTPOST_COMMAND_TIMEOUT_SECONDS") {
        match v.parse::<u64>() {
            Ok(n) => config.buildings.command_timeout_seconds = n,
            Err(_) => warn!(value = %v, "Ignoring invalid OUTPOST_COMMAND_TIMEOUT_SECONDS"),
        }
    }
    if let Some(v) = lookup("OUTPOST_MAX_OUTPUT_BYTES") {
        match v.parse::<usize>() {
            Ok(n) if n > 0 => config.buildings.max_output_bytes = n,
            _ => warn!(value = %v, "Ignoring invalid OUTPOST_MAX_OUTPUT_BYTES"),
        }
    }
    if let Some(v) = lookup("OUTPOST_SHELL") {
        config.buildings.shell = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_overrides_applied() {
        let mut config = OutpostConfig::default();
        apply_overrides(
            &mut config,
            lookup_from(&[
                ("OUTPOST_BIND_ADDR", "127.0.0.1:1234"),
                ("OUTPOST_BROADCAST_CAPACITY", "16"),
                ("OUTPOST_COMMAND_TIMEOUT_SECONDS", "9"),
                ("OUTPOST_MAX_OUTPUT_BYTES", "2048"),
                ("OUTPOST_SHELL", "bash"),
            ]),
        );

        assert_eq!(config.server.bind_addr, "127.0.0.1:1234");
        assert_eq!(config.broadcast.channel_capacity, 16);
        assert_eq!(config.buildings.command_timeout_seconds, 9);
        assert_eq!(config.buildings.max_output_bytes, 2048);
        assert_eq!(config.buildings.shell, "bash");
    }

    #[test]
    fn test_invalid_values_ignored() {
        let mut config = OutpostConfig::default();
        apply_overrides(
            &mut config,
            lookup_from(&[
                ("OUTPOST_BROADCAST_CAPACITY", "0"),
                ("OUTPOST_COMMAND_TIMEOUT_SECONDS", "soon"),
                ("OUTPOST_MAX_OUTPUT_BYTES", "-1"),
            ]),
        );

        assert_eq!(config.broadcast.channel_capacity, 1024);
        assert_eq!(config.buildings.command_timeout_seconds, 60);
        assert_eq!(config.buildings.max_output_bytes, 16 * 1024);
    }
}
