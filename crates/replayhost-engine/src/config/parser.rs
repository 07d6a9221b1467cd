//! Harness YAML parsing with environment variable substitution.

use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::{Captures, Regex};

use crate::config::types::HarnessConfig;

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex"));

/// Substitute `${VAR_NAME}` patterns with environment variable values.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set.
pub fn substitute_env_vars(input: &str) -> Result<String> {
    let mut missing: Vec<String> = Vec::new();

    let substituted = ENV_VAR_RE.replace_all(input, |cap: &Captures<'_>| {
        let name = &cap[1];
        std::env::var(name).unwrap_or_else(|_| {
            if !missing.iter().any(|m| m == name) {
                missing.push(name.to_string());
            }
            String::new()
        })
    });

    if !missing.is_empty() {
        anyhow::bail!("Missing environment variable(s): {}", missing.join(", "));
    }
    Ok(substituted.into_owned())
}

/// Parse a harness YAML string (after env var substitution). Relative paths
/// are left as written.
///
/// # Errors
///
/// Returns an error if env var substitution fails or the YAML is invalid.
pub fn parse_harness_str(yaml_str: &str) -> Result<HarnessConfig> {
    let substituted = substitute_env_vars(yaml_str)?;
    serde_yaml::from_str(&substituted).context("Failed to parse harness YAML")
}

/// Parse a harness YAML file. Relative `module` and `root` paths resolve
/// against the directory containing the file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the YAML is invalid.
pub fn parse_harness(path: &Path) -> Result<HarnessConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read harness file: {}", path.display()))?;
    let mut config = parse_harness_str(&content)
        .with_context(|| format!("Invalid harness file: {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    config.resolve_relative_to(base);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use replayhost_types::{ParseMode, ProtocolPreference};

    use super::*;

    #[test]
    fn env_var_substitution() {
        std::env::set_var("RH_TEST_ROOT", "/srv/demos");
        let result = substitute_env_vars("root: ${RH_TEST_ROOT}\nmode: 1").unwrap();
        assert_eq!(result, "root: /srv/demos\nmode: 1");
        std::env::remove_var("RH_TEST_ROOT");
    }

    #[test]
    fn no_env_vars_passthrough() {
        let input = "root: /demos\nextension: sdfz";
        assert_eq!(substitute_env_vars(input).unwrap(), input);
    }

    #[test]
    fn all_missing_env_vars_reported_once() {
        let err = substitute_env_vars("${RH_MISSING_X} ${RH_MISSING_Y} ${RH_MISSING_X}")
            .unwrap_err()
            .to_string();
        assert_eq!(
            err,
            "Missing environment variable(s): RH_MISSING_X, RH_MISSING_Y"
        );
    }

    #[test]
    fn parse_minimal_harness_applies_defaults() {
        let config = parse_harness_str(
            r#"
version: "1.0"
module: parser.wasm
root: /data/demos
"#,
        )
        .unwrap();
        assert_eq!(config.extension, "sdfz");
        assert_eq!(config.guest_root, "/");
        assert_eq!(config.mode, ParseMode::METADATA_ONLY);
        assert_eq!(config.protocol, ProtocolPreference::Auto);
        assert_eq!(config.iterations, 1);
        assert_eq!(config.limits.path_region_bytes, 1024);
        assert_eq!(config.exports.parse_by_path, "parseDemoFile");
        assert!(config.cache.aot.is_none());
    }

    #[test]
    fn parse_full_harness() {
        let config = parse_harness_str(
            r#"
version: "1.0"
module: parser.wat
root: /data/demos
guest_root: /replays
extension: sdf
mode: 3
protocol: path
iterations: 1024
limits:
  max_memory: 256mb
  path_region_bytes: 512
exports:
  parse_by_path: parse_demo
cache:
  aot: false
"#,
        )
        .unwrap();
        assert_eq!(config.mode, ParseMode(3));
        assert_eq!(config.protocol, ProtocolPreference::Path);
        assert_eq!(config.iterations, 1024);
        assert_eq!(config.limits.max_memory.as_deref(), Some("256mb"));
        assert_eq!(config.exports.parse_by_path, "parse_demo");
        assert_eq!(config.exports.alloc, "alloc");
        assert_eq!(config.cache.aot, Some(false));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = parse_harness_str("version: \"1.0\"\nmodule: a\nroot: b\nthreads: 4\n")
            .unwrap_err();
        assert!(format!("{err:#}").contains("threads"), "got: {err:#}");
    }

    #[test]
    fn parse_harness_file_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("harness.yaml");
        std::fs::write(
            &path,
            "version: \"1.0\"\nmodule: parser.wasm\nroot: demos\n",
        )
        .unwrap();

        let config = parse_harness(&path).unwrap();
        assert_eq!(config.module, dir.path().join("parser.wasm"));
        assert_eq!(config.root, dir.path().join("demos"));
    }

    #[test]
    fn parse_harness_file_not_found() {
        let err = parse_harness(&PathBuf::from("/nonexistent/harness.yaml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read harness file"));
    }
}
