//! Semantic validation for parsed harness configuration values.

use anyhow::{bail, Result};

use crate::config::types::{parse_byte_size, HarnessConfig};

fn validate_extension(extension: &str, errors: &mut Vec<String>) {
    if extension.trim().is_empty() {
        errors.push("extension must not be empty".to_string());
    } else if extension.starts_with('.') {
        errors.push(format!(
            "extension '{extension}' must be given without the leading dot"
        ));
    } else if extension.contains(['/', '\\']) {
        errors.push(format!("extension '{extension}' must not contain path separators"));
    }
}

/// Validate a parsed harness configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// # Errors
///
/// Returns an error listing every validation failure found in the config.
pub fn validate_harness(config: &HarnessConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported harness version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.module.as_os_str().is_empty() {
        errors.push("module path must not be empty".to_string());
    }
    if config.root.as_os_str().is_empty() {
        errors.push("root directory must not be empty".to_string());
    }
    if !config.guest_root.starts_with('/') {
        errors.push(format!(
            "guest_root '{}' must be an absolute guest path",
            config.guest_root
        ));
    }

    validate_extension(&config.extension, &mut errors);

    if config.iterations == 0 {
        errors.push("iterations must be at least 1".to_string());
    }

    if config.limits.path_region_bytes == 0 {
        errors.push("limits.path_region_bytes must be > 0".to_string());
    }
    if let Some(ref mem) = config.limits.max_memory {
        if parse_byte_size(mem).is_err() {
            errors.push(format!("limits.max_memory: invalid size '{mem}'"));
        }
    }

    for (key, name) in config.exports.entries() {
        if name.trim().is_empty() {
            errors.push(format!("exports.{key} must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Harness validation failed:\n  - {}", errors.join("\n  - "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parser::parse_harness_str;

    fn valid_yaml() -> &'static str {
        r#"
version: "1.0"
module: parser.wasm
root: /data/demos
extension: sdfz
"#
    }

    #[test]
    fn valid_harness_passes() {
        let config = parse_harness_str(valid_yaml()).unwrap();
        assert!(validate_harness(&config).is_ok());
    }

    #[test]
    fn wrong_version_fails() {
        let yaml = valid_yaml().replace("\"1.0\"", "\"2.0\"");
        let config = parse_harness_str(&yaml).unwrap();
        let err = validate_harness(&config).unwrap_err().to_string();
        assert!(err.contains("Unsupported harness version"));
    }

    #[test]
    fn dotted_extension_fails() {
        let yaml = valid_yaml().replace("extension: sdfz", "extension: .sdfz");
        let config = parse_harness_str(&yaml).unwrap();
        let err = validate_harness(&config).unwrap_err().to_string();
        assert!(err.contains("without the leading dot"));
    }

    #[test]
    fn zero_iterations_and_bad_memory_all_reported() {
        let yaml = format!(
            "{}iterations: 0\nlimits:\n  max_memory: lots\n  path_region_bytes: 0\n",
            valid_yaml()
        );
        let config = parse_harness_str(&yaml).unwrap();
        let err = validate_harness(&config).unwrap_err().to_string();
        assert!(err.contains("iterations must be at least 1"));
        assert!(err.contains("invalid size 'lots'"));
        assert!(err.contains("path_region_bytes must be > 0"));
    }

    #[test]
    fn empty_export_name_fails() {
        let yaml = format!("{}exports:\n  get_output: \"\"\n", valid_yaml());
        let config = parse_harness_str(&yaml).unwrap();
        let err = validate_harness(&config).unwrap_err().to_string();
        assert!(err.contains("exports.get_output must not be empty"));
    }

    #[test]
    fn relative_guest_root_fails() {
        let yaml = format!("{}guest_root: demos\n", valid_yaml());
        let config = parse_harness_str(&yaml).unwrap();
        let err = validate_harness(&config).unwrap_err().to_string();
        assert!(err.contains("absolute guest path"));
    }
}
