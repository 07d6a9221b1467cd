//! `harness.yaml` loading: types, env substitution and semantic validation.

pub mod parser;
pub mod types;
pub mod validator;

pub use parser::{parse_harness, parse_harness_str, substitute_env_vars};
pub use types::{parse_byte_size, CacheConfig, HarnessConfig, HarnessLimits};
pub use validator::validate_harness;
