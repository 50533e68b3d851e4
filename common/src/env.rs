use std::fmt::Display;
use std::str::FromStr;

/// Mirrors the teacher's `EnvVarError` (`core/src/error.rs`): a named
/// variable plus optional operator-facing guidance, used for every
/// environment-variable-driven config value named in §6 ("Environment
/// variables consumed").
#[derive(Debug)]
pub struct EnvVarError {
    pub var: String,
    pub instructions: Option<String>,
}

impl Display for EnvVarError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "missing or invalid environment variable `{}`", self.var)?;
        if let Some(instructions) = &self.instructions {
            write!(f, ". {instructions}")?;
        }
        Ok(())
    }
}

impl std::error::Error for EnvVarError {}

pub fn required_env(var: &str) -> Result<String, EnvVarError> {
    std::env::var(var).map_err(|_| EnvVarError {
        var: var.to_string(),
        instructions: None,
    })
}

pub fn env_or<T>(var: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn env_opt<T>(var: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(var).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_or_falls_back_to_default_when_unset() {
        let value: u64 = env_or("CELLBOX_TEST_DOES_NOT_EXIST_XYZ", 42);
        assert_eq!(value, 42);
    }

    #[test]
    fn required_env_reports_the_missing_variable_name() {
        let err = required_env("CELLBOX_TEST_DOES_NOT_EXIST_XYZ").unwrap_err();
        assert_eq!(err.var, "CELLBOX_TEST_DOES_NOT_EXIST_XYZ");
    }
}
