use serde::Deserialize;
use serde::Serialize;
use std::fmt::Display;

/// The twelve languages this service knows how to execute. The registry of
/// per-language behavior (command templates, UID, env whitelist, ...) lives
/// in `cellbox-langs`; this enum is the shared identifier other crates key
/// off of without depending on the registry itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Py,
    Js,
    Ts,
    Go,
    Java,
    C,
    Cpp,
    Php,
    Rs,
    R,
    F90,
    D,
}

impl Language {
    pub const ALL: [Language; 12] = [
        Language::Py,
        Language::Js,
        Language::Ts,
        Language::Go,
        Language::Java,
        Language::C,
        Language::Cpp,
        Language::Php,
        Language::Rs,
        Language::R,
        Language::F90,
        Language::D,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Language::Py => "py",
            Language::Js => "js",
            Language::Ts => "ts",
            Language::Go => "go",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Php => "php",
            Language::Rs => "rs",
            Language::R => "r",
            Language::F90 => "f90",
            Language::D => "d",
        }
    }

    pub fn from_code(code: &str) -> Option<Language> {
        Self::ALL.into_iter().find(|l| l.code() == code)
    }

    /// Only Python sandboxes ever run in REPL mode; every other language is
    /// always a one-shot execution (§4.1, §4.4).
    pub fn supports_repl(self) -> bool {
        matches!(self, Language::Py)
    }
}

impl Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown language code: {0}")]
pub struct UnknownLanguage(pub String);

impl std::str::FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Language::from_code(s).ok_or_else(|| UnknownLanguage(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_language_round_trips_through_its_code() {
        for lang in Language::ALL {
            assert_eq!(Language::from_code(lang.code()), Some(lang));
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert_eq!(Language::from_code("cobol"), None);
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn only_python_supports_repl_mode() {
        assert!(Language::Py.supports_repl());
        for lang in Language::ALL {
            if lang != Language::Py {
                assert!(!lang.supports_repl());
            }
        }
    }
}
