//! The fixed language registry (§3 Language registry): twelve entries
//! mapping a language code to its display name, source extension, execution
//! command template, stdin-vs-file convention, timeout multiplier, the UID
//! that owns its sandbox files, and its environment whitelist/extras.
//!
//! This is deliberately a typed registry rather than a bare map literal (§9
//! Design Notes call for the teacher's ad-hoc dictionaries to become
//! explicit types in a systems language) so each entry is constructible and
//! unit-testable on its own.

use std::collections::HashMap;

use cellbox_protocol::Language;

/// One entry in the language registry.
#[derive(Debug, Clone)]
pub struct LanguageSpec {
    pub language: Language,
    pub display_name: &'static str,
    pub extension: &'static str,
    /// The exact source filename written into the sandbox. Java requires the
    /// literal `Code.java` (public-class-name match); every other language
    /// uses `code.<extension>` (§4.6 step 10 names both forms explicitly).
    pub source_filename: &'static str,
    /// Command template with `{file}` (full path) and `{basename}` (source
    /// filename without extension, e.g. the Java class name) placeholders.
    pub command_template: &'static str,
    /// Whether the command expects the source to arrive on stdin instead of
    /// (in addition to) being written to `{file}` (§4.1).
    pub takes_stdin: bool,
    pub timeout_multiplier: f64,
    pub uid: u32,
    pub gid: u32,
    /// Host environment variable *names* forwarded into the sandbox, beyond
    /// the universal `PATH`/`HOME`/`TMPDIR` (§4.2).
    pub env_whitelist: &'static [&'static str],
    /// Static `KEY=VALUE` pairs always injected regardless of the host
    /// environment (§4.2).
    pub env_extra: &'static [(&'static str, &'static str)],
    /// Java and Rust need `/proc/self/exe` to locate shared libraries and
    /// are the documented exception to masking `/proc` (§4.2 step 4).
    pub needs_proc: bool,
}

impl LanguageSpec {
    pub fn command_for(&self, file: &str, basename: &str) -> String {
        self.command_template
            .replace("{file}", file)
            .replace("{basename}", basename)
    }

    /// The sandbox-level environment: universal vars, this language's
    /// whitelisted host vars (only if actually set on the host), and its
    /// static extras.
    pub fn build_env(&self, host_env: &HashMap<String, String>) -> HashMap<String, String> {
        let mut env = HashMap::new();
        env.insert("HOME".to_string(), "/tmp".to_string());
        env.insert("TMPDIR".to_string(), "/tmp".to_string());
        if let Some(path) = host_env.get("PATH") {
            env.insert("PATH".to_string(), path.clone());
        }
        for name in self.env_whitelist {
            if let Some(value) = host_env.get(*name) {
                env.insert((*name).to_string(), value.clone());
            }
        }
        for (k, v) in self.env_extra {
            env.insert((*k).to_string(), (*v).to_string());
        }
        env
    }
}

pub struct LanguageRegistry {
    specs: HashMap<Language, LanguageSpec>,
}

impl LanguageRegistry {
    pub fn get(&self, language: Language) -> &LanguageSpec {
        self.specs
            .get(&language)
            .expect("registry always contains all twelve languages")
    }

    pub fn lookup_code(&self, code: &str) -> Option<&LanguageSpec> {
        Language::from_code(code).map(|l| self.get(l))
    }

    pub fn all(&self) -> impl Iterator<Item = &LanguageSpec> {
        self.specs.values()
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        build_registry()
    }
}

fn build_registry() -> LanguageRegistry {
    use Language::*;

    let entries: Vec<LanguageSpec> = vec![
        LanguageSpec {
            language: Py,
            display_name: "Python",
            extension: "py",
            source_filename: "code.py",
            command_template: "python3 {file}",
            takes_stdin: true,
            timeout_multiplier: 1.0,
            uid: 1001,
            gid: 1001,
            env_whitelist: &[],
            env_extra: &[
                ("PYTHONUNBUFFERED", "1"),
                ("PYTHONDONTWRITEBYTECODE", "1"),
                ("PYTHONPATH", "/mnt/data"),
                ("MPLBACKEND", "Agg"),
                ("MPLCONFIGDIR", "/tmp/mplconfig"),
                ("XDG_CACHE_HOME", "/tmp/cache"),
            ],
            needs_proc: false,
        },
        LanguageSpec {
            language: Js,
            display_name: "JavaScript",
            extension: "js",
            source_filename: "code.js",
            command_template: "node {file}",
            takes_stdin: false,
            timeout_multiplier: 1.0,
            uid: 1002,
            gid: 1002,
            env_whitelist: &["NODE_PATH"],
            env_extra: &[],
            needs_proc: false,
        },
        LanguageSpec {
            language: Ts,
            display_name: "TypeScript",
            extension: "ts",
            source_filename: "code.ts",
            command_template: "npx --yes ts-node {file}",
            takes_stdin: false,
            timeout_multiplier: 1.5,
            uid: 1003,
            gid: 1003,
            env_whitelist: &["NODE_PATH"],
            env_extra: &[],
            needs_proc: false,
        },
        LanguageSpec {
            language: Go,
            display_name: "Go",
            extension: "go",
            source_filename: "code.go",
            command_template: "go run {file}",
            takes_stdin: false,
            timeout_multiplier: 2.0,
            uid: 1004,
            gid: 1004,
            env_whitelist: &["GOROOT"],
            env_extra: &[("GO111MODULE", "on"), ("GOCACHE", "/tmp/go-build")],
            needs_proc: false,
        },
        LanguageSpec {
            language: Java,
            display_name: "Java",
            extension: "java",
            source_filename: "Code.java",
            command_template: "sh -c 'javac {file} -d /tmp && java -cp /tmp {basename}'",
            takes_stdin: false,
            timeout_multiplier: 2.5,
            uid: 1005,
            gid: 1005,
            env_whitelist: &["CLASSPATH", "JAVA_OPTS"],
            env_extra: &[],
            needs_proc: true,
        },
        LanguageSpec {
            language: C,
            display_name: "C",
            extension: "c",
            source_filename: "code.c",
            command_template: "sh -c 'gcc {file} -o /tmp/cellbox-bin && /tmp/cellbox-bin'",
            takes_stdin: false,
            timeout_multiplier: 1.5,
            uid: 1006,
            gid: 1006,
            env_whitelist: &[],
            env_extra: &[],
            needs_proc: false,
        },
        LanguageSpec {
            language: Cpp,
            display_name: "C++",
            extension: "cpp",
            source_filename: "code.cpp",
            command_template: "sh -c 'g++ {file} -o /tmp/cellbox-bin && /tmp/cellbox-bin'",
            takes_stdin: false,
            timeout_multiplier: 1.5,
            uid: 1007,
            gid: 1007,
            env_whitelist: &[],
            env_extra: &[],
            needs_proc: false,
        },
        LanguageSpec {
            language: Php,
            display_name: "PHP",
            extension: "php",
            source_filename: "code.php",
            command_template: "php {file}",
            takes_stdin: false,
            timeout_multiplier: 1.0,
            uid: 1008,
            gid: 1008,
            env_whitelist: &["PHP_INI_SCAN_DIR", "COMPOSER_HOME"],
            env_extra: &[],
            needs_proc: false,
        },
        LanguageSpec {
            language: Rs,
            display_name: "Rust",
            extension: "rs",
            source_filename: "code.rs",
            command_template: "sh -c 'rustc {file} -o /tmp/cellbox-bin && /tmp/cellbox-bin'",
            takes_stdin: false,
            timeout_multiplier: 3.0,
            uid: 1009,
            gid: 1009,
            env_whitelist: &["CARGO_HOME", "RUSTUP_HOME"],
            env_extra: &[],
            needs_proc: true,
        },
        LanguageSpec {
            language: R,
            display_name: "R",
            extension: "r",
            source_filename: "code.r",
            command_template: "Rscript {file}",
            takes_stdin: false,
            timeout_multiplier: 1.5,
            uid: 1010,
            gid: 1010,
            env_whitelist: &["R_LIBS_USER"],
            env_extra: &[],
            needs_proc: false,
        },
        LanguageSpec {
            language: F90,
            display_name: "Fortran",
            extension: "f90",
            source_filename: "code.f90",
            command_template: "sh -c 'gfortran {file} -o /tmp/cellbox-bin && /tmp/cellbox-bin'",
            takes_stdin: false,
            timeout_multiplier: 2.0,
            uid: 1011,
            gid: 1011,
            env_whitelist: &[],
            env_extra: &[("FC", "gfortran")],
            needs_proc: false,
        },
        LanguageSpec {
            language: D,
            display_name: "D",
            extension: "d",
            source_filename: "code.d",
            command_template: "sh -c 'ldc2 {file} -of=/tmp/cellbox-bin && /tmp/cellbox-bin'",
            takes_stdin: false,
            timeout_multiplier: 2.0,
            uid: 1012,
            gid: 1012,
            env_whitelist: &[],
            env_extra: &[],
            // Open question in §9: unclear whether ldc2 needs /proc/self/exe
            // like Java/Rust. Left masked pending verification on the
            // runtime image, matching the teacher's documented default of
            // masking /proc unless a language is a proven exception.
            needs_proc: false,
        },
    ];

    let specs = entries.into_iter().map(|s| (s.language, s)).collect();
    LanguageRegistry { specs }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_has_all_twelve_languages() {
        let registry = LanguageRegistry::default();
        for lang in Language::ALL {
            let spec = registry.get(lang);
            assert_eq!(spec.language, lang);
        }
    }

    #[test]
    fn command_template_substitutes_file_and_basename() {
        let registry = LanguageRegistry::default();
        let spec = registry.get(Language::Java);
        let cmd = spec.command_for("/mnt/data/Code.java", "Code");
        assert_eq!(
            cmd,
            "sh -c 'javac /mnt/data/Code.java -d /tmp && java -cp /tmp Code'"
        );
    }

    #[test]
    fn java_source_filename_is_capitalized() {
        let registry = LanguageRegistry::default();
        assert_eq!(registry.get(Language::Java).source_filename, "Code.java");
        assert_eq!(registry.get(Language::Py).source_filename, "code.py");
    }

    #[test]
    fn only_java_and_rust_need_proc() {
        let registry = LanguageRegistry::default();
        for lang in Language::ALL {
            let expected = matches!(lang, Language::Java | Language::Rs);
            assert_eq!(registry.get(lang).needs_proc, expected, "{lang}");
        }
    }

    #[test]
    fn build_env_always_has_universal_vars_and_never_leaks_unlisted_host_vars() {
        let registry = LanguageRegistry::default();
        let spec = registry.get(Language::Js);
        let mut host_env = HashMap::new();
        host_env.insert("PATH".to_string(), "/usr/bin".to_string());
        host_env.insert("NODE_PATH".to_string(), "/opt/node_modules".to_string());
        host_env.insert("SECRET_TOKEN".to_string(), "leaked?".to_string());

        let env = spec.build_env(&host_env);
        assert_eq!(env.get("HOME"), Some(&"/tmp".to_string()));
        assert_eq!(env.get("TMPDIR"), Some(&"/tmp".to_string()));
        assert_eq!(env.get("PATH"), Some(&"/usr/bin".to_string()));
        assert_eq!(env.get("NODE_PATH"), Some(&"/opt/node_modules".to_string()));
        assert!(!env.contains_key("SECRET_TOKEN"));
    }

    #[test]
    fn lookup_code_finds_registered_languages_and_rejects_unknown() {
        let registry = LanguageRegistry::default();
        assert!(registry.lookup_code("py").is_some());
        assert!(registry.lookup_code("cobol").is_none());
    }
}
