//! Test-file naming conventions used to pair tests with the code they cover
//!
//! The table is data: the built-in conventions can be replaced by a TOML file
//! with one `[[pattern]]` entry per convention:
//!
//! ```toml
//! [[pattern]]
//! language = "python"
//! kind = "prefix"
//! marker = "test_"
//! extensions = ["py"]
//! ```

use crate::error::{Result, TributaryError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where a marker appears in a test file's path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    /// End of the file stem: `parser_test.go`, `FooTest.java`, `app.spec.ts`
    Suffix,
    /// Start of the file stem: `test_parser.py`
    Prefix,
    /// A directory segment sequence: `tests/`, `__tests__/`, `src/test/`
    Directory,
}

/// One naming convention as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestPatternConfig {
    pub language: String,
    pub kind: MarkerKind,
    pub marker: String,
    /// File extensions the convention applies to; empty means any
    #[serde(default)]
    pub extensions: Vec<String>,
}

/// Test patterns file structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestPatternsConfig {
    #[serde(default)]
    pub pattern: Vec<TestPatternConfig>,
}

#[derive(Debug, Clone)]
struct Convention {
    language: String,
    kind: MarkerKind,
    /// Lowercased; directory markers are stored as `/marker/`
    marker: String,
    extensions: Vec<String>,
}

impl Convention {
    fn applies_to(&self, extension: &str) -> bool {
        self.extensions.is_empty() || self.extensions.iter().any(|e| e == extension)
    }

    /// Whether a test file with `test_ext` can cover a subject with
    /// `subject_ext`. Conventions without extensions pair same-extension files.
    fn covers(&self, test_ext: &str, subject_ext: &str) -> bool {
        if self.extensions.is_empty() {
            test_ext == subject_ext
        } else {
            self.applies_to(subject_ext)
        }
    }
}

/// Path split into the parts the matcher compares, all lowercased
#[derive(Debug, Clone, PartialEq)]
struct PathParts {
    /// `/`-separated, with a leading `/` so directory markers match at the root
    normalized: String,
    stem: String,
    extension: String,
}

impl PathParts {
    fn parse(path: &str) -> Self {
        let normalized = format!("/{}", path.replace('\\', "/").trim_start_matches('/'))
            .to_lowercase();
        let file_name = normalized.rsplit('/').next().unwrap_or_default();

        let (stem, extension) = match file_name.rfind('.') {
            Some(idx) if idx > 0 => (&file_name[..idx], &file_name[idx + 1..]),
            _ => (file_name, ""),
        };

        Self {
            stem: stem.to_string(),
            extension: extension.to_string(),
            normalized,
        }
    }
}

/// Compiled test-naming table
#[derive(Debug, Clone)]
pub struct TestPatternTable {
    conventions: Vec<Convention>,
}

impl Default for TestPatternTable {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TestPatternTable {
    /// Conventions for Rust, Go, Python, JavaScript/TypeScript, Java/Kotlin, Ruby and C#
    pub fn builtin() -> Self {
        const JS: &[&str] = &["js", "jsx", "ts", "tsx", "mjs", "cjs"];
        const JVM: &[&str] = &["java", "kt"];

        let entries: &[(&str, MarkerKind, &str, &[&str])] = &[
            ("rust", MarkerKind::Suffix, "_test", &["rs"]),
            ("rust", MarkerKind::Directory, "tests", &["rs"]),
            ("go", MarkerKind::Suffix, "_test", &["go"]),
            ("python", MarkerKind::Prefix, "test_", &["py"]),
            ("python", MarkerKind::Suffix, "_test", &["py"]),
            ("python", MarkerKind::Directory, "tests", &["py"]),
            ("javascript", MarkerKind::Suffix, ".test", JS),
            ("javascript", MarkerKind::Suffix, ".spec", JS),
            ("javascript", MarkerKind::Directory, "__tests__", JS),
            ("java", MarkerKind::Suffix, "Tests", JVM),
            ("java", MarkerKind::Suffix, "Test", JVM),
            ("java", MarkerKind::Suffix, "IT", JVM),
            ("java", MarkerKind::Directory, "src/test", JVM),
            ("ruby", MarkerKind::Suffix, "_spec", &["rb"]),
            ("ruby", MarkerKind::Directory, "spec", &["rb"]),
            ("csharp", MarkerKind::Suffix, "Tests", &["cs"]),
            ("csharp", MarkerKind::Suffix, "Test", &["cs"]),
        ];

        Self::compile(entries.iter().map(|(language, kind, marker, extensions)| {
            TestPatternConfig {
                language: language.to_string(),
                kind: *kind,
                marker: marker.to_string(),
                extensions: extensions.iter().map(|e| e.to_string()).collect(),
            }
        }))
    }

    /// Load a replacement table from a TOML patterns file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| TributaryError::Io {
            source: e,
            context: format!("Failed to read test patterns: {:?}", path),
        })?;
        let config: TestPatternsConfig = toml::from_str(&contents)?;
        Self::from_config(config)
    }

    pub fn from_config(config: TestPatternsConfig) -> Result<Self> {
        for entry in &config.pattern {
            let marker = entry.marker.trim_matches(|c| c == '/' || c == '\\');
            if marker.trim().is_empty() {
                return Err(TributaryError::Config(format!(
                    "Empty test pattern marker for language '{}'",
                    entry.language
                )));
            }
        }
        Ok(Self::compile(config.pattern))
    }

    fn compile(entries: impl IntoIterator<Item = TestPatternConfig>) -> Self {
        let mut conventions: Vec<Convention> = entries
            .into_iter()
            .map(|entry| {
                let marker = entry
                    .marker
                    .replace('\\', "/")
                    .trim_matches('/')
                    .to_lowercase();
                let marker = match entry.kind {
                    MarkerKind::Directory => format!("/{}/", marker),
                    _ => marker,
                };
                Convention {
                    language: entry.language,
                    kind: entry.kind,
                    marker,
                    extensions: entry
                        .extensions
                        .iter()
                        .map(|e| e.trim_start_matches('.').to_lowercase())
                        .collect(),
                }
            })
            .collect();

        // Longest marker first so `Tests` wins over `Test`
        conventions.sort_by(|a, b| b.marker.len().cmp(&a.marker.len()));

        Self { conventions }
    }

    pub fn len(&self) -> usize {
        self.conventions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conventions.is_empty()
    }

    /// Languages covered by the table, deduplicated in table order
    pub fn languages(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for convention in &self.conventions {
            if !seen.contains(&convention.language.as_str()) {
                seen.push(convention.language.as_str());
            }
        }
        seen
    }

    /// Stems this file would test, each with the convention that derived it
    fn subjects<'a>(
        &'a self,
        parts: &'a PathParts,
    ) -> impl Iterator<Item = (&'a str, &'a Convention)> + 'a {
        self.conventions
            .iter()
            .filter(move |c| c.applies_to(&parts.extension))
            .filter_map(move |c| {
                let base = match c.kind {
                    MarkerKind::Suffix => parts.stem.strip_suffix(c.marker.as_str()),
                    MarkerKind::Prefix => parts.stem.strip_prefix(c.marker.as_str()),
                    MarkerKind::Directory => None,
                }?;
                (!base.is_empty()).then_some((base, c))
            })
    }

    /// Directory conventions whose marker appears in the path
    fn test_directories<'a>(
        &'a self,
        parts: &'a PathParts,
    ) -> impl Iterator<Item = &'a Convention> + 'a {
        self.conventions.iter().filter(move |c| {
            c.kind == MarkerKind::Directory
                && c.applies_to(&parts.extension)
                && parts.normalized.contains(c.marker.as_str())
        })
    }

    /// Whether one path is a test-file naming variant of the other
    pub fn is_test_pair(&self, a: &str, b: &str) -> bool {
        let a = PathParts::parse(a);
        let b = PathParts::parse(b);

        if a.normalized == b.normalized || a.stem.is_empty() || b.stem.is_empty() {
            return false;
        }

        self.tests_other(&a, &b) || self.tests_other(&b, &a)
    }

    fn tests_other(&self, test: &PathParts, subject: &PathParts) -> bool {
        let named_after = self
            .subjects(test)
            .any(|(stem, c)| stem == subject.stem && c.covers(&test.extension, &subject.extension));
        if named_after {
            return true;
        }

        // Parallel test tree: same stem, only the test side under a test directory
        test.stem == subject.stem
            && self.test_directories(subject).next().is_none()
            && self
                .test_directories(test)
                .any(|c| c.covers(&test.extension, &subject.extension))
    }
}
