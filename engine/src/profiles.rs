//! Static extension table and the runtime profile for every supported type.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Substituted with the staged artifact's base name.
pub const ARTIFACT_PLACEHOLDER: &str = "{artifact}";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeKind {
    Python,
    Bash,
    Perl,
    Nodejs,
    Ruby,
    Php,
    Html,
    Css,
    C,
    Cpp,
    CppHeader,
    Java,
    Go,
    Binary,
    Apk,
    Deb,
    Rpm,
    Tarball,
    Zip,
    Gzip,
    Document,
    Text,
    Log,
}

impl RuntimeKind {
    pub const ALL: [RuntimeKind; 23] = [
        RuntimeKind::Python,
        RuntimeKind::Bash,
        RuntimeKind::Perl,
        RuntimeKind::Nodejs,
        RuntimeKind::Ruby,
        RuntimeKind::Php,
        RuntimeKind::Html,
        RuntimeKind::Css,
        RuntimeKind::C,
        RuntimeKind::Cpp,
        RuntimeKind::CppHeader,
        RuntimeKind::Java,
        RuntimeKind::Go,
        RuntimeKind::Binary,
        RuntimeKind::Apk,
        RuntimeKind::Deb,
        RuntimeKind::Rpm,
        RuntimeKind::Tarball,
        RuntimeKind::Zip,
        RuntimeKind::Gzip,
        RuntimeKind::Document,
        RuntimeKind::Text,
        RuntimeKind::Log,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeKind::Python => "python",
            RuntimeKind::Bash => "bash",
            RuntimeKind::Perl => "perl",
            RuntimeKind::Nodejs => "nodejs",
            RuntimeKind::Ruby => "ruby",
            RuntimeKind::Php => "php",
            RuntimeKind::Html => "html",
            RuntimeKind::Css => "css",
            RuntimeKind::C => "c",
            RuntimeKind::Cpp => "cpp",
            RuntimeKind::CppHeader => "cpp_header",
            RuntimeKind::Java => "java",
            RuntimeKind::Go => "go",
            RuntimeKind::Binary => "binary",
            RuntimeKind::Apk => "apk",
            RuntimeKind::Deb => "deb",
            RuntimeKind::Rpm => "rpm",
            RuntimeKind::Tarball => "tarball",
            RuntimeKind::Zip => "zip",
            RuntimeKind::Gzip => "gzip",
            RuntimeKind::Document => "document",
            RuntimeKind::Text => "text",
            RuntimeKind::Log => "log",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const EXTENSIONS: &[(&str, RuntimeKind)] = &[
    (".py", RuntimeKind::Python),
    (".sh", RuntimeKind::Bash),
    (".pl", RuntimeKind::Perl),
    (".js", RuntimeKind::Nodejs),
    (".rb", RuntimeKind::Ruby),
    (".php", RuntimeKind::Php),
    (".html", RuntimeKind::Html),
    (".css", RuntimeKind::Css),
    (".c", RuntimeKind::C),
    (".cpp", RuntimeKind::Cpp),
    (".h", RuntimeKind::CppHeader),
    (".java", RuntimeKind::Java),
    (".go", RuntimeKind::Go),
    (".exe", RuntimeKind::Binary),
    (".bin", RuntimeKind::Binary),
    (".out", RuntimeKind::Binary),
    (".apk", RuntimeKind::Apk),
    (".deb", RuntimeKind::Deb),
    (".rpm", RuntimeKind::Rpm),
    (".tar", RuntimeKind::Tarball),
    (".zip", RuntimeKind::Zip),
    (".gz", RuntimeKind::Gzip),
    (".tar.gz", RuntimeKind::Tarball),
    (".pdf", RuntimeKind::Document),
    (".txt", RuntimeKind::Text),
    (".log", RuntimeKind::Log),
];

/// Recognized file-name suffixes.
#[derive(Debug, Clone)]
pub struct ExtensionTable {
    entries: Vec<(&'static str, RuntimeKind)>,
}

impl Default for ExtensionTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl ExtensionTable {
    pub fn standard() -> Self {
        Self {
            entries: EXTENSIONS.to_vec(),
        }
    }

    /// Longest recognized suffix of `name`. Case-sensitive.
    pub fn match_name(&self, name: &str) -> Option<(&'static str, RuntimeKind)> {
        self.entries
            .iter()
            .filter(|(ext, _)| name.ends_with(ext))
            .max_by_key(|(ext, _)| ext.len())
            .copied()
    }

    pub fn match_path(&self, path: &Path) -> Option<(&'static str, RuntimeKind)> {
        path.file_name()
            .and_then(|name| name.to_str())
            .and_then(|name| self.match_name(name))
    }

    pub fn kind_of(&self, extension: &str) -> Option<RuntimeKind> {
        self.entries
            .iter()
            .find(|(ext, _)| *ext == extension)
            .map(|(_, kind)| *kind)
    }

    pub fn extensions_for(&self, kind: RuntimeKind) -> Vec<&'static str> {
        self.entries
            .iter()
            .filter(|(_, k)| *k == kind)
            .map(|(ext, _)| *ext)
            .collect()
    }
}

/// How to prepare an image for one runtime kind and how to start the artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeProfile {
    pub kind: RuntimeKind,
    /// Exec-form `RUN` steps.
    pub setup_steps: Vec<Vec<&'static str>>,
    /// Exec-form `CMD`; tokens may contain [`ARTIFACT_PLACEHOLDER`].
    pub run_command: Vec<&'static str>,
}

impl RuntimeProfile {
    fn new(
        kind: RuntimeKind,
        setup_steps: &[&[&'static str]],
        run_command: &[&'static str],
    ) -> Self {
        Self {
            kind,
            setup_steps: setup_steps.iter().map(|step| step.to_vec()).collect(),
            run_command: run_command.to_vec(),
        }
    }

    fn inert(kind: RuntimeKind, notice: &'static str) -> Self {
        Self::new(kind, &[], &["echo", notice])
    }

    /// Whether the container only prints a notice instead of running the file.
    pub fn is_inert(&self) -> bool {
        !self
            .run_command
            .iter()
            .any(|token| token.contains(ARTIFACT_PLACEHOLDER))
    }

    /// Run command with every placeholder replaced by `artifact_name`.
    pub fn render_command(&self, artifact_name: &str) -> Vec<String> {
        self.run_command
            .iter()
            .map(|token| token.replace(ARTIFACT_PLACEHOLDER, artifact_name))
            .collect()
    }

    pub fn render_setup(&self) -> Vec<Vec<String>> {
        self.setup_steps
            .iter()
            .map(|step| step.iter().map(|s| s.to_string()).collect())
            .collect()
    }
}

fn apk_add(packages: &[&'static str]) -> Vec<&'static str> {
    let mut step = vec!["apk", "add", "--no-cache"];
    step.extend_from_slice(packages);
    step
}

fn standard_profile(kind: RuntimeKind) -> RuntimeProfile {
    use RuntimeKind::*;

    let interpreted = |packages: &[&'static str], command: &[&'static str]| RuntimeProfile {
        kind,
        setup_steps: vec![apk_add(packages)],
        run_command: command.to_vec(),
    };

    match kind {
        Python => interpreted(&["python3", "py3-pip"], &["python3", ARTIFACT_PLACEHOLDER]),
        Bash => interpreted(&["bash"], &["bash", ARTIFACT_PLACEHOLDER]),
        Perl => interpreted(&["perl"], &["perl", ARTIFACT_PLACEHOLDER]),
        Nodejs => interpreted(&["nodejs", "npm"], &["node", ARTIFACT_PLACEHOLDER]),
        Ruby => interpreted(&["ruby"], &["ruby", ARTIFACT_PLACEHOLDER]),
        Php => interpreted(&["php"], &["php", ARTIFACT_PLACEHOLDER]),
        C => interpreted(
            &["gcc", "musl-dev"],
            &[
                "sh",
                "-c",
                "gcc \"$0\" -o /tmp/output && /tmp/output",
                ARTIFACT_PLACEHOLDER,
            ],
        ),
        Cpp => interpreted(
            &["g++", "musl-dev"],
            &[
                "sh",
                "-c",
                "g++ \"$0\" -o /tmp/output && /tmp/output",
                ARTIFACT_PLACEHOLDER,
            ],
        ),
        Java => interpreted(&["openjdk17-jdk"], &["java", ARTIFACT_PLACEHOLDER]),
        Go => interpreted(&["go"], &["go", "run", ARTIFACT_PLACEHOLDER]),
        Binary => RuntimeProfile::new(kind, &[], &["./{artifact}"]),
        Html => RuntimeProfile::inert(kind, "HTML file detected, manually handle this file."),
        Css => RuntimeProfile::inert(kind, "CSS file detected, manually handle this file."),
        CppHeader => RuntimeProfile::inert(
            kind,
            "C/C++ header file detected, manually handle this file.",
        ),
        Apk => RuntimeProfile::inert(kind, "APK file detected, manually handle this file."),
        Deb => RuntimeProfile::inert(kind, "Debian package detected, manually handle this file."),
        Rpm => RuntimeProfile::inert(kind, "RPM package detected, manually handle this file."),
        Tarball => RuntimeProfile::inert(kind, "Tarball file detected, manually handle this file."),
        Zip => RuntimeProfile::inert(kind, "Zip archive detected, manually handle this file."),
        Gzip => RuntimeProfile::inert(kind, "Gzip file detected, manually handle this file."),
        Document => RuntimeProfile::inert(
            kind,
            "Document file detected, manually handle this file.",
        ),
        Text => RuntimeProfile::inert(kind, "Text file detected, manually handle this file."),
        Log => RuntimeProfile::inert(kind, "Log file detected, manually handle this file."),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    #[error("extension {0:?} is not recognized")]
    UnknownExtension(String),
    #[error("no runtime profile registered for type {0}")]
    NoProfile(RuntimeKind),
}

/// Extension table plus the profiles that are enabled for this host.
#[derive(Debug, Clone)]
pub struct RuntimeProfileRegistry {
    extensions: ExtensionTable,
    profiles: BTreeMap<RuntimeKind, RuntimeProfile>,
}

impl Default for RuntimeProfileRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl RuntimeProfileRegistry {
    pub fn standard() -> Self {
        Self {
            extensions: ExtensionTable::standard(),
            profiles: RuntimeKind::ALL
                .iter()
                .map(|kind| (*kind, standard_profile(*kind)))
                .collect(),
        }
    }

    /// Drop the profiles of `disabled`; their lookups become unsupported.
    pub fn without(mut self, disabled: &[RuntimeKind]) -> Self {
        for kind in disabled {
            self.profiles.remove(kind);
        }
        self
    }

    pub fn extensions(&self) -> &ExtensionTable {
        &self.extensions
    }

    pub fn lookup(&self, extension: &str) -> Result<&RuntimeProfile, ProfileError> {
        let kind = self
            .extensions
            .kind_of(extension)
            .ok_or_else(|| ProfileError::UnknownExtension(extension.to_string()))?;
        self.profile(kind)
    }

    pub fn profile(&self, kind: RuntimeKind) -> Result<&RuntimeProfile, ProfileError> {
        self.profiles.get(&kind).ok_or(ProfileError::NoProfile(kind))
    }

    pub fn profiles(&self) -> impl Iterator<Item = &RuntimeProfile> {
        self.profiles.values()
    }
}
