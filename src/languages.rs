//! Language configuration for compilation and execution

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;

use crate::error::ExecutionError;

/// Placeholder replaced by the caller-supplied class name
pub const CLASS_NAME_PLACEHOLDER: &str = "{name}";

/// Class name used when the caller supplies none
pub const DEFAULT_CLASS_NAME: &str = "Main";

/// File the program's stdin is read from, inside the work dir
pub const STDIN_FILE: &str = "stdin.txt";

/// Exit status reported by `timeout` when it kills the program
pub const TIMEOUT_EXIT_STATUS: i64 = 124;

const BUILTIN_LANGUAGES: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/files/languages.toml"));

/// Build/run recipe for one language
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageProfile {
    /// Primary language id (e.g. "cpp")
    pub id: String,
    /// Container image the program runs in
    pub image: String,
    /// Name of the source file (e.g. "main.cpp")
    pub source_file: String,
    /// Compile command (None if not needed)
    pub compile_command: Option<String>,
    /// Run command
    pub run_command: String,
    /// Non-zero exit statuses whose output is returned as a normal result
    pub captured_exit_codes: Vec<i64>,
}

/// Everything needed to create the environment for one run
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    pub image: String,
    /// Source file name inside the work dir
    pub source_file: String,
    /// Shell script executed as the container command
    pub script: String,
}

impl RunPlan {
    /// Container command (program + args)
    pub fn command(&self) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), self.script.clone()]
    }
}

impl LanguageProfile {
    /// Whether the toolchain needs a caller-chosen class name
    pub fn uses_class_name(&self) -> bool {
        self.source_file.contains(CLASS_NAME_PLACEHOLDER)
            || self.run_command.contains(CLASS_NAME_PLACEHOLDER)
            || self
                .compile_command
                .as_deref()
                .is_some_and(|cmd| cmd.contains(CLASS_NAME_PLACEHOLDER))
    }

    /// Materialize the build-and-run script.
    ///
    /// Source and stdin are not part of the script; they are written into
    /// the work dir as files. The only caller text substituted here is the
    /// class name, which must be a plain identifier.
    pub fn plan(
        &self,
        aux_filename: Option<&str>,
        timeout_secs: u64,
    ) -> Result<RunPlan, ExecutionError> {
        let class_name = if self.uses_class_name() {
            resolve_class_name(aux_filename)?
        } else {
            DEFAULT_CLASS_NAME.to_string()
        };
        let fill = |template: &str| template.replace(CLASS_NAME_PLACEHOLDER, &class_name);

        let run = format!(
            "timeout {} {} < {}",
            timeout_secs,
            fill(&self.run_command),
            STDIN_FILE
        );
        let script = match &self.compile_command {
            Some(compile) => format!("{} && {}", fill(compile), run),
            None => run,
        };

        Ok(RunPlan {
            image: self.image.clone(),
            source_file: fill(&self.source_file),
            script,
        })
    }
}

/// Turn the caller's filename into a Java class name
fn resolve_class_name(aux_filename: Option<&str>) -> Result<String, ExecutionError> {
    let raw = match aux_filename.map(str::trim) {
        None | Some("") => return Ok(DEFAULT_CLASS_NAME.to_string()),
        Some(name) => name,
    };
    let name = raw.strip_suffix(".java").unwrap_or(raw);

    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    // `$` is legal in Java but would be expanded by the shell
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid_start && valid_rest {
        Ok(name.to_string())
    } else {
        Err(ExecutionError::InvalidClassName(raw.to_string()))
    }
}

/// Raw TOML configuration for a language
#[derive(Debug, Deserialize)]
struct RawLanguageProfile {
    image: String,
    source_file: String,
    compile_command: Option<String>,
    run_command: String,
    #[serde(default = "default_captured_exit_codes")]
    captured_exit_codes: Vec<i64>,
    #[serde(default)]
    aliases: Vec<String>,
}

fn default_captured_exit_codes() -> Vec<i64> {
    vec![1]
}

/// Profile table keyed by language id and alias
#[derive(Debug, Clone, Default)]
pub struct Languages {
    profiles: HashMap<String, Arc<LanguageProfile>>,
}

impl Languages {
    /// Profiles embedded at build time from `files/languages.toml`
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_toml(BUILTIN_LANGUAGES)
    }

    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read language config {:?}", path))?;
        Self::from_toml(&content).with_context(|| format!("Invalid language config {:?}", path))
    }

    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let raw_profiles: HashMap<String, RawLanguageProfile> = toml::from_str(content)?;
        let raw_ids: BTreeSet<String> = raw_profiles.keys().map(|k| k.to_lowercase()).collect();
        let mut profiles = HashMap::new();

        for (name, raw) in raw_profiles {
            let id = name.to_lowercase();

            if let Some(code) = raw
                .captured_exit_codes
                .iter()
                .find(|&&code| code == 0 || code == TIMEOUT_EXIT_STATUS)
            {
                anyhow::bail!("Exit status {} cannot be captured for {}", code, id);
            }
            if raw.source_file.trim().is_empty() || raw.run_command.trim().is_empty() {
                anyhow::bail!("Language {} needs a source_file and a run_command", id);
            }

            let profile = Arc::new(LanguageProfile {
                id: id.clone(),
                image: raw.image,
                source_file: raw.source_file,
                compile_command: raw.compile_command,
                run_command: raw.run_command,
                captured_exit_codes: raw.captured_exit_codes,
            });

            // Add main language name
            profiles.insert(id, profile.clone());

            // Add aliases
            for alias in raw.aliases {
                let alias = alias.to_lowercase();
                if raw_ids.contains(&alias) {
                    continue;
                }
                if let Some(existing) = profiles.get(&alias) {
                    if existing.id != profile.id {
                        anyhow::bail!(
                            "Alias {} is declared by both {} and {}",
                            alias,
                            existing.id,
                            profile.id
                        );
                    }
                    continue;
                }
                profiles.insert(alias, profile.clone());
            }
        }

        Ok(Self { profiles })
    }

    /// Get language profile by id or alias
    pub fn get(&self, language: &str) -> Option<&LanguageProfile> {
        self.profiles
            .get(&language.trim().to_lowercase())
            .map(|profile| profile.as_ref())
    }

    /// Primary language ids, sorted
    pub fn supported(&self) -> Vec<String> {
        self.profiles
            .values()
            .map(|profile| profile.id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Distinct images referenced by the profiles, sorted
    pub fn images(&self) -> Vec<String> {
        self.profiles
            .values()
            .map(|profile| profile.image.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}
