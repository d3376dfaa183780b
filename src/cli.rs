//! Minimal CLI: compile schemas → (generate | check)
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;

use crate::generator::Generator;
use crate::schema;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// compile JSON schemas and either emit Rust source that rebuilds them or
/// check JSON documents against one
#[derive(Parser, Debug)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// compile schemas and emit a Rust module that reconstructs them
    Generate(GenerateOut),
    /// compile one schema and validate JSON documents against it
    Check(CheckSettings),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct GenerateOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// validator name for the first schema (file stems otherwise)
    #[arg(long)]
    name: Option<String>,

    /// path prefix used in the emitted source
    #[arg(long, default_value = "jsv")]
    prefix: String,

    /// output .rs file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct CheckSettings {
    /// schema file to compile
    #[arg(long, short)]
    schema: PathBuf,

    #[command(flatten)]
    input_settings: InputSettings,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn resolve(&self) -> anyhow::Result<Vec<PathBuf>> {
        let paths = resolve_file_path_patterns(&self.input)?;
        if paths.is_empty() {
            bail!("no input files");
        }
        Ok(paths)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> anyhow::Result<()> {
        match &self.cmd {
            Command::Generate(target) => run_generate(target),
            Command::Check(target) => run_check(target),
        }
    }
}

fn run_generate(target: &GenerateOut) -> anyhow::Result<()> {
    // 1) compile every input schema, in supply order
    let mut validators = Vec::new();
    for (index, source_path) in target.input_settings.resolve()?.iter().enumerate() {
        let doc = load_json(source_path)?;
        let name = match (index, target.name.as_ref()) {
            (0, Some(name)) => sanitize_identifier(name),
            _ => validator_name_for(source_path),
        };
        let v = schema::compile(name, &doc)
            .with_context(|| format!("failed to compile schema {}", source_path.display()))?;
        validators.push(v);
    }

    // 2) serialize them into one module
    let mut buf = Vec::new();
    Generator::with_prefix(target.prefix.as_str()).process(&mut buf, &validators)?;

    if let Some(out) = target.out.as_ref() {
        if let Some(parent) = out.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        std::fs::write(out, &buf)
            .with_context(|| format!("failed to write {}", out.display()))?;
    } else {
        print!("{}", String::from_utf8_lossy(&buf));
    }
    Ok(())
}

fn run_check(target: &CheckSettings) -> anyhow::Result<()> {
    let doc = load_json(&target.schema)?;
    let v = schema::compile(validator_name_for(&target.schema), &doc)
        .with_context(|| format!("failed to compile schema {}", target.schema.display()))?;

    let mut failures = 0usize;
    for source_path in target.input_settings.resolve()? {
        let value = load_json(&source_path)?;
        match v.validate(&value) {
            Ok(()) => {
                println!("{} {}", "ok".green().bold(), source_path.display());
            }
            Err(error) => {
                failures += 1;
                println!("{} {}: {error}", "fail".red().bold(), source_path.display());
            }
        }
    }
    if failures > 0 {
        bail!("{failures} document(s) failed validation");
    }
    Ok(())
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn load_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let de = &mut serde_json::Deserializer::from_str(&source);
    let value: serde_json::Value = serde_path_to_error::deserialize(de)
        .with_context(|| format!("failed to parse JSON in {}", path.display()))?;
    Ok(value)
}

/// Derive an identifier-safe validator name from a file stem.
fn validator_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    sanitize_identifier(&stem)
}

/// Emitted names land in `pub static` declarations, so anything that is not
/// a legal identifier gets rewritten rather than surfacing later as a
/// canonicalization failure.
fn sanitize_identifier(raw: &str) -> String {
    let mut name: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, 'V');
    }
    name
}

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            // Treat as a glob pattern
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                matched_any = true;
                out.push(entry?);
            }
            if !matched_any {
                // Pattern was explicitly a glob but matched nothing -> surface as an error
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            // Treat as a literal path
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validator_names_are_identifier_safe() {
        assert_eq!(validator_name_for(Path::new("user-profile.json")), "user_profile");
        assert_eq!(validator_name_for(Path::new("2fa.json")), "V2fa");
        assert_eq!(validator_name_for(Path::new("simple.json")), "simple");
    }

    #[test]
    fn explicit_names_are_sanitized_too() {
        assert_eq!(sanitize_identifier("my-name"), "my_name");
        assert_eq!(sanitize_identifier("2fa"), "V2fa");
        assert_eq!(sanitize_identifier(""), "V");
        assert_eq!(sanitize_identifier("Person"), "Person");
    }

    #[test]
    fn literal_paths_pass_through() {
        let paths = resolve_file_path_patterns(["a.json", "b.json"]).unwrap();
        assert_eq!(paths, vec![PathBuf::from("a.json"), PathBuf::from("b.json")]);
    }
}
