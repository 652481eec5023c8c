use anyhow::{anyhow, Context, Result};
use std::collections::{HashMap, HashSet};
use std::env;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const PROJECT_FILE_NAME: &str = ".tallyrc";
const MAX_ALIAS_DEPTH: usize = 10;

/// Settings read from `.tallyrc` / `config.ini`
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    /// Arguments prepended to every invocation
    pub defaults: Option<String>,
    /// Named argument bundles expanded by `-a NAME`
    pub aliases: HashMap<String, String>,
}

impl ConfigFile {
    /// Walk up from the working directory looking for `.tallyrc`
    pub fn find_project_config() -> Option<PathBuf> {
        let start = env::current_dir().ok()?;
        Self::find_project_config_from(&start)
    }

    fn find_project_config_from(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(PROJECT_FILE_NAME))
            .find(|candidate| candidate.is_file())
    }

    /// User-level locations, most preferred first
    pub fn get_user_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        if cfg!(windows) {
            if let Ok(appdata) = env::var("APPDATA") {
                paths.push(PathBuf::from(appdata).join("tally").join("config.ini"));
            }
            if let Ok(profile) = env::var("USERPROFILE") {
                paths.push(PathBuf::from(profile).join(PROJECT_FILE_NAME));
            }
        } else {
            let home = env::var("HOME").ok().map(PathBuf::from);
            let xdg_config = env::var("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .ok()
                .or_else(|| home.as_ref().map(|h| h.join(".config")))
                .unwrap_or_else(|| PathBuf::from(".config"));

            paths.push(xdg_config.join("tally").join("config.ini"));
            if let Some(home) = home {
                paths.push(home.join(PROJECT_FILE_NAME));
            }
        }

        paths
    }

    /// Merge the first existing user file with the project file on top
    pub fn load() -> Result<Self> {
        let user = Self::get_user_config_paths()
            .into_iter()
            .find(|p| p.is_file());
        let project = Self::find_project_config();
        Self::load_layers(user.as_deref(), project.as_deref())
    }

    fn load_layers(user: Option<&Path>, project: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();
        for path in [user, project].into_iter().flatten() {
            config = config.overlay(Self::load_from_path(path)?);
        }
        Ok(config)
    }

    /// `--config-file` replaces discovery entirely
    pub fn load_with_custom_path(custom_path: Option<&str>) -> Result<Self> {
        match custom_path {
            Some(path) => Self::load_from_path(Path::new(path)),
            None => Self::load(),
        }
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("in config file {}", path.display()))
    }

    /// Parse INI text. Unknown sections and root keys are ignored.
    pub fn parse(content: &str) -> Result<Self> {
        let mut config = Self::default();
        let mut section = String::new();

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[') {
                let name = name
                    .strip_suffix(']')
                    .ok_or_else(|| anyhow!("line {}: unterminated section header", idx + 1))?;
                section = name.trim().to_string();
                continue;
            }

            let (key, value) = line
                .split_once('=')
                .ok_or_else(|| anyhow!("line {}: expected `key = value`", idx + 1))?;
            let (key, value) = (key.trim(), value.trim());

            match section.as_str() {
                "" if key == "defaults" => config.defaults = Some(value.to_string()),
                "aliases" => {
                    config.aliases.insert(key.to_string(), value.to_string());
                }
                _ => {}
            }
        }

        Ok(config)
    }

    /// `other` wins for defaults and for aliases with the same name
    fn overlay(mut self, other: Self) -> Self {
        if other.defaults.is_some() {
            self.defaults = other.defaults;
        }
        self.aliases.extend(other.aliases);
        self
    }

    /// Expand one alias, following nested `-a` references
    pub fn resolve_alias(&self, name: &str) -> Result<Vec<String>> {
        self.resolve_alias_inner(name, &mut HashSet::new())
    }

    fn resolve_alias_inner(&self, name: &str, chain: &mut HashSet<String>) -> Result<Vec<String>> {
        if chain.len() >= MAX_ALIAS_DEPTH {
            return Err(anyhow!("alias chain too deep at '{}'", name));
        }
        if !chain.insert(name.to_string()) {
            return Err(anyhow!("circular alias reference through '{}'", name));
        }

        let value = self
            .aliases
            .get(name)
            .ok_or_else(|| anyhow!("unknown alias '{}'", name))?;
        let words = shell_words::split(value)
            .with_context(|| format!("alias '{}' is not valid shell syntax", name))?;
        let expanded = self.expand_aliases(words, chain)?;

        chain.remove(name);
        Ok(expanded)
    }

    fn expand_aliases(&self, args: Vec<String>, chain: &mut HashSet<String>) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(args.len());
        let mut iter = args.into_iter();
        while let Some(arg) = iter.next() {
            if arg == "-a" || arg == "--alias" {
                match iter.next() {
                    Some(name) => out.extend(self.resolve_alias_inner(&name, chain)?),
                    // Leave a dangling flag for clap to report
                    None => out.push(arg),
                }
            } else if let Some(name) = arg.strip_prefix("--alias=") {
                out.extend(self.resolve_alias_inner(name, chain)?);
            } else {
                out.push(arg);
            }
        }
        Ok(out)
    }

    /// Prepend `defaults` after the program name, then expand aliases
    pub fn process_args(&self, args: Vec<String>) -> Result<Vec<String>> {
        let mut args = args.into_iter();
        let mut combined: Vec<String> = args.next().into_iter().collect();

        if let Some(defaults) = &self.defaults {
            let words =
                shell_words::split(defaults).context("`defaults` is not valid shell syntax")?;
            combined.extend(words);
        }
        combined.extend(args);

        self.expand_aliases(combined, &mut HashSet::new())
    }

    /// Report for `--show-config`
    pub fn describe() -> String {
        let project = Self::find_project_config();
        let user_paths = Self::get_user_config_paths();
        let mut out = String::new();

        let _ = writeln!(
            out,
            "Configuration precedence: CLI > project {} > user config > built-in defaults\n",
            PROJECT_FILE_NAME
        );

        match Self::load() {
            Ok(config) => {
                match &config.defaults {
                    Some(defaults) => {
                        let _ = writeln!(out, "Active defaults:\n  defaults = {}", defaults);
                    }
                    None => {
                        let _ = writeln!(out, "No defaults configured.");
                    }
                }
                if !config.aliases.is_empty() {
                    let _ = writeln!(out, "\nActive aliases:");
                    let mut names: Vec<_> = config.aliases.iter().collect();
                    names.sort();
                    for (name, value) in names {
                        let _ = writeln!(out, "  {} = {}", name, value);
                    }
                }
            }
            Err(e) => {
                let _ = writeln!(out, "Error loading configuration: {:#}", e);
            }
        }

        let _ = writeln!(out, "\nSearch locations (in precedence order):");
        match &project {
            Some(path) => {
                let _ = writeln!(out, "  1. Project: {} (found)", path.display());
            }
            None => {
                let _ = writeln!(
                    out,
                    "  1. Project: {} (searched up from the working directory, not found)",
                    PROJECT_FILE_NAME
                );
            }
        }
        for (i, path) in user_paths.iter().enumerate() {
            let status = if path.is_file() { "found" } else { "not found" };
            let _ = writeln!(out, "  {}. User: {} ({})", i + 2, path.display(), status);
        }

        if project.is_none() && !user_paths.iter().any(|p| p.is_file()) {
            let _ = writeln!(out, "\nExample {}:\n", PROJECT_FILE_NAME);
            let _ = writeln!(out, "defaults = --threads 8 --batch-size 5000 --stats");
            let _ = writeln!(out, "\n[aliases]");
            let _ = writeln!(out, "quick = --deadline 10s");
            let _ = writeln!(out, "csv = --separator , --identity-field 2 --period-field 5");
        }

        out
    }
}
