//! Namer configuration: the YAML rule file and the inline selectors.
//!
//! ```yaml
//! process_names:
//!   - name: "{{.Matches.Script}}"
//!     comm: [python3]
//!     cmdline: ['(?P<Script>[^/ ]+)\.py']
//!   - comm: [bash, zsh]
//! ```

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::collector::procfs::UserResolver;
use crate::collector::traits::FileSystem;
use crate::proc::namer::{
    ExePattern, MatchNamer, NamePattern, ProcnameNamer, Rule, RuleNamer, Template,
};

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid regex {pattern:?}: {source}")]
    Regex {
        pattern: String,
        source: regex::Error,
    },
    #[error("invalid template {template:?}: {message}")]
    Template { template: String, message: String },
    #[error("rule {index}: {message}")]
    Rule { index: usize, message: String },
    #[error("{0}")]
    Selector(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    process_names: Vec<RuleSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RuleSpec {
    name: Option<String>,
    comm: Vec<String>,
    exe: Vec<String>,
    cmdline: Vec<String>,
    environ: BTreeMap<String, String>,
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::Regex {
        pattern: pattern.to_string(),
        source,
    })
}

impl RuleSpec {
    fn into_rule(self) -> Result<Rule, ConfigError> {
        let name = Template::parse(self.name.as_deref().unwrap_or(Template::DEFAULT))?;
        Ok(Rule {
            name,
            comm: self
                .comm
                .iter()
                .map(|p| NamePattern::parse(p))
                .collect::<Result<_, _>>()?,
            exe: self
                .exe
                .iter()
                .map(|p| ExePattern::parse(p))
                .collect::<Result<_, _>>()?,
            cmdline: self
                .cmdline
                .iter()
                .map(|p| compile(p))
                .collect::<Result<_, _>>()?,
            environ: self
                .environ
                .into_iter()
                .map(|(var, p)| Ok((var, compile(&p)?)))
                .collect::<Result<_, ConfigError>>()?,
        })
    }
}

/// Parses a YAML rule document into ordered rules.
pub fn parse_rules(yaml: &str) -> Result<Vec<Rule>, ConfigError> {
    let file: ConfigFile = serde_yaml::from_str(yaml)?;
    file.process_names
        .into_iter()
        .map(RuleSpec::into_rule)
        .collect()
}

/// Loads `/etc/passwd` for `{{.Username}}`; a missing file leaves uids numeric.
pub fn load_users<F: FileSystem>(fs: &F, passwd: &Path) -> UserResolver {
    let mut users = UserResolver::new();
    match fs.read_to_string(passwd) {
        Ok(content) => users.load_from_content(&content),
        Err(e) => warn!(
            path = %passwd.display(),
            error = %e,
            "cannot read passwd, usernames unavailable"
        ),
    }
    users
}

/// Loads the rule file at `path`.
pub fn load_rule_namer<F: FileSystem>(
    fs: &F,
    path: &Path,
    passwd: &Path,
) -> Result<RuleNamer, ConfigError> {
    let yaml = fs.read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let rules = parse_rules(&yaml)?;
    debug!(path = %path.display(), rules = rules.len(), "loaded naming rules");
    RuleNamer::new(rules, load_users(fs, passwd))
}

/// Builds the `-procnames` / `-namemapping` namer.
///
/// `namemapping` is a comma separated list of `comm,regex` pairs.
pub fn procname_namer(procnames: &str, namemapping: &str) -> Result<ProcnameNamer, ConfigError> {
    let names: Vec<String> = split_csv(procnames).map(str::to_string).collect();
    if names.is_empty() {
        return Err(ConfigError::Selector("-procnames is empty".to_string()));
    }

    let items: Vec<&str> = split_csv(namemapping).collect();
    if items.len() % 2 != 0 {
        return Err(ConfigError::Selector(
            "-namemapping needs an even number of comm,regex items".to_string(),
        ));
    }
    let mut mappings = HashMap::new();
    for pair in items.chunks_exact(2) {
        mappings.insert(pair[0].to_string(), compile(pair[1])?);
    }

    Ok(ProcnameNamer::new(names, mappings))
}

fn split_csv(s: &str) -> impl Iterator<Item = &str> {
    s.split(',').map(str::trim).filter(|item| !item.is_empty())
}

/// Where process names come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamerSource {
    ConfigFile(PathBuf),
    Procnames { names: String, mapping: String },
}

impl NamerSource {
    /// Picks the namer source from the command line options; exactly one
    /// of a config file or `-procnames` must be given.
    pub fn select(
        config_path: Option<PathBuf>,
        procnames: Option<String>,
        namemapping: Option<String>,
    ) -> Result<Self, ConfigError> {
        match (config_path, procnames) {
            (Some(_), Some(_)) => Err(ConfigError::Selector(
                "-config.path cannot be combined with -procnames".to_string(),
            )),
            (Some(_), None) if namemapping.is_some() => Err(ConfigError::Selector(
                "-config.path cannot be combined with -namemapping".to_string(),
            )),
            (Some(path), None) => Ok(NamerSource::ConfigFile(path)),
            (None, Some(names)) => Ok(NamerSource::Procnames {
                names,
                mapping: namemapping.unwrap_or_default(),
            }),
            (None, None) => Err(ConfigError::Selector(
                "one of -config.path or -procnames is required".to_string(),
            )),
        }
    }

    /// Builds the namer this source describes.
    pub fn build<F: FileSystem>(
        &self,
        fs: &F,
        passwd: &Path,
    ) -> Result<Box<dyn MatchNamer>, ConfigError> {
        Ok(match self {
            NamerSource::ConfigFile(path) => Box::new(load_rule_namer(fs, path, passwd)?),
            NamerSource::Procnames { names, mapping } => Box::new(procname_namer(names, mapping)?),
        })
    }
}
