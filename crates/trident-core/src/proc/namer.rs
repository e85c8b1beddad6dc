//! Process classification: maps a process to a group name, or rejects it.
//!
//! Two namers exist:
//! - [`RuleNamer`]: ordered rules from the YAML config file. The first rule
//!   whose matchers all pass names the process through its template.
//! - [`ProcnameNamer`]: the `-procnames`/`-namemapping` shorthand.

use std::collections::{HashMap, HashSet};

use regex::Regex;

use crate::collector::procfs::parser::UserResolver;
use crate::config::ConfigError;
use crate::proc::types::ProcAttrs;

/// Classifies processes into groups.
pub trait MatchNamer: Send {
    /// Group name for the process, or `None` to reject it.
    ///
    /// A returned name is never empty.
    fn match_and_name(&self, attrs: &ProcAttrs) -> Option<String>;

    /// Whether matching needs `/proc/[pid]/environ`.
    fn needs_environ(&self) -> bool {
        false
    }
}

impl<N: MatchNamer + ?Sized> MatchNamer for Box<N> {
    fn match_and_name(&self, attrs: &ProcAttrs) -> Option<String> {
        (**self).match_and_name(attrs)
    }

    fn needs_environ(&self) -> bool {
        (**self).needs_environ()
    }
}

/// Shell-style pattern (`*`, `?`) or literal string.
#[derive(Debug, Clone)]
pub enum NamePattern {
    Exact(String),
    Glob(Regex),
}

impl NamePattern {
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        if !pattern.contains(['*', '?']) {
            return Ok(NamePattern::Exact(pattern.to_string()));
        }

        let mut re = String::with_capacity(pattern.len() + 8);
        re.push('^');
        for c in pattern.chars() {
            match c {
                '*' => re.push_str(".*"),
                '?' => re.push('.'),
                other => re.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
            }
        }
        re.push('$');

        Regex::new(&re)
            .map(NamePattern::Glob)
            .map_err(|source| ConfigError::Regex {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            NamePattern::Exact(s) => s == value,
            NamePattern::Glob(re) => re.is_match(value),
        }
    }
}

/// Executable matcher: a pattern containing `/` is compared with the full
/// path (`argv[0]`), anything else with its basename.
#[derive(Debug, Clone)]
pub struct ExePattern {
    full_path: bool,
    pattern: NamePattern,
}

impl ExePattern {
    pub fn parse(pattern: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            full_path: pattern.contains('/'),
            pattern: NamePattern::parse(pattern)?,
        })
    }

    fn matches(&self, exe_full: &str, exe_base: &str) -> bool {
        if self.full_path {
            self.pattern.matches(exe_full)
        } else {
            self.pattern.matches(exe_base)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Literal(String),
    Comm,
    ExeBase,
    ExeFull,
    Username,
    Pid,
    StartTime,
    Match(String),
}

/// Group name template, e.g. `{{.Comm}}-{{.Matches.Script}}`.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub const DEFAULT: &'static str = "{{.ExeBase}}";

    pub fn parse(template: &str) -> Result<Self, ConfigError> {
        let error = |message: &str| ConfigError::Template {
            template: template.to_string(),
            message: message.to_string(),
        };

        let mut segments = Vec::new();
        let mut rest = template;
        while let Some(open) = rest.find("{{") {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let after = &rest[open + 2..];
            let close = after.find("}}").ok_or_else(|| error("unterminated '{{'"))?;
            let field = after[..close].trim();
            let field = field
                .strip_prefix('.')
                .ok_or_else(|| error("field must start with '.'"))?;

            segments.push(match field {
                "Comm" => Segment::Comm,
                "ExeBase" => Segment::ExeBase,
                "ExeFull" => Segment::ExeFull,
                "Username" => Segment::Username,
                "PID" => Segment::Pid,
                "StartTime" => Segment::StartTime,
                other => match other.strip_prefix("Matches.") {
                    Some(name) if !name.is_empty() => Segment::Match(name.to_string()),
                    _ => return Err(error(&format!("unknown field '.{}'", other))),
                },
            });
            rest = &after[close + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self { segments })
    }

    fn uses_username(&self) -> bool {
        self.segments.contains(&Segment::Username)
    }

    fn render(&self, ctx: &TemplateContext<'_>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Comm => out.push_str(&ctx.attrs.comm),
                Segment::ExeBase => out.push_str(ctx.exe_base),
                Segment::ExeFull => out.push_str(ctx.exe_full),
                Segment::Username => out.push_str(&ctx.username),
                Segment::Pid => out.push_str(&ctx.attrs.pid.to_string()),
                Segment::StartTime => {
                    let start = ctx.attrs.start_time as i64;
                    if let Some(t) = chrono::DateTime::from_timestamp(start, 0) {
                        out.push_str(&t.format("%Y-%m-%dT%H:%M:%SZ").to_string());
                    }
                }
                Segment::Match(name) => {
                    if let Some(value) = ctx.matches.get(name) {
                        out.push_str(value);
                    }
                }
            }
        }
        out
    }
}

struct TemplateContext<'a> {
    attrs: &'a ProcAttrs,
    exe_base: &'a str,
    exe_full: &'a str,
    username: String,
    matches: HashMap<String, String>,
}

/// `argv[0]` and its basename; falls back to comm for kernel threads.
fn exe_names(attrs: &ProcAttrs) -> (&str, &str) {
    match attrs.cmdline.first() {
        Some(argv0) if !argv0.is_empty() => {
            let base = argv0.rsplit('/').next().unwrap_or(argv0);
            (argv0.as_str(), base)
        }
        _ => (attrs.comm.as_str(), attrs.comm.as_str()),
    }
}

/// Collects named captures of `re` on `haystack` into `matches`.
fn capture_into(re: &Regex, haystack: &str, matches: &mut HashMap<String, String>) -> bool {
    let Some(caps) = re.captures(haystack) else {
        return false;
    };
    for name in re.capture_names().flatten() {
        if let Some(m) = caps.name(name) {
            matches.insert(name.to_string(), m.as_str().to_string());
        }
    }
    true
}

/// One naming rule. Every specified matcher must pass.
#[derive(Debug, Clone)]
pub struct Rule {
    pub name: Template,
    /// Any-of.
    pub comm: Vec<NamePattern>,
    /// Any-of.
    pub exe: Vec<ExePattern>,
    /// All-of, against the space-joined command line.
    pub cmdline: Vec<Regex>,
    /// All-of; the variable must be set and match.
    pub environ: Vec<(String, Regex)>,
}

impl Rule {
    fn is_empty(&self) -> bool {
        self.comm.is_empty()
            && self.exe.is_empty()
            && self.cmdline.is_empty()
            && self.environ.is_empty()
    }

    /// Runs the matchers; on success returns the captured named groups.
    fn evaluate(
        &self,
        attrs: &ProcAttrs,
        exe_full: &str,
        exe_base: &str,
    ) -> Option<HashMap<String, String>> {
        if !self.comm.is_empty() && !self.comm.iter().any(|p| p.matches(&attrs.comm)) {
            return None;
        }
        if !self.exe.is_empty() && !self.exe.iter().any(|p| p.matches(exe_full, exe_base)) {
            return None;
        }

        let mut matches = HashMap::new();
        if !self.cmdline.is_empty() {
            let joined = attrs.cmdline.join(" ");
            for re in &self.cmdline {
                if !capture_into(re, &joined, &mut matches) {
                    return None;
                }
            }
        }
        if !self.environ.is_empty() {
            let environ = attrs.environ.as_ref()?;
            for (var, re) in &self.environ {
                let value = environ.get(var)?;
                if !capture_into(re, value, &mut matches) {
                    return None;
                }
            }
        }
        Some(matches)
    }
}

/// Namer driven by ordered config file rules.
#[derive(Debug)]
pub struct RuleNamer {
    rules: Vec<Rule>,
    users: UserResolver,
}

impl RuleNamer {
    /// Builds a namer; rules without any matcher are rejected.
    pub fn new(rules: Vec<Rule>, users: UserResolver) -> Result<Self, ConfigError> {
        if let Some(index) = rules.iter().position(Rule::is_empty) {
            return Err(ConfigError::Rule {
                index,
                message: "no matchers specified".to_string(),
            });
        }
        Ok(Self { rules, users })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }
}

impl MatchNamer for RuleNamer {
    fn match_and_name(&self, attrs: &ProcAttrs) -> Option<String> {
        let (exe_full, exe_base) = exe_names(attrs);

        let (rule, matches) = self
            .rules
            .iter()
            .find_map(|rule| rule.evaluate(attrs, exe_full, exe_base).map(|m| (rule, m)))?;

        let username = if rule.name.uses_username() {
            self.users.resolve(attrs.uid)
        } else {
            String::new()
        };
        let ctx = TemplateContext {
            attrs,
            exe_base,
            exe_full,
            username,
            matches,
        };

        let name = rule.name.render(&ctx);
        (!name.is_empty()).then_some(name)
    }

    fn needs_environ(&self) -> bool {
        self.rules.iter().any(|r| !r.environ.is_empty())
    }
}

/// Namer for the `-procnames` / `-namemapping` command-line shorthand.
///
/// A process is named by its comm. If a mapping exists for that comm and its
/// regex matches the space-joined command line, the name becomes
/// `comm:<first non-empty capture>`. Names not listed in `-procnames` are
/// rejected.
#[derive(Debug)]
pub struct ProcnameNamer {
    names: HashSet<String>,
    mappings: HashMap<String, Regex>,
}

impl ProcnameNamer {
    pub fn new(names: impl IntoIterator<Item = String>, mappings: HashMap<String, Regex>) -> Self {
        Self {
            names: names.into_iter().collect(),
            mappings,
        }
    }

    fn mapped_name(&self, attrs: &ProcAttrs) -> String {
        let Some(re) = self.mappings.get(&attrs.comm) else {
            return attrs.comm.clone();
        };
        let joined = attrs.cmdline.join(" ");
        let capture = re.captures(&joined).and_then(|caps| {
            caps.iter()
                .skip(1)
                .flatten()
                .map(|m| m.as_str())
                .find(|s| !s.is_empty())
                .map(str::to_string)
        });
        match capture {
            Some(c) => format!("{}:{}", attrs.comm, c),
            None => attrs.comm.clone(),
        }
    }
}

impl MatchNamer for ProcnameNamer {
    fn match_and_name(&self, attrs: &ProcAttrs) -> Option<String> {
        let name = self.mapped_name(attrs);
        (!name.is_empty() && self.names.contains(&name)).then_some(name)
    }
}
