//! Allow-listed command patterns.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::HelmError;

/// Substrings that let a shell run something other than the matched command.
const BLOCKED_SEQUENCES: &[&str] = &[";", "&", "|", "<", ">", "`", "$(", "${", "\n", "\r"];

/// Characters the shell would expand or re-split after matching: parameter
/// expansion, globbing, tilde and brace expansion, quoting, escapes, comments
/// and subshell grouping.
const EXPANSION_CHARS: &[char] = &[
    '$', '*', '?', '[', ']', '~', '{', '}', '\'', '"', '\\', '#', '(', ')',
];

/// One argument position of a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgToken {
    Literal(String),
    /// Matches exactly one argument.
    Wildcard,
}

/// A single allowlist entry such as `npm *` or `git status`.
///
/// A trailing `*` accepts any remaining arguments, including none. Any other
/// `*` stands for exactly one argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CommandPattern {
    command_name: String,
    arg_tokens: Vec<ArgToken>,
    rest: bool,
}

impl CommandPattern {
    pub fn parse(pattern: &str) -> Result<Self, HelmError> {
        let mut tokens = pattern.split_whitespace();
        let command_name = tokens
            .next()
            .ok_or_else(|| HelmError::Configuration("empty allowlist pattern".to_string()))?;
        if command_name == "*" {
            return Err(HelmError::Configuration(
                "allowlist pattern must start with a command name".to_string(),
            ));
        }

        let mut arg_tokens: Vec<ArgToken> = tokens
            .map(|token| match token {
                "*" => ArgToken::Wildcard,
                literal => ArgToken::Literal(literal.to_string()),
            })
            .collect();
        let rest = matches!(arg_tokens.last(), Some(ArgToken::Wildcard));
        if rest {
            arg_tokens.pop();
        }

        Ok(Self {
            command_name: command_name.to_string(),
            arg_tokens,
            rest,
        })
    }

    pub fn command_name(&self) -> &str {
        &self.command_name
    }

    /// Match an already tokenized command line (command name first).
    pub fn matches(&self, tokens: &[&str]) -> bool {
        let Some((command, args)) = tokens.split_first() else {
            return false;
        };
        if *command != self.command_name {
            return false;
        }
        if args.len() < self.arg_tokens.len() || (!self.rest && args.len() != self.arg_tokens.len())
        {
            return false;
        }
        self.arg_tokens
            .iter()
            .zip(args)
            .all(|(expected, actual)| match expected {
                ArgToken::Wildcard => true,
                ArgToken::Literal(literal) => literal == actual,
            })
    }
}

impl FromStr for CommandPattern {
    type Err = HelmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for CommandPattern {
    type Error = HelmError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CommandPattern> for String {
    fn from(pattern: CommandPattern) -> Self {
        pattern.to_string()
    }
}

impl fmt::Display for CommandPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_name)?;
        for token in &self.arg_tokens {
            match token {
                ArgToken::Literal(literal) => write!(f, " {literal}")?,
                ArgToken::Wildcard => f.write_str(" *")?,
            }
        }
        if self.rest {
            f.write_str(" *")?;
        }
        Ok(())
    }
}

/// Ordered allowlist plus the shell used to run accepted lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllowlistConfig {
    pub patterns: Vec<CommandPattern>,
    pub shell: String,
}

impl Default for AllowlistConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            shell: "/bin/sh".to_string(),
        }
    }
}

impl AllowlistConfig {
    /// Build from pattern strings, failing on the first malformed entry.
    pub fn from_patterns<I, S>(patterns: I) -> Result<Self, HelmError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| CommandPattern::parse(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            patterns,
            ..Self::default()
        })
    }

    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Whether `command_line` may run. Empty lines and lines with shell
    /// control or expansion characters are always rejected, so the words the
    /// shell executes are exactly the tokens matched here.
    pub fn validate(&self, command_line: &str) -> bool {
        if BLOCKED_SEQUENCES
            .iter()
            .any(|blocked| command_line.contains(blocked))
            || command_line.contains(EXPANSION_CHARS)
        {
            return false;
        }
        let tokens: Vec<&str> = command_line.split_whitespace().collect();
        if tokens.is_empty() {
            return false;
        }
        self.patterns.iter().any(|pattern| pattern.matches(&tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allowlist(patterns: &[&str]) -> AllowlistConfig {
        AllowlistConfig::from_patterns(patterns).unwrap()
    }

    #[test]
    fn npm_wildcard_and_bare_pwd() {
        let list = allowlist(&["npm *", "pwd"]);

        assert!(list.validate("npm install"));
        assert!(list.validate("npm"));
        assert!(list.validate("npm run build"));
        assert!(list.validate("pwd"));
        assert!(!list.validate("pwd -P"));
        assert!(!list.validate("rm -rf /"));
        assert!(!list.validate(""));
        assert!(!list.validate("   "));
    }

    #[test]
    fn positional_wildcard_matches_exactly_one_argument() {
        let list = allowlist(&["git * status"]);

        assert!(list.validate("git -C status"));
        assert!(!list.validate("git status"));
        assert!(!list.validate("git -C repo status --short"));
    }

    #[test]
    fn literals_must_match_exactly() {
        let list = allowlist(&["git status", "cargo test *"]);

        assert!(list.validate("git status"));
        assert!(list.validate("git   status"));
        assert!(!list.validate("git push"));
        assert!(list.validate("cargo test --all"));
        assert!(!list.validate("cargo build"));
    }

    #[test]
    fn shell_control_characters_are_rejected() {
        let list = allowlist(&["npm *", "echo *"]);

        assert!(!list.validate("npm install; rm -rf /"));
        assert!(!list.validate("npm install && curl evil"));
        assert!(!list.validate("echo hi | sh"));
        assert!(!list.validate("echo $(whoami)"));
        assert!(!list.validate("echo `whoami`"));
        assert!(!list.validate("echo hi > /etc/passwd"));
        assert!(!list.validate("echo hi\nrm -rf /"));
    }

    #[test]
    fn globs_cannot_widen_a_positional_wildcard() {
        let list = allowlist(&["echo * end", "ls *"]);

        assert!(list.validate("echo a1 end"));
        assert!(!list.validate("echo a* end"));
        assert!(!list.validate("echo a? end"));
        assert!(!list.validate("echo [a]1 end"));
        assert!(!list.validate("echo {a,b} end"));
        assert!(!list.validate("ls *"));
        assert!(!list.validate("ls ~"));
    }

    #[test]
    fn variable_expansion_quoting_and_escapes_are_rejected() {
        let list = allowlist(&["echo * end", "echo *"]);

        assert!(!list.validate("echo $HOME end"));
        assert!(!list.validate("echo $ANTHROPIC_API_KEY"));
        assert!(!list.validate("echo $1 end"));
        assert!(!list.validate("echo 'two words' end"));
        assert!(!list.validate("echo \"two words\" end"));
        assert!(!list.validate("echo a\\ b end"));
        assert!(!list.validate("echo hi # end"));
        assert!(!list.validate("echo (hi) end"));
        assert!(list.validate("echo hello-world end"));
    }

    #[test]
    fn patterns_round_trip_through_strings() {
        for raw in ["npm *", "pwd", "git * status", "git * *"] {
            assert_eq!(CommandPattern::parse(raw).unwrap().to_string(), raw);
        }
        assert!(CommandPattern::parse("  ").is_err());
        assert!(CommandPattern::parse("* foo").is_err());
    }

    #[test]
    fn deserializes_from_toml_strings() {
        let config: AllowlistConfig =
            toml::from_str("patterns = [\"ls *\", \"pwd\"]\nshell = \"/bin/bash\"").unwrap();
        assert_eq!(config.patterns.len(), 2);
        assert_eq!(config.patterns[0].command_name(), "ls");
        assert_eq!(config.shell, "/bin/bash");
    }
}
