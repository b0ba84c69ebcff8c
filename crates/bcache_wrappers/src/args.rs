//! The dialect-independent argument model.
//!
//! A parsed command line is a sequence of [`ArgAtom`]s. Each atom records
//! the option name, its value (possibly empty), and the joining shape the
//! source text used. The shape must survive a round trip back to tokens so
//! that respawned children see exactly the command line they expect.

use std::path::PathBuf;

use crate::error::WrapperError;

/// How an option and its value were joined in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Joined {
    /// A flag with no value (`-c`).
    Bare,
    /// Two tokens (`-I path`).
    Separate,
    /// One token with an equals sign (`--emit=link`).
    Equals,
    /// One token, value concatenated to the flag (`-Ipath`).
    Concatenated,
}

/// One parsed command-line atom: `(flag, value, joined)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgAtom {
    /// The option name, including its dashes (`-D`, `--emit`), or the bare
    /// token itself for positionals.
    pub flag: String,
    /// The option's value, or empty.
    pub value: String,
    /// The joining shape used in the source text.
    pub joined: Joined,
}

impl ArgAtom {
    /// A flag with no value.
    pub fn bare(flag: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            value: String::new(),
            joined: Joined::Bare,
        }
    }

    /// A two-token `flag value` pair.
    pub fn separate(flag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            value: value.into(),
            joined: Joined::Separate,
        }
    }

    /// An equals-joined `flag=value` token.
    pub fn equals(flag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            value: value.into(),
            joined: Joined::Equals,
        }
    }

    /// A concatenated `flagvalue` token.
    pub fn concatenated(flag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            flag: flag.into(),
            value: value.into(),
            joined: Joined::Concatenated,
        }
    }

    /// Renders the atom back into command-line tokens, preserving the
    /// joining shape.
    pub fn to_tokens(&self) -> Vec<String> {
        match self.joined {
            Joined::Bare => vec![self.flag.clone()],
            Joined::Separate => {
                if self.value.is_empty() {
                    vec![self.flag.clone()]
                } else {
                    vec![self.flag.clone(), self.value.clone()]
                }
            }
            Joined::Equals => vec![format!("{}={}", self.flag, self.value)],
            Joined::Concatenated => vec![format!("{}{}", self.flag, self.value)],
        }
    }
}

/// Renders a sequence of atoms back into a command line.
pub fn render_tokens(atoms: &[ArgAtom]) -> Vec<String> {
    atoms.iter().flat_map(ArgAtom::to_tokens).collect()
}

/// Maximum response-file nesting before expansion gives up.
const MAX_RESPONSE_DEPTH: usize = 16;

/// Expands `@file` response-file tokens in place.
///
/// Each `@file` token is replaced by the whitespace-tokenized contents of
/// the file, and the substitution repeats until no `@` tokens remain (or
/// the nesting limit trips, which indicates a cycle). Classification runs
/// on the expanded sequence.
pub fn expand_response_files(
    dialect: &'static str,
    tokens: &[String],
) -> Result<Vec<String>, WrapperError> {
    let mut current: Vec<String> = tokens.to_vec();
    for _ in 0..MAX_RESPONSE_DEPTH {
        if !current.iter().any(|t| t.starts_with('@') && t.len() > 1) {
            return Ok(current);
        }
        let mut expanded = Vec::with_capacity(current.len());
        for token in &current {
            if let Some(file) = token.strip_prefix('@').filter(|f| !f.is_empty()) {
                let path = PathBuf::from(file);
                let content =
                    std::fs::read_to_string(&path).map_err(|e| WrapperError::Io {
                        dialect,
                        path,
                        source: e,
                    })?;
                expanded.extend(content.split_whitespace().map(str::to_string));
            } else {
                expanded.push(token.clone());
            }
        }
        current = expanded;
    }
    Err(WrapperError::Unsupported {
        dialect,
        reason: "response files nested too deeply".to_string(),
    })
}
