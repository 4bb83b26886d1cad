//! Parsing of function chain definitions such as `upper|lower>host1:7000`.

use std::{fmt, str::FromStr};
use thiserror::Error;

/// Characters separating hops in a chain. Both are equivalent.
pub const CHAIN_SEPARATORS: [char; 2] = ['|', ','];

/// Separates a hop's local function from the destination its output goes to.
pub const OUTPUT_REDIRECT: char = '>';

/// One link of a function chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Hop {
    Local(String),
    Remote {
        local_name: String,
        destination: String,
    },
}

impl Hop {
    /// Name of the local function this hop runs. Forwarders are registered
    /// under this name.
    pub fn local_name(&self) -> &str {
        match self {
            Hop::Local(name) => name,
            Hop::Remote { local_name, .. } => local_name,
        }
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Hop::Local(name) => f.write_str(name),
            Hop::Remote {
                local_name,
                destination,
            } => write!(f, "{local_name}{OUTPUT_REDIRECT}{destination}"),
        }
    }
}

impl FromStr for Hop {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hop(s)
    }
}

/// A parsed, non-empty sequence of hops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainDefinition {
    hops: Vec<Hop>,
}

impl ChainDefinition {
    pub fn hops(&self) -> &[Hop] {
        &self.hops
    }

    pub fn len(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Hop> {
        self.hops.iter()
    }
}

impl IntoIterator for ChainDefinition {
    type Item = Hop;
    type IntoIter = std::vec::IntoIter<Hop>;

    fn into_iter(self) -> Self::IntoIter {
        self.hops.into_iter()
    }
}

/// Canonical form: hops joined with `|`.
impl fmt::Display for ChainDefinition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (i, hop) in self.hops.iter().enumerate() {
            if i > 0 {
                f.write_str("|")?;
            }
            write!(f, "{hop}")?;
        }
        Ok(())
    }
}

impl FromStr for ChainDefinition {
    type Err = DefinitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_chain(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("function definition '{0}' names no functions")]
    EmptyChain(String),

    #[error("empty hop in function definition")]
    EmptyHop,

    #[error("'{0}' must contain exactly one output redirect")]
    Redirect(String),

    #[error("'{0}' must name both a function and a destination around its output redirect")]
    IncompleteRedirect(String),
}

/// Splits a definition into trimmed, non-empty hop tokens without parsing them.
pub fn split_chain(definition: &str) -> Vec<&str> {
    definition
        .split(CHAIN_SEPARATORS)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}

pub fn parse_chain(definition: &str) -> Result<ChainDefinition, DefinitionError> {
    let hops = split_chain(definition)
        .into_iter()
        .map(parse_hop)
        .collect::<Result<Vec<_>, _>>()?;
    if hops.is_empty() {
        return Err(DefinitionError::EmptyChain(definition.to_owned()));
    }
    Ok(ChainDefinition { hops })
}

pub fn parse_hop(name: &str) -> Result<Hop, DefinitionError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DefinitionError::EmptyHop);
    }
    let parts: Vec<&str> = name.split(OUTPUT_REDIRECT).map(str::trim).collect();
    match parts.as_slice() {
        [local] => Ok(Hop::Local((*local).to_owned())),
        [local, destination] if !local.is_empty() && !destination.is_empty() => Ok(Hop::Remote {
            local_name: (*local).to_owned(),
            destination: (*destination).to_owned(),
        }),
        [_, _] => Err(DefinitionError::IncompleteRedirect(name.to_owned())),
        _ => Err(DefinitionError::Redirect(name.to_owned())),
    }
}
