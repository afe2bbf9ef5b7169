//! Declarative operator schemas: ordered argument/return descriptors with
//! alias-set and mutability annotations, queried by the aliasing engine.

pub mod registry;

use std::fmt;

/// Interned operator identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpId(&'static str);

impl OpId {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }

    /// Name without the namespace prefix, used by the splitting-op table
    pub fn base_name(&self) -> &'static str {
        match self.0.rsplit_once("::") {
            Some((_, base)) => base,
            None => self.0,
        }
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Alias annotation on one argument or return slot.
///
/// The annotation form is a set of alias tokens, where a trailing `!` marks
/// the slot as an in-place mutation of whatever shares the token, not a
/// read-only view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasInfo {
    set: Vec<String>,
    is_write: bool,
}

impl AliasInfo {
    /// Parse the `"a"` / `"a!"` annotation form
    pub fn parse(annotation: &str) -> Self {
        let is_write = annotation.ends_with('!');
        let token = annotation.trim_end_matches('!');
        Self {
            set: vec![token.to_string()],
            is_write,
        }
    }

    pub fn view(token: &str) -> Self {
        Self {
            set: vec![token.to_string()],
            is_write: false,
        }
    }

    pub fn write(token: &str) -> Self {
        Self {
            set: vec![token.to_string()],
            is_write: true,
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.set
    }

    pub fn is_write(&self) -> bool {
        self.is_write
    }

    pub fn contains(&self, token: &str) -> bool {
        self.set.iter().any(|t| t == token)
    }

    /// Two slots may alias iff their alias sets share a token
    pub fn intersects(&self, other: &AliasInfo) -> bool {
        self.set.iter().any(|t| other.contains(t))
    }
}

/// One positional argument descriptor
#[derive(Debug, Clone)]
pub struct ArgumentSpec {
    name: String,
    alias: Option<AliasInfo>,
}

impl ArgumentSpec {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn alias(&self) -> Option<&AliasInfo> {
        self.alias.as_ref()
    }
}

/// One return descriptor
#[derive(Debug, Clone)]
pub struct ReturnSpec {
    alias: Option<AliasInfo>,
}

impl ReturnSpec {
    pub fn alias(&self) -> Option<&AliasInfo> {
        self.alias.as_ref()
    }
}

/// Immutable per-operator metadata
#[derive(Debug, Clone)]
pub struct OpSchema {
    op: OpId,
    arguments: Vec<ArgumentSpec>,
    returns: Vec<ReturnSpec>,
}

impl OpSchema {
    pub fn new(op: OpId) -> Self {
        Self {
            op,
            arguments: Vec::new(),
            returns: Vec::new(),
        }
    }

    pub fn with_arg(mut self, name: &str, alias: Option<AliasInfo>) -> Self {
        self.arguments.push(ArgumentSpec {
            name: name.to_string(),
            alias,
        });
        self
    }

    pub fn with_ret(mut self, alias: Option<AliasInfo>) -> Self {
        self.returns.push(ReturnSpec { alias });
        self
    }

    pub fn op(&self) -> OpId {
        self.op
    }

    pub fn arguments(&self) -> &[ArgumentSpec] {
        &self.arguments
    }

    pub fn returns(&self) -> &[ReturnSpec] {
        &self.returns
    }

    /// Index of the argument whose alias set contains `token`
    pub fn arg_index_for_alias(&self, token: &str) -> Option<usize> {
        self.arguments
            .iter()
            .position(|a| a.alias().map_or(false, |info| info.contains(token)))
    }
}
