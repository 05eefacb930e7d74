//! Semantic build errors
//!
//! Every failure is fatal for the build pass: there is no partial output and
//! nothing is recovered locally.

use std::fmt;

use thiserror::Error;
use tswasm_frontend::Span;

pub type SemanticResult<T> = Result<T, SemanticError>;

/// What kind of symbol a failed lookup was searching for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Identifier,
    Type,
    Function,
    Namespace,
    Member,
}

impl fmt::Display for LookupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LookupKind::Identifier => "identifier",
            LookupKind::Type => "type",
            LookupKind::Function => "function",
            LookupKind::Namespace => "namespace",
            LookupKind::Member => "member",
        })
    }
}

#[derive(Debug, Error)]
pub enum SemanticError {
    #[error("cannot resolve {lookup} \"{name}\" in scope {scope}")]
    SymbolResolution {
        lookup: LookupKind,
        name: String,
        scope: String,
    },

    #[error("no free member slot for \"{member}\" in object description {description}")]
    ShapeLayout { description: String, member: String },

    #[error("`{statement}` has no enclosing target block{}", label_suffix(.label))]
    FlattenTarget {
        statement: String,
        label: Option<String>,
    },

    #[error("no lowering rule for {node}")]
    UnsupportedNode { node: String },

    #[error("internal semantic builder error: {message}")]
    Internal { message: String },

    #[error("invalid build configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("{file}:{location}: {inner}\n  --> {fragment}")]
    Located {
        file: String,
        location: Span,
        fragment: String,
        #[source]
        inner: Box<SemanticError>,
    },
}

fn label_suffix(label: &Option<String>) -> String {
    label
        .as_ref()
        .map(|l| format!(" labeled \"{}\"", l))
        .unwrap_or_default()
}

impl SemanticError {
    pub fn internal(message: impl Into<String>) -> Self {
        SemanticError::Internal {
            message: message.into(),
        }
    }

    pub fn unsupported(node: impl Into<String>) -> Self {
        SemanticError::UnsupportedNode { node: node.into() }
    }

    /// Attach a source location and the failing fragment. The innermost
    /// location wins: an already located error is returned unchanged.
    pub fn located(self, file: &str, location: Span, fragment: impl fmt::Display) -> Self {
        match self {
            SemanticError::Located { .. } => self,
            inner => SemanticError::Located {
                file: file.to_string(),
                location,
                fragment: fragment.to_string(),
                inner: Box::new(inner),
            },
        }
    }

    /// The underlying error without location wrappers
    pub fn root(&self) -> &SemanticError {
        match self {
            SemanticError::Located { inner, .. } => inner.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_located_keeps_innermost() {
        let err = SemanticError::unsupported("yield")
            .located("a.ts", Span::new(3, 7), "yield x")
            .located("a.ts", Span::new(1, 1), "function f() { ... }");
        let text = err.to_string();
        assert!(text.starts_with("a.ts:3:7: no lowering rule for yield"));
        assert!(text.contains("--> yield x"));
        assert!(matches!(err.root(), SemanticError::UnsupportedNode { .. }));
    }

    #[test]
    fn test_flatten_target_message() {
        let err = SemanticError::FlattenTarget {
            statement: "continue outer;".to_string(),
            label: Some("outer".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "`continue outer;` has no enclosing target block labeled \"outer\""
        );
    }
}
