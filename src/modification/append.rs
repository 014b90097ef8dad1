//! Append content as children of each target

use std::fmt;
use std::str::FromStr;

use super::batch::run_batch;
use super::errors::{ModificationError, ModificationResult};
use super::selector::Selection;
use super::{Modification, UpdateContext};
use crate::dom::{ContentNode, NodeKind};
use crate::txn::TransactionScope;

/// Where appended content lands among the target's children
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppendPosition {
    #[default]
    Last,
    /// 1-based child position; past the end means last
    At(usize),
}

impl AppendPosition {
    /// 0-based insertion index, `None` for the end
    fn index(&self) -> Option<usize> {
        match self {
            AppendPosition::Last => None,
            AppendPosition::At(n) => Some(n.saturating_sub(1)),
        }
    }
}

impl FromStr for AppendPosition {
    type Err = ModificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s == "last" {
            return Ok(AppendPosition::Last);
        }
        match s.parse::<usize>() {
            Ok(n) if n > 0 => Ok(AppendPosition::At(n)),
            _ => Err(ModificationError::invalid_content(format!(
                "append position must be 'last' or a positive integer, got '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for AppendPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppendPosition::Last => f.write_str("last"),
            AppendPosition::At(n) => write!(f, "{}", n),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Append {
    selection: Selection,
    content: Vec<ContentNode>,
    position: AppendPosition,
}

impl Append {
    pub fn new(selection: Selection, content: Vec<ContentNode>) -> Self {
        Self {
            selection,
            content,
            position: AppendPosition::Last,
        }
    }

    pub fn at(mut self, position: AppendPosition) -> Self {
        self.position = position;
        self
    }
}

impl Modification for Append {
    fn name(&self) -> &'static str {
        "append"
    }

    fn process(&self, ctx: &UpdateContext<'_>, scope: &mut TransactionScope<'_>) -> ModificationResult<u64> {
        if self.content.is_empty() {
            return Ok(0);
        }
        let index = self.position.index();
        run_batch(ctx, scope, self.name(), &self.selection, |txn, target| {
            let kind = ctx.store.node(target)?.kind;
            if kind != NodeKind::Element {
                return Err(ModificationError::unsupported("append", kind));
            }
            ctx.store.append_children(txn, target, index, &self.content)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_parse() {
        assert_eq!("last".parse::<AppendPosition>().unwrap(), AppendPosition::Last);
        assert_eq!("".parse::<AppendPosition>().unwrap(), AppendPosition::Last);
        assert_eq!(" 2 ".parse::<AppendPosition>().unwrap(), AppendPosition::At(2));
        assert!("0".parse::<AppendPosition>().is_err());
        assert!("first".parse::<AppendPosition>().is_err());
    }

    #[test]
    fn test_position_index() {
        assert_eq!(AppendPosition::Last.index(), None);
        assert_eq!(AppendPosition::At(1).index(), Some(0));
        assert_eq!(AppendPosition::At(3).to_string(), "3");
    }
}
