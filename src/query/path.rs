//! Path expression evaluator over a document store
//!
//! Grammar:
//!
//! ```text
//! expr     := operand (("=" | "!=") operand)?
//! operand  := path | string | number | "true()" | "false()" | "()" | "$" name
//! path     := ("/" step)+
//! step     := ("@")? (name | "*") predicate* | kind "()" predicate*
//! kind     := "text" | "node" | "comment"
//! predicate:= "[" (integer | "last()") "]"
//! ```
//!
//! Paths are evaluated against every document in the working set in
//! ascending document id order; the result is in document order within
//! each document.

use std::sync::Arc;

use super::errors::{QueryError, QueryResult};
use super::{Item, NamespaceBindings, QueryEvaluator, Sequence, VariableBindings};
use crate::dom::{DocumentId, NodeHandle, NodeKind, QName, QNameError, WorkingDocumentSet};
use crate::storage::DocumentStore;

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Path(Vec<Step>),
    Literal(Item),
    Variable(String),
    Empty,
    Compare {
        left: Box<Expr>,
        negated: bool,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    test: NodeTest,
    predicates: Vec<Position>,
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    /// `None` is the `*` wildcard
    Element(Option<String>),
    Attribute(Option<String>),
    Text,
    Comment,
    AnyNode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Position {
    At(usize),
    Last,
}

struct Parser<'e> {
    expr: &'e str,
    pos: usize,
}

impl<'e> Parser<'e> {
    fn parse(expr: &'e str) -> QueryResult<Expr> {
        let mut parser = Parser { expr, pos: 0 };
        let left = parser.operand()?;
        parser.skip_ws();

        let negated = if parser.eat("!=") {
            true
        } else if parser.eat("=") {
            false
        } else {
            return parser.finish(left);
        };

        let right = parser.operand()?;
        parser.finish(Expr::Compare {
            left: Box::new(left),
            negated,
            right: Box::new(right),
        })
    }

    fn finish(&mut self, expr: Expr) -> QueryResult<Expr> {
        self.skip_ws();
        if self.pos < self.expr.len() {
            return Err(self.error("unexpected trailing input"));
        }
        Ok(expr)
    }

    fn rest(&self) -> &'e str {
        &self.expr[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        let trimmed = self.rest().trim_start();
        self.pos = self.expr.len() - trimmed.len();
    }

    fn error(&self, message: impl Into<String>) -> QueryError {
        QueryError::syntax(self.expr, self.pos, message)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'e str {
        let start = self.pos;
        let len = self
            .rest()
            .char_indices()
            .find(|(_, c)| !pred(*c))
            .map(|(i, _)| i)
            .unwrap_or(self.rest().len());
        self.pos += len;
        &self.expr[start..self.pos]
    }

    fn name(&mut self) -> &'e str {
        self.take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
    }

    fn operand(&mut self) -> QueryResult<Expr> {
        self.skip_ws();
        match self.peek() {
            Some('/') => self.path(),
            Some(quote @ ('\'' | '"')) => {
                self.pos += 1;
                let value = self.take_while(|c| c != quote);
                if !self.eat(&quote.to_string()) {
                    return Err(self.error("unterminated string literal"));
                }
                Ok(Expr::Literal(Item::String(value.to_string())))
            }
            Some(c) if c.is_ascii_digit() || c == '-' || c == '.' => self.number(),
            Some('$') => {
                self.pos += 1;
                let name = self.name();
                if name.is_empty() {
                    return Err(self.error("expected variable name"));
                }
                Ok(Expr::Variable(name.to_string()))
            }
            Some('(') => {
                self.pos += 1;
                self.skip_ws();
                if !self.eat(")") {
                    return Err(self.error("only the empty sequence () is supported"));
                }
                Ok(Expr::Empty)
            }
            Some(_) => {
                if self.eat("true()") {
                    Ok(Expr::Literal(Item::Boolean(true)))
                } else if self.eat("false()") {
                    Ok(Expr::Literal(Item::Boolean(false)))
                } else {
                    Err(self.error("expected a path, literal or variable"))
                }
            }
            None => Err(self.error("unexpected end of expression")),
        }
    }

    fn number(&mut self) -> QueryResult<Expr> {
        let start = self.pos;
        self.eat("-");
        let digits = self.take_while(|c| c.is_ascii_digit() || c == '.');
        if digits.is_empty() || digits == "." {
            return Err(self.error("expected a number"));
        }
        let text = &self.expr[start..self.pos];
        let item = if text.contains('.') {
            text.parse().map(Item::Double).ok()
        } else {
            text.parse().map(Item::Integer).ok()
        };
        item.map(Expr::Literal)
            .ok_or_else(|| self.error(format!("invalid number '{}'", text)))
    }

    fn path(&mut self) -> QueryResult<Expr> {
        let mut steps = Vec::new();
        while self.eat("/") {
            if self.peek() == Some('/') {
                return Err(self.error("descendant axis is not supported"));
            }
            steps.push(self.step()?);
            self.skip_ws();
        }
        Ok(Expr::Path(steps))
    }

    fn step(&mut self) -> QueryResult<Step> {
        let attribute = self.eat("@");
        let test = if self.eat("*") {
            if attribute {
                NodeTest::Attribute(None)
            } else {
                NodeTest::Element(None)
            }
        } else {
            let name = self.name();
            if name.is_empty() {
                return Err(self.error("expected a name test"));
            }
            if !attribute && self.eat("()") {
                match name {
                    "text" => NodeTest::Text,
                    "node" => NodeTest::AnyNode,
                    "comment" => NodeTest::Comment,
                    other => return Err(self.error(format!("unknown kind test {}()", other))),
                }
            } else if attribute {
                NodeTest::Attribute(Some(name.to_string()))
            } else {
                NodeTest::Element(Some(name.to_string()))
            }
        };

        let mut predicates = Vec::new();
        while self.eat("[") {
            self.skip_ws();
            let position = if self.eat("last()") {
                Position::Last
            } else {
                let digits = self.take_while(|c| c.is_ascii_digit());
                match digits.parse::<usize>() {
                    Ok(n) if n > 0 => Position::At(n),
                    _ => return Err(self.error("expected a positive position or last()")),
                }
            };
            self.skip_ws();
            if !self.eat("]") {
                return Err(self.error("expected ']'"));
            }
            predicates.push(position);
        }
        Ok(Step { test, predicates })
    }
}

/// Evaluates path expressions against a [`DocumentStore`]
pub struct PathEvaluator {
    store: Arc<dyn DocumentStore>,
}

#[derive(Debug, Clone, Copy)]
enum Context {
    Document(DocumentId),
    Node(NodeHandle),
}

impl PathEvaluator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn eval(
        &self,
        expr: &Expr,
        namespaces: &NamespaceBindings,
        variables: &VariableBindings,
        docs: &WorkingDocumentSet,
    ) -> QueryResult<Sequence> {
        match expr {
            Expr::Empty => Ok(Sequence::empty()),
            Expr::Literal(item) => Ok(Sequence::single(item.clone())),
            Expr::Variable(name) => variables
                .get(name)
                .cloned()
                .ok_or_else(|| QueryError::UnboundVariable(name.clone())),
            Expr::Path(steps) => self.eval_path(steps, namespaces, docs),
            Expr::Compare {
                left,
                negated,
                right,
            } => {
                let left = self.atomize(&self.eval(left, namespaces, variables, docs)?)?;
                let right = self.atomize(&self.eval(right, namespaces, variables, docs)?)?;
                let found = left
                    .iter()
                    .any(|l| right.iter().any(|r| compare(l, r) == Some(!negated)));
                Ok(Sequence::single(Item::Boolean(found)))
            }
        }
    }

    fn eval_path(
        &self,
        steps: &[Step],
        namespaces: &NamespaceBindings,
        docs: &WorkingDocumentSet,
    ) -> QueryResult<Sequence> {
        let mut contexts: Vec<Context> = docs.iter().map(Context::Document).collect();
        for step in steps {
            let name = match &step.test {
                NodeTest::Element(Some(name)) | NodeTest::Attribute(Some(name)) => {
                    Some(resolve_name(name, namespaces)?)
                }
                _ => None,
            };
            let mut next = Vec::new();
            for context in &contexts {
                let mut matched = self.apply_test(context, &step.test, name.as_ref())?;
                for position in &step.predicates {
                    matched = match position {
                        Position::At(n) => matched.into_iter().nth(n - 1).into_iter().collect(),
                        Position::Last => matched.pop().into_iter().collect(),
                    };
                }
                next.extend(matched.into_iter().map(Context::Node));
            }
            contexts = next;
        }

        Ok(contexts
            .into_iter()
            .filter_map(|c| match c {
                Context::Node(handle) => Some(Item::Node(handle)),
                Context::Document(_) => None,
            })
            .collect())
    }

    fn apply_test(
        &self,
        context: &Context,
        test: &NodeTest,
        name: Option<&QName>,
    ) -> QueryResult<Vec<NodeHandle>> {
        let candidates = match (context, test) {
            (Context::Document(doc), NodeTest::Element(_)) => {
                self.store.root_element(*doc)?.into_iter().collect()
            }
            (Context::Document(_), NodeTest::Attribute(_)) => Vec::new(),
            (Context::Document(doc), _) => self.store.top_level(*doc)?,
            (Context::Node(handle), NodeTest::Attribute(_)) => self.store.attributes(handle)?,
            (Context::Node(handle), _) => self.store.children(handle)?,
        };

        let mut matched = Vec::with_capacity(candidates.len());
        for handle in candidates {
            let node = self.store.node(&handle)?;
            let hit = match test {
                NodeTest::Element(_) => node.kind == NodeKind::Element,
                NodeTest::Attribute(_) => node.kind == NodeKind::Attribute,
                NodeTest::Text => node.kind == NodeKind::Text,
                NodeTest::Comment => node.kind == NodeKind::Comment,
                NodeTest::AnyNode => true,
            };
            let named = match (name, &node.name) {
                (Some(wanted), Some(actual)) => wanted.matches(actual),
                (Some(_), None) => false,
                (None, _) => true,
            };
            if hit && named {
                matched.push(handle);
            }
        }
        Ok(matched)
    }

    /// Replace nodes by their string values
    fn atomize(&self, sequence: &Sequence) -> QueryResult<Vec<Item>> {
        sequence
            .items()
            .iter()
            .map(|item| match item {
                Item::Node(handle) => Ok(Item::String(self.store.string_value(handle)?)),
                other => Ok(other.clone()),
            })
            .collect()
    }
}

fn resolve_name(name: &str, namespaces: &NamespaceBindings) -> QueryResult<QName> {
    QName::parse(name, namespaces).map_err(|e| match e {
        QNameError::UnboundPrefix(prefix) => QueryError::UnboundPrefix(prefix),
        QNameError::Invalid(name) => QueryError::syntax(&name, 0, "invalid name test"),
    })
}

/// Value comparison of two atomic items; `None` when they are not
/// comparable
fn compare(left: &Item, right: &Item) -> Option<bool> {
    match (left, right) {
        (Item::Boolean(a), Item::Boolean(b)) => Some(a == b),
        (Item::Boolean(a), other) | (other, Item::Boolean(a)) => {
            as_boolean(other).map(|b| *a == b)
        }
        (Item::String(a), Item::String(b)) => Some(a == b),
        (a, b) => Some(as_number(a)? == as_number(b)?),
    }
}

fn as_number(item: &Item) -> Option<f64> {
    match item {
        Item::Integer(i) => Some(*i as f64),
        Item::Double(d) => Some(*d),
        Item::String(s) => s.trim().parse().ok(),
        Item::Boolean(_) | Item::Node(_) => None,
    }
}

fn as_boolean(item: &Item) -> Option<bool> {
    match item {
        Item::String(s) => match s.trim() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Item::Integer(i) => Some(*i != 0),
        Item::Double(d) => Some(*d != 0.0 && !d.is_nan()),
        Item::Boolean(b) => Some(*b),
        Item::Node(_) => None,
    }
}

impl QueryEvaluator for PathEvaluator {
    fn evaluate(
        &self,
        expr: &str,
        namespaces: &NamespaceBindings,
        variables: &VariableBindings,
        docs: &WorkingDocumentSet,
    ) -> QueryResult<Sequence> {
        let parsed = Parser::parse(expr)?;
        self.eval(&parsed, namespaces, variables, docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::{ContentNode, ParentRef};
    use crate::storage::MemoryStore;
    use crate::txn::Transaction;

    fn setup() -> (Arc<MemoryStore>, PathEvaluator, WorkingDocumentSet) {
        let store = Arc::new(MemoryStore::new());
        let doc = store.create_document(
            "books.xml",
            ContentNode::element("library")
                .with_child(
                    ContentNode::element("book")
                        .with_attribute("id", "1")
                        .with_child(ContentNode::text("Dune")),
                )
                .with_child(ContentNode::comment("shelf"))
                .with_child(
                    ContentNode::element("book")
                        .with_attribute("id", "2")
                        .with_child(ContentNode::text("Emma")),
                ),
        )
        .unwrap();
        let evaluator = PathEvaluator::new(store.clone() as Arc<dyn DocumentStore>);
        (store, evaluator, WorkingDocumentSet::of([doc]))
    }

    fn eval(evaluator: &PathEvaluator, docs: &WorkingDocumentSet, expr: &str) -> Sequence {
        evaluator
            .evaluate(expr, &NamespaceBindings::new(), &VariableBindings::new(), docs)
            .unwrap()
    }

    fn names(store: &MemoryStore, seq: &Sequence) -> Vec<String> {
        seq.items()
            .iter()
            .map(|item| match item {
                Item::Node(h) => store.string_value(h).unwrap(),
                other => other.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_child_paths() {
        let (store, evaluator, docs) = setup();
        assert_eq!(eval(&evaluator, &docs, "/library").len(), 1);
        assert_eq!(names(&store, &eval(&evaluator, &docs, "/library/book")), ["Dune", "Emma"]);
        assert_eq!(names(&store, &eval(&evaluator, &docs, "/library/book[2]")), ["Emma"]);
        assert_eq!(names(&store, &eval(&evaluator, &docs, "/library/*[last()]")), ["Emma"]);
        assert_eq!(eval(&evaluator, &docs, "/library/node()").len(), 3);
        assert_eq!(eval(&evaluator, &docs, "/library/comment()").len(), 1);
        assert!(eval(&evaluator, &docs, "/nothing").is_empty());
    }

    #[test]
    fn test_document_level_steps() {
        let (store, evaluator, docs) = setup();
        let root = eval(&evaluator, &docs, "/library").items()[0].clone();
        let Item::Node(root) = root else {
            panic!("expected a node");
        };
        let doc = root.document;
        store
            .insert_before(
                &Transaction::begin(),
                &ParentRef::Document(doc),
                &root,
                &[ContentNode::comment("catalog")],
            )
            .unwrap();

        assert_eq!(names(&store, &eval(&evaluator, &docs, "/comment()")), ["catalog"]);
        assert_eq!(eval(&evaluator, &docs, "/node()").len(), 2);
        assert_eq!(eval(&evaluator, &docs, "/*").len(), 1);
        assert!(eval(&evaluator, &docs, "/@id").is_empty());
    }

    #[test]
    fn test_attribute_and_text_steps() {
        let (store, evaluator, docs) = setup();
        assert_eq!(names(&store, &eval(&evaluator, &docs, "/library/book/@id")), ["1", "2"]);
        assert_eq!(eval(&evaluator, &docs, "/library/book[1]/@*").len(), 1);
        assert_eq!(names(&store, &eval(&evaluator, &docs, "/library/book/text()")), ["Dune", "Emma"]);
    }

    #[test]
    fn test_literals_and_comparisons() {
        let (_, evaluator, docs) = setup();
        assert_eq!(eval(&evaluator, &docs, "1=0"), Sequence::single(Item::Boolean(false)));
        assert_eq!(eval(&evaluator, &docs, "1 = 1"), Sequence::single(Item::Boolean(true)));
        assert_eq!(
            eval(&evaluator, &docs, "/library/book/@id = 2"),
            Sequence::single(Item::Boolean(true))
        );
        assert_eq!(
            eval(&evaluator, &docs, "/library/book != 'Dune'"),
            Sequence::single(Item::Boolean(true))
        );
        assert_eq!(eval(&evaluator, &docs, "'abc'"), Sequence::single(Item::String("abc".into())));
        assert_eq!(eval(&evaluator, &docs, "2.5"), Sequence::single(Item::Double(2.5)));
        assert!(eval(&evaluator, &docs, "()").is_empty());
        assert!(eval(&evaluator, &docs, "true()").effective_boolean_value().unwrap());
    }

    #[test]
    fn test_variables() {
        let (_, evaluator, docs) = setup();
        let mut vars = VariableBindings::new();
        vars.insert("limit".into(), Sequence::single(Item::Integer(2)));
        let result = evaluator
            .evaluate("$limit = 2", &NamespaceBindings::new(), &vars, &docs)
            .unwrap();
        assert_eq!(result, Sequence::single(Item::Boolean(true)));

        let missing = evaluator.evaluate("$nope", &NamespaceBindings::new(), &vars, &docs);
        assert!(matches!(missing, Err(QueryError::UnboundVariable(name)) if name == "nope"));
    }

    #[test]
    fn test_syntax_errors() {
        let (_, evaluator, docs) = setup();
        for bad in ["", "/a//b", "/a[0]", "'open", "/a/foo()", "1 2"] {
            let result =
                evaluator.evaluate(bad, &NamespaceBindings::new(), &VariableBindings::new(), &docs);
            assert!(matches!(result, Err(QueryError::Syntax { .. })), "{bad}");
        }
    }

    #[test]
    fn test_unbound_prefix() {
        let (_, evaluator, docs) = setup();
        let result =
            evaluator.evaluate("/x:library", &NamespaceBindings::new(), &VariableBindings::new(), &docs);
        assert!(matches!(result, Err(QueryError::UnboundPrefix(p)) if p == "x"));
    }
}
