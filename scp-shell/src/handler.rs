//! The dispatch tree.
//!
//! Every command line is resolved by walking a tree of [`Handler`]s from the
//! root namespace.  A handler is either a [`Leaf`], which is executable, or a
//! branch implementing [`Namespace`], which offers further names to complete
//! and resolve against.  Nodes are cheap values built on demand; the session
//! they act on is passed in at every call rather than captured, so the
//! session can own the tree's root and still be mutated by a leaf.

use owo_colors::AnsiColors;

use crate::shell::Shell;

/// Display category of a node.  Used to color prompts and completion
/// candidates; never consulted for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerType {
    Builtin,
    Local,
    Remote,
    Modify,
}

impl HandlerType {
    pub fn color(self) -> AnsiColors {
        match self {
            HandlerType::Builtin => AnsiColors::Cyan,
            HandlerType::Local => AnsiColors::Green,
            HandlerType::Remote => AnsiColors::Yellow,
            HandlerType::Modify => AnsiColors::Red,
        }
    }
}

/// Completion results: `(name, node)` pairs, produced lazily.
pub type Completions<'a> = Box<dyn Iterator<Item = (String, Handler)> + 'a>;

/// A node of the dispatch tree.
pub enum Handler {
    Leaf(Leaf),
    Branch(Box<dyn Namespace>),
}

impl Handler {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Handler::Leaf(_))
    }

    pub fn handler_type(&self) -> HandlerType {
        match self {
            Handler::Leaf(leaf) => leaf.handler_type(),
            Handler::Branch(ns) => ns.handler_type(),
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Leaf(leaf) => f.debug_tuple("Leaf").field(leaf).finish(),
            Handler::Branch(ns) => f
                .debug_tuple("Branch")
                .field(&ns.handler_type())
                .finish(),
        }
    }
}

/// A branch of the dispatch tree.
pub trait Namespace {
    fn handler_type(&self) -> HandlerType;

    /// Children whose name starts with `part`.  Must not fail, also not for
    /// an empty `part`.  May populate session caches but has no other side
    /// effects.
    fn complete<'a>(&'a self, shell: &'a mut Shell, part: &'a str) -> Completions<'a>;

    /// The child called exactly `name`, built on demand.
    fn resolve(&self, shell: &Shell, name: &str) -> Option<Handler>;
}

/// What a leaf does when invoked.
#[derive(Clone, Copy)]
pub enum Action {
    Plain(fn(&mut Shell)),
    /// Runs with the argument the leaf is bound to.
    Bound(fn(&mut Shell, &str)),
}

/// An executable node, optionally bound to an argument.
pub struct Leaf {
    handler_type: HandlerType,
    action: Action,
    argument: Option<String>,
}

impl Leaf {
    pub fn new(handler_type: HandlerType, action: fn(&mut Shell)) -> Self {
        Self {
            handler_type,
            action: Action::Plain(action),
            argument: None,
        }
    }

    pub fn bound(handler_type: HandlerType, action: fn(&mut Shell, &str), argument: String) -> Self {
        Self {
            handler_type,
            action: Action::Bound(action),
            argument: Some(argument),
        }
    }

    pub fn handler_type(&self) -> HandlerType {
        self.handler_type
    }

    pub fn argument(&self) -> Option<&str> {
        self.argument.as_deref()
    }

    pub fn invoke(&self, shell: &mut Shell) {
        match (self.action, self.argument.as_deref()) {
            (Action::Plain(run), _) => run(shell),
            (Action::Bound(run), Some(arg)) => run(shell, arg),
            (Action::Bound(run), None) => run(shell, ""),
        }
    }
}

impl std::fmt::Debug for Leaf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Leaf")
            .field("handler_type", &self.handler_type)
            .field("argument", &self.argument)
            .finish()
    }
}
