use std::cell::Cell;

use crate::expr::{Expr, Tristate};
use crate::model::Kconfig;
use crate::symbol::{SymbolId, SymbolType};

/// Handle of a menu node in its owning [`Kconfig`](crate::Kconfig) arena.
/// The root node is always handle 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MenuId(pub(crate) u32);

/// Handle of a choice group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChoiceId(pub(crate) u32);

/// What a menu node positions in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuItem {
    Symbol(SymbolId),
    Choice(ChoiceId),
    Menu,
    Comment,
}

/// A prompt together with its (finalized) condition.
#[derive(Debug, Clone)]
pub struct Prompt {
    pub text: String,
    pub cond: Expr,
}

/// A node of the menu tree. Symbols and choices may be defined by several
/// nodes; menus and comments own exactly one.
#[derive(Debug)]
pub struct MenuNode {
    pub(crate) item: MenuItem,
    pub(crate) prompt: Option<Prompt>,
    pub(crate) help: Option<String>,
    /// Effective dependency: the `if`/`depends on` stack at this position,
    /// folded with every ancestor's dependency during finalization.
    pub(crate) dep: Expr,
    /// `visible if` conditions of a `menu` node.
    pub(crate) visibility: Expr,
    pub(crate) is_menuconfig: bool,

    pub(crate) parent: Option<MenuId>,
    pub(crate) list: Option<MenuId>,
    pub(crate) next: Option<MenuId>,

    pub(crate) filename: String,
    pub(crate) linenr: u32,

    // Properties as declared at this node; drained onto the item during
    // finalization once the effective dependency is known.
    pub(crate) raw_defaults: Vec<(Expr, Expr)>,
    pub(crate) raw_selects: Vec<(SymbolId, Expr)>,
    pub(crate) raw_implies: Vec<(SymbolId, Expr)>,
    pub(crate) raw_ranges: Vec<(Expr, Expr, Expr)>,
}

impl MenuNode {
    pub(crate) fn new(item: MenuItem, dep: Expr, vis: Expr, filename: String, linenr: u32) -> Self {
        MenuNode {
            item,
            prompt: None,
            help: None,
            dep,
            visibility: vis,
            is_menuconfig: false,
            parent: None,
            list: None,
            next: None,
            filename,
            linenr,
            raw_defaults: Vec::new(),
            raw_selects: Vec::new(),
            raw_implies: Vec::new(),
            raw_ranges: Vec::new(),
        }
    }

    pub fn item(&self) -> MenuItem {
        self.item
    }

    pub fn prompt(&self) -> Option<&Prompt> {
        self.prompt.as_ref()
    }

    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    pub fn dep(&self) -> &Expr {
        &self.dep
    }

    pub fn visibility(&self) -> &Expr {
        &self.visibility
    }

    pub fn is_menuconfig(&self) -> bool {
        self.is_menuconfig
    }

    pub fn parent(&self) -> Option<MenuId> {
        self.parent
    }

    /// First child.
    pub fn list(&self) -> Option<MenuId> {
        self.list
    }

    /// Next sibling.
    pub fn next(&self) -> Option<MenuId> {
        self.next
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn linenr(&self) -> u32 {
        self.linenr
    }
}

impl Kconfig {
    /// Depth-first pre-order walk of the finalized menu tree, excluding
    /// the root node itself.
    pub fn menu_iter(&self) -> MenuIter<'_> {
        let mut stack = Vec::new();
        if let Some(first) = self.menu_node(self.top_node()).list() {
            stack.push(first);
        }
        MenuIter { kconfig: self, stack }
    }
}

/// Iterator returned by [`Kconfig::menu_iter`].
pub struct MenuIter<'a> {
    kconfig: &'a Kconfig,
    stack: Vec<MenuId>,
}

impl<'a> Iterator for MenuIter<'a> {
    type Item = MenuId;

    fn next(&mut self) -> Option<MenuId> {
        let id = self.stack.pop()?;
        let node = self.kconfig.menu_node(id);
        if let Some(sibling) = node.next() {
            self.stack.push(sibling);
        }
        if let Some(child) = node.list() {
            self.stack.push(child);
        }
        Some(id)
    }
}

/// An exclusive-selection group of bool/tristate symbols.
#[derive(Debug)]
pub struct Choice {
    pub(crate) typ: SymbolType,
    pub(crate) nodes: Vec<MenuId>,
    pub(crate) syms: Vec<SymbolId>,
    /// `(member, condition)` pairs from `default` lines, finalized.
    pub(crate) defaults: Vec<(SymbolId, Expr)>,
    pub(crate) is_optional: bool,
    pub(crate) direct_dep: Expr,

    pub(crate) user_value: Cell<Option<Tristate>>,
    pub(crate) user_selection: Cell<Option<SymbolId>>,

    pub(crate) cached_mode: Cell<Option<Tristate>>,
    pub(crate) cached_vis: Cell<Option<Tristate>>,
    pub(crate) cached_selection: Cell<Option<Option<SymbolId>>>,
}

impl Choice {
    pub(crate) fn new(dep_n: Expr) -> Self {
        Choice {
            typ: SymbolType::Unknown,
            nodes: Vec::new(),
            syms: Vec::new(),
            defaults: Vec::new(),
            is_optional: false,
            direct_dep: dep_n,
            user_value: Cell::new(None),
            user_selection: Cell::new(None),
            cached_mode: Cell::new(None),
            cached_vis: Cell::new(None),
            cached_selection: Cell::new(None),
        }
    }

    pub fn sym_type(&self) -> SymbolType {
        self.typ
    }

    pub fn nodes(&self) -> &[MenuId] {
        &self.nodes
    }

    /// Member symbols in declaration order.
    pub fn syms(&self) -> &[SymbolId] {
        &self.syms
    }

    pub fn defaults(&self) -> &[(SymbolId, Expr)] {
        &self.defaults
    }

    /// An optional choice may be left at mode `n` with no member selected.
    pub fn is_optional(&self) -> bool {
        self.is_optional
    }

    pub fn direct_dep(&self) -> &Expr {
        &self.direct_dep
    }

    /// The mode the user assigned, if any.
    pub fn user_value(&self) -> Option<Tristate> {
        self.user_value.get()
    }

    /// The member the user selected, if any.
    pub fn user_selection(&self) -> Option<SymbolId> {
        self.user_selection.get()
    }

    pub(crate) fn clear_cache(&self) {
        self.cached_mode.set(None);
        self.cached_vis.set(None);
        self.cached_selection.set(None);
    }

    pub(crate) fn clear_user_value(&self) {
        self.user_value.set(None);
        self.user_selection.set(None);
    }
}
