use std::cell::{Cell, RefCell};

use crate::expr::{Expr, Tristate};
use crate::menu::{ChoiceId, MenuId, MenuItem};
use crate::model::Kconfig;

/// Handle of a symbol in its owning [`Kconfig`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolType {
    Unknown,
    Bool,
    Tristate,
    String,
    Int,
    Hex,
}

impl SymbolType {
    pub fn as_str(self) -> &'static str {
        match self {
            SymbolType::Unknown => "unknown",
            SymbolType::Bool => "bool",
            SymbolType::Tristate => "tristate",
            SymbolType::String => "string",
            SymbolType::Int => "int",
            SymbolType::Hex => "hex",
        }
    }

    pub fn is_bool_or_tristate(self) -> bool {
        matches!(self, SymbolType::Bool | SymbolType::Tristate)
    }
}

/// A named configuration entity. Static structure (type, properties,
/// dependency expressions) is fixed at finalization; only the user value
/// and the computed-value caches change afterwards.
#[derive(Debug)]
pub struct Symbol {
    pub(crate) name: String,
    pub(crate) typ: SymbolType,
    pub(crate) is_constant: bool,
    /// Menu nodes defining this symbol, in parse order. Empty for symbols
    /// that are only referenced.
    pub(crate) nodes: Vec<MenuId>,

    /// OR of the dependencies of every defining node.
    pub(crate) direct_dep: Expr,
    /// OR of `selecting && cond` over every `select` naming this symbol.
    pub(crate) rev_dep: Expr,
    /// Same for `imply`.
    pub(crate) weak_rev_dep: Expr,

    // Property lists with effective (finalized) conditions.
    pub(crate) defaults: Vec<(Expr, Expr)>,
    pub(crate) selects: Vec<(SymbolId, Expr)>,
    pub(crate) implies: Vec<(SymbolId, Expr)>,
    pub(crate) ranges: Vec<(Expr, Expr, Expr)>,

    pub(crate) env_var: Option<String>,
    pub(crate) is_allnoconfig_y: bool,
    pub(crate) choice: Option<ChoiceId>,

    pub(crate) user_tri: Cell<Option<Tristate>>,
    pub(crate) user_str: RefCell<Option<String>>,

    // Value caches, cleared by the invalidation cascade.
    pub(crate) cached_tri: Cell<Option<Tristate>>,
    pub(crate) cached_str: RefCell<Option<String>>,
    pub(crate) cached_vis: Cell<Option<Tristate>>,
    pub(crate) write_to_conf: Cell<bool>,
    /// Re-entrancy guard for dependency loops.
    pub(crate) evaluating: Cell<bool>,
}

impl Symbol {
    pub(crate) fn new(name: String, is_constant: bool) -> Self {
        Symbol {
            name,
            typ: SymbolType::Unknown,
            is_constant,
            nodes: Vec::new(),
            direct_dep: Expr::Symbol(SymbolId(0)), // patched by the model builder
            rev_dep: Expr::Symbol(SymbolId(0)),
            weak_rev_dep: Expr::Symbol(SymbolId(0)),
            defaults: Vec::new(),
            selects: Vec::new(),
            implies: Vec::new(),
            ranges: Vec::new(),
            env_var: None,
            is_allnoconfig_y: false,
            choice: None,
            user_tri: Cell::new(None),
            user_str: RefCell::new(None),
            cached_tri: Cell::new(None),
            cached_str: RefCell::new(None),
            cached_vis: Cell::new(None),
            write_to_conf: Cell::new(false),
            evaluating: Cell::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sym_type(&self) -> SymbolType {
        self.typ
    }

    /// Constant symbols back quoted strings, numbers and `y`/`m`/`n`
    /// appearing in expressions. They are never defined or written out.
    pub fn is_constant(&self) -> bool {
        self.is_constant
    }

    pub fn nodes(&self) -> &[MenuId] {
        &self.nodes
    }

    pub fn direct_dep(&self) -> &Expr {
        &self.direct_dep
    }

    pub fn rev_dep(&self) -> &Expr {
        &self.rev_dep
    }

    pub fn weak_rev_dep(&self) -> &Expr {
        &self.weak_rev_dep
    }

    /// `(value, condition)` pairs in declaration order, conditions already
    /// folded with the defining nodes' dependencies.
    pub fn defaults(&self) -> &[(Expr, Expr)] {
        &self.defaults
    }

    /// `(target, condition)` pairs for `select`.
    pub fn selects(&self) -> &[(SymbolId, Expr)] {
        &self.selects
    }

    /// `(target, condition)` pairs for `imply`.
    pub fn implies(&self) -> &[(SymbolId, Expr)] {
        &self.implies
    }

    /// `(low, high, condition)` triples for `range`.
    pub fn ranges(&self) -> &[(Expr, Expr, Expr)] {
        &self.ranges
    }

    pub fn env_var(&self) -> Option<&str> {
        self.env_var.as_deref()
    }

    pub fn is_allnoconfig_y(&self) -> bool {
        self.is_allnoconfig_y
    }

    /// The choice this symbol is a member of, if any.
    pub fn choice(&self) -> Option<ChoiceId> {
        self.choice
    }

    /// The tristate the user assigned, if any (bool/tristate symbols).
    pub fn user_tri(&self) -> Option<Tristate> {
        self.user_tri.get()
    }

    /// The string the user assigned, if any (string/int/hex symbols).
    pub fn user_str(&self) -> Option<String> {
        self.user_str.borrow().clone()
    }

    pub fn has_user_value(&self) -> bool {
        self.user_tri.get().is_some() || self.user_str.borrow().is_some()
    }

    pub(crate) fn clear_cache(&self) {
        self.cached_tri.set(None);
        self.cached_str.borrow_mut().take();
        self.cached_vis.set(None);
    }

    pub(crate) fn clear_user_value(&self) {
        self.user_tri.set(None);
        self.user_str.borrow_mut().take();
    }
}

impl Kconfig {
    /// Render a standalone Kconfig definition of the symbol, in stable
    /// property order. Conditions equal to `y` are omitted. Choice members
    /// carry a synthesized prompt condition and are not exactly
    /// re-parsable; everything else round-trips through the parser.
    pub fn symbol_str(&self, id: SymbolId) -> String {
        let sym = self.symbol(id);
        let mut out = String::new();

        let keyword = if sym
            .nodes
            .first()
            .is_some_and(|&n| self.menu_node(n).is_menuconfig())
        {
            "menuconfig"
        } else {
            "config"
        };
        out.push_str(&format!("{} {}\n", keyword, sym.name()));

        if sym.typ != SymbolType::Unknown {
            out.push_str(&format!("\t{}\n", sym.typ.as_str()));
        }
        for &node_id in &sym.nodes {
            if let Some(prompt) = self.menu_node(node_id).prompt() {
                out.push_str("\tprompt \"");
                out.push_str(&prompt.text);
                out.push('"');
                if sym.choice.is_some() {
                    // Synthesized condition showing the choice gating.
                    // Not exact Kconfig input.
                    out.push_str(" if <choice>");
                    if !self.is_expr_y(&prompt.cond) {
                        out.push_str(" && ");
                        out.push_str(&self.expr_str(&prompt.cond));
                    }
                } else {
                    self.push_cond(&mut out, &prompt.cond);
                }
                out.push('\n');
            }
        }
        for (value, cond) in &sym.defaults {
            out.push_str(&format!("\tdefault {}", self.expr_str(value)));
            self.push_cond(&mut out, cond);
            out.push('\n');
        }
        for (target, cond) in &sym.selects {
            out.push_str(&format!("\tselect {}", self.symbol(*target).name()));
            self.push_cond(&mut out, cond);
            out.push('\n');
        }
        for (target, cond) in &sym.implies {
            out.push_str(&format!("\timply {}", self.symbol(*target).name()));
            self.push_cond(&mut out, cond);
            out.push('\n');
        }
        for (low, high, cond) in &sym.ranges {
            out.push_str(&format!(
                "\trange {} {}",
                self.expr_str(low),
                self.expr_str(high)
            ));
            self.push_cond(&mut out, cond);
            out.push('\n');
        }
        if let Some(help) = sym
            .nodes
            .iter()
            .find_map(|&n| self.menu_node(n).help().map(str::to_string))
        {
            out.push_str("\thelp\n");
            for line in help.lines() {
                if line.is_empty() {
                    out.push('\n');
                } else {
                    out.push_str(&format!("\t  {}\n", line));
                }
            }
        }
        out
    }

    /// Render a menu node for diagnostics: the defining statement of its
    /// item together with its location.
    pub fn node_str(&self, id: MenuId) -> String {
        let node = self.menu_node(id);
        let head = match node.item() {
            MenuItem::Symbol(sym) => return self.symbol_str(sym),
            MenuItem::Choice(choice) => return self.choice_str(choice),
            MenuItem::Menu => {
                let mut s = format!(
                    "menu \"{}\"\n",
                    node.prompt().map(|p| p.text.as_str()).unwrap_or("")
                );
                if !self.is_expr_y(node.dep()) {
                    s.push_str(&format!("\tdepends on {}\n", self.expr_str(node.dep())));
                }
                if !self.is_expr_y(node.visibility()) {
                    s.push_str(&format!(
                        "\tvisible if {}\n",
                        self.expr_str(node.visibility())
                    ));
                }
                s
            }
            MenuItem::Comment => {
                let mut s = format!(
                    "comment \"{}\"\n",
                    node.prompt().map(|p| p.text.as_str()).unwrap_or("")
                );
                if !self.is_expr_y(node.dep()) {
                    s.push_str(&format!("\tdepends on {}\n", self.expr_str(node.dep())));
                }
                s
            }
        };
        head
    }

    /// Render a choice block header (members are separate definitions).
    pub fn choice_str(&self, id: ChoiceId) -> String {
        let choice = self.choice(id);
        let mut out = String::from("choice\n");
        if choice.typ.is_bool_or_tristate() {
            out.push_str(&format!("\t{}\n", choice.typ.as_str()));
        }
        for &node_id in &choice.nodes {
            if let Some(prompt) = self.menu_node(node_id).prompt() {
                out.push_str(&format!("\tprompt \"{}\"", prompt.text));
                self.push_cond(&mut out, &prompt.cond);
                out.push('\n');
            }
        }
        for (target, cond) in &choice.defaults {
            out.push_str(&format!("\tdefault {}", self.symbol(*target).name()));
            self.push_cond(&mut out, cond);
            out.push('\n');
        }
        if choice.is_optional {
            out.push_str("\toptional\n");
        }
        out
    }

    fn push_cond(&self, out: &mut String, cond: &Expr) {
        if !self.is_expr_y(cond) {
            out.push_str(" if ");
            out.push_str(&self.expr_str(cond));
        }
    }
}
