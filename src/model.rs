//! The `Kconfig` instance: arenas, interning, file loading and the
//! raw-tree-to-semantic-model lowering.

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::KconfigError;
use crate::expr::{Expr, Tristate};
use crate::finalize;
use crate::lexer;
use crate::menu::{Choice, ChoiceId, MenuId, MenuItem, MenuNode, Prompt};
use crate::parser::{self, Node, NodeKind, PropKind, Property, RawExpr, SourceKind};
use crate::symbol::{Symbol, SymbolId, SymbolType};

const DEFAULT_MAINMENU: &str = "Main menu";

/// A parsed and finalized Kconfig tree together with the current
/// configuration state. Instances are fully independent of each other.
#[derive(Debug)]
pub struct Kconfig {
    pub(crate) syms: Vec<Symbol>,
    pub(crate) choice_arena: Vec<Choice>,
    pub(crate) menus: Vec<MenuNode>,

    /// Non-constant symbols by name, in first-reference order.
    pub(crate) named: IndexMap<String, SymbolId>,
    /// Constant symbols (quoted strings, numbers, `y`/`m`/`n`).
    pub(crate) consts: FxHashMap<String, SymbolId>,

    /// One entry per definition site, in parse order.
    pub(crate) defined_syms: Vec<SymbolId>,
    /// Defined symbols with re-definitions collapsed, in parse order.
    pub(crate) unique_defined: Vec<SymbolId>,

    y_id: SymbolId,
    m_id: SymbolId,
    n_id: SymbolId,

    pub(crate) modules: Option<SymbolId>,
    pub(crate) defconfig_list: Option<SymbolId>,
    pub(crate) mainmenu: Option<String>,

    pub(crate) warnings: RefCell<Vec<String>>,
    warn_enabled: bool,
    warn_to_stderr: bool,

    pub(crate) prefix: String,
    pub(crate) srctree: PathBuf,
    pub(crate) env: FxHashMap<String, String>,

    /// Inverted dependency index: symbols to invalidate when the key
    /// symbol changes. Built once at finalization.
    pub(crate) rdeps: Vec<Vec<SymbolId>>,
    /// Choices to invalidate when the key symbol changes.
    pub(crate) choice_rdeps: Vec<Vec<ChoiceId>>,

    pub(crate) config_changed: Cell<bool>,
}

impl Kconfig {
    /// Parse and finalize the Kconfig tree rooted at `path` with default
    /// options.
    pub fn load(path: impl AsRef<Path>) -> Result<Kconfig, KconfigError> {
        Kconfig::builder().load(path)
    }

    /// Parse and finalize a single in-memory Kconfig file. `source`
    /// statements resolve against `srctree` as usual.
    pub fn parse(source: &str) -> Result<Kconfig, KconfigError> {
        Kconfig::builder().parse(source)
    }

    pub fn builder() -> KconfigBuilder {
        KconfigBuilder::new()
    }

    // -- entity access ------------------------------------------------------

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.syms[id.0 as usize]
    }

    pub(crate) fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.syms[id.0 as usize]
    }

    pub fn menu_node(&self, id: MenuId) -> &MenuNode {
        &self.menus[id.0 as usize]
    }

    pub fn choice(&self, id: ChoiceId) -> &Choice {
        &self.choice_arena[id.0 as usize]
    }

    pub(crate) fn choice_mut(&mut self, id: ChoiceId) -> &mut Choice {
        &mut self.choice_arena[id.0 as usize]
    }

    /// Look up a defined or referenced symbol by exact name.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.named.get(name).copied()
    }

    /// Root of the menu tree.
    pub fn top_node(&self) -> MenuId {
        MenuId(0)
    }

    /// One handle per definition site, in parse order (a symbol defined in
    /// several places appears once per definition).
    pub fn defined_syms(&self) -> &[SymbolId] {
        &self.defined_syms
    }

    /// Defined symbols with duplicates collapsed, in parse order.
    pub fn unique_defined_syms(&self) -> &[SymbolId] {
        &self.unique_defined
    }

    pub fn choices(&self) -> impl Iterator<Item = ChoiceId> + '_ {
        (0..self.choice_arena.len() as u32).map(ChoiceId)
    }

    pub fn mainmenu_text(&self) -> &str {
        self.mainmenu.as_deref().unwrap_or(DEFAULT_MAINMENU)
    }

    /// The symbol carrying `option modules`, if any.
    pub fn modules_symbol(&self) -> Option<SymbolId> {
        self.modules
    }

    /// The symbol carrying `option defconfig_list`, if any.
    pub fn defconfig_list_symbol(&self) -> Option<SymbolId> {
        self.defconfig_list
    }

    pub fn config_prefix(&self) -> &str {
        &self.prefix
    }

    pub fn srctree(&self) -> &Path {
        &self.srctree
    }

    /// Warnings collected so far, oldest first.
    pub fn warnings(&self) -> Vec<String> {
        self.warnings.borrow().clone()
    }

    pub fn clear_warnings(&mut self) {
        self.warnings.borrow_mut().clear();
    }

    /// Set when a loaded `.config` changed any symbol's value; cleared by
    /// `sync_deps`.
    pub fn config_changed(&self) -> bool {
        self.config_changed.get()
    }

    /// Handle of the `y`/`m`/`n` constant.
    pub fn const_symbol(&self, tri: Tristate) -> SymbolId {
        match tri {
            Tristate::Y => self.y_id,
            Tristate::M => self.m_id,
            Tristate::N => self.n_id,
        }
    }

    pub(crate) fn const_y(&self) -> SymbolId {
        self.y_id
    }

    pub(crate) fn const_m(&self) -> SymbolId {
        self.m_id
    }

    pub(crate) fn const_n(&self) -> SymbolId {
        self.n_id
    }

    /// Whether modules are available: a `modules` symbol exists and is
    /// currently enabled.
    pub fn modules_enabled(&self) -> bool {
        self.modules
            .is_some_and(|id| self.tri_value(id) != Tristate::N)
    }

    pub(crate) fn warn(&self, msg: String) {
        if !self.warn_enabled {
            return;
        }
        if self.warn_to_stderr {
            log::warn!("{msg}");
        }
        self.warnings.borrow_mut().push(msg);
    }

    // -- interning ----------------------------------------------------------

    fn push_symbol(&mut self, sym: Symbol) -> SymbolId {
        let id = SymbolId(self.syms.len() as u32);
        self.syms.push(sym);
        id
    }

    pub(crate) fn named_sym(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.named.get(name) {
            return id;
        }
        let n = self.expr_n();
        let mut sym = Symbol::new(name.to_string(), false);
        sym.direct_dep = n.clone();
        sym.rev_dep = n.clone();
        sym.weak_rev_dep = n;
        let id = self.push_symbol(sym);
        self.named.insert(name.to_string(), id);
        id
    }

    pub(crate) fn const_sym(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.consts.get(name) {
            return id;
        }
        let n = self.expr_n();
        let mut sym = Symbol::new(name.to_string(), true);
        sym.typ = const_type(name);
        sym.direct_dep = n.clone();
        sym.rev_dep = n.clone();
        sym.weak_rev_dep = n;
        let id = self.push_symbol(sym);
        self.consts.insert(name.to_string(), id);
        id
    }

    fn new_instance(opts: &KconfigBuilder) -> Kconfig {
        let mut env: FxHashMap<String, String> = std::env::vars().collect();
        for (k, v) in &opts.env {
            env.insert(k.clone(), v.clone());
        }

        let srctree = opts
            .srctree
            .clone()
            .or_else(|| env.get("srctree").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("."));
        let prefix = opts
            .prefix
            .clone()
            .or_else(|| env.get("CONFIG_").cloned())
            .unwrap_or_else(|| "CONFIG_".to_string());

        let mut kc = Kconfig {
            syms: Vec::new(),
            choice_arena: Vec::new(),
            menus: Vec::new(),
            named: IndexMap::new(),
            consts: FxHashMap::default(),
            defined_syms: Vec::new(),
            unique_defined: Vec::new(),
            y_id: SymbolId(0),
            m_id: SymbolId(1),
            n_id: SymbolId(2),
            modules: None,
            defconfig_list: None,
            mainmenu: None,
            warnings: RefCell::new(Vec::new()),
            warn_enabled: opts.warn,
            warn_to_stderr: opts.warn_to_stderr,
            prefix,
            srctree,
            env,
            rdeps: Vec::new(),
            choice_rdeps: Vec::new(),
            config_changed: Cell::new(false),
        };

        // The three tristate constants occupy the first arena slots.
        for name in ["y", "m", "n"] {
            let mut sym = Symbol::new(name.to_string(), true);
            sym.typ = SymbolType::Tristate;
            let id = kc.push_symbol(sym);
            kc.consts.insert(name.to_string(), id);
        }
        let n = Expr::Symbol(kc.n_id);
        for id in [kc.y_id, kc.m_id, kc.n_id] {
            let sym = kc.symbol_mut(id);
            sym.direct_dep = n.clone();
            sym.rev_dep = n.clone();
            sym.weak_rev_dep = n.clone();
        }

        kc
    }

    fn finish(mut kc: Kconfig) -> Result<Kconfig, KconfigError> {
        let mainmenu = kc.mainmenu_text().to_string();
        let y = kc.expr_y();
        kc.menus[0].prompt = Some(Prompt {
            text: mainmenu,
            cond: y,
        });
        finalize::finalize(&mut kc);
        Ok(kc)
    }
}

fn const_type(name: &str) -> SymbolType {
    let dec = name.strip_prefix('-').unwrap_or(name);
    if !dec.is_empty() && dec.bytes().all(|b| b.is_ascii_digit()) {
        return SymbolType::Int;
    }
    let hex = name.strip_prefix("0x").or_else(|| name.strip_prefix("0X"));
    if let Some(h) = hex {
        if !h.is_empty() && h.bytes().all(|b| b.is_ascii_hexdigit()) {
            return SymbolType::Hex;
        }
    }
    SymbolType::Unknown
}

fn is_numeric_token(name: &str) -> bool {
    const_type(name) != SymbolType::Unknown
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Per-instance options: source-tree root, `.config` symbol prefix,
/// environment overlay and warning behavior.
pub struct KconfigBuilder {
    srctree: Option<PathBuf>,
    prefix: Option<String>,
    env: Vec<(String, String)>,
    warn: bool,
    warn_to_stderr: bool,
}

impl KconfigBuilder {
    fn new() -> Self {
        KconfigBuilder {
            srctree: None,
            prefix: None,
            env: Vec::new(),
            warn: true,
            warn_to_stderr: true,
        }
    }

    /// Root directory for `source` statements. Defaults to `$srctree`,
    /// falling back to the current directory.
    pub fn srctree(mut self, path: impl Into<PathBuf>) -> Self {
        self.srctree = Some(path.into());
        self
    }

    /// Symbol prefix in configuration files. Defaults to `$CONFIG_`,
    /// falling back to `CONFIG_`.
    pub fn config_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Override an environment variable for `$VAR` expansion and the
    /// well-known variables, without touching the process environment.
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((name.into(), value.into()));
        self
    }

    /// Collect (and log) warnings at all. On by default.
    pub fn warn(mut self, on: bool) -> Self {
        self.warn = on;
        self
    }

    /// Forward warnings to the `log` crate as they happen. On by default.
    pub fn warn_to_stderr(mut self, on: bool) -> Self {
        self.warn_to_stderr = on;
        self
    }

    /// Parse and finalize the tree rooted at `path`.
    pub fn load(self, path: impl AsRef<Path>) -> Result<Kconfig, KconfigError> {
        let path = path.as_ref();
        let mut kc = Kconfig::new_instance(&self);
        let root = MenuNode::new(
            MenuItem::Menu,
            Expr::Symbol(kc.const_y()),
            Expr::Symbol(kc.const_y()),
            path.display().to_string(),
            1,
        );
        kc.menus.push(root);

        let mut builder = ModelBuilder {
            kc: &mut kc,
            include_stack: Vec::new(),
            defined: FxHashSet::default(),
        };
        let dep = builder.kc.expr_y();
        let mut link = LinkState {
            parent: MenuId(0),
            last: None,
        };
        builder.load_file(path, &dep, &mut link)?;

        Kconfig::finish(kc)
    }

    /// Parse and finalize a single in-memory file.
    pub fn parse(self, source: &str) -> Result<Kconfig, KconfigError> {
        let mut kc = Kconfig::new_instance(&self);
        let root = MenuNode::new(
            MenuItem::Menu,
            Expr::Symbol(kc.const_y()),
            Expr::Symbol(kc.const_y()),
            "<input>".to_string(),
            1,
        );
        kc.menus.push(root);

        let mut builder = ModelBuilder {
            kc: &mut kc,
            include_stack: Vec::new(),
            defined: FxHashSet::default(),
        };
        let dep = builder.kc.expr_y();
        let mut link = LinkState {
            parent: MenuId(0),
            last: None,
        };
        builder.process_source("<input>", source, PathBuf::from("."), &dep, &mut link)?;

        Kconfig::finish(kc)
    }
}

// ---------------------------------------------------------------------------
// Model builder: files -> raw tree -> arena entities
// ---------------------------------------------------------------------------

/// Sibling-chain cursor for one nesting level.
struct LinkState {
    parent: MenuId,
    last: Option<MenuId>,
}

struct FileCtx {
    /// Path as shown in locations and error messages.
    filename: String,
    /// Directory for `rsource`/`gsource` resolution.
    dir: PathBuf,
}

struct ModelBuilder<'a> {
    kc: &'a mut Kconfig,
    include_stack: Vec<PathBuf>,
    defined: FxHashSet<SymbolId>,
}

impl<'a> ModelBuilder<'a> {
    fn load_file(
        &mut self,
        path: &Path,
        dep: &Expr,
        link: &mut LinkState,
    ) -> Result<(), KconfigError> {
        if self.include_stack.iter().any(|p| p == path) {
            let filename = self
                .include_stack
                .last()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            return Err(KconfigError::syntax(
                &filename,
                0,
                format!("recursive source of {}", path.display()),
            ));
        }

        let source = fs::read_to_string(path)?;
        self.include_stack.push(path.to_path_buf());
        let dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
        let result = self.process_source(&path.display().to_string(), &source, dir, dep, link);
        self.include_stack.pop();
        result
    }

    fn process_source(
        &mut self,
        filename: &str,
        source: &str,
        dir: PathBuf,
        dep: &Expr,
        link: &mut LinkState,
    ) -> Result<(), KconfigError> {
        let lines = lexer::tokenize(source, &self.kc.env)
            .map_err(|e| KconfigError::syntax(filename, e.line, e.message))?;
        let output = parser::parse(lines)
            .map_err(|e| KconfigError::syntax(filename, e.line, e.message))?;

        for (line, message) in &output.warnings {
            self.kc.warn(format!("{}:{}: {}", filename, line, message));
        }

        let ctx = FileCtx {
            filename: filename.to_string(),
            dir,
        };
        self.walk_nodes(&output.nodes, &ctx, dep, link)
    }

    fn walk_nodes(
        &mut self,
        nodes: &[Node],
        ctx: &FileCtx,
        dep: &Expr,
        link: &mut LinkState,
    ) -> Result<(), KconfigError> {
        for node in nodes {
            match &node.kind {
                NodeKind::Symbol {
                    name,
                    is_menuconfig,
                } => self.add_symbol(node, name, *is_menuconfig, ctx, dep, link),
                NodeKind::Choice => self.add_choice(node, ctx, dep, link)?,
                NodeKind::Menu(title) => self.add_menu(node, title, ctx, dep, link)?,
                NodeKind::Comment(text) => self.add_comment(node, text, ctx, dep, link),
                NodeKind::If(cond) => {
                    let cond = self.lower_expr(cond);
                    let inner = self.kc.make_and(dep.clone(), cond);
                    self.walk_nodes(&node.children, ctx, &inner, link)?;
                }
                NodeKind::Source(kind, path) => {
                    self.add_source(*kind, path, node.line, ctx, dep, link)?;
                }
                NodeKind::Mainmenu(text) => {
                    if self.kc.mainmenu.is_none() {
                        self.kc.mainmenu = Some(text.clone());
                    }
                }
            }
        }
        Ok(())
    }

    // -- entries ------------------------------------------------------------

    fn add_symbol(
        &mut self,
        raw: &Node,
        name: &str,
        is_menuconfig: bool,
        ctx: &FileCtx,
        dep: &Expr,
        link: &mut LinkState,
    ) {
        let sym_id = self.kc.named_sym(name);

        let node_dep = self.fold_depends(&raw.props, dep);
        let node_id = self.new_node(MenuItem::Symbol(sym_id), node_dep, ctx, raw.line);
        self.kc.menus[node_id.0 as usize].is_menuconfig = is_menuconfig;

        for prop in &raw.props {
            match &prop.kind {
                PropKind::Type(typ) => self.apply_type(sym_id, *typ, ctx, prop.line),
                PropKind::Prompt(text) => {
                    self.apply_prompt(node_id, text, &prop.cond, ctx, prop.line)
                }
                PropKind::Default(value) => {
                    let value = self.lower_expr(value);
                    let cond = self.lower_opt(&prop.cond);
                    self.kc.menus[node_id.0 as usize]
                        .raw_defaults
                        .push((value, cond));
                }
                PropKind::DependsOn(_) => {} // folded into the node dep
                PropKind::Select(target) => {
                    let target = self.kc.named_sym(target);
                    let cond = self.lower_opt(&prop.cond);
                    self.kc.menus[node_id.0 as usize]
                        .raw_selects
                        .push((target, cond));
                }
                PropKind::Imply(target) => {
                    let target = self.kc.named_sym(target);
                    let cond = self.lower_opt(&prop.cond);
                    self.kc.menus[node_id.0 as usize]
                        .raw_implies
                        .push((target, cond));
                }
                PropKind::Range(low, high) => {
                    let low = self.lower_expr(low);
                    let high = self.lower_expr(high);
                    let cond = self.lower_opt(&prop.cond);
                    self.kc.menus[node_id.0 as usize]
                        .raw_ranges
                        .push((low, high, cond));
                }
                PropKind::Help(text) => {
                    self.kc.menus[node_id.0 as usize].help = Some(text.clone());
                }
                PropKind::Env(var) => {
                    self.kc.symbol_mut(sym_id).env_var = Some(var.clone());
                    match self.kc.env.get(var).cloned() {
                        Some(value) => {
                            let value_sym = self.kc.const_sym(&value);
                            let y = self.kc.expr_y();
                            self.kc.menus[node_id.0 as usize]
                                .raw_defaults
                                .push((Expr::Symbol(value_sym), y));
                        }
                        None => self.warn_at(
                            ctx,
                            prop.line,
                            format!("environment variable {} is not set", var),
                        ),
                    }
                }
                PropKind::Modules => {
                    if name != "MODULES" {
                        self.warn_at(
                            ctx,
                            prop.line,
                            format!("the `modules` option is set on {}, not MODULES", name),
                        );
                    }
                    self.kc.modules = Some(sym_id);
                }
                PropKind::DefconfigList => {
                    if self.kc.defconfig_list.is_none() {
                        self.kc.defconfig_list = Some(sym_id);
                    } else {
                        self.warn_at(
                            ctx,
                            prop.line,
                            "more than one defconfig_list symbol".to_string(),
                        );
                    }
                }
                PropKind::AllNoConfigY => {
                    self.kc.symbol_mut(sym_id).is_allnoconfig_y = true;
                }
                PropKind::Optional => self.warn_at(
                    ctx,
                    prop.line,
                    "`optional` is only valid in a choice".to_string(),
                ),
                PropKind::VisibleIf(_) => self.warn_at(
                    ctx,
                    prop.line,
                    "`visible if` is only valid on a menu".to_string(),
                ),
            }
        }

        self.kc.symbol_mut(sym_id).nodes.push(node_id);
        self.kc.defined_syms.push(sym_id);
        if self.defined.insert(sym_id) {
            self.kc.unique_defined.push(sym_id);
        }
        self.link_node(node_id, link);
    }

    fn add_choice(
        &mut self,
        raw: &Node,
        ctx: &FileCtx,
        dep: &Expr,
        link: &mut LinkState,
    ) -> Result<(), KconfigError> {
        let n = self.kc.expr_n();
        let choice_id = ChoiceId(self.kc.choice_arena.len() as u32);
        self.kc.choice_arena.push(Choice::new(n));

        let node_dep = self.fold_depends(&raw.props, dep);
        let node_id = self.new_node(MenuItem::Choice(choice_id), node_dep, ctx, raw.line);

        for prop in &raw.props {
            match &prop.kind {
                PropKind::Type(typ) => {
                    if typ.is_bool_or_tristate() {
                        self.kc.choice_mut(choice_id).typ = *typ;
                    } else {
                        self.warn_at(
                            ctx,
                            prop.line,
                            format!("choice declared with invalid type {}", typ.as_str()),
                        );
                    }
                }
                PropKind::Prompt(text) => {
                    self.apply_prompt(node_id, text, &prop.cond, ctx, prop.line)
                }
                PropKind::Default(value) => {
                    let value = self.lower_expr(value);
                    let cond = self.lower_opt(&prop.cond);
                    self.kc.menus[node_id.0 as usize]
                        .raw_defaults
                        .push((value, cond));
                }
                PropKind::Optional => {
                    self.kc.choice_mut(choice_id).is_optional = true;
                }
                PropKind::Help(text) => {
                    self.kc.menus[node_id.0 as usize].help = Some(text.clone());
                }
                PropKind::DependsOn(_) => {}
                _ => self.warn_at(ctx, prop.line, "property not valid in a choice".to_string()),
            }
        }

        self.kc.choice_mut(choice_id).nodes.push(node_id);
        self.link_node(node_id, link);

        let mut inner = LinkState {
            parent: node_id,
            last: None,
        };
        let y = self.kc.expr_y();
        self.walk_nodes(&raw.children, ctx, &y, &mut inner)
    }

    fn add_menu(
        &mut self,
        raw: &Node,
        title: &str,
        ctx: &FileCtx,
        dep: &Expr,
        link: &mut LinkState,
    ) -> Result<(), KconfigError> {
        let node_dep = self.fold_depends(&raw.props, dep);
        let node_id = self.new_node(MenuItem::Menu, node_dep, ctx, raw.line);
        let y = self.kc.expr_y();
        self.kc.menus[node_id.0 as usize].prompt = Some(Prompt {
            text: title.to_string(),
            cond: y,
        });

        let mut vis = self.kc.expr_y();
        for prop in &raw.props {
            match &prop.kind {
                PropKind::DependsOn(_) => {}
                PropKind::VisibleIf(expr) => {
                    let cond = self.lower_expr(expr);
                    vis = self.kc.make_and(vis, cond);
                }
                _ => self.warn_at(ctx, prop.line, "property not valid on a menu".to_string()),
            }
        }
        self.kc.menus[node_id.0 as usize].visibility = vis;

        self.link_node(node_id, link);

        let mut inner = LinkState {
            parent: node_id,
            last: None,
        };
        let y = self.kc.expr_y();
        self.walk_nodes(&raw.children, ctx, &y, &mut inner)
    }

    fn add_comment(
        &mut self,
        raw: &Node,
        text: &str,
        ctx: &FileCtx,
        dep: &Expr,
        link: &mut LinkState,
    ) {
        let node_dep = self.fold_depends(&raw.props, dep);
        let node_id = self.new_node(MenuItem::Comment, node_dep, ctx, raw.line);
        let y = self.kc.expr_y();
        self.kc.menus[node_id.0 as usize].prompt = Some(Prompt {
            text: text.to_string(),
            cond: y,
        });

        for prop in &raw.props {
            if !matches!(prop.kind, PropKind::DependsOn(_)) {
                self.warn_at(ctx, prop.line, "property not valid on a comment".to_string());
            }
        }
        self.link_node(node_id, link);
    }

    fn add_source(
        &mut self,
        kind: SourceKind,
        path: &str,
        linenr: u32,
        ctx: &FileCtx,
        dep: &Expr,
        link: &mut LinkState,
    ) -> Result<(), KconfigError> {
        match kind {
            SourceKind::Tree | SourceKind::Relative => {
                let resolved = if kind == SourceKind::Tree {
                    self.kc.srctree.join(path)
                } else {
                    ctx.dir.join(path)
                };
                if !resolved.is_file() {
                    return Err(KconfigError::syntax(
                        &ctx.filename,
                        linenr,
                        format!("sourced file {} not found", resolved.display()),
                    ));
                }
                self.load_file(&resolved, dep, link)
            }
            SourceKind::Glob => {
                let pattern = ctx.dir.join(path);
                let pattern = pattern.to_string_lossy();
                let paths = glob::glob(&pattern).map_err(|e| {
                    KconfigError::syntax(
                        &ctx.filename,
                        linenr,
                        format!("invalid glob pattern {}: {}", path, e),
                    )
                })?;
                let mut matches: Vec<PathBuf> = paths.filter_map(Result::ok).collect();
                matches.sort();
                for file in matches {
                    self.load_file(&file, dep, link)?;
                }
                Ok(())
            }
        }
    }

    // -- helpers ------------------------------------------------------------

    fn new_node(&mut self, item: MenuItem, dep: Expr, ctx: &FileCtx, linenr: u32) -> MenuId {
        let y = self.kc.expr_y();
        let node = MenuNode::new(item, dep, y, ctx.filename.clone(), linenr);
        let id = MenuId(self.kc.menus.len() as u32);
        self.kc.menus.push(node);
        id
    }

    fn link_node(&mut self, node_id: MenuId, link: &mut LinkState) {
        self.kc.menus[node_id.0 as usize].parent = Some(link.parent);
        match link.last {
            Some(prev) => self.kc.menus[prev.0 as usize].next = Some(node_id),
            None => self.kc.menus[link.parent.0 as usize].list = Some(node_id),
        }
        link.last = Some(node_id);
    }

    /// AND the surrounding `if` context with every `depends on` line.
    fn fold_depends(&mut self, props: &[Property], dep: &Expr) -> Expr {
        let mut result = dep.clone();
        for prop in props {
            if let PropKind::DependsOn(expr) = &prop.kind {
                let e = self.lower_expr(expr);
                result = self.kc.make_and(result, e);
            }
        }
        result
    }

    fn apply_type(&mut self, sym_id: SymbolId, typ: SymbolType, ctx: &FileCtx, line: u32) {
        let name = self.kc.symbol(sym_id).name().to_string();
        let current = self.kc.symbol(sym_id).sym_type();
        if current == SymbolType::Unknown {
            self.kc.symbol_mut(sym_id).typ = typ;
        } else if current != typ {
            self.warn_at(
                ctx,
                line,
                format!(
                    "{} defined with multiple types, keeping {}",
                    name,
                    current.as_str()
                ),
            );
        }
    }

    fn apply_prompt(
        &mut self,
        node_id: MenuId,
        text: &str,
        cond: &Option<RawExpr>,
        ctx: &FileCtx,
        line: u32,
    ) {
        if self.kc.menus[node_id.0 as usize].prompt.is_some() {
            self.warn_at(ctx, line, "ignoring extra prompt".to_string());
            return;
        }
        let cond = self.lower_opt(cond);
        self.kc.menus[node_id.0 as usize].prompt = Some(Prompt {
            text: text.to_string(),
            cond,
        });
    }

    fn lower_opt(&mut self, cond: &Option<RawExpr>) -> Expr {
        match cond {
            Some(c) => self.lower_expr(c),
            None => self.kc.expr_y(),
        }
    }

    fn lower_expr(&mut self, raw: &RawExpr) -> Expr {
        match raw {
            RawExpr::Sym(name) => Expr::Symbol(self.expr_sym(name)),
            RawExpr::Const(s) => Expr::Symbol(self.kc.const_sym(s)),
            RawExpr::Not(e) => Expr::Not(Box::new(self.lower_expr(e))),
            RawExpr::And(a, b) => Expr::And(
                Box::new(self.lower_expr(a)),
                Box::new(self.lower_expr(b)),
            ),
            RawExpr::Or(a, b) => Expr::Or(
                Box::new(self.lower_expr(a)),
                Box::new(self.lower_expr(b)),
            ),
            RawExpr::Cmp(op, a, b) => Expr::Cmp(
                *op,
                Box::new(self.lower_expr(a)),
                Box::new(self.lower_expr(b)),
            ),
        }
    }

    /// Leaf resolution: `y`/`m`/`n` and numbers are constants, everything
    /// else names a symbol (creating an untyped placeholder if new).
    fn expr_sym(&mut self, name: &str) -> SymbolId {
        match name {
            "y" => self.kc.const_y(),
            "m" => self.kc.const_m(),
            "n" => self.kc.const_n(),
            _ if is_numeric_token(name) => self.kc.const_sym(name),
            _ => self.kc.named_sym(name),
        }
    }

    fn warn_at(&mut self, ctx: &FileCtx, line: u32, msg: String) {
        self.kc.warn(format!("{}:{}: {}", ctx.filename, line, msg));
    }
}
