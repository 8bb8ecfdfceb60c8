//! Tristate logic and the dependency-expression kernel.
//!
//! Expression leaves are always [`SymbolId`]s: quoted strings and numeric
//! literals are interned as constant symbols when the semantic model is
//! built, so an expression tree never owns text of its own.

use std::fmt;

use crate::model::Kconfig;
use crate::symbol::{SymbolId, SymbolType};

/// The three-valued logic Kconfig computes in: `n < m < y`.
///
/// `and` is minimum, `or` is maximum and `not` mirrors around `m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Tristate {
    N = 0,
    M = 1,
    Y = 2,
}

impl Tristate {
    pub fn and(self, other: Tristate) -> Tristate {
        self.min(other)
    }

    pub fn or(self, other: Tristate) -> Tristate {
        self.max(other)
    }

    pub fn not(self) -> Tristate {
        match self {
            Tristate::N => Tristate::Y,
            Tristate::M => Tristate::M,
            Tristate::Y => Tristate::N,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Tristate::N => "n",
            Tristate::M => "m",
            Tristate::Y => "y",
        }
    }

    /// Parse `n`/`m`/`y`, as found in `.config` files and user input.
    pub fn from_str(s: &str) -> Option<Tristate> {
        match s {
            "n" => Some(Tristate::N),
            "m" => Some(Tristate::M),
            "y" => Some(Tristate::Y),
            _ => None,
        }
    }
}

impl fmt::Display for Tristate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Relational operator inside a comparison expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CmpOp {
    pub fn as_str(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::NotEq => "!=",
            CmpOp::Lt => "<",
            CmpOp::LtEq => "<=",
            CmpOp::Gt => ">",
            CmpOp::GtEq => ">=",
        }
    }
}

/// A dependency expression over symbol handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Symbol(SymbolId),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Collect every symbol handle mentioned in the expression.
    pub fn collect_symbols(&self, out: &mut Vec<SymbolId>) {
        match self {
            Expr::Symbol(id) => out.push(*id),
            Expr::Not(e) => e.collect_symbols(out),
            Expr::And(a, b) | Expr::Or(a, b) | Expr::Cmp(_, a, b) => {
                a.collect_symbols(out);
                b.collect_symbols(out);
            }
        }
    }

    fn as_symbol(&self) -> Option<SymbolId> {
        match self {
            Expr::Symbol(id) => Some(*id),
            _ => None,
        }
    }
}

// Rendering precedence, lowest first: || < && < ! / comparison / leaf.
const PREC_OR: u8 = 0;
const PREC_AND: u8 = 1;
const PREC_UNARY: u8 = 2;

fn prec(e: &Expr) -> u8 {
    match e {
        Expr::Or(..) => PREC_OR,
        Expr::And(..) => PREC_AND,
        _ => PREC_UNARY,
    }
}

/// Does `expr` gate on `sym` being enabled? Used to detect implicit
/// submenus: a plain reference, either side of an `&&`, `sym = y`/`m`, or
/// `sym != n` all count.
pub(crate) fn expr_gates_on(expr: &Expr, sym: SymbolId, y: SymbolId, m: SymbolId, n: SymbolId) -> bool {
    match expr {
        Expr::Symbol(id) => *id == sym,
        Expr::And(a, b) => {
            expr_gates_on(a, sym, y, m, n) || expr_gates_on(b, sym, y, m, n)
        }
        Expr::Cmp(CmpOp::Eq, l, r) => {
            l.as_symbol() == Some(sym) && matches!(r.as_symbol(), Some(id) if id == y || id == m)
        }
        Expr::Cmp(CmpOp::NotEq, l, r) => l.as_symbol() == Some(sym) && r.as_symbol() == Some(n),
        _ => false,
    }
}

impl Kconfig {
    /// Evaluate an expression to a tristate under the current configuration.
    pub fn expr_value(&self, e: &Expr) -> Tristate {
        match e {
            Expr::Symbol(id) => self.leaf_value(*id),
            Expr::Not(inner) => self.expr_value(inner).not(),
            Expr::And(a, b) => self.expr_value(a).and(self.expr_value(b)),
            Expr::Or(a, b) => self.expr_value(a).or(self.expr_value(b)),
            Expr::Cmp(op, l, r) => self.cmp_value(*op, l, r),
        }
    }

    /// Leaf rule: bool/tristate symbols contribute their tristate value;
    /// anything else contributes `y` when its string value is non-empty.
    fn leaf_value(&self, id: SymbolId) -> Tristate {
        let sym = self.symbol(id);
        match sym.sym_type() {
            SymbolType::Bool | SymbolType::Tristate | SymbolType::Unknown if !sym.is_constant() => {
                self.tri_value(id)
            }
            _ => {
                if sym.is_constant() {
                    // `m` stays m here; symbol-level evaluation promotes a
                    // computed m to y when modules are unavailable.
                    return match sym.name() {
                        "y" => Tristate::Y,
                        "m" => Tristate::M,
                        "n" => Tristate::N,
                        name if name.is_empty() => Tristate::N,
                        _ => Tristate::Y,
                    };
                }
                if self.str_value(id).is_empty() {
                    Tristate::N
                } else {
                    Tristate::Y
                }
            }
        }
    }

    fn cmp_value(&self, op: CmpOp, l: &Expr, r: &Expr) -> Tristate {
        let (lt, ls) = self.operand(l);
        let (rt, rs) = self.operand(r);

        let ord = if lt == SymbolType::Int && rt == SymbolType::Int {
            match (ls.trim().parse::<i64>(), rs.trim().parse::<i64>()) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => ls.cmp(&rs),
            }
        } else if lt == SymbolType::Hex && rt == SymbolType::Hex {
            match (parse_hex(&ls), parse_hex(&rs)) {
                (Some(a), Some(b)) => a.cmp(&b),
                _ => ls.cmp(&rs),
            }
        } else {
            ls.cmp(&rs)
        };

        let holds = match op {
            CmpOp::Eq => ord.is_eq(),
            CmpOp::NotEq => ord.is_ne(),
            CmpOp::Lt => ord.is_lt(),
            CmpOp::LtEq => ord.is_le(),
            CmpOp::Gt => ord.is_gt(),
            CmpOp::GtEq => ord.is_ge(),
        };
        if holds { Tristate::Y } else { Tristate::N }
    }

    /// Type and string form of a comparison operand. Non-leaf operands
    /// degrade to their tristate's string form.
    fn operand(&self, e: &Expr) -> (SymbolType, String) {
        match e {
            Expr::Symbol(id) => (self.symbol(*id).sym_type(), self.str_value(*id)),
            _ => (SymbolType::Unknown, self.expr_value(e).as_str().to_string()),
        }
    }

    /// Render an expression the way it would appear in a Kconfig file,
    /// parenthesizing only where precedence demands it.
    pub fn expr_str(&self, e: &Expr) -> String {
        let mut out = String::new();
        self.expr_str_into(e, &mut out);
        out
    }

    fn expr_str_into(&self, e: &Expr, out: &mut String) {
        match e {
            Expr::Symbol(id) => out.push_str(&self.sym_expr_name(*id)),
            Expr::Not(inner) => {
                out.push('!');
                self.child_str_into(inner, PREC_UNARY, out);
            }
            Expr::And(a, b) => {
                self.child_str_into(a, PREC_AND, out);
                out.push_str(" && ");
                self.child_str_into(b, PREC_AND, out);
            }
            Expr::Or(a, b) => {
                self.child_str_into(a, PREC_OR, out);
                out.push_str(" || ");
                self.child_str_into(b, PREC_OR, out);
            }
            Expr::Cmp(op, l, r) => {
                self.child_str_into(l, PREC_UNARY, out);
                out.push(' ');
                out.push_str(op.as_str());
                out.push(' ');
                self.child_str_into(r, PREC_UNARY, out);
            }
        }
    }

    fn child_str_into(&self, e: &Expr, min_prec: u8, out: &mut String) {
        if prec(e) < min_prec {
            out.push('(');
            self.expr_str_into(e, out);
            out.push(')');
        } else {
            self.expr_str_into(e, out);
        }
    }

    fn sym_expr_name(&self, id: SymbolId) -> String {
        let sym = self.symbol(id);
        // String constants keep their quotes; numbers and y/m/n re-parse
        // to the same constant either way and read better bare.
        if sym.is_constant()
            && !matches!(sym.name(), "y" | "m" | "n")
            && !matches!(sym.sym_type(), SymbolType::Int | SymbolType::Hex)
        {
            format!("\"{}\"", sym.name())
        } else {
            sym.name().to_string()
        }
    }

    /// True when `expr` gates on `sym` (plain reference, `&&` operand,
    /// `sym = y`/`m` or `sym != n`).
    pub fn expr_depends_on(&self, expr: &Expr, sym: SymbolId) -> bool {
        expr_gates_on(expr, sym, self.const_y(), self.const_m(), self.const_n())
    }

    /// `a && b`, folded against the constants so the common `y`-condition
    /// case stays a plain leaf.
    pub(crate) fn make_and(&self, a: Expr, b: Expr) -> Expr {
        let y = self.const_y();
        let n = self.const_n();
        if a.as_symbol() == Some(n) || b.as_symbol() == Some(n) {
            return Expr::Symbol(n);
        }
        if a.as_symbol() == Some(y) {
            return b;
        }
        if b.as_symbol() == Some(y) {
            return a;
        }
        Expr::And(Box::new(a), Box::new(b))
    }

    /// `a || b`, folded against the constants.
    pub(crate) fn make_or(&self, a: Expr, b: Expr) -> Expr {
        let y = self.const_y();
        let n = self.const_n();
        if a.as_symbol() == Some(y) || b.as_symbol() == Some(y) {
            return Expr::Symbol(y);
        }
        if a.as_symbol() == Some(n) {
            return b;
        }
        if b.as_symbol() == Some(n) {
            return a;
        }
        Expr::Or(Box::new(a), Box::new(b))
    }

    pub(crate) fn expr_y(&self) -> Expr {
        Expr::Symbol(self.const_y())
    }

    pub(crate) fn expr_n(&self) -> Expr {
        Expr::Symbol(self.const_n())
    }

    pub(crate) fn is_expr_y(&self, e: &Expr) -> bool {
        e.as_symbol() == Some(self.const_y())
    }
}

fn parse_hex(s: &str) -> Option<u64> {
    let t = s.trim();
    let t = t
        .strip_prefix("0x")
        .or_else(|| t.strip_prefix("0X"))
        .unwrap_or(t);
    u64::from_str_radix(t, 16).ok()
}
