//! Recursive-descent parser over token lines.
//!
//! The grammar is block structured: every statement is one token line,
//! `config`/`menuconfig` open a run of property lines, and
//! `choice`/`menu`/`if` open nested entry blocks closed by their `end*`
//! keyword. Each nesting level comes out as a flat list of [`Node`]s;
//! a node's properties keep their declared conditions, which finalization
//! later folds with the surrounding menu dependencies.
//!
//! Syntax rejects abort the parse with a line number; recoverable
//! oddities (stray trailing tokens, unknown options) come back as
//! warnings.

use crate::expr::CmpOp;
use crate::lexer::{Kw, Punct, Token, TokenLine};
use crate::symbol::SymbolType;

/// How a `source` statement resolves its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// `source` – relative to `srctree`.
    Tree,
    /// `rsource` – relative to the sourcing file's directory.
    Relative,
    /// `gsource` – an `rsource`-relative glob; zero matches is legal.
    Glob,
}

/// Expression over raw names, before symbol interning.
#[derive(Debug, Clone)]
pub enum RawExpr {
    /// Unquoted reference: a symbol name, `y`/`m`/`n`, or a number.
    Sym(String),
    /// Quoted string operand.
    Const(String),
    Not(Box<RawExpr>),
    And(Box<RawExpr>, Box<RawExpr>),
    Or(Box<RawExpr>, Box<RawExpr>),
    Cmp(CmpOp, Box<RawExpr>, Box<RawExpr>),
}

/// One property line, with its trailing `if` condition (`None` means `y`).
#[derive(Debug)]
pub struct Property {
    pub kind: PropKind,
    pub cond: Option<RawExpr>,
    pub line: u32,
}

#[derive(Debug)]
pub enum PropKind {
    Type(SymbolType),
    Prompt(String),
    Default(RawExpr),
    DependsOn(RawExpr),
    Select(String),
    Imply(String),
    Range(RawExpr, RawExpr),
    VisibleIf(RawExpr),
    Help(String),
    /// `option env="NAME"`.
    Env(String),
    /// `option modules` or the bare `modules` attribute.
    Modules,
    /// `option defconfig_list`.
    DefconfigList,
    /// `option allnoconfig_y`.
    AllNoConfigY,
    Optional,
}

/// A parsed entry: what it is, its property lines, its nested entries.
#[derive(Debug)]
pub struct Node {
    pub kind: NodeKind,
    pub props: Vec<Property>,
    pub children: Vec<Node>,
    pub line: u32,
}

#[derive(Debug)]
pub enum NodeKind {
    Symbol { name: String, is_menuconfig: bool },
    Choice,
    Menu(String),
    Comment(String),
    If(RawExpr),
    Source(SourceKind, String),
    Mainmenu(String),
}

/// A syntax reject. Aborts the surrounding file load.
#[derive(Debug)]
pub struct ParseError {
    pub line: u32,
    pub message: String,
}

pub struct ParseOutput {
    pub nodes: Vec<Node>,
    pub warnings: Vec<(u32, String)>,
}

pub fn parse(lines: Vec<TokenLine>) -> Result<ParseOutput, ParseError> {
    let mut parser = Parser {
        lines,
        pos: 0,
        warnings: Vec::new(),
    };
    let nodes = parser.parse_block(None)?;
    Ok(ParseOutput {
        nodes,
        warnings: parser.warnings,
    })
}

// Binding powers for the binary operators; comparisons bind tighter than
// both and are non-associative.
const BP_OR: u8 = 1;
const BP_AND: u8 = 2;

struct Parser {
    lines: Vec<TokenLine>,
    pos: usize,
    warnings: Vec<(u32, String)>,
}

impl Parser {
    /// Take ownership of the current line's tokens and advance.
    fn take_line(&mut self) -> (Vec<Token>, u32) {
        let line = self.lines[self.pos].line;
        let tokens = std::mem::take(&mut self.lines[self.pos].tokens);
        self.pos += 1;
        (tokens, line)
    }

    fn warn(&mut self, line: u32, message: impl Into<String>) {
        self.warnings.push((line, message.into()));
    }

    /// Warn about anything left on a fully-parsed line.
    fn finish_line(&mut self, cur: &Cursor<'_>) {
        if !cur.at_end() {
            self.warn(cur.line, "ignoring extra tokens at end of line");
        }
    }

    // -- entry blocks -------------------------------------------------------

    /// Parse entries until `end` (consumed) or end of input. A mismatched
    /// or missing terminator is fatal.
    fn parse_block(&mut self, end: Option<Kw>) -> Result<Vec<Node>, ParseError> {
        let mut nodes = Vec::new();
        while self.pos < self.lines.len() {
            let line = self.lines[self.pos].line;
            let first = self.lines[self.pos].tokens[0].clone();
            let Token::Kw(kw) = first else {
                return Err(ParseError {
                    line,
                    message: "expected a statement".to_string(),
                });
            };
            if end == Some(kw) {
                self.pos += 1;
                return Ok(nodes);
            }
            match kw {
                Kw::Config => nodes.push(self.parse_symbol(false)?),
                Kw::MenuConfig => nodes.push(self.parse_symbol(true)?),
                Kw::Choice => nodes.push(self.parse_choice()?),
                Kw::Menu => nodes.push(self.parse_menu()?),
                Kw::Comment => nodes.push(self.parse_comment()?),
                Kw::If => nodes.push(self.parse_if()?),
                Kw::Source => nodes.push(self.parse_source(SourceKind::Tree)?),
                Kw::RSource => nodes.push(self.parse_source(SourceKind::Relative)?),
                Kw::GSource => nodes.push(self.parse_source(SourceKind::Glob)?),
                Kw::Mainmenu => nodes.push(self.parse_mainmenu()?),
                other => {
                    return Err(ParseError {
                        line,
                        message: format!("unexpected `{}`", other.as_str()),
                    });
                }
            }
        }
        match end {
            None => Ok(nodes),
            Some(kw) => Err(ParseError {
                line: self.lines.last().map(|l| l.line).unwrap_or(0),
                message: format!("missing `{}`", kw.as_str()),
            }),
        }
    }

    fn parse_symbol(&mut self, is_menuconfig: bool) -> Result<Node, ParseError> {
        let (tokens, line) = self.take_line();
        let mut cur = Cursor::new(&tokens, line);
        cur.skip(); // config / menuconfig
        let name = cur.expect_name()?;
        self.finish_line(&cur);

        let props = self.parse_properties()?;
        Ok(Node {
            kind: NodeKind::Symbol {
                name,
                is_menuconfig,
            },
            props,
            children: Vec::new(),
            line,
        })
    }

    fn parse_choice(&mut self) -> Result<Node, ParseError> {
        let (tokens, line) = self.take_line();
        let mut cur = Cursor::new(&tokens, line);
        cur.skip(); // choice
        self.finish_line(&cur);

        let props = self.parse_properties()?;
        let children = self.parse_block(Some(Kw::EndChoice))?;
        Ok(Node {
            kind: NodeKind::Choice,
            props,
            children,
            line,
        })
    }

    fn parse_menu(&mut self) -> Result<Node, ParseError> {
        let (tokens, line) = self.take_line();
        let mut cur = Cursor::new(&tokens, line);
        cur.skip(); // menu
        let title = cur.expect_str()?;
        self.finish_line(&cur);

        let props = self.parse_properties()?;
        let children = self.parse_block(Some(Kw::EndMenu))?;
        Ok(Node {
            kind: NodeKind::Menu(title),
            props,
            children,
            line,
        })
    }

    fn parse_comment(&mut self) -> Result<Node, ParseError> {
        let (tokens, line) = self.take_line();
        let mut cur = Cursor::new(&tokens, line);
        cur.skip(); // comment
        let text = cur.expect_str()?;
        self.finish_line(&cur);

        let props = self.parse_properties()?;
        Ok(Node {
            kind: NodeKind::Comment(text),
            props,
            children: Vec::new(),
            line,
        })
    }

    fn parse_if(&mut self) -> Result<Node, ParseError> {
        let (tokens, line) = self.take_line();
        let mut cur = Cursor::new(&tokens, line);
        cur.skip(); // if
        let cond = self.parse_expr(&mut cur)?;
        self.finish_line(&cur);

        let children = self.parse_block(Some(Kw::EndIf))?;
        Ok(Node {
            kind: NodeKind::If(cond),
            props: Vec::new(),
            children,
            line,
        })
    }

    fn parse_source(&mut self, kind: SourceKind) -> Result<Node, ParseError> {
        let (tokens, line) = self.take_line();
        let mut cur = Cursor::new(&tokens, line);
        cur.skip(); // source / rsource / gsource
        let path = cur.expect_str()?;
        self.finish_line(&cur);
        Ok(Node {
            kind: NodeKind::Source(kind, path),
            props: Vec::new(),
            children: Vec::new(),
            line,
        })
    }

    fn parse_mainmenu(&mut self) -> Result<Node, ParseError> {
        let (tokens, line) = self.take_line();
        let mut cur = Cursor::new(&tokens, line);
        cur.skip(); // mainmenu
        let text = cur.expect_str()?;
        self.finish_line(&cur);
        Ok(Node {
            kind: NodeKind::Mainmenu(text),
            props: Vec::new(),
            children: Vec::new(),
            line,
        })
    }

    // -- property lines -----------------------------------------------------

    /// Consume property lines until the first line that does not start
    /// with a property keyword.
    fn parse_properties(&mut self) -> Result<Vec<Property>, ParseError> {
        let mut props = Vec::new();
        while self.pos < self.lines.len() {
            let first = self.lines[self.pos].tokens.first().cloned();
            let Some(Token::Kw(kw)) = first else { break };
            if !is_property_kw(kw) {
                break;
            }
            let (tokens, line) = self.take_line();
            let mut cur = Cursor::new(&tokens, line);
            cur.skip(); // the property keyword
            self.parse_property(kw, &mut cur, &mut props)?;
            self.finish_line(&cur);
        }
        Ok(props)
    }

    fn parse_property(
        &mut self,
        kw: Kw,
        cur: &mut Cursor<'_>,
        out: &mut Vec<Property>,
    ) -> Result<(), ParseError> {
        let line = cur.line;
        match kw {
            Kw::Bool | Kw::Tristate | Kw::StringType | Kw::Hex | Kw::Int => {
                out.push(Property {
                    kind: PropKind::Type(type_for(kw)),
                    cond: None,
                    line,
                });
                // Inline prompt: `bool "text" [if expr]`.
                if matches!(cur.peek(), Some(Token::Str(_))) {
                    let text = cur.expect_str()?;
                    let cond = self.parse_opt_cond(cur)?;
                    out.push(Property {
                        kind: PropKind::Prompt(text),
                        cond,
                        line,
                    });
                }
            }

            // `def_bool`/`def_tristate` are a type plus a default.
            Kw::DefBool | Kw::DefTristate => {
                let typ = if kw == Kw::DefBool {
                    SymbolType::Bool
                } else {
                    SymbolType::Tristate
                };
                let value = self.parse_expr(cur)?;
                let cond = self.parse_opt_cond(cur)?;
                out.push(Property {
                    kind: PropKind::Type(typ),
                    cond: None,
                    line,
                });
                out.push(Property {
                    kind: PropKind::Default(value),
                    cond,
                    line,
                });
            }

            Kw::Prompt => {
                let text = cur.expect_str()?;
                let cond = self.parse_opt_cond(cur)?;
                out.push(Property {
                    kind: PropKind::Prompt(text),
                    cond,
                    line,
                });
            }

            Kw::Default => {
                let value = self.parse_expr(cur)?;
                let cond = self.parse_opt_cond(cur)?;
                out.push(Property {
                    kind: PropKind::Default(value),
                    cond,
                    line,
                });
            }

            Kw::Depends => {
                cur.eat_kw(Kw::On);
                let expr = self.parse_expr(cur)?;
                out.push(Property {
                    kind: PropKind::DependsOn(expr),
                    cond: None,
                    line,
                });
            }

            Kw::Select | Kw::Imply => {
                let target = cur.expect_name()?;
                let cond = self.parse_opt_cond(cur)?;
                let kind = if kw == Kw::Select {
                    PropKind::Select(target)
                } else {
                    PropKind::Imply(target)
                };
                out.push(Property { kind, cond, line });
            }

            Kw::Range => {
                let low = self.parse_primary(cur)?;
                let high = self.parse_primary(cur)?;
                let cond = self.parse_opt_cond(cur)?;
                out.push(Property {
                    kind: PropKind::Range(low, high),
                    cond,
                    line,
                });
            }

            Kw::Visible => {
                if !cur.eat_kw(Kw::If) {
                    return Err(cur.err("expected `if` after `visible`"));
                }
                let expr = self.parse_expr(cur)?;
                out.push(Property {
                    kind: PropKind::VisibleIf(expr),
                    cond: None,
                    line,
                });
            }

            // The lexer attaches the collected block as a string token.
            Kw::Help => {
                let text = cur.expect_str()?;
                out.push(Property {
                    kind: PropKind::Help(text),
                    cond: None,
                    line,
                });
            }

            Kw::Option => match cur.bump() {
                Some(Token::Kw(Kw::Modules)) => out.push(Property {
                    kind: PropKind::Modules,
                    cond: None,
                    line,
                }),
                Some(Token::Kw(Kw::DefconfigList)) => out.push(Property {
                    kind: PropKind::DefconfigList,
                    cond: None,
                    line,
                }),
                Some(Token::Kw(Kw::AllNoConfigY)) => out.push(Property {
                    kind: PropKind::AllNoConfigY,
                    cond: None,
                    line,
                }),
                Some(Token::Kw(Kw::Env)) => {
                    cur.eat_punct(Punct::Eq);
                    let name = cur.expect_str()?;
                    out.push(Property {
                        kind: PropKind::Env(name),
                        cond: None,
                        line,
                    });
                }
                _ => self.warn(line, "unknown option"),
            },

            Kw::Modules => out.push(Property {
                kind: PropKind::Modules,
                cond: None,
                line,
            }),

            Kw::Optional => out.push(Property {
                kind: PropKind::Optional,
                cond: None,
                line,
            }),

            _ => unreachable!("not a property keyword"),
        }
        Ok(())
    }

    fn parse_opt_cond(&mut self, cur: &mut Cursor<'_>) -> Result<Option<RawExpr>, ParseError> {
        if cur.eat_kw(Kw::If) {
            Ok(Some(self.parse_expr(cur)?))
        } else {
            Ok(None)
        }
    }

    // -- expressions --------------------------------------------------------

    fn parse_expr(&mut self, cur: &mut Cursor<'_>) -> Result<RawExpr, ParseError> {
        self.parse_expr_bp(cur, 0)
    }

    fn parse_expr_bp(&mut self, cur: &mut Cursor<'_>, min_bp: u8) -> Result<RawExpr, ParseError> {
        let mut lhs = self.parse_comparison(cur)?;
        while let Some(bp) = binary_bp(cur.peek()) {
            if bp < min_bp {
                break;
            }
            let is_or = matches!(cur.bump(), Some(Token::Punct(Punct::OrOr)));
            let rhs = self.parse_expr_bp(cur, bp + 1)?;
            lhs = if is_or {
                RawExpr::Or(lhs.into(), rhs.into())
            } else {
                RawExpr::And(lhs.into(), rhs.into())
            };
        }
        Ok(lhs)
    }

    fn parse_comparison(&mut self, cur: &mut Cursor<'_>) -> Result<RawExpr, ParseError> {
        let lhs = self.parse_primary(cur)?;
        let op = match cur.peek() {
            Some(Token::Punct(Punct::Eq)) => CmpOp::Eq,
            Some(Token::Punct(Punct::NotEq)) => CmpOp::NotEq,
            Some(Token::Punct(Punct::Lt)) => CmpOp::Lt,
            Some(Token::Punct(Punct::LtEq)) => CmpOp::LtEq,
            Some(Token::Punct(Punct::Gt)) => CmpOp::Gt,
            Some(Token::Punct(Punct::GtEq)) => CmpOp::GtEq,
            _ => return Ok(lhs),
        };
        cur.skip();
        let rhs = self.parse_primary(cur)?;
        Ok(RawExpr::Cmp(op, lhs.into(), rhs.into()))
    }

    fn parse_primary(&mut self, cur: &mut Cursor<'_>) -> Result<RawExpr, ParseError> {
        match cur.bump() {
            Some(Token::Punct(Punct::Not)) => {
                Ok(RawExpr::Not(self.parse_primary(cur)?.into()))
            }
            Some(Token::Punct(Punct::LParen)) => {
                let inner = self.parse_expr_bp(cur, 0)?;
                if !cur.eat_punct(Punct::RParen) {
                    return Err(cur.err("expected `)`"));
                }
                Ok(inner)
            }
            Some(Token::Word(w)) => Ok(RawExpr::Sym(w.clone())),
            Some(Token::Str(s)) => Ok(RawExpr::Const(s.clone())),
            Some(Token::Kw(kw)) => Ok(RawExpr::Sym(kw.as_str().to_string())),
            _ => Err(cur.err("expected an expression")),
        }
    }
}

fn binary_bp(tok: Option<&Token>) -> Option<u8> {
    match tok {
        Some(Token::Punct(Punct::OrOr)) => Some(BP_OR),
        Some(Token::Punct(Punct::AndAnd)) => Some(BP_AND),
        _ => None,
    }
}

fn is_property_kw(kw: Kw) -> bool {
    matches!(
        kw,
        Kw::Bool
            | Kw::Tristate
            | Kw::StringType
            | Kw::Hex
            | Kw::Int
            | Kw::Prompt
            | Kw::Default
            | Kw::DefBool
            | Kw::DefTristate
            | Kw::Depends
            | Kw::Select
            | Kw::Imply
            | Kw::Range
            | Kw::Visible
            | Kw::Help
            | Kw::Option
            | Kw::Modules
            | Kw::Optional
    )
}

fn type_for(kw: Kw) -> SymbolType {
    match kw {
        Kw::Bool => SymbolType::Bool,
        Kw::Tristate => SymbolType::Tristate,
        Kw::StringType => SymbolType::String,
        Kw::Hex => SymbolType::Hex,
        Kw::Int => SymbolType::Int,
        _ => unreachable!("not a type keyword"),
    }
}

// -- line cursor ------------------------------------------------------------

/// Cursor over one line's tokens.
struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
    line: u32,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token], line: u32) -> Self {
        Cursor {
            tokens,
            pos: 0,
            line,
        }
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<&'a Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    /// Advance past a token whose identity is already known.
    fn skip(&mut self) {
        self.pos += 1;
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn eat_kw(&mut self, kw: Kw) -> bool {
        if self.peek() == Some(&Token::Kw(kw)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_punct(&mut self, punct: Punct) -> bool {
        if self.peek() == Some(&Token::Punct(punct)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn err(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            line: self.line,
            message: message.into(),
        }
    }

    /// A symbol name; keywords double as names where the grammar is
    /// unambiguous.
    fn expect_name(&mut self) -> Result<String, ParseError> {
        match self.bump() {
            Some(Token::Word(w)) => Ok(w.clone()),
            Some(Token::Kw(kw)) => Ok(kw.as_str().to_string()),
            _ => Err(self.err("expected a symbol name")),
        }
    }

    fn expect_str(&mut self) -> Result<String, ParseError> {
        match self.bump() {
            Some(Token::Str(s)) => Ok(s.clone()),
            Some(Token::Word(w)) => Ok(w.clone()),
            _ => Err(self.err("expected a string")),
        }
    }
}
