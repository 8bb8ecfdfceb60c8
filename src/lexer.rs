//! Line-oriented tokenizer for the Kconfig language.
//!
//! Kconfig is a line grammar: every statement fits on one logical line
//! once backslash continuations are joined, so the tokenizer hands the
//! parser a stream of token *lines* rather than a flat token soup. Help
//! blocks are layout-sensitive and are collected here, attached to their
//! `help` line as a string token. `$NAME`/`$(NAME)` environment
//! references are expanded during scanning; expansion is lexical and
//! single-pass.

use rustc_hash::FxHashMap;

/// Keywords of the Kconfig language, including the `rsource`/`gsource`
/// extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kw {
    AllNoConfigY,
    Bool,
    Choice,
    Comment,
    Config,
    DefBool,
    DefTristate,
    DefconfigList,
    Default,
    Depends,
    EndChoice,
    EndIf,
    EndMenu,
    Env,
    GSource,
    Help,
    Hex,
    If,
    Imply,
    Int,
    Mainmenu,
    Menu,
    MenuConfig,
    Modules,
    On,
    Option,
    Optional,
    Prompt,
    RSource,
    Range,
    Select,
    Source,
    StringType,
    Tristate,
    Visible,
}

impl Kw {
    fn from_word(word: &str) -> Option<Kw> {
        Some(match word {
            "allnoconfig_y" => Kw::AllNoConfigY,
            "bool" | "boolean" => Kw::Bool,
            "choice" => Kw::Choice,
            "comment" => Kw::Comment,
            "config" => Kw::Config,
            "def_bool" => Kw::DefBool,
            "def_tristate" => Kw::DefTristate,
            "defconfig_list" => Kw::DefconfigList,
            "default" => Kw::Default,
            "depends" => Kw::Depends,
            "endchoice" => Kw::EndChoice,
            "endif" => Kw::EndIf,
            "endmenu" => Kw::EndMenu,
            "env" => Kw::Env,
            "gsource" => Kw::GSource,
            "help" => Kw::Help,
            "hex" => Kw::Hex,
            "if" => Kw::If,
            "imply" => Kw::Imply,
            "int" => Kw::Int,
            "mainmenu" => Kw::Mainmenu,
            "menu" => Kw::Menu,
            "menuconfig" => Kw::MenuConfig,
            "modules" => Kw::Modules,
            "on" => Kw::On,
            "option" => Kw::Option,
            "optional" => Kw::Optional,
            "prompt" => Kw::Prompt,
            "range" => Kw::Range,
            "rsource" => Kw::RSource,
            "select" => Kw::Select,
            "source" => Kw::Source,
            "string" => Kw::StringType,
            "tristate" => Kw::Tristate,
            "visible" => Kw::Visible,
            _ => return None,
        })
    }

    /// The keyword's spelling. Keywords double as symbol names where the
    /// grammar leaves no ambiguity.
    pub fn as_str(self) -> &'static str {
        match self {
            Kw::AllNoConfigY => "allnoconfig_y",
            Kw::Bool => "bool",
            Kw::Choice => "choice",
            Kw::Comment => "comment",
            Kw::Config => "config",
            Kw::DefBool => "def_bool",
            Kw::DefTristate => "def_tristate",
            Kw::DefconfigList => "defconfig_list",
            Kw::Default => "default",
            Kw::Depends => "depends",
            Kw::EndChoice => "endchoice",
            Kw::EndIf => "endif",
            Kw::EndMenu => "endmenu",
            Kw::Env => "env",
            Kw::GSource => "gsource",
            Kw::Help => "help",
            Kw::Hex => "hex",
            Kw::If => "if",
            Kw::Imply => "imply",
            Kw::Int => "int",
            Kw::Mainmenu => "mainmenu",
            Kw::Menu => "menu",
            Kw::MenuConfig => "menuconfig",
            Kw::Modules => "modules",
            Kw::On => "on",
            Kw::Option => "option",
            Kw::Optional => "optional",
            Kw::Prompt => "prompt",
            Kw::RSource => "rsource",
            Kw::Range => "range",
            Kw::Select => "select",
            Kw::Source => "source",
            Kw::StringType => "string",
            Kw::Tristate => "tristate",
            Kw::Visible => "visible",
        }
    }
}

/// Operators and punctuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    AndAnd,
    OrOr,
    Not,
    NotEq,
    Eq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LParen,
    RParen,
}

/// Two-character operators listed first so longest-match wins.
const PUNCTS: [(&str, Punct); 11] = [
    ("&&", Punct::AndAnd),
    ("||", Punct::OrOr),
    ("!=", Punct::NotEq),
    ("<=", Punct::LtEq),
    (">=", Punct::GtEq),
    ("!", Punct::Not),
    ("=", Punct::Eq),
    ("<", Punct::Lt),
    (">", Punct::Gt),
    ("(", Punct::LParen),
    (")", Punct::RParen),
];

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Kw(Kw),
    /// Unquoted word: a symbol name or a number literal.
    Word(String),
    /// Quoted string, environment-expanded. Also carries a lexer-collected
    /// help block on a `help` line.
    Str(String),
    Punct(Punct),
}

/// One logical line of tokens with its 1-based line number. Blank and
/// comment-only lines never appear.
#[derive(Debug)]
pub struct TokenLine {
    pub tokens: Vec<Token>,
    pub line: u32,
}

/// A lexer reject: unterminated string or a stray character. Fatal to the
/// surrounding file load.
#[derive(Debug)]
pub struct LexError {
    pub line: u32,
    pub message: String,
}

/// Tokenize a whole file into logical lines.
pub fn tokenize(
    source: &str,
    env: &FxHashMap<String, String>,
) -> Result<Vec<TokenLine>, LexError> {
    let raw: Vec<&str> = source.lines().collect();
    let mut out = Vec::new();
    let mut i = 0;
    while i < raw.len() {
        let line = i as u32 + 1;

        // Join backslash continuations into one logical line.
        let mut logical = raw[i].to_string();
        i += 1;
        while logical.ends_with('\\') && i < raw.len() {
            logical.pop();
            logical.push_str(raw[i]);
            i += 1;
        }

        let mut tokens = scan_line(&logical, line, env)?;
        if tokens.is_empty() {
            continue;
        }
        // A `help` statement switches to layout mode: the indented block
        // that follows belongs to this line.
        if tokens[0] == Token::Kw(Kw::Help) {
            let (text, consumed) = collect_help(&raw[i..]);
            i += consumed;
            tokens = vec![Token::Kw(Kw::Help), Token::Str(text)];
        }
        out.push(TokenLine { tokens, line });
    }
    Ok(out)
}

/// Collect an indented help block. The first non-blank line fixes the
/// indent column; the block ends at the first line indented less (or at
/// column zero). The common indent is stripped, blank lines kept.
fn collect_help(lines: &[&str]) -> (String, usize) {
    let mut text = String::new();
    let mut indent = 0;
    let mut used = 0;
    for raw in lines {
        let body = raw.trim_start_matches([' ', '\t']);
        if body.is_empty() {
            text.push('\n');
            used += 1;
            continue;
        }
        let this_indent = raw.len() - body.len();
        if this_indent == 0 {
            break;
        }
        if indent == 0 {
            indent = this_indent;
        } else if this_indent < indent {
            break;
        }
        text.push_str(&raw[indent..]);
        text.push('\n');
        used += 1;
    }
    (
        text.trim_start_matches('\n').trim_end().to_string(),
        used,
    )
}

fn scan_line(
    text: &str,
    line: u32,
    env: &FxHashMap<String, String>,
) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let bytes = text.as_bytes();
    let mut pos = 0;
    while pos < bytes.len() {
        match bytes[pos] {
            b' ' | b'\t' | b'\r' => pos += 1,

            // Comment to end of line.
            b'#' => break,

            b'"' | b'\'' => {
                let (value, next) = scan_string(text, pos, line, env)?;
                tokens.push(Token::Str(value));
                pos = next;
            }

            // Top-level environment reference: the value becomes a single
            // word; unset or empty vanishes.
            b'$' => {
                let (name, next) = scan_env_name(text, pos + 1);
                if let Some(value) = env.get(&name) {
                    if !value.is_empty() {
                        tokens.push(Token::Word(value.clone()));
                    }
                }
                pos = next;
            }

            b'-' if text[pos..].starts_with("---help---") => {
                tokens.push(Token::Kw(Kw::Help));
                pos += "---help---".len();
            }

            // Negative number, e.g. `range -1 10`.
            b'-' if bytes.get(pos + 1).is_some_and(|b| b.is_ascii_digit()) => {
                let end = word_end(bytes, pos + 1);
                tokens.push(Token::Word(text[pos..end].to_string()));
                pos = end;
            }

            b => {
                if let Some((punct, len)) = match_punct(&text[pos..]) {
                    tokens.push(Token::Punct(punct));
                    pos += len;
                } else if is_word_byte(b) {
                    let end = word_end(bytes, pos);
                    let word = &text[pos..end];
                    tokens.push(match Kw::from_word(word) {
                        Some(kw) => Token::Kw(kw),
                        None => Token::Word(word.to_string()),
                    });
                    pos = end;
                } else {
                    let ch = text[pos..].chars().next().unwrap_or('?');
                    return Err(LexError {
                        line,
                        message: format!("unexpected character `{}`", ch),
                    });
                }
            }
        }
    }
    Ok(tokens)
}

fn match_punct(rest: &str) -> Option<(Punct, usize)> {
    PUNCTS
        .iter()
        .find(|(s, _)| rest.starts_with(s))
        .map(|(s, p)| (*p, s.len()))
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn word_end(bytes: &[u8], mut pos: usize) -> usize {
    while pos < bytes.len() && is_word_byte(bytes[pos]) {
        pos += 1;
    }
    pos
}

/// Scan a quoted string starting at `start`, expanding `$` references in
/// its value. Returns the value and the position after the closing quote.
fn scan_string(
    text: &str,
    start: usize,
    line: u32,
    env: &FxHashMap<String, String>,
) -> Result<(String, usize), LexError> {
    let quote = text[start..].chars().next().unwrap_or('"');
    let mut value = String::new();
    let mut iter = text[start + 1..].char_indices();
    while let Some((off, ch)) = iter.next() {
        if ch == quote {
            return Ok((expand_env(&value, env), start + 1 + off + ch.len_utf8()));
        }
        if ch == '\\' {
            match iter.next() {
                Some((_, esc)) => value.push(esc),
                None => break,
            }
        } else {
            value.push(ch);
        }
    }
    Err(LexError {
        line,
        message: "unterminated string".to_string(),
    })
}

/// `$NAME` or `$(NAME)`: the name and the position after it.
fn scan_env_name(text: &str, pos: usize) -> (String, usize) {
    let bytes = text.as_bytes();
    if bytes.get(pos) == Some(&b'(') {
        let start = pos + 1;
        let end = text[start..]
            .find(')')
            .map(|o| start + o)
            .unwrap_or(text.len());
        let after = if end < text.len() { end + 1 } else { end };
        (text[start..end].to_string(), after)
    } else {
        let end = word_end(bytes, pos);
        (text[pos..end].to_string(), end)
    }
}

/// Expand `$NAME` / `$(NAME)` inside a string value; unset expands empty.
fn expand_env(value: &str, env: &FxHashMap<String, String>) -> String {
    if !value.contains('$') {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(idx) = rest.find('$') {
        out.push_str(&rest[..idx]);
        rest = &rest[idx + 1..];
        if let Some(open) = rest.strip_prefix('(') {
            let end = open.find(')').unwrap_or(open.len());
            if let Some(v) = env.get(&open[..end]) {
                out.push_str(v);
            }
            rest = &open[(end + 1).min(open.len())..];
        } else {
            let end = rest
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(rest.len());
            if end == 0 {
                out.push('$'); // lone `$`
            } else if let Some(v) = env.get(&rest[..end]) {
                out.push_str(v);
            }
            rest = &rest[end..];
        }
    }
    out.push_str(rest);
    out
}
