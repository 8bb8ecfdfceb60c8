//! Configuration-file I/O: `.config` loading and writing, minimal
//! defconfig emission, `autoconf.h` generation and the incremental-build
//! `sync_deps` protocol.

use std::fs;
use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::KconfigError;
use crate::expr::Tristate;
use crate::menu::{MenuId, MenuItem};
use crate::model::Kconfig;
use crate::symbol::{SymbolId, SymbolType};

impl Kconfig {
    // -- .config loading ----------------------------------------------------

    /// Load user values from a `.config`-format file. With `replace`, all
    /// current user values are dropped first; otherwise the file is merged
    /// over them. Unknown or malformed lines warn and are skipped.
    pub fn load_config(
        &mut self,
        path: impl AsRef<Path>,
        replace: bool,
    ) -> Result<(), KconfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;

        let before: Vec<String> = self
            .unique_defined_syms()
            .iter()
            .map(|&id| self.str_value(id))
            .collect();

        if replace {
            self.reset_user_values();
        }

        let filename = path.display().to_string();
        for (lineno, raw_line) in content.lines().enumerate() {
            self.apply_config_line(&filename, lineno as u32 + 1, raw_line);
        }

        let changed = self
            .unique_defined_syms()
            .to_vec()
            .iter()
            .zip(&before)
            .any(|(&id, old)| self.str_value(id) != *old);
        if changed {
            self.config_changed.set(true);
        }
        Ok(())
    }

    /// Load the default configuration file: `$KCONFIG_CONFIG`, falling
    /// back to `.config`.
    pub fn load_config_default(&mut self) -> Result<(), KconfigError> {
        let path = self
            .env
            .get("KCONFIG_CONFIG")
            .cloned()
            .unwrap_or_else(|| ".config".to_string());
        self.load_config(path, true)
    }

    fn apply_config_line(&mut self, filename: &str, lineno: u32, raw_line: &str) {
        let line = raw_line.trim();
        if line.is_empty() {
            return;
        }

        // `# CONFIG_FOO is not set` records an explicit n.
        if let Some(rest) = line.strip_prefix("# ") {
            if let Some(stripped) = rest.strip_prefix(self.prefix.as_str()) {
                if let Some(name) = stripped.strip_suffix(" is not set") {
                    let name = name.to_string();
                    self.apply_not_set(filename, lineno, &name);
                    return;
                }
            }
            return;
        }
        if line.starts_with('#') {
            return;
        }

        let Some(stripped) = line.strip_prefix(self.prefix.as_str()) else {
            self.warn(format!("{}:{}: ignoring malformed line", filename, lineno));
            return;
        };
        let Some((name, value)) = stripped.split_once('=') else {
            self.warn(format!("{}:{}: ignoring malformed line", filename, lineno));
            return;
        };
        let name = name.to_string();
        let value = value.to_string();

        let Some(id) = self.lookup(&name) else {
            self.warn(format!(
                "{}:{}: unknown symbol {}{}",
                filename, lineno, self.prefix, name
            ));
            return;
        };

        match self.symbol(id).sym_type() {
            SymbolType::Bool | SymbolType::Tristate => match Tristate::from_str(&value) {
                Some(tri) => self.set_user_tri_raw(id, tri),
                None => self.warn(format!(
                    "{}:{}: invalid tristate \"{}\" for {}",
                    filename, lineno, value, name
                )),
            },
            SymbolType::String => match unquote(&value) {
                Some(unquoted) => self.set_user_str_raw(id, &unquoted),
                None => self.warn(format!(
                    "{}:{}: malformed string value for {}",
                    filename, lineno, name
                )),
            },
            SymbolType::Int | SymbolType::Hex => self.set_user_str_raw(id, &value),
            SymbolType::Unknown => self.warn(format!(
                "{}:{}: assignment to untyped symbol {}",
                filename, lineno, name
            )),
        }
    }

    fn apply_not_set(&mut self, filename: &str, lineno: u32, name: &str) {
        let Some(id) = self.lookup(name) else {
            self.warn(format!(
                "{}:{}: unknown symbol {}{}",
                filename, lineno, self.prefix, name
            ));
            return;
        };
        if self.symbol(id).sym_type().is_bool_or_tristate() {
            self.set_user_tri_raw(id, Tristate::N);
        } else {
            self.warn(format!(
                "{}:{}: \"is not set\" on non-bool/tristate symbol {}",
                filename, lineno, name
            ));
        }
    }

    // -- .config writing ----------------------------------------------------

    /// Write the current configuration in `.config` format.
    pub fn write_config(&self, path: impl AsRef<Path>) -> Result<(), KconfigError> {
        fs::write(path, self.config_text(None))?;
        Ok(())
    }

    /// Same, with a custom leading header comment.
    pub fn write_config_with_header(
        &self,
        path: impl AsRef<Path>,
        header: &str,
    ) -> Result<(), KconfigError> {
        fs::write(path, self.config_text(Some(header)))?;
        Ok(())
    }

    /// The `.config` contents as a string: menu-tree order, each symbol at
    /// most once, `#`-boxed headers for menus and comments whose
    /// dependencies hold.
    pub fn config_text(&self, header: Option<&str>) -> String {
        let mut out = match header {
            Some(h) => {
                let mut s = h.to_string();
                if !s.ends_with('\n') {
                    s.push('\n');
                }
                s
            }
            None => self.default_header(),
        };
        let mut written: FxHashSet<SymbolId> = FxHashSet::default();
        out.push_str(&self.chain_config_text(self.menu_node(self.top_node()).list(), &mut written));
        out
    }

    fn default_header(&self) -> String {
        format!(
            "#\n# Automatically generated file; DO NOT EDIT.\n# {}\n#\n",
            self.mainmenu_text()
        )
    }

    fn chain_config_text(
        &self,
        first: Option<MenuId>,
        written: &mut FxHashSet<SymbolId>,
    ) -> String {
        let mut out = String::new();
        let mut cur = first;
        while let Some(node_id) = cur {
            let node = self.menu_node(node_id);
            match node.item() {
                MenuItem::Symbol(sym_id) => {
                    if written.insert(sym_id) && self.write_flag(sym_id) {
                        out.push_str(&self.config_string(sym_id));
                    }
                    out.push_str(&self.chain_config_text(node.list(), written));
                }
                MenuItem::Choice(_) => {
                    out.push_str(&self.chain_config_text(node.list(), written));
                }
                MenuItem::Menu => {
                    let children = self.chain_config_text(node.list(), written);
                    if !children.is_empty() {
                        if self.expr_value(node.dep()) != Tristate::N {
                            if let Some(prompt) = node.prompt() {
                                out.push_str(&format!("\n#\n# {}\n#\n", prompt.text));
                            }
                        }
                        out.push_str(&children);
                    }
                }
                MenuItem::Comment => {
                    if self.expr_value(node.dep()) != Tristate::N {
                        if let Some(prompt) = node.prompt() {
                            out.push_str(&format!("\n#\n# {}\n#\n", prompt.text));
                        }
                    }
                }
            }
            cur = self.menu_node(node_id).next();
        }
        out
    }

    /// The symbol's `.config` line as it would be emitted right now;
    /// empty when it has no printable value.
    pub fn config_string(&self, id: SymbolId) -> String {
        let sym = self.symbol(id);
        let name = sym.name();
        match sym.sym_type() {
            SymbolType::Bool | SymbolType::Tristate => match self.tri_value(id) {
                Tristate::N => format!("# {}{} is not set\n", self.prefix, name),
                v => format!("{}{}={}\n", self.prefix, name, v),
            },
            SymbolType::String => {
                format!(
                    "{}{}=\"{}\"\n",
                    self.prefix,
                    name,
                    escape(&self.str_value(id))
                )
            }
            SymbolType::Int | SymbolType::Hex => {
                let v = self.str_value(id);
                if v.is_empty() {
                    String::new()
                } else {
                    format!("{}{}={}\n", self.prefix, name, v)
                }
            }
            SymbolType::Unknown => String::new(),
        }
    }

    // -- minimal config -----------------------------------------------------

    /// Write only the symbols whose value differs from what it would be
    /// with no user input at all (loadable as a defconfig).
    pub fn write_min_config(&mut self, path: impl AsRef<Path>) -> Result<(), KconfigError> {
        let text = self.min_config_text();
        fs::write(path, text)?;
        Ok(())
    }

    /// The minimal-config contents as a string.
    pub fn min_config_text(&mut self) -> String {
        let defaults = self.no_user_values();

        let mut out = self.default_header();
        for (pos, &id) in self.unique_defined_syms().to_vec().iter().enumerate() {
            if self.str_value(id) != defaults[pos] {
                if self.write_flag(id) {
                    out.push_str(&self.config_string(id));
                }
            }
        }
        out
    }

    /// Every defined symbol's value under an empty user configuration.
    /// Saves and restores the current user state around the computation.
    fn no_user_values(&mut self) -> Vec<String> {
        let saved_syms: Vec<(SymbolId, Option<Tristate>, Option<String>)> = self
            .unique_defined_syms()
            .iter()
            .map(|&id| {
                let sym = self.symbol(id);
                (id, sym.user_tri(), sym.user_str())
            })
            .collect();
        let saved_choices: Vec<(Option<Tristate>, Option<SymbolId>)> = self
            .choices()
            .map(|c| {
                let choice = self.choice(c);
                (choice.user_value(), choice.user_selection())
            })
            .collect();

        self.reset_user_values();
        let defaults: Vec<String> = self
            .unique_defined_syms()
            .iter()
            .map(|&id| self.str_value(id))
            .collect();

        for (id, tri, s) in saved_syms {
            let sym = self.symbol(id);
            sym.user_tri.set(tri);
            *sym.user_str.borrow_mut() = s;
        }
        for (c, (mode, sel)) in self.choices().zip(saved_choices.into_iter()).collect::<Vec<_>>() {
            let choice = self.choice(c);
            choice.user_value.set(mode);
            choice.user_selection.set(sel);
        }
        self.invalidate_all();
        defaults
    }

    // -- autoconf.h ---------------------------------------------------------

    /// Write the C header mirror of the configuration: `#define`s for
    /// every enabled symbol, `_MODULE` defines for `m`.
    pub fn write_autoconf(&self, path: impl AsRef<Path>) -> Result<(), KconfigError> {
        fs::write(path, self.autoconf_text())?;
        Ok(())
    }

    /// The `autoconf.h` contents as a string.
    pub fn autoconf_text(&self) -> String {
        let mut out = format!(
            "/*\n * Automatically generated file; DO NOT EDIT.\n * {}\n */\n",
            self.mainmenu_text()
        );
        for &id in self.unique_defined_syms() {
            if self.write_flag(id) {
                out.push_str(&self.define_lines(id));
            }
        }
        out
    }

    /// The `#define` form of one symbol; empty for `n` and valueless
    /// symbols.
    fn define_lines(&self, id: SymbolId) -> String {
        let sym = self.symbol(id);
        let name = sym.name();
        match sym.sym_type() {
            SymbolType::Bool | SymbolType::Tristate => match self.tri_value(id) {
                Tristate::N => String::new(),
                Tristate::M => format!("#define {}{}_MODULE 1\n", self.prefix, name),
                Tristate::Y => format!("#define {}{} 1\n", self.prefix, name),
            },
            SymbolType::String => format!(
                "#define {}{} \"{}\"\n",
                self.prefix,
                name,
                escape(&self.str_value(id))
            ),
            SymbolType::Int => {
                let v = self.str_value(id);
                if v.is_empty() {
                    String::new()
                } else {
                    format!("#define {}{} {}\n", self.prefix, name, v)
                }
            }
            SymbolType::Hex => {
                let v = self.str_value(id);
                if v.is_empty() {
                    String::new()
                } else if v.starts_with("0x") || v.starts_with("0X") {
                    format!("#define {}{} {}\n", self.prefix, name, v)
                } else {
                    format!("#define {}{} 0x{}\n", self.prefix, name, v)
                }
            }
            SymbolType::Unknown => String::new(),
        }
    }

    // -- sync_deps ----------------------------------------------------------

    /// Compare the configuration against the `auto.conf` snapshot in
    /// `dir`, rewrite the per-symbol header of every changed symbol
    /// (`FOO_BAR` lands in `dir/FOO/BAR.h`), leave unchanged headers
    /// untouched, then refresh the snapshot. Drives incremental rebuilds.
    pub fn sync_deps(&self, dir: impl AsRef<Path>) -> Result<(), KconfigError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let auto_conf = dir.join("auto.conf");
        let old = if auto_conf.is_file() {
            parse_snapshot(&fs::read_to_string(&auto_conf)?, &self.prefix)
        } else {
            FxHashMap::default()
        };

        let mut snapshot = String::new();
        for &id in self.unique_defined_syms() {
            let name = self.symbol(id).name().to_string();
            let cur_line = if self.write_flag(id) {
                let line = self.config_string(id);
                (!line.is_empty()).then(|| line.trim_end().to_string())
            } else {
                None
            };

            if cur_line.as_deref() != old.get(&name).map(String::as_str) {
                let header = dir.join(format!("{}.h", name.replace('_', "/")));
                if let Some(parent) = header.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&header, self.define_lines(id))?;
            }
            if let Some(line) = cur_line {
                snapshot.push_str(&line);
                snapshot.push('\n');
            }
        }

        fs::write(&auto_conf, snapshot)?;
        self.config_changed.set(false);
        Ok(())
    }

    // -- defconfig discovery ------------------------------------------------

    /// First existing file among the `defconfig_list` symbol's satisfied
    /// defaults, tried as given and under `srctree`.
    pub fn defconfig_filename(&self) -> Option<PathBuf> {
        let list = self.defconfig_list_symbol()?;
        let defaults = self.symbol(list).defaults().to_vec();
        for (value, cond) in defaults {
            if self.expr_value(&cond) == Tristate::N {
                continue;
            }
            let fname = self.expr_str_value(&value);
            let direct = PathBuf::from(&fname);
            if direct.is_file() {
                return Some(direct);
            }
            let in_tree = self.srctree().join(&fname);
            if in_tree.is_file() {
                return Some(in_tree);
            }
        }
        None
    }
}

/// Backslash-escape `"` and `\` for `.config` / autoconf string output.
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        if ch == '\\' || ch == '"' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Undo [`escape`] for a double-quoted `.config` value.
fn unquote(s: &str) -> Option<String> {
    let inner = s.strip_prefix('"')?.strip_suffix('"')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            out.push(chars.next()?);
        } else {
            out.push(ch);
        }
    }
    Some(out)
}

/// Previous `auto.conf` state: symbol name to its recorded line.
fn parse_snapshot(content: &str, prefix: &str) -> FxHashMap<String, String> {
    let mut map = FxHashMap::default();
    for raw_line in content.lines() {
        let line = raw_line.trim();
        if let Some(rest) = line.strip_prefix("# ") {
            if let Some(stripped) = rest.strip_prefix(prefix) {
                if let Some(name) = stripped.strip_suffix(" is not set") {
                    map.insert(name.to_string(), line.to_string());
                }
            }
            continue;
        }
        if let Some(stripped) = line.strip_prefix(prefix) {
            if let Some((name, _)) = stripped.split_once('=') {
                map.insert(name.to_string(), line.to_string());
            }
        }
    }
    map
}
