//! The value engine: lazy tristate/string evaluation with dirty-flag
//! caches and an invalidation cascade over the inverted dependency index.

use std::collections::VecDeque;

use rustc_hash::FxHashSet;

use crate::expr::{Expr, Tristate};
use crate::menu::ChoiceId;
use crate::model::Kconfig;
use crate::symbol::{SymbolId, SymbolType};

impl Kconfig {
    // -- symbol values ------------------------------------------------------

    /// Current tristate value. `n` for string/int/hex and undefined
    /// symbols.
    pub fn tri_value(&self, id: SymbolId) -> Tristate {
        let sym = self.symbol(id);
        if let Some(v) = sym.cached_tri.get() {
            return v;
        }
        if sym.evaluating.get() {
            self.warn(format!("dependency loop involving {}", sym.name()));
            return Tristate::N;
        }
        sym.evaluating.set(true);
        let v = self.calc_tri(id);
        let sym = self.symbol(id);
        sym.evaluating.set(false);
        sym.cached_tri.set(Some(v));
        v
    }

    fn calc_tri(&self, id: SymbolId) -> Tristate {
        let sym = self.symbol(id);
        if sym.is_constant() {
            return match sym.name() {
                "y" => Tristate::Y,
                "m" => Tristate::M,
                _ => Tristate::N,
            };
        }
        if !sym.sym_type().is_bool_or_tristate() {
            return Tristate::N;
        }

        if let Some(choice_id) = sym.choice() {
            return self.choice_member_value(id, choice_id);
        }

        let vis = self.visibility(id);
        let mut write = vis != Tristate::N;
        let mut val = Tristate::N;

        match sym.user_tri() {
            Some(user) if vis != Tristate::N => {
                // User value clamped to the visible ceiling.
                val = user.and(vis);
            }
            _ => {
                for (value, cond) in sym.defaults() {
                    let cond_val = self.expr_value(cond);
                    if cond_val != Tristate::N {
                        write = true;
                        val = self.expr_value(value).and(cond_val);
                        break;
                    }
                }
            }
        }

        // `select` forces the value up, visible or not.
        let rev = self.expr_value(sym.rev_dep());
        if rev != Tristate::N {
            write = true;
            if self.expr_value(sym.direct_dep()) == Tristate::N {
                self.warn(format!(
                    "{} is selected but its direct dependencies are not met",
                    sym.name()
                ));
            }
            val = val.or(rev);
        }

        // `imply` promotes only a symbol that is already enabled, was not
        // pinned to n by the user, and has its direct dependencies met.
        if val != Tristate::N
            && sym.user_tri() != Some(Tristate::N)
            && self.expr_value(sym.direct_dep()) != Tristate::N
        {
            val = val.or(self.expr_value(sym.weak_rev_dep()));
        }

        if val == Tristate::M && (sym.sym_type() == SymbolType::Bool || !self.modules_enabled()) {
            val = Tristate::Y;
        }

        sym.write_to_conf.set(write);
        val
    }

    fn choice_member_value(&self, id: SymbolId, choice_id: ChoiceId) -> Tristate {
        let mode = self.choice_mode(choice_id);
        let vis = self.visibility(id);
        let selected = mode == Tristate::Y && self.choice_selection(choice_id) == Some(id);

        let val = match mode {
            Tristate::N => Tristate::N,
            Tristate::Y => {
                if selected {
                    Tristate::Y
                } else {
                    Tristate::N
                }
            }
            Tristate::M => {
                if vis != Tristate::N
                    && self.symbol(id).user_tri().is_some_and(|u| u != Tristate::N)
                {
                    Tristate::M
                } else {
                    Tristate::N
                }
            }
        };

        self.symbol(id)
            .write_to_conf
            .set(vis != Tristate::N || selected);
        val
    }

    /// OR of the symbol's prompt conditions; the ceiling a user value is
    /// clamped to. Choice members are additionally capped by the choice
    /// mode.
    pub fn visibility(&self, id: SymbolId) -> Tristate {
        let sym = self.symbol(id);
        if let Some(v) = sym.cached_vis.get() {
            return v;
        }
        if sym.is_constant() {
            return Tristate::N;
        }

        let mut vis = Tristate::N;
        for &node_id in sym.nodes() {
            if let Some(prompt) = self.menu_node(node_id).prompt() {
                vis = vis.or(self.expr_value(&prompt.cond));
            }
        }
        if let Some(choice_id) = sym.choice() {
            vis = vis.and(self.choice_mode(choice_id));
        }
        if vis == Tristate::M && (sym.sym_type() == SymbolType::Bool || !self.modules_enabled()) {
            vis = Tristate::Y;
        }

        self.symbol(id).cached_vis.set(Some(vis));
        vis
    }

    /// Current value in string form: `n`/`m`/`y` for bool/tristate, the
    /// validated user value or first satisfied default for string/int/hex
    /// (range-clamped), the name itself for constants.
    pub fn str_value(&self, id: SymbolId) -> String {
        let sym = self.symbol(id);
        if sym.is_constant() {
            return sym.name().to_string();
        }
        match sym.sym_type() {
            SymbolType::Bool | SymbolType::Tristate => self.tri_value(id).as_str().to_string(),
            SymbolType::Unknown => {
                sym.write_to_conf.set(false);
                String::new()
            }
            SymbolType::String | SymbolType::Int | SymbolType::Hex => {
                if let Some(cached) = sym.cached_str.borrow().clone() {
                    return cached;
                }
                let v = self.calc_str(id);
                self.symbol(id).cached_str.borrow_mut().replace(v.clone());
                v
            }
        }
    }

    fn calc_str(&self, id: SymbolId) -> String {
        let sym = self.symbol(id);
        let typ = sym.sym_type();
        let vis = self.visibility(id);
        let mut write = vis != Tristate::N;
        let mut val: Option<String> = None;

        if vis != Tristate::N {
            if let Some(user) = sym.user_str() {
                if valid_format(typ, &user) {
                    val = Some(user);
                } else {
                    self.warn(format!(
                        "malformed {} value \"{}\" for {}",
                        typ.as_str(),
                        user,
                        sym.name()
                    ));
                }
            }
        }
        if val.is_none() {
            for (value, cond) in sym.defaults() {
                if self.expr_value(cond) != Tristate::N {
                    write = true;
                    val = Some(self.expr_str_value(value));
                    break;
                }
            }
        }

        let mut out = val.unwrap_or_default();
        if !out.is_empty() && matches!(typ, SymbolType::Int | SymbolType::Hex) {
            out = self.clamp_to_range(id, out);
        }
        if out.is_empty() && matches!(typ, SymbolType::Int | SymbolType::Hex) {
            write = false;
        }
        self.symbol(id).write_to_conf.set(write);
        out
    }

    /// String form of a default/range operand: symbols contribute their
    /// value, composite expressions their tristate.
    pub(crate) fn expr_str_value(&self, e: &Expr) -> String {
        match e {
            Expr::Symbol(id) => self.str_value(*id),
            _ => self.expr_value(e).as_str().to_string(),
        }
    }

    /// The first range whose condition holds, as (low, high) strings.
    pub fn active_range(&self, id: SymbolId) -> Option<(String, String)> {
        let sym = self.symbol(id);
        for (low, high, cond) in sym.ranges() {
            if self.expr_value(cond) != Tristate::N {
                return Some((self.expr_str_value(low), self.expr_str_value(high)));
            }
        }
        None
    }

    fn clamp_to_range(&self, id: SymbolId, value: String) -> String {
        let Some((low, high)) = self.active_range(id) else {
            return value;
        };
        let typ = self.symbol(id).sym_type();
        let parse = |s: &str| -> Option<i64> {
            if typ == SymbolType::Hex {
                let t = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
                i64::from_str_radix(t, 16).ok()
            } else {
                s.parse().ok()
            }
        };
        let (Some(v), Some(lo), Some(hi)) = (parse(&value), parse(&low), parse(&high)) else {
            return value;
        };
        if v < lo {
            self.warn(format!(
                "value {} for {} is below range [{}, {}]",
                value,
                self.symbol(id).name(),
                low,
                high
            ));
            low
        } else if v > hi {
            self.warn(format!(
                "value {} for {} is above range [{}, {}]",
                value,
                self.symbol(id).name(),
                low,
                high
            ));
            high
        } else {
            value
        }
    }

    /// The tristates the user could currently assign. Empty for invisible
    /// or non-bool/tristate symbols; `select` narrows it from below.
    pub fn assignable(&self, id: SymbolId) -> Vec<Tristate> {
        let sym = self.symbol(id);
        if !sym.sym_type().is_bool_or_tristate() {
            return Vec::new();
        }
        let vis = self.visibility(id);
        if vis == Tristate::N {
            return Vec::new();
        }

        if let Some(choice_id) = sym.choice() {
            return match self.choice_mode(choice_id) {
                Tristate::N => Vec::new(),
                Tristate::M => vec![Tristate::N, Tristate::M],
                Tristate::Y => {
                    if self.choice_selection(choice_id) == Some(id) {
                        vec![Tristate::Y]
                    } else {
                        vec![Tristate::N, Tristate::Y]
                    }
                }
            };
        }

        let mut rev = self.expr_value(sym.rev_dep());
        if rev == Tristate::M && (sym.sym_type() == SymbolType::Bool || !self.modules_enabled()) {
            rev = Tristate::Y;
        }
        let tristate = sym.sym_type() == SymbolType::Tristate && self.modules_enabled();

        match (vis, rev) {
            (Tristate::Y, Tristate::N) => {
                if tristate {
                    vec![Tristate::N, Tristate::M, Tristate::Y]
                } else {
                    vec![Tristate::N, Tristate::Y]
                }
            }
            (Tristate::Y, Tristate::M) => vec![Tristate::M, Tristate::Y],
            (Tristate::M, Tristate::N) => vec![Tristate::N, Tristate::M],
            (Tristate::M, Tristate::M) => vec![Tristate::M],
            (_, Tristate::Y) | (Tristate::N, _) => vec![Tristate::Y],
        }
    }

    // -- choices ------------------------------------------------------------

    /// OR of the choice's prompt conditions.
    pub fn choice_visibility(&self, id: ChoiceId) -> Tristate {
        let choice = self.choice(id);
        if let Some(v) = choice.cached_vis.get() {
            return v;
        }
        let mut vis = Tristate::N;
        for &node_id in choice.nodes() {
            if let Some(prompt) = self.menu_node(node_id).prompt() {
                vis = vis.or(self.expr_value(&prompt.cond));
            }
        }
        if vis == Tristate::M
            && (choice.sym_type() == SymbolType::Bool || !self.modules_enabled())
        {
            vis = Tristate::Y;
        }
        self.choice(id).cached_vis.set(Some(vis));
        vis
    }

    /// The choice mode: `y` (exactly one member), `m` (members
    /// individually n/m), or `n` (optional choices only).
    pub fn choice_mode(&self, id: ChoiceId) -> Tristate {
        let choice = self.choice(id);
        if let Some(v) = choice.cached_mode.get() {
            return v;
        }
        let vis = self.choice_visibility(id);
        let mut mode = match choice.user_value() {
            Some(user) => user.and(vis),
            None => vis,
        };
        if !choice.is_optional() && mode == Tristate::N && vis != Tristate::N {
            mode = vis;
        }
        if mode == Tristate::M
            && (choice.sym_type() == SymbolType::Bool || !self.modules_enabled())
        {
            mode = Tristate::Y;
        }
        self.choice(id).cached_mode.set(Some(mode));
        mode
    }

    /// The selected member in mode `y`: the user's pick when visible, else
    /// the first satisfied default, else the first visible member.
    pub fn choice_selection(&self, id: ChoiceId) -> Option<SymbolId> {
        let choice = self.choice(id);
        if let Some(sel) = choice.cached_selection.get() {
            return sel;
        }
        let sel = self.calc_selection(id);
        self.choice(id).cached_selection.set(Some(sel));
        sel
    }

    fn calc_selection(&self, id: ChoiceId) -> Option<SymbolId> {
        if self.choice_mode(id) != Tristate::Y {
            return None;
        }
        let choice = self.choice(id);
        if let Some(user) = choice.user_selection() {
            if self.member_visible(user) {
                return Some(user);
            }
        }
        for (sym, cond) in choice.defaults() {
            if self.expr_value(cond) != Tristate::N && self.member_visible(*sym) {
                return Some(*sym);
            }
        }
        choice.syms().iter().copied().find(|&s| self.member_visible(s))
    }

    /// Member visibility without the mode cap: whether the member could be
    /// offered at all while the choice is deciding its selection.
    fn member_visible(&self, id: SymbolId) -> bool {
        let sym = self.symbol(id);
        for &node_id in sym.nodes() {
            if let Some(prompt) = self.menu_node(node_id).prompt() {
                if self.expr_value(&prompt.cond) != Tristate::N {
                    return true;
                }
            }
        }
        false
    }

    /// Modes the user can currently put the choice into.
    pub fn choice_assignable(&self, id: ChoiceId) -> Vec<Tristate> {
        let choice = self.choice(id);
        let vis = self.choice_visibility(id);
        if vis == Tristate::N {
            return Vec::new();
        }
        let tristate = choice.sym_type() == SymbolType::Tristate && self.modules_enabled();
        if vis == Tristate::Y {
            match (choice.is_optional(), tristate) {
                (true, true) => vec![Tristate::N, Tristate::M, Tristate::Y],
                (true, false) => vec![Tristate::N, Tristate::Y],
                (false, true) => vec![Tristate::M, Tristate::Y],
                (false, false) => vec![Tristate::Y],
            }
        } else if choice.is_optional() {
            vec![Tristate::N, Tristate::M]
        } else {
            vec![Tristate::M]
        }
    }

    // -- mutation -----------------------------------------------------------

    /// Assign a tristate. Returns `false` (with a warning) when the value
    /// has the wrong type or is outside the assignable set; never panics.
    pub fn set_value(&mut self, id: SymbolId, value: Tristate) -> bool {
        let sym = self.symbol(id);
        if sym.is_constant() || !sym.sym_type().is_bool_or_tristate() {
            let name = sym.name().to_string();
            self.warn(format!("cannot assign a tristate to symbol {}", name));
            return false;
        }
        let mut value = value;
        if sym.sym_type() == SymbolType::Bool && value == Tristate::M {
            let name = sym.name().to_string();
            self.warn(format!("assigned m to bool symbol {}, clamping to y", name));
            value = Tristate::Y;
        }

        if let Some(choice_id) = self.symbol(id).choice() {
            if value == Tristate::Y {
                return self.select_choice_member(choice_id, id);
            }
        }

        if !self.assignable(id).contains(&value) {
            let name = self.symbol(id).name().to_string();
            self.warn(format!("the value {} is not assignable to {}", value, name));
            return false;
        }
        self.symbol(id).user_tri.set(Some(value));
        self.invalidate_from(id);
        true
    }

    /// Assign from a string, for any symbol type. Bool/tristate accept
    /// `n`/`m`/`y`; int/hex validate the number format.
    pub fn set_str_value(&mut self, id: SymbolId, value: &str) -> bool {
        let sym = self.symbol(id);
        match sym.sym_type() {
            SymbolType::Bool | SymbolType::Tristate => match Tristate::from_str(value) {
                Some(tri) => self.set_value(id, tri),
                None => {
                    let name = sym.name().to_string();
                    self.warn(format!("invalid tristate \"{}\" for {}", value, name));
                    false
                }
            },
            SymbolType::String | SymbolType::Int | SymbolType::Hex => {
                if !valid_format(sym.sym_type(), value) {
                    let name = sym.name().to_string();
                    let typ = sym.sym_type().as_str();
                    self.warn(format!("malformed {} value \"{}\" for {}", typ, value, name));
                    return false;
                }
                self.symbol(id)
                    .user_str
                    .borrow_mut()
                    .replace(value.to_string());
                self.invalidate_from(id);
                true
            }
            SymbolType::Unknown => {
                let name = sym.name().to_string();
                self.warn(format!("cannot assign to untyped symbol {}", name));
                false
            }
        }
    }

    /// Drop the user value, reverting to defaults/selects.
    pub fn unset_value(&mut self, id: SymbolId) {
        let sym = self.symbol(id);
        if sym.has_user_value() {
            sym.clear_user_value();
            self.invalidate_from(id);
        }
    }

    /// Put the choice into the given mode. Returns `false` (with a
    /// warning) when the mode is not assignable.
    pub fn set_choice_mode(&mut self, id: ChoiceId, mode: Tristate) -> bool {
        if !self.choice_assignable(id).contains(&mode) {
            self.warn(format!("choice mode {} is not assignable", mode));
            return false;
        }
        self.choice(id).user_value.set(Some(mode));
        self.invalidate_choice(id);
        true
    }

    fn select_choice_member(&mut self, choice_id: ChoiceId, member: SymbolId) -> bool {
        if !self.member_visible(member) {
            let name = self.symbol(member).name().to_string();
            self.warn(format!("choice member {} is not visible", name));
            return false;
        }
        let choice = self.choice(choice_id);
        choice.user_value.set(Some(Tristate::Y));
        choice.user_selection.set(Some(member));
        self.symbol(member).user_tri.set(Some(Tristate::Y));
        self.invalidate_choice(choice_id);
        true
    }

    /// Drive every assignable symbol toward n, the way `make allnoconfig`
    /// does: `allnoconfig_y` symbols go to y instead, optional choices are
    /// switched off. Single pass over the defined symbols.
    pub fn apply_allnoconfig(&mut self) {
        for id in self.unique_defined_syms().to_vec() {
            let sym = self.symbol(id);
            if !sym.sym_type().is_bool_or_tristate() || sym.choice().is_some() {
                continue;
            }
            let target = if sym.is_allnoconfig_y() {
                Tristate::Y
            } else {
                Tristate::N
            };
            if self.assignable(id).contains(&target) {
                self.set_value(id, target);
            }
        }
        for choice_id in self.choices().collect::<Vec<_>>() {
            if self.choice(choice_id).is_optional()
                && self.choice_assignable(choice_id).contains(&Tristate::N)
            {
                self.set_choice_mode(choice_id, Tristate::N);
            }
        }
    }

    // -- load-path setters (no assignability gate) --------------------------

    /// Store a user tristate as read from a `.config`, clamping bools and
    /// routing choice selections, without the assignable check: the value
    /// engine re-clamps against visibility on evaluation.
    pub(crate) fn set_user_tri_raw(&mut self, id: SymbolId, value: Tristate) {
        let sym = self.symbol(id);
        let mut value = value;
        if sym.sym_type() == SymbolType::Bool && value == Tristate::M {
            let name = sym.name().to_string();
            self.warn(format!("assigned m to bool symbol {}, clamping to y", name));
            value = Tristate::Y;
        }
        if let Some(choice_id) = self.symbol(id).choice() {
            if value == Tristate::Y {
                let choice = self.choice(choice_id);
                choice.user_value.set(Some(Tristate::Y));
                choice.user_selection.set(Some(id));
            }
        }
        self.symbol(id).user_tri.set(Some(value));
        self.invalidate_from(id);
        if let Some(choice_id) = self.symbol(id).choice() {
            self.invalidate_choice(choice_id);
        }
    }

    pub(crate) fn set_user_str_raw(&mut self, id: SymbolId, value: &str) {
        self.symbol(id)
            .user_str
            .borrow_mut()
            .replace(value.to_string());
        self.invalidate_from(id);
    }

    /// Clear every user value (symbols and choices) and all caches.
    pub(crate) fn reset_user_values(&mut self) {
        for sym in &self.syms {
            sym.clear_user_value();
        }
        for choice in &self.choice_arena {
            choice.clear_user_value();
        }
        self.invalidate_all();
    }

    // -- invalidation -------------------------------------------------------

    /// BFS over the inverted dependency index, clearing value caches of
    /// everything that can observe a change to `start`.
    pub(crate) fn invalidate_from(&self, start: SymbolId) {
        // Toggling the modules symbol changes what `m` means everywhere.
        if Some(start) == self.modules {
            self.invalidate_all();
            return;
        }

        let mut queue: VecDeque<SymbolId> = VecDeque::new();
        let mut seen: FxHashSet<SymbolId> = FxHashSet::default();
        queue.push_back(start);
        seen.insert(start);

        while let Some(id) = queue.pop_front() {
            self.symbol(id).clear_cache();

            for &choice_id in &self.choice_rdeps[id.0 as usize] {
                self.choice(choice_id).clear_cache();
                for &member in self.choice(choice_id).syms() {
                    if seen.insert(member) {
                        queue.push_back(member);
                    }
                }
            }
            for &dep in &self.rdeps[id.0 as usize] {
                if seen.insert(dep) {
                    queue.push_back(dep);
                }
            }
        }
    }

    pub(crate) fn invalidate_choice(&self, id: ChoiceId) {
        self.choice(id).clear_cache();
        let members: Vec<SymbolId> = self.choice(id).syms().to_vec();
        for member in members {
            self.invalidate_from(member);
        }
    }

    pub(crate) fn invalidate_all(&self) {
        for sym in &self.syms {
            sym.clear_cache();
        }
        for choice in &self.choice_arena {
            choice.clear_cache();
        }
    }

    /// Whether the symbol belongs in an emitted `.config` under the
    /// current configuration (forces evaluation).
    pub(crate) fn write_flag(&self, id: SymbolId) -> bool {
        let sym = self.symbol(id);
        match sym.sym_type() {
            SymbolType::Bool | SymbolType::Tristate => {
                self.tri_value(id);
            }
            _ => {
                self.str_value(id);
            }
        }
        self.symbol(id).write_to_conf.get()
    }
}

fn valid_format(typ: SymbolType, value: &str) -> bool {
    match typ {
        SymbolType::Int => {
            let digits = value.strip_prefix('-').unwrap_or(value);
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
        }
        SymbolType::Hex => {
            let digits = value
                .strip_prefix("0x")
                .or_else(|| value.strip_prefix("0X"))
                .unwrap_or(value);
            !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_hexdigit())
        }
        _ => true,
    }
}
