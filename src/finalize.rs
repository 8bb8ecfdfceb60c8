//! Post-parse menu finalization: dependency propagation, implicit
//! submenus, reverse-dependency accumulation, choice linkage and the
//! inverted dependency index driving cache invalidation.

use rustc_hash::FxHashSet;

use crate::expr::{self, Expr};
use crate::menu::{ChoiceId, MenuId, MenuItem, Prompt};
use crate::model::Kconfig;
use crate::symbol::{SymbolId, SymbolType};

pub(crate) fn finalize(kc: &mut Kconfig) {
    let y = kc.expr_y();
    propagate(kc, kc.top_node(), &y, &y);
    build_submenus(kc, kc.top_node());
    link_choices(kc);
    accumulate_rev_deps(kc);
    warn_undefined(kc);
    build_dep_index(kc);
}

/// Fold every ancestor's dependency into each node, rewrite prompt
/// conditions (including `visible if` from enclosing menus) and move the
/// per-node property lists onto their symbols/choices with effective
/// conditions.
fn propagate(kc: &mut Kconfig, node_id: MenuId, parent_dep: &Expr, visible_if: &Expr) {
    let idx = node_id.0 as usize;

    let dep = kc.make_and(kc.menus[idx].dep.clone(), parent_dep.clone());
    kc.menus[idx].dep = dep.clone();

    if node_id != kc.top_node() {
        if let Some(prompt) = kc.menus[idx].prompt.take() {
            let cond = kc.make_and(prompt.cond, dep.clone());
            let cond = kc.make_and(cond, visible_if.clone());
            kc.menus[idx].prompt = Some(Prompt {
                text: prompt.text,
                cond,
            });
        }
    }

    let defaults = std::mem::take(&mut kc.menus[idx].raw_defaults);
    let selects = std::mem::take(&mut kc.menus[idx].raw_selects);
    let implies = std::mem::take(&mut kc.menus[idx].raw_implies);
    let ranges = std::mem::take(&mut kc.menus[idx].raw_ranges);

    match kc.menus[idx].item {
        MenuItem::Symbol(sym_id) => {
            for (value, cond) in defaults {
                let cond = kc.make_and(cond, dep.clone());
                kc.symbol_mut(sym_id).defaults.push((value, cond));
            }
            for (target, cond) in selects {
                let cond = kc.make_and(cond, dep.clone());
                kc.symbol_mut(sym_id).selects.push((target, cond));
            }
            for (target, cond) in implies {
                let cond = kc.make_and(cond, dep.clone());
                kc.symbol_mut(sym_id).implies.push((target, cond));
            }
            for (low, high, cond) in ranges {
                let cond = kc.make_and(cond, dep.clone());
                kc.symbol_mut(sym_id).ranges.push((low, high, cond));
            }
            let direct = kc.make_or(kc.symbol(sym_id).direct_dep.clone(), dep.clone());
            kc.symbol_mut(sym_id).direct_dep = direct;
        }
        MenuItem::Choice(choice_id) => {
            for (value, cond) in defaults {
                let cond = kc.make_and(cond, dep.clone());
                match value {
                    Expr::Symbol(target) if !kc.symbol(target).is_constant() => {
                        kc.choice_mut(choice_id).defaults.push((target, cond));
                    }
                    _ => {
                        let (filename, linenr) = node_location(kc, node_id);
                        kc.warn(format!(
                            "{}:{}: choice default is not a symbol",
                            filename, linenr
                        ));
                    }
                }
            }
            let direct = kc.make_or(kc.choice(choice_id).direct_dep.clone(), dep.clone());
            kc.choice_mut(choice_id).direct_dep = direct;
        }
        MenuItem::Menu | MenuItem::Comment => {}
    }

    let child_visible_if = if kc.menus[idx].item == MenuItem::Menu {
        kc.make_and(visible_if.clone(), kc.menus[idx].visibility.clone())
    } else {
        visible_if.clone()
    };

    let mut cur = kc.menus[idx].list;
    while let Some(child) = cur {
        propagate(kc, child, &dep, &child_visible_if);
        cur = kc.menus[child.0 as usize].next;
    }
}

/// Re-parent sibling chains into implicit submenus: a run of siblings
/// gating on a preceding symbol node becomes that node's children.
fn build_submenus(kc: &mut Kconfig, parent: MenuId) {
    let y = kc.const_symbol(crate::expr::Tristate::Y);
    let m = kc.const_symbol(crate::expr::Tristate::M);
    let n = kc.const_symbol(crate::expr::Tristate::N);

    let mut cur = kc.menus[parent.0 as usize].list;
    while let Some(node_id) = cur {
        let idx = node_id.0 as usize;
        if let MenuItem::Symbol(sym_id) = kc.menus[idx].item {
            // Find the current end of the node's child list.
            let mut tail = kc.menus[idx].list;
            while let Some(t) = tail {
                match kc.menus[t.0 as usize].next {
                    Some(nx) => tail = Some(nx),
                    None => break,
                }
            }

            while let Some(next_id) = kc.menus[idx].next {
                let gates = expr::expr_gates_on(
                    &kc.menus[next_id.0 as usize].dep,
                    sym_id,
                    y,
                    m,
                    n,
                );
                if !gates {
                    break;
                }
                kc.menus[idx].next = kc.menus[next_id.0 as usize].next;
                kc.menus[next_id.0 as usize].next = None;
                kc.menus[next_id.0 as usize].parent = Some(node_id);
                match tail {
                    Some(t) => kc.menus[t.0 as usize].next = Some(next_id),
                    None => kc.menus[idx].list = Some(next_id),
                }
                tail = Some(next_id);
            }
        }
        build_submenus(kc, node_id);
        cur = kc.menus[node_id.0 as usize].next;
    }
}

/// Collect choice members by walking each choice node's subtree, back-link
/// them, and settle member/choice typing.
fn link_choices(kc: &mut Kconfig) {
    for choice_idx in 0..kc.choice_arena.len() {
        let choice_id = ChoiceId(choice_idx as u32);
        let mut members: Vec<SymbolId> = Vec::new();
        let mut seen: FxHashSet<SymbolId> = FxHashSet::default();

        for node_pos in 0..kc.choice(choice_id).nodes.len() {
            let node_id = kc.choice(choice_id).nodes[node_pos];
            collect_members(kc, kc.menus[node_id.0 as usize].list, &mut members, &mut seen);
        }

        if kc.choice(choice_id).typ == SymbolType::Unknown {
            let inferred = members
                .iter()
                .map(|&s| kc.symbol(s).sym_type())
                .find(|t| t.is_bool_or_tristate())
                .unwrap_or(SymbolType::Bool);
            kc.choice_mut(choice_id).typ = inferred;
        }
        let choice_type = kc.choice(choice_id).typ;

        members.retain(|&sym_id| {
            let typ = kc.symbol(sym_id).sym_type();
            if typ == SymbolType::Unknown {
                kc.symbol_mut(sym_id).typ = choice_type;
            } else if !typ.is_bool_or_tristate() {
                let name = kc.symbol(sym_id).name().to_string();
                kc.warn(format!(
                    "choice member {} has non-bool/tristate type {}",
                    name,
                    typ.as_str()
                ));
                return false;
            }
            kc.symbol_mut(sym_id).choice = Some(choice_id);
            true
        });

        kc.choice_mut(choice_id).syms = members;
    }
}

fn collect_members(
    kc: &Kconfig,
    first: Option<MenuId>,
    members: &mut Vec<SymbolId>,
    seen: &mut FxHashSet<SymbolId>,
) {
    let mut cur = first;
    while let Some(node_id) = cur {
        let node = kc.menu_node(node_id);
        if let MenuItem::Symbol(sym_id) = node.item() {
            if seen.insert(sym_id) {
                members.push(sym_id);
            }
        }
        collect_members(kc, node.list(), members, seen);
        cur = node.next();
    }
}

/// OR every `select`/`imply` into the target's reverse dependencies.
/// Immutable from here on.
fn accumulate_rev_deps(kc: &mut Kconfig) {
    for sym_idx in 0..kc.syms.len() {
        let sym_id = SymbolId(sym_idx as u32);
        let selects = kc.symbol(sym_id).selects.clone();
        let implies = kc.symbol(sym_id).implies.clone();

        for (target, cond) in selects {
            if !rev_dep_target_ok(kc, target) {
                let name = kc.symbol(target).name().to_string();
                kc.warn(format!("select of non-bool/tristate symbol {}", name));
                continue;
            }
            let contribution = kc.make_and(Expr::Symbol(sym_id), cond);
            let rev = kc.make_or(kc.symbol(target).rev_dep.clone(), contribution);
            kc.symbol_mut(target).rev_dep = rev;
        }
        for (target, cond) in implies {
            if !rev_dep_target_ok(kc, target) {
                let name = kc.symbol(target).name().to_string();
                kc.warn(format!("imply of non-bool/tristate symbol {}", name));
                continue;
            }
            let contribution = kc.make_and(Expr::Symbol(sym_id), cond);
            let weak = kc.make_or(kc.symbol(target).weak_rev_dep.clone(), contribution);
            kc.symbol_mut(target).weak_rev_dep = weak;
        }
    }
}

fn rev_dep_target_ok(kc: &Kconfig, target: SymbolId) -> bool {
    let sym = kc.symbol(target);
    sym.sym_type().is_bool_or_tristate() || sym.sym_type() == SymbolType::Unknown
}

fn warn_undefined(kc: &mut Kconfig) {
    let undefined: Vec<String> = kc
        .named
        .iter()
        .filter(|&(_, &id)| kc.symbol(id).nodes().is_empty())
        .map(|(name, _)| name.clone())
        .collect();
    for name in undefined {
        kc.warn(format!("undefined symbol {}", name));
    }
}

/// Build the inverted dependency index: for every symbol, the symbols and
/// choices whose computed values mention it.
fn build_dep_index(kc: &mut Kconfig) {
    let mut rdeps: Vec<Vec<SymbolId>> = vec![Vec::new(); kc.syms.len()];
    let mut choice_rdeps: Vec<Vec<ChoiceId>> = vec![Vec::new(); kc.syms.len()];

    for sym_idx in 0..kc.syms.len() {
        let sym_id = SymbolId(sym_idx as u32);
        let mut refs: Vec<SymbolId> = Vec::new();
        {
            let sym = kc.symbol(sym_id);
            sym.direct_dep.collect_symbols(&mut refs);
            sym.rev_dep.collect_symbols(&mut refs);
            sym.weak_rev_dep.collect_symbols(&mut refs);
            for (value, cond) in sym.defaults() {
                value.collect_symbols(&mut refs);
                cond.collect_symbols(&mut refs);
            }
            for (low, high, cond) in sym.ranges() {
                low.collect_symbols(&mut refs);
                high.collect_symbols(&mut refs);
                cond.collect_symbols(&mut refs);
            }
            for &node_id in sym.nodes() {
                if let Some(prompt) = kc.menu_node(node_id).prompt() {
                    prompt.cond.collect_symbols(&mut refs);
                }
            }
        }
        let refs: FxHashSet<SymbolId> = refs.into_iter().collect();
        for r in refs {
            if r != sym_id {
                rdeps[r.0 as usize].push(sym_id);
            }
        }
    }

    for choice_idx in 0..kc.choice_arena.len() {
        let choice_id = ChoiceId(choice_idx as u32);
        let mut refs: Vec<SymbolId> = Vec::new();
        {
            let choice = kc.choice(choice_id);
            choice.direct_dep.collect_symbols(&mut refs);
            for (_, cond) in choice.defaults() {
                cond.collect_symbols(&mut refs);
            }
            for &node_id in choice.nodes() {
                if let Some(prompt) = kc.menu_node(node_id).prompt() {
                    prompt.cond.collect_symbols(&mut refs);
                }
            }
            // Member values feed the selection, so a member change must
            // re-evaluate the choice too.
            refs.extend(choice.syms().iter().copied());
        }
        let refs: FxHashSet<SymbolId> = refs.into_iter().collect();
        for r in refs {
            choice_rdeps[r.0 as usize].push(choice_id);
        }
    }

    kc.rdeps = rdeps;
    kc.choice_rdeps = choice_rdeps;
}

fn node_location(kc: &Kconfig, node_id: MenuId) -> (String, u32) {
    let node = kc.menu_node(node_id);
    (node.filename().to_string(), node.linenr())
}
