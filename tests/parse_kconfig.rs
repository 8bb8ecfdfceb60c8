use kconfig_core::lexer::{self, Kw, Token};
use kconfig_core::{Kconfig, KconfigError, MenuItem, SymbolType, Tristate};

use std::fs;

const SAMPLE_KCONFIG: &str = r#"
mainmenu "Sample Configuration"

config AUDIT
	bool "Auditing support"
	depends on NET
	default y
	help
	  Enable auditing infrastructure that can be used with another
	  kernel subsystem, such as SELinux.

menuconfig MODULES
	bool "Enable loadable module support"
	option modules
	help
	  Kernel modules are small pieces of compiled code which can
	  be inserted in the running kernel.

config MODVERSIONS
	bool "Module versioning support"
	depends on MODULES
	help
	  Usually, modules have to be recompiled whenever you switch
	  to a new kernel.

menu "General setup"
	depends on !UML

config SYSVIPC
	bool "System V IPC"
	help
	  Inter Process Communication is a suite of library functions.

choice
	prompt "Compiler optimization level"
	default CC_OPTIMIZE_FOR_PERFORMANCE

config CC_OPTIMIZE_FOR_PERFORMANCE
	bool "Optimize for performance (-O2)"

config CC_OPTIMIZE_FOR_SIZE
	bool "Optimize for size (-Os)"

endchoice

if EXPERT

config CHECKPOINT_RESTORE
	bool "Checkpoint/restore support"
	select PROC_CHILDREN
	default n

endif

config SYSCTL
	bool "Sysctl support" if EXPERT
	depends on PROC_FS
	select PROC_SYSCTL
	imply SYSCTL_EXCEPTION_TRACE
	default y
	help
	  The sysctl interface.

config FOO_RANGE
	int "Foo value"
	range 1 100
	default 50

config HAS_FEATURE
	def_bool y

config OPTIONAL_FEATURE
	def_tristate m if MODULES

endmenu
"#;

fn parse_sample() -> Kconfig {
    Kconfig::builder()
        .warn_to_stderr(false)
        .parse(SAMPLE_KCONFIG)
        .expect("sample should parse")
}

#[test]
fn lexer_produces_token_lines_with_keywords() {
    let env = rustc_hash::FxHashMap::default();
    let lines = lexer::tokenize(SAMPLE_KCONFIG, &env).unwrap();
    // Blank and comment-only lines never show up.
    assert!(lines.len() > 30);
    assert!(lines.iter().all(|l| !l.tokens.is_empty()));

    let kws: Vec<Kw> = lines
        .iter()
        .flat_map(|l| l.tokens.iter())
        .filter_map(|t| match t {
            Token::Kw(kw) => Some(*kw),
            _ => None,
        })
        .collect();
    for kw in [
        Kw::Config,
        Kw::MenuConfig,
        Kw::Menu,
        Kw::EndMenu,
        Kw::Choice,
        Kw::EndChoice,
        Kw::If,
        Kw::EndIf,
        Kw::Mainmenu,
        Kw::Bool,
        Kw::Int,
        Kw::Default,
        Kw::Depends,
        Kw::On,
        Kw::Select,
        Kw::Imply,
        Kw::Help,
        Kw::Option,
        Kw::Modules,
        Kw::DefBool,
        Kw::DefTristate,
        Kw::Range,
    ] {
        assert!(kws.contains(&kw), "missing keyword {kw:?}");
    }

    // Help bodies are collected by the lexer and attached to their line.
    let helps: Vec<&String> = lines
        .iter()
        .filter(|l| l.tokens.first() == Some(&Token::Kw(Kw::Help)))
        .filter_map(|l| match l.tokens.get(1) {
            Some(Token::Str(s)) => Some(s),
            _ => None,
        })
        .collect();
    assert!(!helps.is_empty());
    assert!(helps.iter().any(|h| h.contains("SELinux")));
}

#[test]
fn model_defines_all_symbols() {
    let kconfig = parse_sample();

    let expected = [
        "AUDIT",
        "MODULES",
        "MODVERSIONS",
        "SYSVIPC",
        "CC_OPTIMIZE_FOR_PERFORMANCE",
        "CC_OPTIMIZE_FOR_SIZE",
        "CHECKPOINT_RESTORE",
        "SYSCTL",
        "FOO_RANGE",
        "HAS_FEATURE",
        "OPTIONAL_FEATURE",
    ];
    for name in expected {
        let id = kconfig.lookup(name).unwrap_or_else(|| panic!("{name} missing"));
        assert!(
            !kconfig.symbol(id).nodes().is_empty(),
            "{name} should be defined"
        );
    }

    let audit = kconfig.lookup("AUDIT").unwrap();
    assert_eq!(kconfig.symbol(audit).sym_type(), SymbolType::Bool);
    let audit_node = kconfig.symbol(audit).nodes()[0];
    assert_eq!(
        kconfig.menu_node(audit_node).prompt().map(|p| p.text.as_str()),
        Some("Auditing support")
    );
    assert!(kconfig.menu_node(audit_node).help().is_some());

    let modules = kconfig.lookup("MODULES").unwrap();
    assert_eq!(kconfig.modules_symbol(), Some(modules));
    let modules_node = kconfig.symbol(modules).nodes()[0];
    assert!(kconfig.menu_node(modules_node).is_menuconfig());

    assert_eq!(kconfig.mainmenu_text(), "Sample Configuration");
    assert_eq!(kconfig.unique_defined_syms().len(), expected.len());
}

#[test]
fn help_text_parsed_correctly() {
    let kconfig = parse_sample();
    let audit = kconfig.lookup("AUDIT").unwrap();
    let node = kconfig.symbol(audit).nodes()[0];
    let help = kconfig.menu_node(node).help().unwrap();
    assert!(help.starts_with("Enable auditing"));
    assert!(help.contains("SELinux"));
    assert!(!help.starts_with('\t'));
    assert!(!help.starts_with("  "));
}

#[test]
fn references_create_placeholders_and_warnings() {
    let kconfig = parse_sample();

    // NET and EXPERT are referenced but never defined.
    let net = kconfig.lookup("NET").unwrap();
    assert!(kconfig.symbol(net).nodes().is_empty());
    assert_eq!(kconfig.symbol(net).sym_type(), SymbolType::Unknown);

    let warnings = kconfig.warnings();
    assert!(warnings.iter().any(|w| w.contains("undefined symbol NET")));
    assert!(warnings.iter().any(|w| w.contains("undefined symbol EXPERT")));
}

#[test]
fn choice_members_are_linked() {
    let kconfig = parse_sample();
    let choice_id = kconfig.choices().next().expect("one choice");
    let choice = kconfig.choice(choice_id);

    let names: Vec<&str> = choice
        .syms()
        .iter()
        .map(|&s| kconfig.symbol(s).name())
        .collect();
    assert_eq!(
        names,
        ["CC_OPTIMIZE_FOR_PERFORMANCE", "CC_OPTIMIZE_FOR_SIZE"]
    );
    assert_eq!(choice.sym_type(), SymbolType::Bool);
    assert!(!choice.is_optional());
    for &member in choice.syms() {
        assert_eq!(kconfig.symbol(member).choice(), Some(choice_id));
    }
}

#[test]
fn implicit_submenu_reparents_dependent_siblings() {
    let kconfig = Kconfig::builder()
        .warn_to_stderr(false)
        .parse("config A\n\tbool \"a\"\nconfig B\n\tbool \"b\"\n\tdepends on A\nconfig C\n\tbool \"c\"\n")
        .unwrap();

    let a = kconfig.lookup("A").unwrap();
    let b = kconfig.lookup("B").unwrap();
    let c = kconfig.lookup("C").unwrap();

    let a_node = kconfig.menu_node(kconfig.top_node()).list().unwrap();
    assert_eq!(kconfig.menu_node(a_node).item(), MenuItem::Symbol(a));

    let b_node = kconfig.menu_node(a_node).list().expect("B nested under A");
    assert_eq!(kconfig.menu_node(b_node).item(), MenuItem::Symbol(b));
    assert_eq!(kconfig.menu_node(b_node).parent(), Some(a_node));
    assert_eq!(kconfig.menu_node(b_node).next(), None);

    let c_node = kconfig.menu_node(a_node).next().expect("C stays a sibling");
    assert_eq!(kconfig.menu_node(c_node).item(), MenuItem::Symbol(c));
}

#[test]
fn type_conflict_warns_and_keeps_first() {
    let kconfig = Kconfig::builder()
        .warn_to_stderr(false)
        .parse("config DUAL\n\tbool \"dual\"\n\nconfig DUAL\n\tint \"dual again\"\n")
        .unwrap();
    let dual = kconfig.lookup("DUAL").unwrap();
    assert_eq!(kconfig.symbol(dual).sym_type(), SymbolType::Bool);
    assert_eq!(kconfig.symbol(dual).nodes().len(), 2);
    assert!(
        kconfig
            .warnings()
            .iter()
            .any(|w| w.contains("multiple types"))
    );
}

#[test]
fn missing_source_is_a_syntax_error() {
    let err = Kconfig::builder()
        .warn_to_stderr(false)
        .parse("source \"no/such/file\"\n")
        .unwrap_err();
    match err {
        KconfigError::Syntax { linenr, message, .. } => {
            assert_eq!(linenr, 1);
            assert!(message.contains("not found"));
        }
        other => panic!("expected a syntax error, got {other}"),
    }
}

#[test]
fn gsource_with_no_matches_is_silent() {
    let kconfig = Kconfig::builder()
        .warn_to_stderr(false)
        .parse("gsource \"no/such/dir/*.kconf\"\n\nconfig FOO\n\tbool \"foo\"\n")
        .unwrap();
    assert!(kconfig.lookup("FOO").is_some());
}

#[test]
fn rsource_resolves_relative_to_including_file() {
    let dir = tempfile::tempdir().unwrap();
    let sub = dir.path().join("drivers");
    fs::create_dir(&sub).unwrap();
    fs::write(
        dir.path().join("Kconfig"),
        "config TOP\n\tbool \"top\"\n\nrsource \"drivers/Kconfig\"\n",
    )
    .unwrap();
    fs::write(sub.join("Kconfig"), "config DRIVER\n\tbool \"driver\"\n").unwrap();

    let kconfig = Kconfig::builder()
        .warn_to_stderr(false)
        .load(dir.path().join("Kconfig"))
        .unwrap();
    assert!(kconfig.lookup("TOP").is_some());
    assert!(kconfig.lookup("DRIVER").is_some());

    let driver = kconfig.lookup("DRIVER").unwrap();
    let node = kconfig.symbol(driver).nodes()[0];
    assert!(kconfig.menu_node(node).filename().contains("drivers"));
    assert_eq!(kconfig.menu_node(node).linenr(), 1);
}

#[test]
fn gsource_sources_matches_in_sorted_order() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("Kconfig"), "gsource \"*.kconf\"\n").unwrap();
    fs::write(dir.path().join("b.kconf"), "config BBB\n\tbool \"b\"\n").unwrap();
    fs::write(dir.path().join("a.kconf"), "config AAA\n\tbool \"a\"\n").unwrap();

    let kconfig = Kconfig::builder()
        .warn_to_stderr(false)
        .load(dir.path().join("Kconfig"))
        .unwrap();
    let names: Vec<&str> = kconfig
        .unique_defined_syms()
        .iter()
        .map(|&s| kconfig.symbol(s).name())
        .collect();
    assert_eq!(names, ["AAA", "BBB"]);
}

#[test]
fn environment_expansion_in_strings_and_paths() {
    let kconfig = Kconfig::builder()
        .warn_to_stderr(false)
        .env("ARCH", "x86")
        .env("BOARD", "qemu")
        .parse("config PLATFORM\n\tstring \"Platform\"\n\tdefault \"$(ARCH)-$BOARD\"\n")
        .unwrap();
    let platform = kconfig.lookup("PLATFORM").unwrap();
    assert_eq!(kconfig.str_value(platform), "x86-qemu");
}

#[test]
fn unset_environment_expands_to_empty() {
    let kconfig = Kconfig::builder()
        .warn_to_stderr(false)
        .parse("config NAME\n\tstring \"name\"\n\tdefault \"pre$(NO_SUCH_VAR_SET)post\"\n")
        .unwrap();
    let name = kconfig.lookup("NAME").unwrap();
    assert_eq!(kconfig.str_value(name), "prepost");
}

#[test]
fn empty_input_yields_empty_instance() {
    let kconfig = Kconfig::parse("").unwrap();
    assert!(kconfig.unique_defined_syms().is_empty());
    assert_eq!(kconfig.menu_node(kconfig.top_node()).list(), None);
    assert_eq!(kconfig.mainmenu_text(), "Main menu");
}

#[test]
fn symbol_printer_round_trips() {
    let kconfig = Kconfig::builder()
        .warn_to_stderr(false)
        .parse(
            "config KEEP\n\tbool \"keep me\"\n\tdefault y if OTHER\n\tselect HELPER\n\trange 1 5\n\thelp\n\t  Two lines of\n\t  help text.\n\nconfig OTHER\n\tbool \"other\"\n\nconfig HELPER\n\tbool\n",
        )
        .unwrap();
    let keep = kconfig.lookup("KEEP").unwrap();
    let printed = kconfig.symbol_str(keep);
    assert!(printed.starts_with("config KEEP\n"));
    assert!(printed.contains("\tbool\n"));
    assert!(printed.contains("\tprompt \"keep me\"\n"));
    assert!(printed.contains("\tdefault y if OTHER\n"));
    assert!(printed.contains("\tselect HELPER\n"));
    assert!(printed.contains("\thelp\n"));

    let reparsed = Kconfig::builder()
        .warn_to_stderr(false)
        .parse(&printed)
        .unwrap();
    let keep2 = reparsed.lookup("KEEP").unwrap();
    assert_eq!(reparsed.symbol(keep2).sym_type(), SymbolType::Bool);
    assert_eq!(reparsed.symbol(keep2).defaults().len(), 1);
    assert_eq!(reparsed.symbol(keep2).selects().len(), 1);
}

#[test]
fn expr_str_renders_with_minimal_parentheses() {
    let kconfig = Kconfig::builder()
        .warn_to_stderr(false)
        .parse(
            "config A\n\tbool \"a\"\n\tdepends on B && (C || !D)\nconfig B\n\tbool \"b\"\nconfig C\n\tbool \"c\"\nconfig D\n\tbool \"d\"\n",
        )
        .unwrap();
    let a = kconfig.lookup("A").unwrap();
    assert_eq!(
        kconfig.expr_str(kconfig.symbol(a).direct_dep()),
        "B && (C || !D)"
    );
}

#[test]
fn choice_member_printer_synthesizes_choice_condition() {
    let kconfig = parse_sample();

    // The printed form of a choice member shows the choice gating; it is
    // a diagnostic rendering, not exact Kconfig input.
    let member = kconfig.lookup("CC_OPTIMIZE_FOR_SIZE").unwrap();
    let printed = kconfig.symbol_str(member);
    assert!(
        printed.contains("\tprompt \"Optimize for size (-Os)\" if <choice>\n"),
        "unexpected printer output:\n{printed}"
    );

    // A plain symbol of the same shape has no synthesized condition.
    let plain = kconfig.symbol_str(kconfig.lookup("SYSVIPC").unwrap());
    assert!(!plain.contains("<choice>"));
}

#[test]
fn menu_iter_visits_every_node_in_order() {
    let kconfig = parse_sample();

    let mut symbol_names = Vec::new();
    let mut menu_titles = Vec::new();
    for node_id in kconfig.menu_iter() {
        let node = kconfig.menu_node(node_id);
        match node.item() {
            MenuItem::Symbol(sym) => symbol_names.push(kconfig.symbol(sym).name().to_string()),
            MenuItem::Menu => {
                menu_titles.push(node.prompt().map(|p| p.text.clone()).unwrap_or_default())
            }
            _ => {}
        }
    }

    // Pre-order: AUDIT first, MODVERSIONS nested right under MODULES.
    assert_eq!(symbol_names[0], "AUDIT");
    assert_eq!(symbol_names[1], "MODULES");
    assert_eq!(symbol_names[2], "MODVERSIONS");
    assert_eq!(menu_titles, ["General setup"]);
    assert_eq!(symbol_names.len(), kconfig.defined_syms().len());
}

#[test]
fn tristate_logic_operators() {
    use Tristate::*;
    assert_eq!(N.or(M), M);
    assert_eq!(M.or(Y), Y);
    assert_eq!(Y.and(M), M);
    assert_eq!(N.and(Y), N);
    assert_eq!(N.not(), Y);
    assert_eq!(M.not(), M);
    assert_eq!(Y.not(), N);
    assert!(Y > M && M > N);
}
