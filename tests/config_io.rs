use kconfig_core::{Kconfig, Tristate};

use std::fs;

const SAMPLE: &str = r#"
mainmenu "IO Test"

config MODULES
	bool "Enable modules"
	default y
	option modules

menu "Devices"

config SERIAL
	tristate "Serial driver"
	default m

config BAUD
	int "Baud rate"
	range 300 115200
	default 9600
	depends on SERIAL

endmenu

config HOSTNAME
	string "Host name"
	default "localhost"

config BASE_ADDR
	hex "Base address"
	default 0x1000

comment "Fixed settings"

config HIDDEN
	bool
	default y
"#;

fn parse_sample() -> Kconfig {
    Kconfig::builder()
        .warn_to_stderr(false)
        .parse(SAMPLE)
        .expect("sample should parse")
}

#[test]
fn config_text_layout() {
    let kconfig = parse_sample();
    let text = kconfig.config_text(None);

    assert!(text.starts_with("#\n# Automatically generated file; DO NOT EDIT.\n# IO Test\n#\n"));
    assert!(text.contains("CONFIG_MODULES=y\n"));
    assert!(text.contains("\n#\n# Devices\n#\nCONFIG_SERIAL=m\nCONFIG_BAUD=9600\n"));
    assert!(text.contains("CONFIG_HOSTNAME=\"localhost\"\n"));
    assert!(text.contains("CONFIG_BASE_ADDR=0x1000\n"));
    assert!(text.contains("\n#\n# Fixed settings\n#\n"));
    // Promptless symbols with an applicable default are still recorded.
    assert!(text.contains("CONFIG_HIDDEN=y\n"));
}

#[test]
fn disabled_symbols_use_not_set_lines() {
    let mut kconfig = parse_sample();
    let serial = kconfig.lookup("SERIAL").unwrap();
    kconfig.set_value(serial, Tristate::N);

    let text = kconfig.config_text(None);
    assert!(text.contains("# CONFIG_SERIAL is not set\n"));
    // BAUD depends on SERIAL and drops out entirely.
    assert!(!text.contains("CONFIG_BAUD"));
}

#[test]
fn custom_header_replaces_default() {
    let kconfig = parse_sample();
    let text = kconfig.config_text(Some("# my header\n"));
    assert!(text.starts_with("# my header\n"));
    assert!(!text.contains("DO NOT EDIT"));
}

#[test]
fn write_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(".config");

    let mut kconfig = parse_sample();
    let serial = kconfig.lookup("SERIAL").unwrap();
    let hostname = kconfig.lookup("HOSTNAME").unwrap();
    let baud = kconfig.lookup("BAUD").unwrap();
    assert!(kconfig.set_value(serial, Tristate::Y));
    assert!(kconfig.set_str_value(hostname, "box \"a\\b\""));
    assert!(kconfig.set_str_value(baud, "115200"));
    kconfig.write_config(&path).unwrap();

    let mut other = parse_sample();
    other.load_config(&path, true).unwrap();
    assert_eq!(other.tri_value(other.lookup("SERIAL").unwrap()), Tristate::Y);
    assert_eq!(other.str_value(other.lookup("HOSTNAME").unwrap()), "box \"a\\b\"");
    assert_eq!(other.str_value(other.lookup("BAUD").unwrap()), "115200");

    // Two successive writes of the same state are byte-identical.
    let second = dir.path().join(".config2");
    other.write_config(&second).unwrap();
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        fs::read_to_string(&second).unwrap()
    );
}

#[test]
fn load_config_merges_or_replaces() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fragment");
    fs::write(&path, "CONFIG_SERIAL=y\n").unwrap();

    let mut kconfig = parse_sample();
    let hostname = kconfig.lookup("HOSTNAME").unwrap();
    kconfig.set_str_value(hostname, "custom");

    // Merge keeps the unrelated user value.
    kconfig.load_config(&path, false).unwrap();
    assert_eq!(kconfig.str_value(hostname), "custom");

    // Replace drops it.
    kconfig.load_config(&path, true).unwrap();
    assert_eq!(kconfig.str_value(hostname), "localhost");
    assert_eq!(
        kconfig.tri_value(kconfig.lookup("SERIAL").unwrap()),
        Tristate::Y
    );
}

#[test]
fn load_config_warns_on_unknown_and_malformed_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad");
    fs::write(
        &path,
        "CONFIG_NO_SUCH_SYMBOL=y\nnot a config line\nCONFIG_SERIAL=maybe\n# CONFIG_HOSTNAME is not set\n",
    )
    .unwrap();

    let mut kconfig = parse_sample();
    kconfig.load_config(&path, true).unwrap();

    let warnings = kconfig.warnings();
    assert!(warnings.iter().any(|w| w.contains("unknown symbol CONFIG_NO_SUCH_SYMBOL")));
    assert!(warnings.iter().any(|w| w.contains("malformed line")));
    assert!(warnings.iter().any(|w| w.contains("invalid tristate \"maybe\"")));
    assert!(warnings.iter().any(|w| w.contains("is not set")));
}

#[test]
fn load_config_default_honors_kconfig_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("myconfig");
    fs::write(&path, "CONFIG_SERIAL=y\n").unwrap();

    let mut kconfig = Kconfig::builder()
        .warn_to_stderr(false)
        .env("KCONFIG_CONFIG", path.to_str().unwrap())
        .parse(SAMPLE)
        .unwrap();
    kconfig.load_config_default().unwrap();
    assert_eq!(
        kconfig.tri_value(kconfig.lookup("SERIAL").unwrap()),
        Tristate::Y
    );
}

#[test]
fn config_changed_flag_tracks_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frag");

    let mut kconfig = parse_sample();
    assert!(!kconfig.config_changed());

    fs::write(&path, "CONFIG_SERIAL=y\n").unwrap();
    kconfig.load_config(&path, true).unwrap();
    assert!(kconfig.config_changed());
}

#[test]
fn min_config_contains_only_differences() {
    let mut kconfig = parse_sample();
    let serial = kconfig.lookup("SERIAL").unwrap();
    let baud = kconfig.lookup("BAUD").unwrap();
    kconfig.set_value(serial, Tristate::N);
    kconfig.set_str_value(baud, "9600"); // explicit, but equal to the default

    let text = kconfig.min_config_text();
    assert!(text.contains("# CONFIG_SERIAL is not set\n"));
    assert!(!text.contains("CONFIG_MODULES"));
    assert!(!text.contains("CONFIG_HOSTNAME"));
    assert!(!text.contains("CONFIG_BAUD"));

    // An untouched configuration needs no lines at all.
    let mut pristine = parse_sample();
    let min = pristine.min_config_text();
    assert!(!min.contains("CONFIG_"));
}

#[test]
fn autoconf_defines() {
    let mut kconfig = parse_sample();
    let hostname = kconfig.lookup("HOSTNAME").unwrap();
    kconfig.set_str_value(hostname, "a\"b");

    let text = kconfig.autoconf_text();
    assert!(text.starts_with("/*\n * Automatically generated file; DO NOT EDIT.\n * IO Test\n */\n"));
    assert!(text.contains("#define CONFIG_MODULES 1\n"));
    assert!(text.contains("#define CONFIG_SERIAL_MODULE 1\n"));
    assert!(text.contains("#define CONFIG_BAUD 9600\n"));
    assert!(text.contains("#define CONFIG_HOSTNAME \"a\\\"b\"\n"));
    assert!(text.contains("#define CONFIG_BASE_ADDR 0x1000\n"));
    assert!(text.contains("#define CONFIG_HIDDEN 1\n"));
}

#[test]
fn autoconf_skips_disabled_symbols() {
    let mut kconfig = parse_sample();
    let serial = kconfig.lookup("SERIAL").unwrap();
    kconfig.set_value(serial, Tristate::N);
    let text = kconfig.autoconf_text();
    assert!(!text.contains("CONFIG_SERIAL"));
}

#[test]
fn hex_values_gain_0x_prefix_in_defines() {
    let mut kconfig = parse_sample();
    let addr = kconfig.lookup("BASE_ADDR").unwrap();
    kconfig.set_str_value(addr, "2000");
    assert!(
        kconfig
            .autoconf_text()
            .contains("#define CONFIG_BASE_ADDR 0x2000\n")
    );
    // .config keeps the value as entered.
    assert!(kconfig.config_text(None).contains("CONFIG_BASE_ADDR=2000\n"));
}

#[test]
fn sync_deps_touches_only_changed_symbols() {
    let dir = tempfile::tempdir().unwrap();
    let deps = dir.path().join("deps");

    let mut kconfig = parse_sample();
    kconfig.sync_deps(&deps).unwrap();

    let serial_h = deps.join("SERIAL.h");
    let base_addr_h = deps.join("BASE/ADDR.h");
    assert_eq!(
        fs::read_to_string(&serial_h).unwrap(),
        "#define CONFIG_SERIAL_MODULE 1\n"
    );
    assert_eq!(
        fs::read_to_string(&base_addr_h).unwrap(),
        "#define CONFIG_BASE_ADDR 0x1000\n"
    );
    assert!(deps.join("auto.conf").is_file());

    // Unchanged symbols must be left alone on the next sync: plant a
    // sentinel and verify it survives.
    fs::write(&base_addr_h, "sentinel").unwrap();
    let serial = kconfig.lookup("SERIAL").unwrap();
    kconfig.set_value(serial, Tristate::N);
    kconfig.sync_deps(&deps).unwrap();

    assert_eq!(fs::read_to_string(&base_addr_h).unwrap(), "sentinel");
    // SERIAL changed to n: its header is rewritten to an empty define set.
    assert_eq!(fs::read_to_string(&serial_h).unwrap(), "");
    assert!(!kconfig.config_changed());

    // A sync with no changes rewrites nothing.
    fs::write(&serial_h, "sentinel2").unwrap();
    kconfig.sync_deps(&deps).unwrap();
    assert_eq!(fs::read_to_string(&serial_h).unwrap(), "sentinel2");
}

#[test]
fn defconfig_filename_finds_first_existing_default() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("board_defconfig"), "").unwrap();
    fs::write(
        dir.path().join("Kconfig"),
        "config DEFCONFIG_LIST\n\tstring\n\toption defconfig_list\n\tdefault \"missing_defconfig\"\n\tdefault \"board_defconfig\"\n",
    )
    .unwrap();

    let kconfig = Kconfig::builder()
        .warn_to_stderr(false)
        .srctree(dir.path())
        .load(dir.path().join("Kconfig"))
        .unwrap();
    let found = kconfig.defconfig_filename().expect("defconfig should exist");
    assert!(found.ends_with("board_defconfig"));
}

#[test]
fn custom_prefix_applies_everywhere() {
    let mut kconfig = Kconfig::builder()
        .warn_to_stderr(false)
        .config_prefix("CFG_")
        .parse("config FOO\n\tbool \"foo\"\n\tdefault y\n")
        .unwrap();
    assert!(kconfig.config_text(None).contains("CFG_FOO=y\n"));
    assert!(kconfig.autoconf_text().contains("#define CFG_FOO 1\n"));

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frag");
    fs::write(&path, "# CFG_FOO is not set\n").unwrap();
    kconfig.load_config(&path, true).unwrap();
    assert_eq!(kconfig.tri_value(kconfig.lookup("FOO").unwrap()), Tristate::N);
}
