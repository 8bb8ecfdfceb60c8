//! Parser, semantic model and configuration engine for the Kconfig
//! language used by Linux, Zephyr, U-Boot and coreboot.
//!
//! A [`Kconfig`] instance owns everything: the interned symbol table, the
//! menu tree, choice groups and the current configuration state. Parsing
//! and menu finalization happen up front; afterwards only user values and
//! the lazily computed value caches change.
//!
//! ```
//! use kconfig_core::{Kconfig, Tristate};
//!
//! # fn main() -> Result<(), kconfig_core::KconfigError> {
//! let kconfig = Kconfig::parse("config FOO\n\tbool \"foo\"\n\tdefault y\n")?;
//! let foo = kconfig.lookup("FOO").unwrap();
//! assert_eq!(kconfig.tri_value(foo), Tristate::Y);
//! assert!(kconfig.config_text(None).contains("CONFIG_FOO=y\n"));
//! # Ok(())
//! # }
//! ```
//!
//! Dependency expressions evaluate under three-valued logic (see
//! [`Tristate`]); `select`/`imply` reverse dependencies, choice groups and
//! visibility follow the semantics of the C implementation, and the
//! emitted `.config`, defconfig and `autoconf.h` artifacts match its
//! output byte for byte apart from the header comment.

mod config;
mod error;
mod eval;
mod expr;
mod finalize;
pub mod lexer;
mod menu;
mod model;
pub mod parser;
mod symbol;

pub use error::KconfigError;
pub use expr::{CmpOp, Expr, Tristate};
pub use menu::{Choice, ChoiceId, MenuId, MenuItem, MenuIter, MenuNode, Prompt};
pub use model::{Kconfig, KconfigBuilder};
pub use symbol::{Symbol, SymbolId, SymbolType};
