use std::io;

use thiserror::Error;

/// Fatal conditions raised while loading a Kconfig tree or touching
/// configuration files. Everything non-fatal is collected as a warning on
/// the [`Kconfig`](crate::Kconfig) instance instead.
#[derive(Debug, Error)]
pub enum KconfigError {
    /// The lexer or parser rejected the input. Carries the location of the
    /// first offending construct.
    #[error("{filename}:{linenr}: {message}")]
    Syntax {
        filename: String,
        linenr: u32,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl KconfigError {
    pub(crate) fn syntax(filename: &str, linenr: u32, message: impl Into<String>) -> Self {
        KconfigError::Syntax {
            filename: filename.to_string(),
            linenr,
            message: message.into(),
        }
    }
}
