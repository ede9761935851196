//! Terminal color helpers. Colors are process-global and switched off by
//! `--no-color` or the NO_COLOR environment variable (handled by the CLI
//! flag definition).

use std::sync::atomic::{AtomicBool, Ordering};

static DISABLED: AtomicBool = AtomicBool::new(false);

pub fn init(disabled: bool) {
    DISABLED.store(disabled, Ordering::Relaxed);
}

pub fn is_disabled() -> bool {
    DISABLED.load(Ordering::Relaxed)
}

pub struct Colors;

impl Colors {
    fn paint(code: &str, text: &str) -> String {
        if is_disabled() {
            text.to_string()
        } else {
            format!("\x1b[{code}m{text}\x1b[0m")
        }
    }

    pub fn error(text: &str) -> String {
        Self::paint("31", text)
    }

    pub fn success(text: &str) -> String {
        Self::paint("32", text)
    }

    pub fn warning(text: &str) -> String {
        Self::paint("33", text)
    }

    pub fn dim(text: &str) -> String {
        Self::paint("2", text)
    }

    pub fn bold(text: &str) -> String {
        Self::paint("1", text)
    }
}
