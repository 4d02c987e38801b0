//! Terminal colour control following the NO_COLOR and CLICOLOR conventions.
//!
//! Precedence: `NO_COLOR` (any value) disables colour, `CLICOLOR_FORCE` other than
//! `0` enables it, `CLICOLOR=0` disables it, and otherwise colour follows whether
//! stdout is a terminal.

use colored::control;
use std::io::IsTerminal;

fn env_is(name: &str, pred: impl Fn(&str) -> bool) -> bool {
    std::env::var(name).is_ok_and(|v| pred(&v))
}

/// Decide once, early in `main`, whether output is coloured
pub fn init_colors() {
    let enabled = if env_is("NO_COLOR", |_| true) {
        false
    } else if env_is("CLICOLOR_FORCE", |v| v != "0") {
        true
    } else if env_is("CLICOLOR", |v| v == "0") {
        false
    } else {
        std::io::stdout().is_terminal()
    };

    control::set_override(enabled);
}
