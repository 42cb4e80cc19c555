//! Operator confirmation strategies
//!
//! Every destructive or irreversible step asks a [`Confirm`] implementation
//! instead of reading stdin directly, so automated runs can pass a fixed
//! policy. All strategies default to "no" on anything but an explicit yes.

use std::io::{BufRead, IsTerminal, Write};

use tracing::warn;

/// Asks the operator to approve an action
pub trait Confirm: Send + Sync {
    /// Returns true only on explicit approval
    fn confirm(&self, prompt: &str) -> bool;
}

/// Prompt on the terminal, abort when stdin is not interactive
#[derive(Debug, Default, Clone, Copy)]
pub struct Interactive;

impl Confirm for Interactive {
    fn confirm(&self, prompt: &str) -> bool {
        let stdin = std::io::stdin();
        if !stdin.is_terminal() {
            warn!("Not a terminal, declining: {}", prompt);
            return false;
        }

        eprint!("{} [y/N] ", prompt);
        let _ = std::io::stderr().flush();

        let mut answer = String::new();
        match stdin.lock().read_line(&mut answer) {
            Ok(_) => is_affirmative(&answer),
            Err(_) => false,
        }
    }
}

/// Approve everything (`--yes`, `update force`)
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysYes;

impl Confirm for AlwaysYes {
    fn confirm(&self, _prompt: &str) -> bool {
        true
    }
}

/// Decline everything (`--non-interactive`)
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysNo;

impl Confirm for AlwaysNo {
    fn confirm(&self, prompt: &str) -> bool {
        warn!("Non-interactive mode, declining: {}", prompt);
        false
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}
