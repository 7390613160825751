use crate::types::Result;
use dialoguer::{Confirm, Input};

/// Standardized confirmation prompt used across binaries.
pub fn ask_confirmation(prompt: &str, default_yes: bool) -> Result<bool> {
    let choice = Confirm::new()
        .with_prompt(prompt)
        .default(default_yes)
        .show_default(true)
        .interact()?;
    Ok(choice)
}

/// Reads one line of free text. Empty input is allowed so callers can treat
/// blank submits as no-ops themselves.
pub fn ask_line(prompt: &str) -> Result<String> {
    let line: String = Input::new()
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()?;
    Ok(line)
}
