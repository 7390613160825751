use anyhow::Context;
use arboard::Clipboard;
use shared::types::Result;

pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard = Clipboard::new().context("clipboard is not available")?;
    clipboard
        .set_text(text.to_owned())
        .context("could not write to the clipboard")?;
    Ok(())
}
