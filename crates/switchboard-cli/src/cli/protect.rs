//! `swb protect`: preview which credentials would be hidden from a backend.
//!
//! Only the protected text and placeholder names are printed. The tokens
//! themselves never reach the output.

use std::path::PathBuf;

use console::style;

use switchboard_core::vault::SensitiveTokenVault;

use super::read_input;

pub async fn protect(file: Option<PathBuf>, json: bool) -> anyhow::Result<()> {
    let text = read_input(file.as_deref()).await?;
    let protected = SensitiveTokenVault::new().protect(&text);
    let placeholders: Vec<&str> = protected.map.placeholders().collect();

    if json {
        let value = serde_json::json!({
            "text": protected.text,
            "protectedTokens": placeholders.len(),
            "placeholders": placeholders,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print!("{}", protected.text);
    if !protected.text.ends_with('\n') {
        println!();
    }
    if placeholders.is_empty() {
        eprintln!("  {}", style("No credentials found.").dim());
    } else {
        eprintln!(
            "  {} {} token(s) protected: {}",
            style("✓").green().bold(),
            style(placeholders.len()).bold(),
            style(placeholders.join(", ")).cyan()
        );
    }
    Ok(())
}
