//! Set-pin command: initial setup or replacement of the shutdown PIN.

use std::io::Write;

use anyhow::{Result, bail};

use tl_core::{Enforcer, PinPrompt, PinPurpose, choose_pin};
use tl_db::Database;

pub fn run<W: Write, P: PinPrompt>(writer: &mut W, db: &mut Database, prompt: &mut P) -> Result<()> {
    if !db.pin_configured()? {
        if !Enforcer::ensure_pin(db, prompt)? {
            bail!("PIN not set: entries were empty or did not match");
        }
        writeln!(writer, "PIN set.")?;
        return Ok(());
    }

    let current = prompt.prompt_pin(PinPurpose::Shutdown).unwrap_or_default();
    if !db.verify_pin(&current)? {
        tracing::warn!("PIN change rejected");
        bail!("incorrect PIN");
    }
    let Some(pin) = choose_pin(prompt) else {
        bail!("PIN not changed: entries were empty or did not match");
    };
    db.set_pin(&pin)?;
    tracing::info!("PIN replaced");
    writeln!(writer, "PIN changed.")?;
    Ok(())
}
