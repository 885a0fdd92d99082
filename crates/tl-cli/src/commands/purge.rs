//! Purge command: drops old closed sessions and their app usage.

use std::io::Write;

use anyhow::{Result, bail};
use chrono::NaiveDate;

use tl_core::time::start_of_day;
use tl_core::{PinPrompt, PinPurpose};
use tl_db::Database;

/// Deletes every closed session that ended before `before` 00:00.
pub fn run<W: Write, P: PinPrompt>(
    writer: &mut W,
    db: &mut Database,
    prompt: &mut P,
    before: NaiveDate,
) -> Result<()> {
    if db.pin_configured()? {
        let pin = prompt.prompt_pin(PinPurpose::Shutdown).unwrap_or_default();
        if !db.verify_pin(&pin)? {
            tracing::warn!("purge rejected");
            bail!("incorrect PIN");
        }
    }

    let purged = db.purge_before(start_of_day(before))?;
    let noun = if purged == 1 { "session" } else { "sessions" };
    writeln!(writer, "Purged {purged} {noun} ended before {before}.")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::terminal::LinePrompt;
    use tl_core::parse_timestamp;

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    fn seeded() -> Database {
        let mut db = Database::open_in_memory().unwrap();
        for (start, end) in [
            ("2024-12-30T10:00:00", "2024-12-30T11:00:00"),
            ("2024-12-31T23:00:00", "2025-01-01T01:00:00"),
            ("2025-01-01T10:00:00", "2025-01-01T11:00:00"),
        ] {
            let id = db.create_session(parse_timestamp(start).unwrap()).unwrap();
            db.close_session(id, parse_timestamp(end).unwrap()).unwrap();
        }
        db
    }

    #[test]
    fn purges_without_pin_when_none_is_set() {
        let mut db = seeded();
        let mut output = Vec::new();
        let mut prompt = LinePrompt::new("".as_bytes());

        run(&mut output, &mut db, &mut prompt, day("2025-01-01")).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Purged 1 session ended before 2025-01-01.\n"
        );
        assert_eq!(db.list_sessions().unwrap().len(), 2);
    }

    #[test]
    fn purge_is_pin_gated() {
        let mut db = seeded();
        db.set_pin("1234").unwrap();

        let mut output = Vec::new();
        let mut wrong = LinePrompt::new("9999\n".as_bytes());
        assert!(run(&mut output, &mut db, &mut wrong, day("2025-01-02")).is_err());
        assert_eq!(db.list_sessions().unwrap().len(), 3);

        let mut right = LinePrompt::new("1234\n".as_bytes());
        run(&mut output, &mut db, &mut right, day("2025-01-02")).unwrap();
        assert!(db.list_sessions().unwrap().is_empty());
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "Purged 3 sessions ended before 2025-01-02.\n"
        );
    }
}
