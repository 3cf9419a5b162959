//! Administrative commands.
//!
//! ```text
//! list          one line per database: "<*| > <name> <lang> <article count>"
//! use <db>      "OK <db>" or "ERROR <reason>"
//! ```
//!
//! Every reply ends with an empty line.

use crate::routing::DatabaseRouter;

/// A parsed admin command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    List,
    Use(String),
}

impl AdminCommand {
    /// Parse one input line. Command words are case-insensitive; database
    /// names are kept as given. Anything unrecognized is `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let verb = words.next()?;
        let command = match words.next() {
            None if verb.eq_ignore_ascii_case("list") => AdminCommand::List,
            Some(db) if verb.eq_ignore_ascii_case("use") => AdminCommand::Use(db.to_owned()),
            _ => return None,
        };
        words.next().is_none().then_some(command)
    }
}

/// Run `command` against the router and render the reply.
pub async fn execute(router: &DatabaseRouter, command: AdminCommand) -> String {
    let mut reply = match command {
        AdminCommand::List => match router.list().await {
            Ok(listing) => listing
                .iter()
                .map(|db| {
                    format!(
                        "{} {} {} {}\n",
                        if db.current { '*' } else { ' ' },
                        db.info.db_name,
                        db.info.lang,
                        db.info.article_count
                    )
                })
                .collect(),
            Err(e) => {
                tracing::error!(error = %e, "Failed to list databases");
                format!("ERROR {e}\n")
            }
        },
        AdminCommand::Use(db_name) => match router.switch_to(&db_name).await {
            Ok(info) => {
                tracing::info!(database = %info.db_name, lang = %info.lang, "Admin switched database");
                format!("OK {}\n", info.db_name)
            }
            Err(e) => {
                tracing::warn!(database = %db_name, error = %e, "Admin switch rejected");
                format!("ERROR {e}\n")
            }
        },
    };
    reply.push('\n');
    reply
}
