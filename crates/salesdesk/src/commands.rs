use clap::Args;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
pub use clap_complete::Shell;

use salesdesk_lease::UnitKey;

const LONG_ABOUT: &str = r#"salesdesk drives reservation editing against the legacy sales backend.

WORKFLOW:
    1. Log in once; the session is kept alive while you work
    2. Check a unit's lock status before editing
    3. Edit a unit; its lock is yours for 5 minutes at a time
    4. Renew when prompted, or let the window close to free the unit

UNITS:
    A unit is addressed as DEVELOPMENT BLOCK UNIT, for example:
        salesdesk status EMP01 B 204

EXAMPLES:
    salesdesk login -u maria.souza
    salesdesk status EMP01 B 204
    salesdesk edit EMP01 B 204
    salesdesk release EMP01 B 204
    salesdesk logout"#;

#[derive(Parser)]
#[command(name = "salesdesk")]
#[command(author, version)]
#[command(about = "Sales desk CLI for reservation editing under exclusive unit locks")]
#[command(long_about = LONG_ABOUT)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Backend base URL (default: SALESDESK_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Output as JSON (shorthand for --format json)
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output (also respects NO_COLOR env var)
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,
}

impl Cli {
    /// Returns the effective output format, considering --json shorthand.
    pub fn effective_format(&self) -> OutputFormat {
        if self.json {
            OutputFormat::Json
        } else {
            self.format
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// One unit, addressed the way the desks talk about them.
#[derive(Debug, Args)]
pub struct UnitArgs {
    /// Development code (e.g. EMP01)
    pub development: String,

    /// Block within the development
    pub block: String,

    /// Unit number
    pub unit: String,
}

impl UnitArgs {
    pub fn key(&self) -> UnitKey {
        UnitKey::new(&self.development, &self.block, &self.unit)
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Log in to the reservation backend
    #[command(long_about = r#"Log in to the reservation backend.

The session is persisted, so later commands reuse it until it expires
or 'salesdesk logout' ends it.

EXAMPLES:
    salesdesk login -u maria.souza -p s3cret
    SALESDESK_PASSWORD=s3cret salesdesk login -u maria.souza"#)]
    Login {
        /// Backend username
        #[arg(short, long, env = "SALESDESK_USER")]
        username: String,

        /// Backend password (prefer the environment variable)
        #[arg(short, long, env = "SALESDESK_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// End the current session
    Logout,

    /// Show the logged-in operator and session health
    Whoami,

    /// Show a unit's lock status
    Status {
        #[command(flatten)]
        unit: UnitArgs,
    },

    /// Take a unit's edit lock without entering the edit flow
    Lock {
        #[command(flatten)]
        unit: UnitArgs,
    },

    /// Extend a held edit lock back to a full window
    Renew {
        #[command(flatten)]
        unit: UnitArgs,
    },

    /// Give a unit's edit lock back
    Release {
        #[command(flatten)]
        unit: UnitArgs,
    },

    /// Edit a unit under an exclusive lock
    #[command(long_about = r#"Edit a unit under an exclusive lock.

Takes the unit's edit lock (or resumes one this session already holds)
and keeps it on screen with a countdown. Near the end of the window a
renewal prompt appears; without a renewal the lock is given back and
unsaved changes are discarded, exactly like the legacy screens.

KEYS:
    r    renew the editing window
    s    save and exit
    q    discard and exit

EXAMPLES:
    salesdesk edit EMP01 B 204"#)]
    Edit {
        #[command(flatten)]
        unit: UnitArgs,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_unit_args_parse_positionally() {
        let cli = Cli::try_parse_from(["salesdesk", "status", "EMP01", "B", "204"]).unwrap();
        match cli.command {
            Commands::Status { unit } => {
                assert_eq!(unit.key(), UnitKey::new("EMP01", "B", "204"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_json_shorthand_wins_over_format() {
        let cli =
            Cli::try_parse_from(["salesdesk", "--json", "whoami"]).unwrap();
        assert_eq!(cli.effective_format(), OutputFormat::Json);

        let cli = Cli::try_parse_from(["salesdesk", "whoami"]).unwrap();
        assert_eq!(cli.effective_format(), OutputFormat::Text);
    }

    #[test]
    fn test_login_requires_credentials() {
        let err = Cli::try_parse_from(["salesdesk", "login"]);
        assert!(err.is_err());
    }

    #[test]
    fn test_global_api_url_is_accepted_after_subcommand() {
        let cli = Cli::try_parse_from([
            "salesdesk",
            "status",
            "EMP01",
            "B",
            "204",
            "--api-url",
            "http://10.0.0.5/api",
        ])
        .unwrap();
        assert_eq!(cli.api_url.as_deref(), Some("http://10.0.0.5/api"));
    }
}
