use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

/// Log in to the UVSQ portal or fetch an IUT de Vélizy timetable.
#[derive(Parser, Debug)]
#[command(
    name = "velizy",
    version = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_SHORT"), ")"),
    about
)]
pub struct Args {
    /// Log output format
    #[arg(long, value_enum, default_value_t = TracingFormat::Pretty, global = true)]
    pub tracing: TracingFormat,

    /// Go through the relay API instead of talking to the university hosts
    #[arg(long, global = true)]
    pub relay: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Log in through CAS and print the bulletin data
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long, env = "VELIZY_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Print the event details of a class between two dates
    Schedule {
        /// Celcat federation id of the class, e.g. `INF2-FA`
        #[arg(long = "class")]
        class_id: String,
        #[arg(long)]
        start: NaiveDate,
        #[arg(long)]
        end: NaiveDate,
        /// Print the events grouped by date instead of their details
        #[arg(long)]
        grouped: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TracingFormat {
    /// Human-readable output on stderr
    #[default]
    Pretty,
    /// One JSON object per line on stderr
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_schedule_command() {
        let args = Args::parse_from([
            "velizy",
            "--tracing",
            "json",
            "schedule",
            "--class",
            "INF2-FA",
            "--start",
            "2024-01-08",
            "--end",
            "2024-01-14",
            "--grouped",
        ]);

        assert_eq!(args.tracing, TracingFormat::Json);
        match args.command {
            Command::Schedule {
                class_id,
                start,
                grouped,
                ..
            } => {
                assert_eq!(class_id, "INF2-FA");
                assert_eq!(start, NaiveDate::from_ymd_opt(2024, 1, 8).unwrap());
                assert!(grouped);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_dates() {
        let result = Args::try_parse_from([
            "velizy",
            "schedule",
            "--class",
            "X",
            "--start",
            "08/01/2024",
            "--end",
            "2024-01-14",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn clap_definition_is_consistent() {
        use clap::CommandFactory;
        Args::command().debug_assert();
    }
}
