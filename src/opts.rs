use clap::Parser;

#[derive(Parser)]
#[command(name = "abibridge-demo", about = "Drives ISteamRemotePlay handles over a scripted native object.")]
pub struct Opts {
    /// Specifies the level of log verbosity
    #[arg(long = "log-verbosity", value_name = "LEVEL", default_value = "info")]
    pub log_verbosity: Verbosity,

    /// Interface version string to build, repeatable (defaults to every known version)
    #[arg(long = "version", value_name = "VERSION_STRING")]
    pub versions: Vec<String>,
}

pub fn from_args() -> Opts {
    Opts::parse()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verbosity {
    level: log::LevelFilter,
}

impl Verbosity {
    pub fn level(&self) -> log::LevelFilter {
        self.level
    }
}

impl std::str::FromStr for Verbosity {
    type Err = String;

    fn from_str(string: &str) -> std::result::Result<Verbosity, String> {
        use log::LevelFilter::*;

        let level = match string {
            "quiet" => Off,
            "error" => Error,
            "warn" => Warn,
            "info" => Info,
            "debug" => Debug,
            "trace" => Trace,
            _ => return Err(format!("invalid verbosity choice '{}'", string)),
        };

        Ok(Verbosity { level })
    }
}
