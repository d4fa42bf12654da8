use clap::{Arg, ArgMatches, Command};

pub const ARG_MEDIA_ROOT: &str = "media-root";

#[derive(Debug, Clone)]
pub struct Options {
    pub root: String,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        Self {
            root: matches
                .get_one::<String>(ARG_MEDIA_ROOT)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| "media".to_string()),
        }
    }
}

pub fn with_args(command: Command) -> Command {
    command.arg(
        Arg::new(ARG_MEDIA_ROOT)
            .long(ARG_MEDIA_ROOT)
            .help("Directory where uploaded media is stored")
            .env("VERKI_MEDIA_ROOT")
            .default_value("media"),
    )
}
