use std::path::PathBuf;

use clap::{ArgAction, Parser};
use url::Url;

#[derive(Parser, Debug)]
#[command(about, name = "carport", version)]
pub struct Args {
    /// Directory whose files are packed and uploaded. Sub-directories are skipped.
    pub directory: PathBuf,
    /// Path to an optional toml configuration file.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// API token of the remote store.
    #[arg(long, env = "API_KEY", hide_env_values = true)]
    pub token: String,
    /// Endpoint of the remote store, overrides the configuration file.
    #[arg(long, env = "ENDPOINT")]
    pub endpoint: Option<Url>,
    /// Enable code locations when printing logs.
    #[arg(long, default_value_t = false)]
    pub with_log_locations: bool,
    /// Increases the level of verbosity (the max level is -vvv).
    #[arg(short, action = ArgAction::Count)]
    pub verbose: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let args = Args::try_parse_from([
            "carport",
            "--token",
            "secret",
            "--endpoint",
            "http://localhost:8787",
            "-vv",
            "data",
        ])
        .unwrap();
        assert_eq!(args.directory, PathBuf::from("data"));
        assert_eq!(args.token, "secret");
        assert_eq!(
            args.endpoint.map(|u| u.to_string()),
            Some("http://localhost:8787/".to_string())
        );
        assert_eq!(args.verbose, 2);
        assert!(args.config.is_none());
    }

    #[test]
    fn test_directory_is_required() {
        assert!(Args::try_parse_from(["carport", "--token", "secret"]).is_err());
    }
}
