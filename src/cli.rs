use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug, PartialEq, Clone)]
#[command(name = "docsync")]
#[command(about = "Keeps a local folder in two-way sync with a remote document repository")]
pub struct CliArgs {
    /// Local folder to synchronize (overrides config)
    #[arg(long)]
    pub local_path: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Seconds between periodic syncs (overrides config)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Do not watch the local folder for changes
    #[arg(long)]
    pub no_watch: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_local_path_only() {
        let args = CliArgs::parse_from(["docsync", "--local-path", "/test/path"]);
        assert_eq!(args.local_path, Some(PathBuf::from("/test/path")));
        assert_eq!(args.config, None);
        assert!(!args.no_watch);
    }

    #[test]
    fn test_cli_parse_all() {
        let args = CliArgs::parse_from([
            "docsync",
            "--local-path", "/test/path",
            "--config", "/custom/config.toml",
            "--interval", "30",
            "--no-watch",
        ]);
        assert_eq!(args.local_path, Some(PathBuf::from("/test/path")));
        assert_eq!(args.config, Some(PathBuf::from("/custom/config.toml")));
        assert_eq!(args.interval, Some(30));
        assert!(args.no_watch);
    }

    #[test]
    fn test_cli_parse_no_args() {
        let args = CliArgs::parse_from(["docsync"]);
        assert_eq!(
            args,
            CliArgs {
                local_path: None,
                config: None,
                interval: None,
                no_watch: false,
            }
        );
    }

    #[test]
    fn test_cli_rejects_bad_interval() {
        assert!(CliArgs::try_parse_from(["docsync", "--interval", "soon"]).is_err());
    }
}
