//! CLI argument definitions using clap derive macros.

use clap::{Parser, Subcommand};

use imgfetch::classify;
use imgfetch::download::DEFAULT_WIDTH;

/// Incremental, verified image fetcher for booru-style galleries.
#[derive(Parser, Debug)]
#[command(name = "imgfetch")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download a single image or an artist's collection
    #[command(after_help = classify::pattern_help())]
    Img {
        /// Top level url
        url: String,

        /// Download until the latest known data has been found
        #[arg(short = 'u', long)]
        update: bool,

        /// Download any missing data
        #[arg(short = 'a', long, conflicts_with = "update")]
        update_all: bool,

        /// Concurrent downloads (1-16)
        #[arg(short = 'c', long, default_value_t = DEFAULT_WIDTH as u8, value_parser = clap::value_parser!(u8).range(1..=16))]
        concurrency: u8,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_img_parses_url() {
        let args =
            Args::try_parse_from(["imgfetch", "img", "https://yande.re/post/show/1"]).unwrap();
        let Command::Img {
            url,
            update,
            update_all,
            concurrency,
        } = args.command;
        assert_eq!(url, "https://yande.re/post/show/1");
        assert!(!update);
        assert!(!update_all);
        assert_eq!(concurrency, 4); // DEFAULT_WIDTH
    }

    #[test]
    fn test_cli_update_flags() {
        let args = Args::try_parse_from(["imgfetch", "img", "u", "-u"]).unwrap();
        let Command::Img {
            update, update_all, ..
        } = args.command;
        assert!(update);
        assert!(!update_all);

        let args = Args::try_parse_from(["imgfetch", "img", "u", "--update-all"]).unwrap();
        let Command::Img {
            update, update_all, ..
        } = args.command;
        assert!(!update);
        assert!(update_all);
    }

    #[test]
    fn test_cli_update_flags_conflict() {
        let result = Args::try_parse_from(["imgfetch", "img", "u", "-u", "-a"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_cli_concurrency_bounds() {
        let args = Args::try_parse_from(["imgfetch", "img", "u", "-c", "16"]).unwrap();
        let Command::Img { concurrency, .. } = args.command;
        assert_eq!(concurrency, 16);

        let result = Args::try_parse_from(["imgfetch", "img", "u", "-c", "0"]);
        assert!(result.is_err());
        let result = Args::try_parse_from(["imgfetch", "img", "u", "-c", "17"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_verbose_and_quiet() {
        let args = Args::try_parse_from(["imgfetch", "-vv", "img", "u"]).unwrap();
        assert_eq!(args.verbose, 2);
        assert!(!args.quiet);

        let args = Args::try_parse_from(["imgfetch", "-q", "img", "u"]).unwrap();
        assert!(args.quiet);
    }

    #[test]
    fn test_cli_missing_url_rejected() {
        let result = Args::try_parse_from(["imgfetch", "img"]);
        assert!(result.is_err());
    }
}
