//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use releasegate_core::SearchKind;

/// Admission decisions and failed download handling for music releases.
///
/// Releasegate evaluates candidate releases against a quality profile and
/// tracks admitted downloads until they are imported or declared failed.
#[derive(Parser, Debug)]
#[command(name = "releasegate")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/releasegate/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a candidate through the admission chain (exit code 2 on rejection)
    Evaluate(EvaluateArgs),

    /// List library items whose quality is below the profile cutoff
    CutoffUnmet(CutoffUnmetArgs),

    /// Record that a candidate was sent to a download client
    RecordGrab(RecordGrabArgs),

    /// Check a tracked download for failure and publish it
    Check(CheckArgs),

    /// Manually mark a grab as failed
    MarkFailed(MarkFailedArgs),
}

#[derive(ClapArgs, Debug)]
pub struct EvaluateArgs {
    /// Quality profile JSON file
    #[arg(long)]
    pub profile: PathBuf,

    /// Candidate release JSON file
    #[arg(long)]
    pub candidate: PathBuf,

    /// JSON array of library items already held
    #[arg(long)]
    pub held: Option<PathBuf>,

    /// JSON array of queue entries currently in flight
    #[arg(long)]
    pub queue: Option<PathBuf>,

    /// Kind of search that produced the candidate (automatic, interactive)
    #[arg(long)]
    pub search_kind: Option<SearchKind>,
}

#[derive(ClapArgs, Debug)]
pub struct CutoffUnmetArgs {
    /// Quality profile JSON file
    #[arg(long)]
    pub profile: PathBuf,

    /// JSON array of library items
    #[arg(long)]
    pub items: PathBuf,
}

#[derive(ClapArgs, Debug)]
pub struct RecordGrabArgs {
    /// Candidate release JSON file
    #[arg(long)]
    pub candidate: PathBuf,

    /// Download client job id
    #[arg(long)]
    pub download_id: String,

    /// Download client name
    #[arg(long)]
    pub download_client: String,

    /// How the release was found (rss, search, user_invoked_search, interactive_search)
    #[arg(long, default_value = "search")]
    pub source: String,

    /// History database (overrides `database_path` from config)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
pub struct CheckArgs {
    /// Tracked download JSON file
    #[arg(long)]
    pub tracked: PathBuf,

    /// History database (overrides `database_path` from config)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
#[command(group(clap::ArgGroup::new("target").required(true).args(["history_id", "download_id"])))]
pub struct MarkFailedArgs {
    /// History record id of the grab
    #[arg(long)]
    pub history_id: Option<i64>,

    /// Download client job id of the grab
    #[arg(long)]
    pub download_id: Option<String>,

    /// Do not search for a replacement
    #[arg(long)]
    pub skip_redownload: bool,

    /// History database (overrides `database_path` from config)
    #[arg(long)]
    pub db: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_evaluate_parses_required_paths() {
        let args = Args::try_parse_from([
            "releasegate",
            "evaluate",
            "--profile",
            "profile.json",
            "--candidate",
            "candidate.json",
        ])
        .unwrap();
        let Command::Evaluate(evaluate) = args.command else {
            panic!("expected evaluate command");
        };
        assert_eq!(evaluate.profile, PathBuf::from("profile.json"));
        assert!(evaluate.held.is_none());
        assert!(evaluate.search_kind.is_none());
    }

    #[test]
    fn test_cli_evaluate_search_kind() {
        let args = Args::try_parse_from([
            "releasegate",
            "evaluate",
            "--profile",
            "p.json",
            "--candidate",
            "c.json",
            "--search-kind",
            "interactive",
        ])
        .unwrap();
        let Command::Evaluate(evaluate) = args.command else {
            panic!("expected evaluate command");
        };
        assert_eq!(evaluate.search_kind, Some(SearchKind::Interactive));
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let args = Args::try_parse_from([
            "releasegate",
            "-vv",
            "cutoff-unmet",
            "--profile",
            "p",
            "--items",
            "i",
        ])
        .unwrap();
        assert_eq!(args.verbose, 2);
        assert!(!args.quiet);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "releasegate",
            "check",
            "--tracked",
            "t.json",
            "--quiet",
            "--config",
            "custom.toml",
        ])
        .unwrap();
        assert!(args.quiet);
        assert_eq!(args.config, Some(PathBuf::from("custom.toml")));
    }

    #[test]
    fn test_cli_mark_failed_requires_target() {
        let result = Args::try_parse_from(["releasegate", "mark-failed"]);
        assert!(result.is_err());

        let result = Args::try_parse_from([
            "releasegate",
            "mark-failed",
            "--history-id",
            "1",
            "--download-id",
            "nzo_1",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_mark_failed_by_download_id() {
        let args = Args::try_parse_from([
            "releasegate",
            "mark-failed",
            "--download-id",
            "nzo_1",
            "--skip-redownload",
        ])
        .unwrap();
        let Command::MarkFailed(mark) = args.command else {
            panic!("expected mark-failed command");
        };
        assert_eq!(mark.download_id.as_deref(), Some("nzo_1"));
        assert_eq!(mark.history_id, None);
        assert!(mark.skip_redownload);
    }

    #[test]
    fn test_cli_record_grab_defaults_source() {
        let args = Args::try_parse_from([
            "releasegate",
            "record-grab",
            "--candidate",
            "c.json",
            "--download-id",
            "nzo_1",
            "--download-client",
            "SABnzbd",
        ])
        .unwrap();
        let Command::RecordGrab(grab) = args.command else {
            panic!("expected record-grab command");
        };
        assert_eq!(grab.source, "search");
        assert_eq!(grab.download_client, "SABnzbd");
    }

    #[test]
    fn test_cli_requires_subcommand() {
        let result = Args::try_parse_from(["releasegate"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let result = Args::try_parse_from(["releasegate", "--help"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
