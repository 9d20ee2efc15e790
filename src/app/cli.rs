//! Command line arguments

use std::path::PathBuf;

use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand, ValueEnum};

use crate::collector::api::SourceKind;

#[derive(Parser, Debug, Clone)]
#[command(name = "metaingest")]
#[command(about = "Collect file, message and media metadata with live progress")]
#[command(version, long_version = crate::core::version::long_version())]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error", "off"])]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(short = 'o', long = "log-format", value_name = "FORMAT", value_parser = ["text", "ext", "json"])]
    pub log_format: Option<String>,

    /// Log file path
    #[arg(short = 'f', long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    /// Force colored log output
    #[arg(long = "color", action = ArgAction::SetTrue)]
    pub color: bool,

    /// More verbose logging (repeat for trace)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run one scan and stream its progress as server-sent events
    Scan(ScanArgs),
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ScanArgs {
    /// Source to scan
    #[arg(value_enum)]
    pub source: SourceArg,

    /// Root directory (filesystem scans)
    #[arg(short = 'r', long = "root", value_name = "PATH")]
    pub root: Option<PathBuf>,

    /// Provider query filter (paginated sources)
    #[arg(short = 'q', long = "query", value_name = "QUERY")]
    pub query: Option<String>,

    /// Key progress is published under
    #[arg(short = 'k', long = "client-key", value_name = "KEY", default_value = "cli")]
    pub client_key: String,

    /// Directory for the JSON-lines store; in-memory when omitted
    #[arg(long = "out", value_name = "DIR")]
    pub out: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceArg {
    Filesystem,
    Drive,
    Messages,
    Media,
}

impl From<SourceArg> for SourceKind {
    fn from(source: SourceArg) -> Self {
        match source {
            SourceArg::Filesystem => SourceKind::Filesystem,
            SourceArg::Drive => SourceKind::PagedDriveLike,
            SourceArg::Messages => SourceKind::PagedMessageLike,
            SourceArg::Media => SourceKind::PagedMediaLike,
        }
    }
}

impl Args {
    /// Log level after applying `--verbose`
    pub fn effective_log_level(&self) -> Option<&str> {
        match self.verbose {
            0 => self.log_level.as_deref(),
            1 => Some("debug"),
            _ => Some("trace"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filesystem_scan_args() {
        let args = Args::try_parse_from([
            "metaingest",
            "--log-level",
            "warn",
            "scan",
            "filesystem",
            "--root",
            "/srv/data",
            "--out",
            "/tmp/store",
        ])
        .unwrap();
        assert_eq!(args.log_level.as_deref(), Some("warn"));
        let Command::Scan(scan) = args.command;
        assert_eq!(SourceKind::from(scan.source), SourceKind::Filesystem);
        assert_eq!(scan.root, Some(PathBuf::from("/srv/data")));
        assert_eq!(scan.client_key, "cli");
        assert_eq!(scan.out, Some(PathBuf::from("/tmp/store")));
    }

    #[test]
    fn test_paginated_scan_args() {
        let args = Args::try_parse_from([
            "metaingest",
            "-v",
            "scan",
            "messages",
            "--query",
            "newer_than:7d",
            "--client-key",
            "browser-1",
        ])
        .unwrap();
        assert_eq!(args.effective_log_level(), Some("debug"));
        let Command::Scan(scan) = args.command;
        assert_eq!(SourceKind::from(scan.source), SourceKind::PagedMessageLike);
        assert_eq!(scan.query.as_deref(), Some("newer_than:7d"));
        assert_eq!(scan.client_key, "browser-1");
    }

    #[test]
    fn test_rejects_unknown_source_and_format() {
        assert!(Args::try_parse_from(["metaingest", "scan", "calendar"]).is_err());
        assert!(
            Args::try_parse_from(["metaingest", "--log-format", "xml", "scan", "media"]).is_err()
        );
    }
}
