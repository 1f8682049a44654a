use clap::{Args, Parser, Subcommand};

use crate::select::EntryFilter;
use crate::zip::{ExtractOptions, FailurePolicy, Overwrite};

#[derive(Parser, Debug)]
#[command(name = "zipex")]
#[command(version)]
#[command(about = "A safe, streaming ZIP extractor", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipex extract data1.zip out -x joe        extract all files except joe into out/\n  \
  zipex extract --continue broken.zip out   extract what can be extracted\n  \
  zipex list -v https://example.com/archive.zip   list files from remote ZIP\n\n\
Exit codes:\n  \
  0 success, 1 archive could not be opened or has no readable central directory,\n  \
  2 usage error, 3 destination could not be prepared, 4 entry failures, 130 interrupted")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract an archive into a directory
    Extract(ExtractArgs),

    /// List archive entries
    List {
        /// ZIP file path or HTTP URL
        #[arg(value_name = "ARCHIVE")]
        archive: String,

        /// Show sizes, compression ratio and timestamps
        #[arg(short = 'v')]
        verbose: bool,
    },

    /// Decode every entry and check CRC-32 without writing anything
    Test {
        /// ZIP file path or HTTP URL
        #[arg(value_name = "ARCHIVE")]
        archive: String,

        /// Quiet mode
        #[arg(short = 'q')]
        quiet: bool,
    },
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "ARCHIVE")]
    pub archive: String,

    /// Destination directory
    #[arg(value_name = "DEST")]
    pub destination: String,

    /// Files to extract (default: all)
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Keep extracting after an entry fails
    #[arg(long = "continue")]
    pub keep_going: bool,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Number of entries to extract concurrently
    #[arg(long, value_name = "N", default_value_t = 1)]
    pub jobs: usize,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl ExtractArgs {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Engine options for these flags.
    pub fn options(&self) -> ExtractOptions {
        let policy = if self.keep_going {
            FailurePolicy::Continue
        } else {
            FailurePolicy::Abort
        };
        let overwrite = if self.never_overwrite {
            Overwrite::Never
        } else {
            Overwrite::Always
        };

        ExtractOptions::default()
            .failure_policy(policy)
            .overwrite(overwrite)
            .junk_paths(self.junk_paths)
            .jobs(self.jobs)
            .filter(EntryFilter::new(self.files.clone(), self.exclude.clone()))
            .archive_name(self.archive.clone())
    }
}

impl Command {
    pub fn archive(&self) -> &str {
        match self {
            Command::Extract(args) => &args.archive,
            Command::List { archive, .. } | Command::Test { archive, .. } => archive,
        }
    }
}

pub fn is_http_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}
