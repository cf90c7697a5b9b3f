use clap::{Parser, Subcommand};

/// This is the command-line administrator for QuickVote elections.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path, default qvadmin.json) The JSON file with the server, the sheet id and the
    /// credentials of the election. See the manual of the quickvote crate for the format.
    #[clap(short, long, value_parser)]
    pub config: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Prints the election, its phase and its stages.
    Status,
    /// Opens the election on its first stage.
    Open,
    /// Closes voting on the current stage.
    CloseVoting,
    /// Starts a quick poll before the first stage or between two stages.
    QuickPoll {
        /// The question asked to the voters.
        prompt: String,
    },
    /// Closes the quick poll and prints its results.
    ClosePoll,
    /// Moves on to the next stage.
    Advance,
    /// Decides the outcome of the tally. Candidates not listed stay in the runoff.
    Adjudicate {
        /// (repeatable) A winning candidate.
        #[clap(long, value_parser)]
        win: Vec<String>,
        /// (repeatable) A losing candidate.
        #[clap(long, value_parser)]
        lose: Vec<String>,
    },
    /// Prints the live ballot counts until Ctrl-C.
    Watch,
    /// Replaces the candidates of a stage.
    SetSource {
        /// 0-based stage index.
        #[clap(value_parser)]
        stage: usize,
        /// One of yesno, inline, slate, alternates, linked.
        #[clap(value_parser)]
        kind: String,
        /// Comma-separated names (inline), slate id or URL (slate), election id (linked).
        #[clap(value_parser)]
        value: Option<String>,
    },
    /// Sets the number of winners of a stage.
    SetQuota {
        #[clap(value_parser)]
        stage: usize,
        #[clap(value_parser)]
        quota: u32,
    },
    /// Appends a stage with the default settings.
    AddStage,
    /// Removes a stage that has not run yet.
    RemoveStage {
        #[clap(value_parser)]
        stage: usize,
    },
    /// Moves a stage that has not run yet.
    MoveStage {
        #[clap(value_parser)]
        from: usize,
        #[clap(value_parser)]
        to: usize,
    },
    /// Restricts the voters of a stage to one value of a voter attribute.
    SetFilter {
        #[clap(value_parser)]
        stage: usize,
        /// The voter attribute. Without it, the restriction is removed.
        #[clap(long, value_parser)]
        column: Option<String>,
        /// The attribute value. Defaults to the first value offered by the server.
        #[clap(long, value_parser)]
        value: Option<String>,
    },
    /// Renames the election.
    SetTitle {
        #[clap(value_parser)]
        title: String,
    },
    /// Sets the date the election is planned for. Without a date, clears it.
    SetDate {
        #[clap(value_parser)]
        date: Option<String>,
    },
    /// Mails every voter their personal secret link.
    SendLinks {
        /// Confirms the mailing. Without it, only prints who would receive a link.
        #[clap(long, takes_value = false)]
        yes: bool,
    },
    /// Lists the slates candidates can be drawn from.
    Slates,
    /// Prints the candidates of a slate.
    Slate {
        /// Slate id or URL.
        #[clap(value_parser)]
        id: String,
    },
    /// Lists the reports available for download.
    Reports,
    /// Runs a complete election against an in-memory server.
    Demo,
}
