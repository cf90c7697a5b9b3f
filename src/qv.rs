use log::{debug, info, warn};

use quickvote::builder::ElectionBuilder;
use quickvote::simulator::SimulatedServer;
use quickvote::*;
use snafu::{prelude::*, Snafu};

use std::sync::Arc;

use crate::args::{Args, Command};
use crate::qv::client::HttpApi;
use crate::qv::config_reader::*;

pub mod client;
pub mod config_reader;

#[derive(Debug, Snafu)]
pub enum QvError {
    #[snafu(display("Error opening config file {path}"))]
    OpeningConfig {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing config file {path}"))]
    ParsingConfig {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error creating the HTTP client"))]
    HttpClient { source: reqwest::Error },
    #[snafu(display("{source}"))]
    Engine { source: EngineError },

    #[snafu(whatever, display("{message}"))]
    Whatever {
        message: String,
        #[snafu(source(from(Box<dyn std::error::Error>, Some)))]
        source: Option<Box<dyn std::error::Error>>,
    },
}

pub type QvResult<T> = Result<T, QvError>;

pub async fn run_command(args: &Args) -> QvResult<()> {
    if let Command::Demo = args.command {
        return run_demo().await;
    }
    let config_path = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    let config = read_config(config_path)?;
    let api = HttpApi::new(&config)?;
    let slates = api.slates(&config);
    let engine = Engine::load(Arc::new(api)).await.context(EngineSnafu)?;
    execute(&engine, &slates, &args.command, config.polling_config()).await
}

async fn execute<A: QuickVoteApi, S: SlateDirectory>(
    engine: &Engine<A>,
    slates: &S,
    command: &Command,
    polling: PollingConfig,
) -> QvResult<()> {
    match command {
        Command::Status => print_status(engine),
        Command::Open => {
            let phase = engine.rounds().open().await.context(EngineSnafu)?;
            println!("Election opened, now in phase {}", phase);
        }
        Command::CloseVoting => {
            let phase = engine.rounds().close_voting().await.context(EngineSnafu)?;
            println!("Voting closed, now in phase {}", phase);
            print_tally(&engine.election());
        }
        Command::QuickPoll { prompt } => {
            engine
                .rounds()
                .start_quick_poll(prompt)
                .await
                .context(EngineSnafu)?;
            println!("Quick poll started: {}", prompt);
        }
        Command::ClosePoll => {
            let summary = engine
                .rounds()
                .close_quick_poll()
                .await
                .context(EngineSnafu)?;
            println!("Quick poll closed");
            println!("{}", summary);
        }
        Command::Advance => {
            let phase = engine.rounds().advance_round().await.context(EngineSnafu)?;
            let election = engine.election();
            if election.completed {
                println!("The election is complete");
            } else {
                println!(
                    "Moved to stage {}, now in phase {}",
                    election.stage_index, phase
                );
            }
        }
        Command::Adjudicate { win, lose } => {
            let adjudicator = engine.adjudicator();
            let mut adjudication = adjudicator.begin().context(EngineSnafu)?;
            for name in win {
                adjudication
                    .decide(name, Decision::Win)
                    .context(EngineSnafu)?;
            }
            for name in lose {
                adjudication
                    .decide(name, Decision::Lose)
                    .context(EngineSnafu)?;
            }
            for (entry, decision) in adjudication.entries() {
                println!("  {:<30} {:>6}  {}", entry.name, entry.vote_count, decision);
            }
            let phase = adjudicator
                .submit(&adjudication)
                .await
                .context(EngineSnafu)?;
            println!("Adjudication submitted, now in phase {}", phase);
        }
        Command::Watch => watch(engine, polling).await?,
        Command::SetSource { stage, kind, value } => {
            let source = parse_source(kind, value.as_deref())?;
            if let CandidateSource::Slate(slate) = &source {
                preview_slate(slates, slate).await;
            }
            let edited = edit_stage(&engine.election(), *stage, |s| {
                Ok(set_source_kind(s, source))
            })
            .context(EngineSnafu)?;
            save(engine, &edited).await?;
        }
        Command::SetQuota { stage, quota } => {
            let edited = edit_stage(&engine.election(), *stage, |s| set_winner_quota(s, *quota))
                .context(EngineSnafu)?;
            save(engine, &edited).await?;
        }
        Command::AddStage => {
            let edited = add_stage(&engine.election());
            save(engine, &edited).await?;
        }
        Command::RemoveStage { stage } => {
            let edited = remove_stage(&engine.election(), *stage).context(EngineSnafu)?;
            save(engine, &edited).await?;
        }
        Command::MoveStage { from, to } => {
            let edited = move_stage(&engine.election(), *from, *to).context(EngineSnafu)?;
            save(engine, &edited).await?;
        }
        Command::SetFilter {
            stage,
            column,
            value,
        } => {
            let edited = set_voter_filter(
                &engine.election(),
                *stage,
                column.as_deref(),
                value.as_deref(),
            )
            .context(EngineSnafu)?;
            save(engine, &edited).await?;
        }
        Command::SetTitle { title } => {
            let title = title.trim();
            if title.is_empty() {
                whatever!("The title can not be empty")
            }
            let mut edited = engine.election();
            edited.title = title.to_string();
            save(engine, &edited).await?;
        }
        Command::SetDate { date } => {
            let mut edited = engine.election();
            edited.target_date = date
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(str::to_string);
            save(engine, &edited).await?;
        }
        Command::SendLinks { yes } => {
            let voters = engine
                .election()
                .credential_metadata
                .map(|c| c.total_users.to_string())
                .unwrap_or_else(|| "every".to_string());
            if !*yes {
                println!(
                    "This mails a secret link to {} voter(s). Run again with --yes to send.",
                    voters
                );
                return Ok(());
            }
            engine.send_links().await.context(EngineSnafu)?;
            println!("Secret links sent to {} voter(s)", voters);
        }
        Command::Slates => {
            let listed = match slates.list_slates().await {
                Ok(listed) => listed,
                Err(e) => whatever!("Could not list the slates: {}", e),
            };
            for slate in listed.iter().filter(|s| !s.dont_list) {
                println!(
                    "  {:<34} {:<30} {} candidate(s)",
                    slate.slate_id,
                    slate.title,
                    slate.candidates().len()
                );
            }
        }
        Command::Slate { id } => {
            let slate_ref = SlateRef::normalize(id);
            let slate = match slates.get_slate(&slate_ref).await {
                Ok(slate) => slate,
                Err(e) => whatever!("Could not load the slate {}: {}", slate_ref.url(), e),
            };
            println!("{} ({})", slate.title, slate_ref.url());
            for item in &slate.items {
                println!("  {:<30} {}", item.candidate_name, item.position);
            }
        }
        Command::Reports => {
            let reports = engine.election().report_metadata.unwrap_or_default();
            if reports.is_empty() {
                println!("No reports available");
            }
            for report in reports {
                println!("{}: {}", report.title, report.details);
                println!("  {}", report.url_csv_download);
            }
        }
        Command::Demo => whatever!("demo runs against its own server"),
    }
    Ok(())
}

async fn save<A: QuickVoteApi>(engine: &Engine<A>, edited: &Election) -> QvResult<()> {
    engine.save(edited).await.context(EngineSnafu)?;
    print_stages(&engine.election());
    Ok(())
}

async fn watch<A: QuickVoteApi>(engine: &Engine<A>, polling: PollingConfig) -> QvResult<()> {
    let handle = engine.start_polling(polling);
    let mut ballots = engine.subscribe_ballots();
    info!("Watching ballot counts every {:?}, Ctrl-C to stop", polling.interval);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = ballots.changed() => {
                if changed.is_err() {
                    break;
                }
                if let Some(count) = *ballots.borrow_and_update() {
                    println!("Ballots received: {}", count);
                }
            }
        }
    }
    handle.shutdown().await;
    Ok(())
}

async fn preview_slate<S: SlateDirectory>(slates: &S, slate: &SlateRef) {
    match slates.get_slate(slate).await {
        Ok(s) => println!("Slate {:?}: {}", s.title, s.candidates().join(", ")),
        Err(e) => warn!("The slate {} could not be loaded: {}", slate.url(), e),
    }
}

pub fn parse_source(kind: &str, value: Option<&str>) -> QvResult<CandidateSource> {
    let source = match (kind.to_lowercase().as_str(), value) {
        ("yesno", _) => CandidateSource::YesNo,
        ("alternates", _) => CandidateSource::Alternates,
        ("inline", Some(v)) => CandidateSource::Inline(
            v.split(',')
                .map(|x| x.trim().to_string())
                .filter(|x| !x.is_empty())
                .collect(),
        ),
        ("slate", Some(v)) => CandidateSource::Slate(SlateRef::normalize(v)),
        ("linked", Some(v)) => CandidateSource::Linked(v.trim().to_string()),
        ("inline", None) | ("slate", None) | ("linked", None) => {
            whatever!("The {} source needs a value", kind)
        }
        (x, _) => whatever!("Unknown candidate source: {:?}", x),
    };
    debug!("parse_source: {:?}", source);
    Ok(source)
}

fn print_status(engine: &Engine<impl QuickVoteApi>) {
    let election = engine.election();
    println!("{}", election.title);
    if let Some(date) = &election.target_date {
        println!("Target date: {}", date);
    }
    match engine.phase() {
        Ok(phase) => println!(
            "Phase: {} (stage {}, round {}){}",
            phase,
            election.stage_index,
            election.round_id,
            if election.completed { ", complete" } else { "" }
        ),
        Err(e) => println!("Phase: unknown ({})", e),
    }
    if let Some(message) = election.configuration_error() {
        println!("Configuration error: {}", message);
    }
    if let Some(prompt) = election.active_quick_poll() {
        println!("Quick poll: {}", prompt);
    }
    if let Some(c) = &election.credential_metadata {
        println!(
            "Voters: {}, {} logged in ({:.1}%)",
            c.total_users,
            c.count_ever_logged_in,
            c.logged_in_percentage()
        );
        if !c.public_vote_url.is_empty() {
            println!("Public link: {}", c.public_vote_url);
        }
    }
    if let Some(filters) = &election.filter_metadata {
        for (column, values) in &filters.columns {
            let values: Vec<String> = values
                .iter()
                .map(|v| format!("{} ({})", v.value, v.count_hint))
                .collect();
            println!("Filter {}: {}", column, values.join(", "));
        }
    }
    print_stages(&election);
    print_tally(&election);
}

fn print_stages(election: &Election) {
    for (idx, stage) in election.stages.iter().enumerate() {
        let lock = if is_stage_editable(election, idx) {
            " "
        } else {
            "*"
        };
        let winners = election
            .stage_outcomes
            .get(idx)
            .map(|o| o.winners.join(", "))
            .unwrap_or_default();
        let filter = stage
            .voter_filter
            .as_ref()
            .map(|f| format!("  [{}={}]", f.attribute, f.value))
            .unwrap_or_default();
        println!(
            "{}{:>3}. {:<30} {:<10} {} winner(s){}  {}",
            lock,
            idx,
            stage.title,
            stage.source_kind(),
            stage.winner_quota,
            filter,
            winners
        );
    }
}

fn print_tally(election: &Election) {
    if let Some(tally) = &election.partial_tally {
        println!("Tally for round {}:", election.round_id);
        for entry in tally {
            println!(
                "  {:<30} {:>6} {:>7}",
                entry.name, entry.vote_count, entry.vote_percentage
            );
        }
    }
}

/// Runs a two-stage election against the simulated server.
async fn run_demo() -> QvResult<()> {
    let election = ElectionBuilder::new("Demo assembly")
        .stage(Stage::new(
            "Chair",
            CandidateSource::inline(&["Alice", "Bob", "Charlie"]),
        ))
        .stage(Stage::new("Approve the budget?", CandidateSource::YesNo))
        .filter_column("District", &[("North", 14), ("South", 11)])
        .credentials(CredentialMetadata {
            total_users: 25,
            count_ever_logged_in: 22,
            ..CredentialMetadata::default()
        })
        .build();
    let server = Arc::new(SimulatedServer::new(election));
    server.add_slate(Slate {
        slate_id: "council-2026".to_string(),
        title: "Council candidates".to_string(),
        description: String::new(),
        dont_list: false,
        election_year: Some(2026),
        items: ["Ann Lee", "Ben Ortiz"]
            .iter()
            .map(|name| SlateItem {
                candidate_name: name.to_string(),
                position: "Council".to_string(),
                url: String::new(),
            })
            .collect(),
    });
    server.set_tally(0, &[("Alice", 14), ("Bob", 9), ("Charlie", 2)]);
    server.set_tally(1, &[("Yes", 19), ("No", 6)]);
    server.set_tally(2, &[("Ann Lee", 8), ("Ben Ortiz", 6)]);
    server.set_eligible_voters(25);
    // The quick poll runs before the election opens, in round 1.
    server.record_ballots(RoundId(1), 21);

    let engine = Engine::load(server.clone()).await.context(EngineSnafu)?;
    let polling = PollingConfig::default();
    let script = vec![
        Command::SetTitle {
            title: "Demo assembly 2026".to_string(),
        },
        Command::Slates,
        Command::AddStage,
        Command::SetSource {
            stage: 2,
            kind: "slate".to_string(),
            value: Some("council-2026".to_string()),
        },
        Command::SetFilter {
            stage: 2,
            column: Some("District".to_string()),
            value: None,
        },
        Command::SendLinks { yes: true },
        Command::Status,
        Command::QuickPoll {
            prompt: "Is the quorum present?".to_string(),
        },
        Command::ClosePoll,
        Command::Open,
        Command::CloseVoting,
        Command::Adjudicate {
            win: vec!["Alice".to_string()],
            lose: vec!["Bob".to_string(), "Charlie".to_string()],
        },
        Command::Advance,
        Command::CloseVoting,
        Command::Adjudicate {
            win: vec!["Yes".to_string()],
            lose: vec!["No".to_string()],
        },
        Command::Advance,
        Command::CloseVoting,
        Command::Adjudicate {
            win: vec!["Ann Lee".to_string()],
            lose: vec!["Ben Ortiz".to_string()],
        },
        Command::Advance,
        Command::Status,
    ];
    for command in script {
        println!("> {:?}", command);
        if let Err(e) = execute(&engine, server.as_ref(), &command, polling).await {
            warn!("demo step {:?} failed", command);
            return Err(e);
        }
    }
    debug!("demo: {} calls to the server", server.calls().len());
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sources() {
        assert_eq!(parse_source("YesNo", None).unwrap(), CandidateSource::YesNo);
        assert_eq!(
            parse_source("inline", Some("Ann, Ben,,")).unwrap(),
            CandidateSource::inline(&["Ann", "Ben"])
        );
        assert_eq!(
            parse_source("slate", Some("85a7fe")).unwrap(),
            CandidateSource::Slate(SlateRef::normalize("https://petitionbuilder.org/slate/85a7fe"))
        );
        assert!(parse_source("linked", None).is_err());
        assert!(parse_source("ranked", Some("x")).is_err());
    }

    #[tokio::test]
    async fn demo_runs_to_completion() {
        assert!(run_demo().await.is_ok());
    }

    fn begin() -> Arc<SimulatedServer> {
        let election = ElectionBuilder::new("Assembly")
            .stage(Stage::new("Chair", CandidateSource::inline(&["A", "B"])))
            .filter_column("Role", &[("Member", 30), ("Guest", 4)])
            .build();
        Arc::new(SimulatedServer::new(election))
    }

    #[tokio::test]
    async fn settings_commands_save_the_election() {
        let server = begin();
        let engine = Engine::load(server.clone()).await.unwrap();
        let polling = PollingConfig::default();
        let script = [
            Command::SetTitle {
                title: " Annual meeting ".to_string(),
            },
            Command::SetDate {
                date: Some("2026-11-03".to_string()),
            },
            Command::SetFilter {
                stage: 0,
                column: Some("Role".to_string()),
                value: Some("Guest".to_string()),
            },
        ];
        for command in &script {
            execute(&engine, server.as_ref(), command, polling)
                .await
                .unwrap();
        }
        let saved = server.election();
        assert_eq!(saved.title, "Annual meeting");
        assert_eq!(saved.target_date.as_deref(), Some("2026-11-03"));
        assert_eq!(saved.stages[0].voter_filter.as_ref().unwrap().value, "Guest");
        assert!(saved.filter_metadata.is_some());

        let clear = Command::SetDate { date: None };
        execute(&engine, server.as_ref(), &clear, polling)
            .await
            .unwrap();
        assert_eq!(server.election().target_date, None);
        let blank = Command::SetTitle {
            title: "  ".to_string(),
        };
        assert!(execute(&engine, server.as_ref(), &blank, polling)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn send_links_needs_confirmation() {
        let server = begin();
        let engine = Engine::load(server.clone()).await.unwrap();
        let polling = PollingConfig::default();
        server.clear_calls();
        execute(&engine, server.as_ref(), &Command::SendLinks { yes: false }, polling)
            .await
            .unwrap();
        assert!(server.calls().is_empty());
        execute(&engine, server.as_ref(), &Command::SendLinks { yes: true }, polling)
            .await
            .unwrap();
        assert_eq!(server.calls(), vec![simulator::ApiCall::SendLinks]);
    }

    #[tokio::test]
    async fn unknown_slate_is_an_error() {
        let server = begin();
        let engine = Engine::load(server.clone()).await.unwrap();
        let command = Command::Slate {
            id: "missing".to_string(),
        };
        assert!(execute(&engine, server.as_ref(), &command, PollingConfig::default())
            .await
            .is_err());
    }
}
