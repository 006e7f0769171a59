use std::path::PathBuf;

use anyhow::{Context, Result, anyhow, bail};

use football_dash::config::Config;
use football_dash::ingest::{IngestEngine, IngestReport};
use football_dash::logging;
use football_dash::query::{FilterOptions, MatchFilter, filter_matches};
use football_dash::remote::{ApiSportsClient, RemoteSource};
use football_dash::store::Store;

const USAGE: &str = "usage: football_dash [--db PATH] <command>

commands:
  init                                   create the database schema
  leagues [--list]                       store current league seasons (or list stored)
  seasons                                list selectable seasons
  load --league ID --season YYYY         ingest finished matches
  matches [--season S] [--team T] [--competition C] [--date YYYY-MM-DD]
  options                                list distinct filter values
  show ID                                match details and lineups
  runs                                   recent ingest runs";

fn main() -> Result<()> {
    let config = Config::from_env();
    logging::init();
    let args = std::env::args().skip(1).collect::<Vec<_>>();

    let Some(command) = positional(&args).first().cloned() else {
        println!("{USAGE}");
        return Ok(());
    };

    let db_path = flag_value(&args, "--db")
        .map(PathBuf::from)
        .or_else(|| config.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let store = Store::open(&db_path)?;

    match command.as_str() {
        "init" => {
            store.create_schema_if_absent()?;
            println!("Initialization complete: {}", db_path.display());
        }
        "leagues" => {
            if has_flag(&args, "--list") {
                for league in store.read_all_leagues()? {
                    println!(
                        "{:>6} {:<6} {:<40} {:<20} {}",
                        league.id, league.season, league.name, league.country, league.kind
                    );
                }
            } else {
                let remote = ApiSportsClient::new(&config)?;
                let engine = IngestEngine::new(&store, &remote, config.ingest_parallelism);
                let report = engine.sync_current_leagues();
                print_report("League sync", &report);
                report.ensure_integrity()?;
            }
        }
        "seasons" => {
            let remote = ApiSportsClient::new(&config)?;
            let seasons = remote
                .list_seasons()
                .into_iter()
                .filter(|year| *year <= config.max_season)
                .collect::<Vec<_>>();
            if seasons.is_empty() {
                bail!("no seasons returned; check FOOTBALL_API_KEY, quota, or connectivity");
            }
            for year in seasons {
                println!("{year}");
            }
        }
        "load" => {
            let league_id = flag_value(&args, "--league")
                .and_then(|v| v.trim().parse::<i64>().ok())
                .ok_or_else(|| anyhow!("--league ID is required"))?;
            let season = flag_value(&args, "--season")
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| anyhow!("--season YYYY is required"))?;
            let remote = ApiSportsClient::new(&config)?;
            let engine = IngestEngine::new(&store, &remote, config.ingest_parallelism);
            println!("Fetching matches for league {league_id} ({season})...");
            let report = engine.ingest_league_season(league_id, season.trim());
            print_report("Match ingest", &report);
            report.ensure_integrity()?;
        }
        "matches" => {
            let mut filter = MatchFilter::new();
            if let Some(v) = flag_value(&args, "--season") {
                filter = filter.season(v);
            }
            if let Some(v) = flag_value(&args, "--team") {
                filter = filter.team(v);
            }
            if let Some(v) = flag_value(&args, "--competition") {
                filter = filter.competition(v);
            }
            if let Some(v) = flag_value(&args, "--date") {
                filter = filter.date(v);
            }
            let rows = filter_matches(&store, &filter);
            if rows.is_empty() {
                println!("No matches found for the selected filters.");
            }
            for m in rows {
                println!(
                    "{:>8}  {}  {:<25} {:>7}  {:<25} [{}] {} {}",
                    m.id,
                    m.calendar_day(),
                    m.home_team,
                    m.score_line(),
                    m.away_team,
                    m.status,
                    m.competition,
                    m.season
                );
            }
        }
        "options" => {
            let all = store.read_all_matches()?;
            let options = FilterOptions::from_matches(&all);
            println!("Seasons: {}", options.seasons.join(", "));
            println!("Competitions: {}", options.competitions.join(", "));
            println!("Teams: {}", options.teams.join(", "));
            println!("Dates: {}", options.dates.join(", "));
        }
        "show" => {
            let id = positional(&args)
                .get(1)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .ok_or_else(|| anyhow!("show needs a numeric match id"))?;
            let m = store
                .find_match_by_id(id)?
                .ok_or_else(|| anyhow!("match {id} not found"))?;
            let date = m
                .kickoff()
                .map(|k| k.format("%d %B %Y, %H:%M UTC").to_string())
                .unwrap_or_else(|| m.date.clone());
            println!("{} vs {}", m.home_team, m.away_team);
            println!("Date: {date}");
            println!("Competition: {}", m.competition);
            println!("Season: {}", m.season);
            println!("Status: {}", m.status);
            println!("Score: {}", m.score_line());
            match m.lineups() {
                None => println!("No lineups available for this match."),
                Some(Err(err)) => println!("Failed to parse lineups: {err}"),
                Some(Ok(sides)) => {
                    for side in sides {
                        println!();
                        println!("{}", side.team);
                        println!("  Starting: {}", list_or_na(&side.starting));
                        println!("  Substitutes: {}", list_or_na(&side.substitutes));
                    }
                }
            }
        }
        "runs" => {
            for run in store.recent_ingest_runs(10)? {
                println!(
                    "#{} {} league={} season={} +{} ~{} ={} skipped={} failed={}",
                    run.run_id,
                    run.finished_at,
                    run.league_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    run.season.as_deref().unwrap_or("-"),
                    run.inserted,
                    run.updated,
                    run.unchanged,
                    run.skipped,
                    run.failed
                );
            }
        }
        other => {
            println!("{USAGE}");
            bail!("unknown command: {other}");
        }
    }

    Ok(())
}

fn print_report(title: &str, report: &IngestReport) {
    let counts = report.counts();
    println!("{title} complete");
    println!(
        "Inserted: {}  Updated: {}  Unchanged: {}  Skipped: {}  Failed: {}",
        counts.inserted, counts.updated, counts.unchanged, counts.skipped, counts.failed
    );
    let errors = report.errors();
    if !errors.is_empty() {
        println!("Errors: {}", errors.len());
        for err in errors.iter().take(8) {
            println!(" - {err}");
        }
    }
}

fn list_or_na(names: &[String]) -> String {
    if names.is_empty() {
        "Not available".to_string()
    } else {
        names.join(", ")
    }
}

const VALUE_FLAGS: &[&str] = &["--db", "--league", "--season", "--team", "--competition", "--date"];

fn flag_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(value) = arg.strip_prefix(&prefix) {
            return Some(value.to_string());
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
        {
            return Some(next.clone());
        }
    }
    None
}

fn has_flag(args: &[String], name: &str) -> bool {
    args.iter().any(|a| a == name)
}

fn positional(args: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    let mut skip_next = false;
    for arg in args {
        if skip_next {
            skip_next = false;
            continue;
        }
        if arg.starts_with("--") {
            skip_next = VALUE_FLAGS.contains(&arg.as_str());
            continue;
        }
        out.push(arg.clone());
    }
    out
}
