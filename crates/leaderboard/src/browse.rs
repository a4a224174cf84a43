//! Line-oriented leaderboard browser over the HTTP API.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::Result;
use clap::ValueEnum;
use leaderboard_app::{AppConfig, HttpRemote, LoadOutcome, PaginationController, RemoteListing, TeamLogoLoader};
use leaderboard_core::{Listing, Milb, Mlb, PlayerMilb, PlayerMlb, SortField};
use leaderboard_store::{FileStorage, MemoryStorage, Storage, DEFAULT_TEAM_IMAGE};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Which listing to browse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ListingKind {
    /// Minor-league prospects.
    Milb,
    /// Major-league player seasons.
    Mlb,
}

/// How a listing's rows are laid out in the terminal.
pub trait TableRow {
    /// Column headers.
    fn header() -> &'static [&'static str];
    /// Cells of one row; `logos` maps team ids to cached images.
    fn cells(&self, logos: &HashMap<String, String>) -> Vec<String>;
}

impl TableRow for PlayerMilb {
    fn header() -> &'static [&'static str] {
        &["Rank", "Player", "Team", "Logo", "bWAR"]
    }

    fn cells(&self, logos: &HashMap<String, String>) -> Vec<String> {
        let logo = if logos.get(&self.team.id).is_some_and(|image| !image.is_empty()) {
            "cached"
        } else {
            DEFAULT_TEAM_IMAGE
        };
        vec![
            self.rank.to_string(),
            self.full_name.clone(),
            self.team.name.clone(),
            logo.to_owned(),
            format!("{:.2}", self.stat.m_war),
        ]
    }
}

impl TableRow for PlayerMlb {
    fn header() -> &'static [&'static str] {
        &["Season", "Player", "Team", "WAR", "bWAR", "±"]
    }

    fn cells(&self, _logos: &HashMap<String, String>) -> Vec<String> {
        vec![
            self.season.to_string(),
            self.full_name.clone(),
            self.team.name.clone(),
            format!("{:.1}", self.stat.war),
            format!("{:.2}", self.stat.m_war),
            format!("{:.2}", self.stat.m_war_error),
        ]
    }
}

/// Lay out `rows` as a left-aligned text table.
pub fn render_table<E: TableRow>(rows: &[E], logos: &HashMap<String, String>) -> String {
    let header: Vec<String> = E::header().iter().map(|h| (*h).to_owned()).collect();
    let body: Vec<Vec<String>> = rows.iter().map(|row| row.cells(logos)).collect();
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for cells in &body {
        for (width, cell) in widths.iter_mut().zip(cells) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    for cells in std::iter::once(&header).chain(&body) {
        let line: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect();
        let _ = writeln!(out, "{}", line.join("  ").trim_end());
    }
    out
}

/// One parsed input line.
#[derive(Debug, PartialEq, Eq)]
pub enum BrowseCommand {
    Next,
    Previous,
    Sort(String),
    Quit,
    Help,
}

impl BrowseCommand {
    /// Parse `n`, `p`, `s <field>` or `q`. Anything else asks for help.
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        match (words.next(), words.next()) {
            (Some("n" | "next"), None) => Self::Next,
            (Some("p" | "prev" | "previous"), None) => Self::Previous,
            (Some("s" | "sort"), Some(field)) => Self::Sort(field.to_owned()),
            (Some("q" | "quit"), None) => Self::Quit,
            _ => Self::Help,
        }
    }
}

/// Browse `kind` until the user quits or stdin closes.
pub async fn run(config: AppConfig, kind: ListingKind, sort: Option<String>) -> Result<()> {
    let remote = Arc::new(HttpRemote::new(&config.client.api_base, config.client.request_timeout())?);
    match &config.client.cache_path {
        Some(path) => {
            let storage = Arc::new(FileStorage::open(path, config.client.quota_bytes)?);
            dispatch(&config, kind, sort, remote, storage).await
        }
        None => {
            let storage = Arc::new(config.client.quota_bytes.map_or_else(MemoryStorage::new, MemoryStorage::with_quota));
            dispatch(&config, kind, sort, remote, storage).await
        }
    }
}

async fn dispatch<S: Storage + 'static>(
    config: &AppConfig,
    kind: ListingKind,
    sort: Option<String>,
    remote: Arc<HttpRemote>,
    storage: Arc<S>,
) -> Result<()> {
    match kind {
        ListingKind::Milb => {
            let loader = TeamLogoLoader::new(remote.as_ref().clone(), Arc::clone(&storage));
            let logos = loader.load().await;
            browse::<Milb, S>(config, sort, remote, storage, &logos).await
        }
        ListingKind::Mlb => browse::<Mlb, S>(config, sort, remote, storage, &HashMap::new()).await,
    }
}

async fn browse<L, S>(
    config: &AppConfig,
    sort: Option<String>,
    remote: Arc<HttpRemote>,
    storage: Arc<S>,
    logos: &HashMap<String, String>,
) -> Result<()>
where
    L: Listing,
    L::Entity: TableRow,
    S: Storage + 'static,
{
    let mut controller = PaginationController::<L, _, _>::new(remote, storage, config.client.page_size)
        .with_prefetch(config.listings.prefetch_for::<L>());
    if let Some(field) = sort {
        controller.handle_sort(L::SortField::parse(&field)?);
    }
    report(controller.load().await);
    print_page(&controller, logos);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match BrowseCommand::parse(&line) {
            BrowseCommand::Quit => break,
            BrowseCommand::Help => {
                let fields: Vec<&str> = L::SortField::ALL.iter().map(|f| f.as_str()).collect();
                println!("n: next page, p: previous page, s <field>: sort ({}), q: quit", fields.join(", "));
                continue;
            }
            BrowseCommand::Next => match controller.next().await {
                Some(outcome) => report(outcome),
                None => println!("Already on the last page."),
            },
            BrowseCommand::Previous => match controller.previous().await {
                Some(outcome) => report(outcome),
                None => println!("Already on the first page."),
            },
            BrowseCommand::Sort(field) => match L::SortField::parse(&field) {
                Ok(field) => report(controller.sort(field).await),
                Err(err) => {
                    println!("{err}");
                    continue;
                }
            },
        }
        print_page(&controller, logos);
    }
    controller.settle().await;
    Ok(())
}

fn report(outcome: LoadOutcome) {
    if outcome == LoadOutcome::Failed {
        println!("Could not load this page; showing the last one loaded.");
    }
}

fn print_page<L, R, S>(controller: &PaginationController<L, R, S>, logos: &HashMap<String, String>)
where
    L: Listing,
    L::Entity: TableRow,
    R: RemoteListing<L>,
    S: Storage + 'static,
{
    let state = controller.state();
    println!(
        "\n{} page {} sorted by {} {}",
        L::NAMESPACE.to_uppercase(),
        state.page_number(),
        state.sort_field(),
        state.sort_order()
    );
    print!("{}", render_table(state.rows(), logos));
}
