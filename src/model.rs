use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

pub const STATUS_FINISHED: &str = "FT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub id: i64,
    pub date: String,
    pub home_team: String,
    pub away_team: String,
    pub home_team_logo: Option<String>,
    pub away_team_logo: Option<String>,
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub status: String,
    pub season: String,
    pub competition: String,
    pub lineups: Option<String>,
}

impl Match {
    pub fn calendar_day(&self) -> &str {
        calendar_day(&self.date)
    }

    pub fn kickoff(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.date).ok()
    }

    pub fn is_finished(&self) -> bool {
        self.status == STATUS_FINISHED
    }

    pub fn involves(&self, team: &str) -> bool {
        self.home_team == team || self.away_team == team
    }

    pub fn score_line(&self) -> String {
        match (self.home_score, self.away_score) {
            (Some(h), Some(a)) => format!("{h} - {a}"),
            _ => "n/a".to_string(),
        }
    }

    pub fn lineups(&self) -> Option<Result<Vec<TeamLineup>, serde_json::Error>> {
        self.lineups.as_deref().map(parse_lineups)
    }
}

// Counts characters so it agrees with SQLite's `substr(date, 1, 10)`.
pub fn calendar_day(date: &str) -> &str {
    match date.char_indices().nth(10) {
        Some((idx, _)) => &date[..idx],
        None => date,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    pub home_score: Option<i32>,
    pub away_score: Option<i32>,
    pub status: String,
}

impl From<&Match> for MatchResult {
    fn from(m: &Match) -> Self {
        Self {
            home_score: m.home_score,
            away_score: m.away_score,
            status: m.status.clone(),
        }
    }
}

/// Field-level patch over [`MatchResult`]. An outer `None` leaves the column
/// untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchUpdate {
    pub home_score: Option<Option<i32>>,
    pub away_score: Option<Option<i32>>,
    pub status: Option<String>,
}

impl MatchUpdate {
    pub fn between(stored: &MatchResult, incoming: &MatchResult) -> Self {
        let mut update = Self::default();
        if stored.home_score != incoming.home_score {
            update.home_score = Some(incoming.home_score);
        }
        if stored.away_score != incoming.away_score {
            update.away_score = Some(incoming.away_score);
        }
        if stored.status != incoming.status {
            update.status = Some(incoming.status.clone());
        }
        update
    }

    pub fn is_empty(&self) -> bool {
        self.home_score.is_none() && self.away_score.is_none() && self.status.is_none()
    }

    pub fn fields(&self) -> Vec<&'static str> {
        let mut out = Vec::with_capacity(3);
        if self.home_score.is_some() {
            out.push("home_score");
        }
        if self.away_score.is_some() {
            out.push("away_score");
        }
        if self.status.is_some() {
            out.push("status");
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct League {
    pub id: i64,
    pub season: String,
    pub name: String,
    pub country: String,
    pub logo: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeamLineup {
    pub team: String,
    pub starting: Vec<String>,
    pub substitutes: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawTeamLineup {
    team: RawNamed,
    #[serde(default, rename = "startXI")]
    start_xi: Vec<RawSlot>,
    #[serde(default)]
    substitutes: Vec<RawSlot>,
}

#[derive(Debug, Deserialize)]
struct RawNamed {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSlot {
    player: RawNamed,
}

pub fn parse_lineups(raw: &str) -> Result<Vec<TeamLineup>, serde_json::Error> {
    let sides: Vec<RawTeamLineup> = serde_json::from_str(raw)?;
    Ok(sides
        .into_iter()
        .map(|side| TeamLineup {
            team: side.team.name.unwrap_or_default(),
            starting: slot_names(side.start_xi),
            substitutes: slot_names(side.substitutes),
        })
        .collect())
}

fn slot_names(slots: Vec<RawSlot>) -> Vec<String> {
    slots.into_iter().filter_map(|s| s.player.name).collect()
}
