use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset};
use tracing::error;

use crate::model::Match;
use crate::store::Store;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchFilter {
    pub season: Option<String>,
    pub team: Option<String>,
    pub competition: Option<String>,
    pub date: Option<String>,
}

impl MatchFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn season(mut self, season: impl Into<String>) -> Self {
        self.season = non_empty(season.into());
        self
    }

    pub fn team(mut self, team: impl Into<String>) -> Self {
        self.team = non_empty(team.into());
        self
    }

    pub fn competition(mut self, competition: impl Into<String>) -> Self {
        self.competition = non_empty(competition.into());
        self
    }

    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = non_empty(date.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        active(&self.season).is_none()
            && active(&self.team).is_none()
            && active(&self.competition).is_none()
            && active(&self.date).is_none()
    }

    /// WHERE clause with `?N` placeholders and the values to bind, in order.
    pub fn where_clause(&self) -> (String, Vec<String>) {
        let mut sql = String::from("WHERE 1=1");
        let mut params: Vec<String> = Vec::new();

        if let Some(season) = active(&self.season) {
            params.push(season.to_string());
            sql.push_str(&format!(" AND season = ?{}", params.len()));
        }
        if let Some(team) = active(&self.team) {
            params.push(team.to_string());
            let idx = params.len();
            sql.push_str(&format!(" AND (home_team = ?{idx} OR away_team = ?{idx})"));
        }
        if let Some(competition) = active(&self.competition) {
            params.push(competition.to_string());
            sql.push_str(&format!(" AND competition = ?{}", params.len()));
        }
        if let Some(date) = active(&self.date) {
            params.push(date.to_string());
            sql.push_str(&format!(" AND substr(date, 1, 10) = ?{}", params.len()));
        }

        (sql, params)
    }

    pub fn matches(&self, m: &Match) -> bool {
        active(&self.season).is_none_or(|s| m.season == s)
            && active(&self.team).is_none_or(|t| m.involves(t))
            && active(&self.competition).is_none_or(|c| m.competition == c)
            && active(&self.date).is_none_or(|d| m.calendar_day() == d)
    }
}

fn active(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

pub fn filter_matches(store: &Store, filter: &MatchFilter) -> Vec<Match> {
    match store.read_matches(filter) {
        Ok(rows) => rows,
        Err(err) => {
            error!(?filter, error = %err, "filtered match read failed");
            Vec::new()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterOptions {
    pub seasons: Vec<String>,
    pub teams: Vec<String>,
    pub competitions: Vec<String>,
    pub dates: Vec<String>,
}

impl FilterOptions {
    pub fn from_matches(matches: &[Match]) -> Self {
        let mut seasons = BTreeSet::new();
        let mut teams = BTreeSet::new();
        let mut competitions = BTreeSet::new();
        let mut dates = BTreeSet::new();
        for m in matches {
            seasons.insert(m.season.clone());
            teams.insert(m.home_team.clone());
            teams.insert(m.away_team.clone());
            competitions.insert(m.competition.clone());
            dates.insert(m.calendar_day().to_string());
        }
        Self {
            seasons: seasons.into_iter().filter(|s| !s.is_empty()).collect(),
            teams: teams.into_iter().filter(|s| !s.is_empty()).collect(),
            competitions: competitions.into_iter().filter(|s| !s.is_empty()).collect(),
            dates: dates.into_iter().filter(|s| !s.is_empty()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelinePoint {
    pub kickoff: DateTime<FixedOffset>,
    pub match_id: i64,
    pub goals: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeamTimeline {
    pub home: Vec<TimelinePoint>,
    pub away: Vec<TimelinePoint>,
}

pub fn team_timeline(matches: &[Match], team: &str) -> TeamTimeline {
    let mut rows: Vec<(&Match, DateTime<FixedOffset>)> = matches
        .iter()
        .filter(|m| m.involves(team))
        .filter_map(|m| m.kickoff().map(|k| (m, k)))
        .collect();
    rows.sort_by_key(|(m, k)| (*k, m.id));

    let mut out = TeamTimeline::default();
    for (m, kickoff) in rows {
        if m.home_team == team {
            out.home.push(TimelinePoint {
                kickoff,
                match_id: m.id,
                goals: m.home_score,
            });
        }
        if m.away_team == team {
            out.away.push(TimelinePoint {
                kickoff,
                match_id: m.id,
                goals: m.away_score,
            });
        }
    }
    out
}
