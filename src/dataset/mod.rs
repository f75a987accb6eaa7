//! Event dataset access: schema validation, game lookup, and per-game event loading.

use serde::{Deserialize, Serialize};
use std::{
    collections::{HashMap, HashSet},
    fs::File,
    path::{Path, PathBuf},
};

use crate::{
    error::{Error, Result},
    models::EventRecord,
};

const ENABLE_LOGS: bool = true;
use crate::{log_debug, log_info};

pub const REQUIRED_EVENT_COLUMNS: [&str; 10] = [
    "game_id",
    "game_episode",
    "action_id",
    "time_seconds",
    "type_name",
    "result_name",
    "start_x",
    "start_y",
    "end_x",
    "end_y",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameSummary {
    pub game_id: String,
    pub home_team: String,
    pub away_team: String,
    pub match_date: String,
    pub stadium: String,
}

/// The configured event dataset plus optional match metadata.
#[derive(Debug, Clone)]
pub struct DatasetCatalog {
    events_path: PathBuf,
    match_info_path: Option<PathBuf>,
}

impl DatasetCatalog {
    pub fn new(events_path: impl Into<PathBuf>, match_info_path: Option<PathBuf>) -> Self {
        Self {
            events_path: events_path.into(),
            match_info_path,
        }
    }

    /// Fail-fast check run at startup.
    pub fn validate(&self) -> Result<()> {
        validate_event_file(&self.events_path)?;
        if let Some(path) = &self.match_info_path {
            if !path.exists() {
                return Err(Error::Configuration(format!(
                    "match info file does not exist: {}",
                    path.display()
                )));
            }
        }
        log_info!("event dataset ready at {}", self.events_path.display());
        Ok(())
    }

    pub fn ensure_game_id_exists(&self, game_id: i64) -> Result<()> {
        if game_id_exists(&self.events_path, game_id)? {
            Ok(())
        } else {
            Err(Error::Validation(format!(
                "game_id {game_id} not found in {}",
                self.events_path.display()
            )))
        }
    }

    /// Distinct game ids in file order, joined with match metadata when available.
    pub fn list_games(&self, limit: Option<usize>) -> Result<Vec<GameSummary>> {
        let mut reader = open_reader(&self.events_path)?;
        let headers = reader.headers().map_err(|e| csv_error(&self.events_path, e))?;
        let Some(gid_idx) = headers.iter().position(|h| h == "game_id") else {
            return Err(missing_columns(&self.events_path, &["game_id"]));
        };

        let mut seen = HashSet::new();
        let mut game_ids = Vec::new();
        for record in reader.records() {
            let record = record.map_err(|e| csv_error(&self.events_path, e))?;
            let Some(gid) = record.get(gid_idx).map(str::trim).filter(|g| !g.is_empty()) else {
                continue;
            };
            if seen.insert(gid.to_string()) {
                game_ids.push(gid.to_string());
                if limit.is_some_and(|limit| limit > 0 && game_ids.len() >= limit) {
                    break;
                }
            }
        }

        let meta = match &self.match_info_path {
            Some(path) if path.exists() => load_match_info(path)?,
            _ => HashMap::new(),
        };

        Ok(game_ids
            .into_iter()
            .map(|game_id| match meta.get(&game_id) {
                Some(info) => GameSummary {
                    game_id,
                    ..info.clone()
                },
                None => GameSummary {
                    game_id,
                    home_team: String::new(),
                    away_team: String::new(),
                    match_date: String::new(),
                    stadium: String::new(),
                },
            })
            .collect())
    }
}

/// The file must exist and carry every required event column.
pub fn validate_event_file(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::Configuration(format!(
            "event dataset does not exist: {}",
            path.display()
        )));
    }
    let mut reader = open_reader(path)?;
    let headers: HashSet<String> = reader
        .headers()
        .map_err(|e| csv_error(path, e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    let missing: Vec<&str> = REQUIRED_EVENT_COLUMNS
        .iter()
        .copied()
        .filter(|c| !headers.contains(*c))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(missing_columns(path, &missing))
    }
}

pub fn game_id_exists(path: &Path, game_id: i64) -> Result<bool> {
    let mut reader = open_reader(path)?;
    let headers = reader.headers().map_err(|e| csv_error(path, e))?;
    let Some(gid_idx) = headers.iter().position(|h| h == "game_id") else {
        return Err(missing_columns(path, &["game_id"]));
    };
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(path, e))?;
        if record.get(gid_idx).and_then(parse_int) == Some(game_id) {
            return Ok(true);
        }
    }
    Ok(false)
}

#[derive(Debug, Deserialize)]
struct RawEventRow {
    game_id: Option<String>,
    #[serde(default)]
    game_episode: Option<String>,
    #[serde(default)]
    action_id: Option<String>,
    time_seconds: Option<String>,
    #[serde(default)]
    type_name: Option<String>,
    #[serde(default)]
    result_name: Option<String>,
    #[serde(default)]
    start_x: Option<String>,
    #[serde(default)]
    start_y: Option<String>,
    #[serde(default)]
    end_x: Option<String>,
    #[serde(default)]
    end_y: Option<String>,
    #[serde(default)]
    team_id: Option<String>,
    #[serde(default)]
    player_id: Option<String>,
    #[serde(default)]
    period_id: Option<String>,
}

/// All events of one game, in replay order. Rows with unparseable numbers are skipped.
pub fn load_game_events(path: &Path, game_id: i64) -> Result<Vec<EventRecord>> {
    let mut reader = open_reader(path)?;
    let mut events = Vec::new();
    let mut skipped = 0usize;

    for row in reader.deserialize::<RawEventRow>() {
        let row = row.map_err(|e| csv_error(path, e))?;
        if row.game_id.as_deref().and_then(parse_int) != Some(game_id) {
            continue;
        }
        match to_event(row) {
            Some(event) => events.push(event),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        log_debug!("skipped {skipped} malformed rows for game {game_id}");
    }
    events.sort_by(|a, b| a.sort_key().partial_cmp(&b.sort_key()).unwrap_or(std::cmp::Ordering::Equal));
    Ok(events)
}

fn to_event(row: RawEventRow) -> Option<EventRecord> {
    Some(EventRecord {
        game_id: parse_int(row.game_id.as_deref()?)?,
        game_episode: row.game_episode.filter(|s| !s.trim().is_empty()),
        action_id: optional(row.action_id.as_deref(), parse_int)?,
        time_seconds: parse_float(row.time_seconds.as_deref()?)?,
        type_name: row.type_name.unwrap_or_default(),
        result_name: row.result_name.unwrap_or_default(),
        start_x: optional(row.start_x.as_deref(), parse_float)?,
        start_y: optional(row.start_y.as_deref(), parse_float)?,
        end_x: optional(row.end_x.as_deref(), parse_float)?,
        end_y: optional(row.end_y.as_deref(), parse_float)?,
        team_id: optional(row.team_id.as_deref(), parse_int)?,
        player_id: optional(row.player_id.as_deref(), parse_int)?,
        period_id: optional(row.period_id.as_deref(), parse_int)?,
    })
}

/// Outer `None` means a present but malformed value; inner `None` means absent.
fn optional<T>(raw: Option<&str>, parse: impl Fn(&str) -> Option<T>) -> Option<Option<T>> {
    match raw.map(str::trim) {
        None | Some("") => Some(None),
        Some(v) if v.eq_ignore_ascii_case("nan") => Some(None),
        Some(v) => parse(v).map(Some),
    }
}

fn parse_float(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_int(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>()
        .ok()
        .or_else(|| parse_float(raw).filter(|v| v.fract() == 0.0).map(|v| v as i64))
}

fn load_match_info(path: &Path) -> Result<HashMap<String, GameSummary>> {
    #[derive(Deserialize)]
    struct MatchInfoRow {
        game_id: Option<String>,
        #[serde(default)]
        home_team: Option<String>,
        #[serde(default)]
        away_team: Option<String>,
        #[serde(default)]
        match_date: Option<String>,
        #[serde(default)]
        stadium: Option<String>,
    }

    let mut reader = open_reader(path)?;
    let mut meta = HashMap::new();
    for row in reader.deserialize::<MatchInfoRow>() {
        let row = row.map_err(|e| csv_error(path, e))?;
        let Some(game_id) = row.game_id.filter(|g| !g.trim().is_empty()) else {
            continue;
        };
        meta.insert(
            game_id.clone(),
            GameSummary {
                game_id,
                home_team: row.home_team.unwrap_or_default(),
                away_team: row.away_team.unwrap_or_default(),
                match_date: row.match_date.unwrap_or_default(),
                stadium: row.stadium.unwrap_or_default(),
            },
        );
    }
    Ok(meta)
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>> {
    let file = File::open(path).map_err(|err| {
        Error::Configuration(format!("cannot open {}: {err}", path.display()))
    })?;
    Ok(csv::ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .flexible(true)
        .from_reader(file))
}

fn csv_error(path: &Path, err: csv::Error) -> Error {
    Error::Configuration(format!("malformed csv {}: {err}", path.display()))
}

fn missing_columns(path: &Path, missing: &[&str]) -> Error {
    Error::Configuration(format!(
        "{} is missing required columns: {}",
        path.display(),
        missing.join(", ")
    ))
}
