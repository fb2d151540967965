use chrono::{DateTime, FixedOffset, NaiveDateTime};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field identifiers starting with this prefix are Testpad built-ins
/// (`_run`, `_tester`, ...) and are never copied into new scripts.
pub const SYSTEM_FIELD_PREFIX: &str = "_";
pub const TESTER_HEADER: &str = "_tester";
pub const TAGS_HEADER: &str = "_tags";
pub const BUILD_HEADER: &str = "build";
pub const BROWSER_HEADER: &str = "browser";
pub const DEFAULT_TAGS: &str = "ALL";

// --- Lenient field decoding ---
//
// Testpad is inconsistent about ids (number vs string) and about null vs
// missing collections, so these helpers normalise on the way in.

fn de_string_id<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(de::Error::custom(format!(
            "expected string or numeric id, got {}",
            other
        ))),
    }
}

fn de_opt_string_id<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        _ => Ok(None),
    }
}

fn de_u64_id<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    match Value::deserialize(d)? {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| de::Error::custom(format!("id {} is not a positive integer", n))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| de::Error::custom(format!("id {:?} is not numeric", s))),
        other => Err(de::Error::custom(format!("expected numeric id, got {}", other))),
    }
}

fn de_nullable_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(d)?.unwrap_or_default())
}

fn null_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

fn de_string_map<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, String>, D::Error> {
    let raw = Option::<BTreeMap<String, Value>>::deserialize(d)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|(k, v)| match v {
            Value::Null => None,
            Value::String(s) => Some((k, s)),
            other => Some((k, other.to_string())),
        })
        .collect())
}

/// Parse a Testpad timestamp. RFC 3339 first, then the naive forms the API
/// has been seen to emit (interpreted as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc().fixed_offset())
}

// --- Read models ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    #[serde(deserialize_with = "de_u64_id")]
    pub id: u64,
    #[serde(default, deserialize_with = "de_nullable_string")]
    pub name: String,
    #[serde(default, deserialize_with = "de_nullable_string")]
    pub description: String,
    #[serde(default, deserialize_with = "de_nullable_string")]
    pub created: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Folder,
    Script,
    // Unknown item types are inert leaves, same as notes.
    #[serde(other)]
    Note,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FolderNode {
    #[serde(deserialize_with = "de_string_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_nullable_string")]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(
        rename = "contents",
        default,
        deserialize_with = "null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub children: Vec<FolderNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<ProgressCounters>,
    #[serde(
        default,
        deserialize_with = "null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub runs: Vec<Run>,
    #[serde(
        default,
        deserialize_with = "null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tests: Vec<Test>,
}

impl FolderNode {
    /// Synthetic project root used when the API hands back a bare list of
    /// top-level items instead of a root folder.
    pub fn root(children: Vec<FolderNode>) -> Self {
        Self {
            id: "root".to_string(),
            name: "/".to_string(),
            kind: NodeKind::Folder,
            children,
            progress: None,
            runs: Vec::new(),
            tests: Vec::new(),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    pub fn is_script(&self) -> bool {
        self.kind == NodeKind::Script
    }

    /// Numeric script id, if this is a script node with a well-formed id.
    pub fn script_id(&self) -> Option<u64> {
        if !self.is_script() {
            return None;
        }
        self.id.trim().parse().ok()
    }

    /// View a script node (with whatever run/test detail the folder query
    /// embedded) as a `Script`.
    pub fn to_script(&self) -> Option<Script> {
        let id = self.script_id()?;
        Some(Script {
            id,
            name: self.name.clone(),
            description: None,
            tests: self.tests.clone(),
            fields: Vec::new(),
            runs: self.runs.clone(),
            progress: self.progress.clone().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Test {
    #[serde(default, deserialize_with = "de_string_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default)]
    pub indent: u32,
}

impl Test {
    /// Display text: `text` is what the API documents, `name` is the older
    /// spelling some responses still use.
    pub fn label(&self) -> &str {
        self.text
            .as_deref()
            .filter(|t| !t.is_empty())
            .or(self.name.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Field {
    #[serde(default, deserialize_with = "de_string_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_nullable_string")]
    pub label: String,
    #[serde(default)]
    pub show: bool,
}

impl Field {
    pub fn is_system(&self) -> bool {
        self.id.starts_with(SYSTEM_FIELD_PREFIX)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    New,
    Started,
    Complete,
    #[serde(other)]
    Unknown,
}

impl RunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::New => "new",
            RunState::Started => "started",
            RunState::Complete => "complete",
            RunState::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignee {
    #[serde(default, deserialize_with = "de_opt_string_id")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "de_nullable_string")]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    #[serde(deserialize_with = "de_string_id")]
    pub id: String,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub state: Option<RunState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Legacy free-text tester; newer responses use `assignee`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tester: Option<String>,
    #[serde(default, deserialize_with = "de_string_map")]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub assignee: Option<Assignee>,
    #[serde(default, deserialize_with = "null_default")]
    pub results: BTreeMap<String, TestResult>,
    #[serde(default)]
    pub progress: Option<ProgressCounters>,
}

impl Run {
    pub fn created_at(&self) -> Option<DateTime<FixedOffset>> {
        self.created.as_deref().and_then(parse_timestamp)
    }

    pub fn state_str(&self) -> &'static str {
        self.state.unwrap_or(RunState::Unknown).as_str()
    }

    /// Who this run belongs to: assignee name, then the legacy tester
    /// field, then the `_tester` header. First non-blank source wins.
    pub fn assigned_tester(&self) -> Option<&str> {
        let assignee = self.assignee.as_ref().map(|a| a.name.as_str());
        let legacy = self.tester.as_deref();
        let header = self.headers.get(TESTER_HEADER).map(String::as_str);

        [assignee, legacy, header]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|name| !name.is_empty())
    }

    pub fn assignee_email(&self) -> Option<&str> {
        self.assignee
            .as_ref()
            .and_then(|a| a.email.as_deref())
            .filter(|e| !e.is_empty())
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Block,
    Query,
    Pending,
    // Also covers the empty string Testpad uses for "not yet recorded".
    #[default]
    #[serde(other)]
    Unset,
}

impl Outcome {
    /// Fail, block and query are all "needs attention".
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Fail | Outcome::Block | Outcome::Query)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TestResult {
    #[serde(rename = "result", default)]
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProgressCounters {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub pass: u32,
    #[serde(default)]
    pub fail: u32,
    #[serde(default)]
    pub block: u32,
    #[serde(default)]
    pub query: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl ProgressCounters {
    /// Never negative, even when the server's counters disagree.
    pub fn pending(&self) -> u32 {
        self.total
            .saturating_sub(self.pass)
            .saturating_sub(self.fail)
            .saturating_sub(self.block)
            .saturating_sub(self.query)
    }

    pub fn failures(&self) -> u32 {
        self.fail + self.block + self.query
    }

    pub fn accumulate(&mut self, other: &ProgressCounters) {
        self.total = self.total.saturating_add(other.total);
        self.pass = self.pass.saturating_add(other.pass);
        self.fail = self.fail.saturating_add(other.fail);
        self.block = self.block.saturating_add(other.block);
        self.query = self.query.saturating_add(other.query);
    }

    /// Whole-percent pass rate, 0 when there is nothing to count.
    pub fn pass_rate(&self) -> u32 {
        if self.total == 0 {
            return 0;
        }
        ((self.pass as f64 / self.total as f64) * 100.0).round() as u32
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Script {
    #[serde(deserialize_with = "de_u64_id")]
    pub id: u64,
    #[serde(default, deserialize_with = "de_nullable_string")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub tests: Vec<Test>,
    #[serde(default, deserialize_with = "null_default")]
    pub fields: Vec<Field>,
    #[serde(default, deserialize_with = "null_default")]
    pub runs: Vec<Run>,
    #[serde(default, deserialize_with = "null_default")]
    pub progress: ProgressCounters,
}

impl Script {
    /// The run with the greatest `created` timestamp. Ties keep the first
    /// run encountered; undated runs lose to any dated one.
    pub fn latest_run(&self) -> Option<&Run> {
        let mut best: Option<(&Run, Option<DateTime<FixedOffset>>)> = None;
        for run in &self.runs {
            let created = run.created_at();
            let replace = match &best {
                None => true,
                Some((_, best_created)) => created > *best_created,
            };
            if replace {
                best = Some((run, created));
            }
        }
        best.map(|(run, _)| run)
    }

    pub fn test_label(&self, test_id: &str) -> Option<&str> {
        self.tests
            .iter()
            .find(|t| t.id == test_id)
            .map(Test::label)
            .filter(|l| !l.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Note {
    #[serde(deserialize_with = "de_string_id")]
    pub id: String,
    #[serde(default, deserialize_with = "de_nullable_string")]
    pub content: String,
    #[serde(default, deserialize_with = "de_nullable_string")]
    pub created: String,
}

// --- Write payloads ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BuildMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
}

impl BuildMetadata {
    fn apply(&self, headers: &mut BTreeMap<String, String>) {
        let entries = [(BUILD_HEADER, &self.build), (BROWSER_HEADER, &self.browser)];
        for (key, value) in entries {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                headers.insert(key.to_string(), v.to_string());
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewRun {
    pub headers: BTreeMap<String, String>,
    pub results: BTreeMap<String, Value>,
}

impl NewRun {
    /// A fresh run with no results. The tester header is always present,
    /// even when empty (an unassigned run).
    pub fn assigned(tester: &str, tags: Option<&str>, metadata: &BuildMetadata) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert(TESTER_HEADER.to_string(), tester.trim().to_string());
        if let Some(tags) = tags {
            let tags = tags.trim();
            let tags = if tags.is_empty() { DEFAULT_TAGS } else { tags };
            headers.insert(TAGS_HEADER.to_string(), tags.to_string());
        }
        metadata.apply(&mut headers);
        Self {
            headers,
            results: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewTest {
    pub text: String,
    pub indent: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NewScript {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub tests: Vec<NewTest>,
    pub fields: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub runs: Vec<NewRun>,
}
