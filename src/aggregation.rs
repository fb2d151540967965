//! Tester workload and failure views derived from fetched scripts.
//!
//! Everything here is a pure function of its input. Each script contributes
//! only its latest run, chosen independently per script.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::testpad::model::{FolderNode, Outcome, ProgressCounters, Run, RunState, Script};
use crate::traversal::collect_located_scripts;

pub const UNASSIGNED: &str = "Unassigned";

/// A script plus where it was found.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptSnapshot {
    pub project_name: String,
    pub folder_path: String,
    pub script: Script,
}

impl ScriptSnapshot {
    /// Snapshots for every script in a folder tree fetched with run and
    /// result detail.
    pub fn from_tree(project_name: &str, root: &FolderNode) -> Vec<ScriptSnapshot> {
        collect_located_scripts(root)
            .into_iter()
            .filter_map(|located| {
                Some(ScriptSnapshot {
                    project_name: project_name.to_string(),
                    folder_path: located.folder_path,
                    script: located.node.to_script()?,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailedTest {
    pub project_name: String,
    pub folder_path: String,
    pub script_id: u64,
    pub script_name: String,
    pub test_id: String,
    pub test_name: String,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
    pub tester: String,
    pub run_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_created: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Assignment {
    pub run_id: String,
    pub script_id: u64,
    pub script_name: String,
    pub project_name: String,
    pub status: &'static str,
    pub progress_summary: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TesterSummary {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub total_runs: usize,
    pub completed_runs: usize,
    pub in_progress_runs: usize,
    pub failed_runs: usize,
    /// Whole-percent share of runs completed.
    pub completion_rate: u32,
    pub assignments: Vec<Assignment>,
}

impl TesterSummary {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            email: None,
            total_runs: 0,
            completed_runs: 0,
            in_progress_runs: 0,
            failed_runs: 0,
            completion_rate: 0,
            assignments: Vec::new(),
        }
    }

    fn rate(completed: usize, total: usize) -> u32 {
        if total == 0 {
            return 0;
        }
        ((completed as f64 / total as f64) * 100.0).round() as u32
    }
}

/// Testers grouped by where they stand on their assignments.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TesterBoard {
    pub not_started: Vec<String>,
    pub in_progress: Vec<String>,
    pub completed: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Highlights {
    pub top_performer: Option<String>,
    pub busiest: Option<String>,
    /// `None` means nobody has a failing run.
    pub bug_hunter: Option<String>,
}

fn tester_name(run: &Run) -> &str {
    run.assigned_tester().unwrap_or(UNASSIGNED)
}

/// Whether a run needs attention: any failing result, or failing counters
/// when the run came without per-test results.
fn run_has_failures(run: &Run) -> bool {
    if run.results.is_empty() {
        return run.progress.as_ref().is_some_and(|p| p.failures() > 0);
    }
    run.results.values().any(|r| r.outcome.is_failure())
}

fn progress_summary(run: &Run) -> String {
    match &run.progress {
        Some(p) => match p.summary.as_deref().filter(|s| !s.is_empty()) {
            Some(summary) => summary.to_string(),
            None => format!("{}/{} passed", p.pass, p.total),
        },
        None => String::new(),
    }
}

/// Every failing, blocked or queried result in each script's latest run,
/// in script order and then test order.
pub fn failed_tests(snapshots: &[ScriptSnapshot]) -> Vec<FailedTest> {
    let mut failures = Vec::new();
    for snapshot in snapshots {
        let script = &snapshot.script;
        let Some(run) = script.latest_run() else {
            continue;
        };

        let mut entries: Vec<(usize, &String, _)> = run
            .results
            .iter()
            .filter(|(_, result)| result.outcome.is_failure())
            .map(|(test_id, result)| {
                let position = script
                    .tests
                    .iter()
                    .position(|t| &t.id == test_id)
                    .unwrap_or(usize::MAX);
                (position, test_id, result)
            })
            .collect();
        entries.sort_by_key(|(position, _, _)| *position);

        for (_, test_id, result) in entries {
            failures.push(FailedTest {
                project_name: snapshot.project_name.clone(),
                folder_path: snapshot.folder_path.clone(),
                script_id: script.id,
                script_name: script.name.clone(),
                test_id: test_id.clone(),
                test_name: script
                    .test_label(test_id)
                    .unwrap_or(test_id.as_str())
                    .to_string(),
                outcome: result.outcome,
                comment: result.comment.clone(),
                issue: result.issue.clone(),
                tester: tester_name(run).to_string(),
                run_id: run.id.clone(),
                run_created: run.created.clone(),
            });
        }
    }
    failures
}

/// One summary per tester owning at least one latest run, sorted by name.
pub fn tester_summaries(snapshots: &[ScriptSnapshot]) -> Vec<TesterSummary> {
    let mut by_name: BTreeMap<String, TesterSummary> = BTreeMap::new();

    for snapshot in snapshots {
        let script = &snapshot.script;
        let Some(run) = script.latest_run() else {
            continue;
        };
        let name = tester_name(run);
        let summary = by_name
            .entry(name.to_string())
            .or_insert_with(|| TesterSummary::new(name));

        if summary.email.is_none() {
            summary.email = run.assignee_email().map(str::to_string);
        }
        summary.total_runs += 1;
        match run.state {
            Some(RunState::Complete) => summary.completed_runs += 1,
            Some(RunState::Started) => summary.in_progress_runs += 1,
            _ => {}
        }
        if run_has_failures(run) {
            summary.failed_runs += 1;
        }
        summary.assignments.push(Assignment {
            run_id: run.id.clone(),
            script_id: script.id,
            script_name: script.name.clone(),
            project_name: snapshot.project_name.clone(),
            status: run.state_str(),
            progress_summary: progress_summary(run),
        });
    }

    by_name
        .into_values()
        .map(|mut summary| {
            summary.completion_rate =
                TesterSummary::rate(summary.completed_runs, summary.total_runs);
            summary
        })
        .collect()
}

/// Not started: nothing completed or underway. Completed: every run done.
/// Everything else with runs is in progress.
pub fn tester_board(summaries: &[TesterSummary]) -> TesterBoard {
    let mut board = TesterBoard::default();
    for summary in summaries.iter().filter(|s| s.total_runs > 0) {
        let name = summary.name.clone();
        if summary.completed_runs == 0 && summary.in_progress_runs == 0 {
            board.not_started.push(name);
        } else if summary.completed_runs < summary.total_runs {
            board.in_progress.push(name);
        } else {
            board.completed.push(name);
        }
    }
    board
}

/// Maximum by `key`, first one wins on ties.
fn leader<F>(summaries: &[TesterSummary], key: F) -> Option<&TesterSummary>
where
    F: Fn(&TesterSummary) -> usize,
{
    summaries.iter().fold(None, |best, s| match best {
        Some(b) if key(b) >= key(s) => Some(b),
        _ => Some(s),
    })
}

pub fn highlights(summaries: &[TesterSummary]) -> Highlights {
    Highlights {
        top_performer: leader(summaries, |s| s.completed_runs).map(|s| s.name.clone()),
        busiest: leader(summaries, |s| s.total_runs).map(|s| s.name.clone()),
        bug_hunter: leader(summaries, |s| s.failed_runs)
            .filter(|s| s.failed_runs > 0)
            .map(|s| s.name.clone()),
    }
}

/// Summed progress counters over every snapshot.
pub fn total_progress(snapshots: &[ScriptSnapshot]) -> ProgressCounters {
    let mut total = ProgressCounters::default();
    for snapshot in snapshots {
        total.accumulate(&snapshot.script.progress);
    }
    total
}
