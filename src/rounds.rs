//! Test round creation: copy a folder of scripts into a new folder and give
//! every copy one fresh run assigned to a tester.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Pacing;
use crate::progress::{ProgressEvent, ProgressSink};
use crate::testpad::client::{FolderQuery, TestpadApi};
use crate::testpad::error::TestpadError;
use crate::testpad::model::{BuildMetadata, Field, FolderNode, NewRun, NewScript, NewTest, Test};
use crate::testpad::retry::{with_backoff, RetryPolicy};
use crate::testpad::shapes::extract_created_id;
use crate::traversal::collect_scripts;

const TOTAL_PHASES: usize = 4;

pub const EMPTY_SOURCE_MESSAGE: &str = "Source folder contains no scripts";

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RoundRequest {
    pub project_id: u64,
    pub source_folder_id: String,
    pub new_folder_name: String,
    /// Either a list of names or a single name. Blank entries are dropped.
    #[serde(default, deserialize_with = "de_tester_pool")]
    pub testers: Vec<String>,
    #[serde(flatten)]
    pub build_metadata: BuildMetadata,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TesterPool {
    One(String),
    Many(Vec<String>),
}

fn de_tester_pool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let pool = Option::<TesterPool>::deserialize(deserializer)?;
    let raw = match pool {
        None => Vec::new(),
        Some(TesterPool::One(name)) => vec![name],
        Some(TesterPool::Many(names)) => names,
    };
    Ok(raw
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepError {
    pub step: String,
    pub error: String,
}

impl StepError {
    fn new(step: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            error: error.into(),
        }
    }
}

/// Outcome of one duplication. `success` means zero errors, so a partial
/// copy reports `false` with non-zero counters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DuplicationResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_folder_id: Option<String>,
    pub errors: Vec<StepError>,
    pub created_scripts: usize,
    pub created_runs: usize,
    /// Testpad answered 401 while copying scripts. The caller owns the
    /// stored key and must discard it.
    #[serde(skip)]
    pub credential_rejected: bool,
}

impl DuplicationResult {
    fn finish(new_folder_id: Option<String>, errors: Vec<StepError>, created: usize) -> Self {
        Self {
            success: errors.is_empty(),
            new_folder_id,
            errors,
            created_scripts: created,
            created_runs: created,
            credential_rejected: false,
        }
    }

    /// A round that stopped before any script was touched.
    pub fn aborted(error: &TestpadError) -> Self {
        Self::finish(None, vec![StepError::new("duplication", error.to_string())], 0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoundOptions {
    pub retry: RetryPolicy,
    pub pacing: Pacing,
    /// Fixed seed for the tester shuffle; `None` draws from the OS.
    pub shuffle_seed: Option<u64>,
}

/// Uniformly shuffled copy of the tester pool.
pub fn shuffle_pool_with<R: Rng + ?Sized>(pool: &[String], rng: &mut R) -> Vec<String> {
    let mut shuffled = pool.to_vec();
    shuffled.shuffle(rng);
    shuffled
}

/// Round-robin pick over the shuffled pool; empty pool means unassigned.
pub fn tester_for(shuffled: &[String], index: usize) -> &str {
    if shuffled.is_empty() {
        return "";
    }
    &shuffled[index % shuffled.len()]
}

/// Test steps without their server ids, keeping outline indentation.
pub fn sanitize_tests(tests: &[Test]) -> Vec<NewTest> {
    tests
        .iter()
        .map(|t| NewTest {
            text: t.label().to_string(),
            indent: t.indent,
        })
        .collect()
}

/// Labels of the user-defined fields; system fields are recreated by Testpad.
pub fn sanitize_fields(fields: &[Field]) -> Vec<String> {
    fields
        .iter()
        .filter(|f| !f.is_system())
        .map(|f| f.label.clone())
        .collect()
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn cancelled(stop_rx: &watch::Receiver<bool>) -> bool {
    *stop_rx.borrow()
}

/// Copy every script under `source_folder_id` into a new top-level folder.
///
/// Failures while reading the source or creating the destination folder are
/// returned as `Err`: nothing has been copied yet at that point. After that,
/// each script fails on its own and is recorded in `errors`, and the batch
/// carries on. Scripts are processed strictly in traversal order. The stop
/// flag is checked before the folder is created and before every script.
pub async fn duplicate_folder(
    api: &dyn TestpadApi,
    request: &RoundRequest,
    options: &RoundOptions,
    progress: &dyn ProgressSink,
    stop_rx: &watch::Receiver<bool>,
) -> Result<DuplicationResult, TestpadError> {
    let project_id = request.project_id;

    progress.report(ProgressEvent::new(1, TOTAL_PHASES, "Fetching source folder..."));
    let query = FolderQuery::structure();
    let source = with_backoff(&options.retry, || {
        api.get_folder(project_id, &request.source_folder_id, &query)
    })
    .await?;

    let scripts = collect_scripts(&source);
    if scripts.is_empty() {
        warn!(
            "Folder {} in project {} has no scripts, not creating a round",
            request.source_folder_id, project_id
        );
        return Ok(DuplicationResult::finish(
            None,
            vec![StepError::new("validation", EMPTY_SOURCE_MESSAGE)],
            0,
        ));
    }
    let total = scripts.len();

    if cancelled(stop_rx) {
        info!("Round cancelled before the destination folder was created");
        return Ok(DuplicationResult::finish(
            None,
            vec![StepError::new("cancelled", "Cancelled before any script was copied")],
            0,
        ));
    }

    progress.report(ProgressEvent::new(2, TOTAL_PHASES, "Creating new folder..."));
    let folder_id = create_destination(api, request, &options.retry).await?;
    info!(
        "Created round folder '{}' ({}) with {} scripts to copy",
        request.new_folder_name, folder_id, total
    );
    pause(options.pacing.after_folder_create).await;

    progress.report(ProgressEvent::new(
        3,
        TOTAL_PHASES,
        format!("Duplicating {} scripts...", total),
    ));

    let shuffled = {
        let mut rng = match options.shuffle_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        shuffle_pool_with(&request.testers, &mut rng)
    };

    let mut errors = Vec::new();
    let mut created = 0usize;
    let mut credential_rejected = false;

    for (i, node) in scripts.iter().enumerate() {
        if cancelled(stop_rx) {
            info!("Round cancelled after {}/{} scripts", i, total);
            errors.push(StepError::new(
                "cancelled",
                format!("Cancelled after {} of {} scripts", i, total),
            ));
            break;
        }

        let tester = tester_for(&shuffled, i);
        // A rejected key fails every remaining script the same way
        let copied = if credential_rejected {
            Err(TestpadError::Unauthenticated)
        } else {
            copy_script(api, request, options, &folder_id, node, tester).await
        };
        match copied {
            Ok(new_id) => {
                created += 1;
                debug!("Copied script {} -> {} for '{}'", node.id, new_id, tester);
                progress.report(ProgressEvent::new(
                    3,
                    TOTAL_PHASES,
                    format!("Duplicated script {} of {}: {}", i + 1, total, node.name),
                ));
            }
            Err(e) => {
                warn!("Failed to copy script '{}' ({}): {}", node.name, node.id, e);
                if matches!(e, TestpadError::InvalidCredential) {
                    credential_rejected = true;
                }
                errors.push(StepError::new(
                    format!("create_script_{}", node.name),
                    e.to_string(),
                ));
                progress.report(ProgressEvent::new(
                    3,
                    TOTAL_PHASES,
                    format!("Failed script {} of {}: {}", i + 1, total, node.name),
                ));
            }
        }
    }

    progress.report(ProgressEvent::new(
        4,
        TOTAL_PHASES,
        format!("Created {} runs with scripts", created),
    ));

    let mut result = DuplicationResult::finish(Some(folder_id), errors, created);
    result.credential_rejected = credential_rejected;
    Ok(result)
}

/// Create the round folder and find out its id, by the creation response if
/// possible and otherwise by name among the top-level folders.
async fn create_destination(
    api: &dyn TestpadApi,
    request: &RoundRequest,
    retry: &RetryPolicy,
) -> Result<String, TestpadError> {
    let project_id = request.project_id;
    let name = request.new_folder_name.as_str();

    let resp = with_backoff(retry, || api.create_folder(project_id, name, None)).await?;
    if let Some(id) = extract_created_id(&resp) {
        return Ok(id);
    }

    debug!("Folder creation response carried no id, looking '{}' up by name", name);
    let query = FolderQuery::top_level();
    let top = with_backoff(retry, || api.list_folders(project_id, &query)).await?;
    top.children
        .iter()
        .find(|item| item.is_folder() && item.name == name)
        .map(|item| item.id.clone())
        .ok_or_else(|| {
            TestpadError::DuplicationFailed(
                "Failed to retrieve new folder ID from API response".to_string(),
            )
        })
}

async fn copy_script(
    api: &dyn TestpadApi,
    request: &RoundRequest,
    options: &RoundOptions,
    folder_id: &str,
    node: &FolderNode,
    tester: &str,
) -> Result<String, TestpadError> {
    let script_id = node
        .script_id()
        .ok_or_else(|| TestpadError::Validation(format!("Invalid script id '{}'", node.id)))?;

    let full = with_backoff(&options.retry, || api.get_script(script_id)).await?;
    pause(options.pacing.after_script_read).await;

    let payload = NewScript {
        name: full.name.clone(),
        description: full.description.clone(),
        tests: sanitize_tests(&full.tests),
        fields: sanitize_fields(&full.fields),
        runs: vec![NewRun::assigned(tester, None, &request.build_metadata)],
    };

    let resp = with_backoff(&options.retry, || {
        api.create_script(request.project_id, folder_id, &payload)
    })
    .await?;
    let new_id = extract_created_id(&resp).ok_or_else(|| {
        TestpadError::InvalidResponse(format!(
            "Created script but could not find ID in response for {}",
            node.name
        ))
    })?;

    pause(options.pacing.after_script_create).await;
    Ok(new_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tester_pool_accepts_string_or_list() {
        let one: RoundRequest = serde_json::from_value(json!({
            "project_id": 1,
            "source_folder_id": "f1",
            "new_folder_name": "Round",
            "testers": " alice "
        }))
        .unwrap();
        assert_eq!(one.testers, vec!["alice"]);

        let many: RoundRequest = serde_json::from_value(json!({
            "project_id": 1,
            "source_folder_id": "f1",
            "new_folder_name": "Round",
            "testers": ["alice", "", "  ", "bob"],
            "build": "v1"
        }))
        .unwrap();
        assert_eq!(many.testers, vec!["alice", "bob"]);
        assert_eq!(many.build_metadata.build.as_deref(), Some("v1"));

        let none: RoundRequest = serde_json::from_value(json!({
            "project_id": 1,
            "source_folder_id": "f1",
            "new_folder_name": "Round"
        }))
        .unwrap();
        assert!(none.testers.is_empty());
    }

    #[test]
    fn test_tester_for_round_robins() {
        let pool = vec!["a".to_string(), "b".to_string()];
        assert_eq!(tester_for(&pool, 0), "a");
        assert_eq!(tester_for(&pool, 1), "b");
        assert_eq!(tester_for(&pool, 2), "a");
        assert_eq!(tester_for(&[], 5), "");
    }

    #[test]
    fn test_seeded_shuffle_is_a_permutation() {
        let pool: Vec<String> = (0..10).map(|i| format!("t{}", i)).collect();
        let mut rng = StdRng::seed_from_u64(7);
        let mut shuffled = shuffle_pool_with(&pool, &mut rng);
        let mut again = shuffle_pool_with(&pool, &mut StdRng::seed_from_u64(7));
        assert_eq!(shuffled, again);
        shuffled.sort();
        again.sort();
        assert_eq!(shuffled, pool);
    }

    #[test]
    fn test_sanitize_drops_ids_and_system_fields() {
        let tests: Vec<Test> = serde_json::from_value(json!([
            {"id": "t1", "text": "Open app", "indent": 0},
            {"id": "t2", "name": "Log in", "indent": 1}
        ]))
        .unwrap();
        assert_eq!(
            sanitize_tests(&tests),
            vec![
                NewTest { text: "Open app".into(), indent: 0 },
                NewTest { text: "Log in".into(), indent: 1 },
            ]
        );

        let fields: Vec<Field> = serde_json::from_value(json!([
            {"id": "_tester", "label": "Tester"},
            {"id": "device", "label": "Device"}
        ]))
        .unwrap();
        assert_eq!(sanitize_fields(&fields), vec!["Device"]);
    }

    #[test]
    fn test_aborted_result_names_the_duplication_step() {
        let result = DuplicationResult::aborted(&TestpadError::Network("refused".into()));
        assert!(!result.success);
        assert_eq!(result.errors[0].step, "duplication");
        assert_eq!(result.created_scripts, 0);
    }
}
