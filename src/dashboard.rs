use serde::Serialize;
use tracing::{debug, warn};

use crate::testpad::client::{FolderQuery, TestpadApi};
use crate::testpad::error::TestpadError;
use crate::testpad::model::ProgressCounters;
use crate::traversal::collect_script_ids;

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DashboardStats {
    pub total_projects: usize,
    pub total_scripts: usize,
    pub total_runs: usize,
    pub total_tests: u32,
    pub pass_rate: u32,
    pub progress: ProgressCounters,
}

/// Credential failures abort the whole pass; anything else only loses the
/// project or script it happened on.
fn is_fatal(err: &TestpadError) -> bool {
    matches!(
        err,
        TestpadError::Unauthenticated | TestpadError::InvalidCredential
    )
}

/// Cross-project totals. Script counts cover every script, while runs,
/// tests and progress are sampled from the first `script_limit` scripts of
/// each project to stay under the rate limit.
pub async fn collect_stats(
    api: &dyn TestpadApi,
    script_limit: usize,
) -> Result<DashboardStats, TestpadError> {
    let projects = api.list_projects().await?;
    let mut stats = DashboardStats {
        total_projects: projects.len(),
        ..DashboardStats::default()
    };

    let query = FolderQuery::listing();
    for project in &projects {
        let tree = match api.list_folders(project.id, &query).await {
            Ok(tree) => tree,
            Err(e) if is_fatal(&e) => return Err(e),
            Err(e) => {
                warn!("Skipping project {} in dashboard stats: {}", project.id, e);
                continue;
            }
        };
        let script_ids = collect_script_ids(&tree);
        stats.total_scripts += script_ids.len();

        for script_id in script_ids.into_iter().take(script_limit) {
            match api.get_script(script_id).await {
                Ok(script) => {
                    stats.total_runs += script.runs.len();
                    stats.total_tests = stats.total_tests.saturating_add(script.progress.total);
                    stats.progress.accumulate(&script.progress);
                }
                Err(e) if is_fatal(&e) => return Err(e),
                Err(e) => debug!("Skipping script {} in dashboard stats: {}", script_id, e),
            }
        }
    }

    stats.pass_rate = stats.progress.pass_rate();
    stats.progress.summary = Some(format!("{}% complete", stats.pass_rate));
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testpad::model::{FolderNode, NewScript, Project, Script};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct FakeApi {
        projects: Vec<Project>,
        revoked: bool,
    }

    fn project(id: u64) -> Project {
        serde_json::from_value(json!({"id": id, "name": format!("P{}", id)})).unwrap()
    }

    #[async_trait]
    impl TestpadApi for FakeApi {
        async fn list_projects(&self) -> Result<Vec<Project>, TestpadError> {
            Ok(self.projects.clone())
        }

        async fn list_folders(
            &self,
            project_id: u64,
            _query: &FolderQuery,
        ) -> Result<FolderNode, TestpadError> {
            if project_id == 2 {
                return Err(TestpadError::Api {
                    status: 500,
                    message: "boom".into(),
                });
            }
            let scripts = (1..=3)
                .map(|i| {
                    serde_json::from_value(json!({"id": project_id * 10 + i, "name": "s", "type": "script"}))
                        .unwrap()
                })
                .collect();
            Ok(FolderNode::root(scripts))
        }

        async fn get_folder(
            &self,
            _project_id: u64,
            _folder_id: &str,
            _query: &FolderQuery,
        ) -> Result<FolderNode, TestpadError> {
            unreachable!()
        }

        async fn get_script(&self, script_id: u64) -> Result<Script, TestpadError> {
            if self.revoked {
                return Err(TestpadError::InvalidCredential);
            }
            Ok(serde_json::from_value(json!({
                "id": script_id,
                "name": "s",
                "runs": [{"id": 1}],
                "progress": {"total": 4, "pass": 3, "fail": 1},
            }))
            .unwrap())
        }

        async fn create_folder(
            &self,
            _project_id: u64,
            _name: &str,
            _parent_folder_id: Option<&str>,
        ) -> Result<Value, TestpadError> {
            unreachable!()
        }

        async fn create_script(
            &self,
            _project_id: u64,
            _folder_id: &str,
            _script: &NewScript,
        ) -> Result<Value, TestpadError> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_stats_sample_scripts_and_skip_broken_projects() {
        let api = FakeApi {
            projects: vec![project(1), project(2), project(3)],
            revoked: false,
        };
        let stats = collect_stats(&api, 2).await.unwrap();

        assert_eq!(stats.total_projects, 3);
        assert_eq!(stats.total_scripts, 6);
        assert_eq!(stats.total_runs, 4);
        assert_eq!(stats.total_tests, 16);
        assert_eq!(stats.progress.pass, 12);
        assert_eq!(stats.pass_rate, 75);
        assert_eq!(stats.progress.summary.as_deref(), Some("75% complete"));
    }

    #[tokio::test]
    async fn test_stats_abort_on_rejected_key() {
        let api = FakeApi {
            projects: vec![project(1)],
            revoked: true,
        };
        let err = collect_stats(&api, 10).await.unwrap_err();
        assert_eq!(err, TestpadError::InvalidCredential);
    }

    #[tokio::test]
    async fn test_stats_without_projects() {
        let api = FakeApi {
            projects: vec![],
            revoked: false,
        };
        let stats = collect_stats(&api, 10).await.unwrap();
        assert_eq!(stats, DashboardStats {
            progress: ProgressCounters {
                summary: Some("0% complete".into()),
                ..Default::default()
            },
            ..Default::default()
        });
    }
}
