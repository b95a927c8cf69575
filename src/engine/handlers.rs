//! Work item handlers.
//!
//! Every handler has the same shape: fetch, validate, persist, spawn
//! children, report, wait on the completion set, then clean up. The two
//! listing handlers also drive pagination by spawning a continuation of
//! themselves with an advanced cursor.

use opentelemetry::KeyValue;
use serde_json::json;
use tracing::{Instrument, debug, error, info, warn};
use uuid::Uuid;

use super::signal::{self, Completion};
use super::Engine;
use crate::audit::{ActionEntry, ActionStatus};
use crate::error::{Error, Result};
use crate::github::link;
use crate::github::types::{CommitDetail, CommitSummary, ListedRepo, Repository};
use crate::model::work::{
    CommitPageCursor, CommitTarget, RepoListCursor, RepoRef, RepoTarget, Task, WorkItem, WorkKind,
};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_outcome, start_work_span};

/// Run one work item to completion, including cleanup.
pub(super) async fn run(engine: Engine, item: WorkItem) {
    let span = start_work_span(item.kind().as_str(), &item.uuid());

    async {
        let mut completion = Completion::new();
        let result = execute(&engine, &item, &mut completion).await;

        let outcome = match result {
            Ok(()) => {
                completion.push(engine.report(ActionEntry::succeeded(&item)));
                completion.wait().await;
                ActionStatus::Succeeded
            }
            Err(e) => {
                warn!(uuid = %item.uuid(), kind = %item.kind(), error = %e, "work item failed");
                completion.push(engine.report(ActionEntry::failed(&item, &e)));
                completion.wait().await;
                if e.is_transient() {
                    defer(&engine, &item).await
                } else {
                    ActionStatus::Failed
                }
            }
        };

        record_outcome(&tracing::Span::current(), &outcome.to_string());
        metrics::work_finished().add(
            1,
            &[
                KeyValue::new("kind", item.kind().as_str()),
                KeyValue::new("result", outcome.to_string()),
            ],
        );

        engine.inner.bus.emit(&signal::done(item.uuid()));
        engine.cleanup();
    }
    .instrument(span)
    .await
}

/// Queue a transiently failed item, keeping its uuid, and audit the deferral.
async fn defer(engine: &Engine, item: &WorkItem) -> ActionStatus {
    let payload = json!({ "uuid": item.uuid(), "kind": item.kind() });
    let entry = ActionEntry::new(
        Uuid::new_v4(),
        WorkKind::DeferredTask,
        ActionStatus::Deferred,
        payload,
    );

    let (status, entry) = match engine.inner.queue.enqueue(item).await {
        Ok(_) => {
            info!(uuid = %item.uuid(), kind = %item.kind(), "work item deferred");
            (ActionStatus::Deferred, entry)
        }
        Err(e) => {
            error!(uuid = %item.uuid(), kind = %item.kind(), error = %e, "failed to defer work item");
            let entry = ActionEntry {
                status: ActionStatus::Failed,
                ..entry
            };
            (ActionStatus::Failed, entry.with_error(e.to_string()))
        }
    };

    engine.report(entry).await;
    status
}

async fn execute(engine: &Engine, item: &WorkItem, completion: &mut Completion) -> Result<()> {
    match &item.task {
        Task::FetchRepo(target) => fetch_repo(engine, target, completion).await,
        Task::FetchRepoList(cursor) => fetch_repo_list(engine, cursor, completion).await,
        Task::FetchLastCommitPage(target) => {
            fetch_last_commit_page(engine, target, completion).await
        }
        Task::FetchCommitPage(cursor) => fetch_commit_page(engine, cursor, completion).await,
        Task::FetchCommit(target) => fetch_commit(engine, target).await,
    }
}

fn api_base(engine: &Engine) -> &str {
    &engine.inner.config.api_base
}

async fn fetch_repo(engine: &Engine, target: &RepoRef, completion: &mut Completion) -> Result<()> {
    let url = format!("{}/repos/{}/{}", api_base(engine), target.owner, target.repo);
    let response = engine.inner.api.get(&url).await?;
    let record = response.json::<Repository>()?.into_record()?;

    engine.inner.store.upsert_repo(&record).await?;
    debug!(repo_id = record.id, owner = %target.owner, repo = %target.repo, "repository stored");

    engine.spawn_child(
        completion,
        Task::FetchLastCommitPage(RepoTarget {
            repo_id: record.id,
            owner: target.owner.clone(),
            repo: target.repo.clone(),
        }),
    );
    Ok(())
}

async fn fetch_repo_list(
    engine: &Engine,
    cursor: &RepoListCursor,
    completion: &mut Completion,
) -> Result<()> {
    let url = format!("{}/repositories?since={}", api_base(engine), cursor.since);
    let response = engine.inner.api.get(&url).await?;
    let Some(listed) = response.page::<ListedRepo>()? else {
        warn!(since = cursor.since, "repository listing is not a list");
        return Ok(());
    };

    let mut found = 0u64;
    for target in listed.into_iter().filter_map(ListedRepo::usable) {
        engine.spawn_child(completion, Task::FetchRepo(target));
        found += 1;
    }
    let repos_count = cursor.repos_count + found;

    let header = response
        .header("link")
        .ok_or_else(|| Error::Pagination("repository listing has no link header".into()))?;
    let since = link::cursor(header, "next", "since")?;

    if repos_count < engine.inner.config.max_repos {
        engine.spawn_child(
            completion,
            Task::FetchRepoList(RepoListCursor { since, repos_count }),
        );
    } else {
        info!(repos_count, "repository budget reached");
    }
    Ok(())
}

async fn fetch_last_commit_page(
    engine: &Engine,
    target: &RepoTarget,
    completion: &mut Completion,
) -> Result<()> {
    let url = format!(
        "{}/repos/{}/{}/commits",
        api_base(engine),
        target.owner,
        target.repo
    );
    let response = engine.inner.api.get(&url).await?;

    // No link header: everything fits on one page, or there are no commits.
    let Some(header) = response.header("link") else {
        debug!(repo_id = target.repo_id, "no commit pagination");
        return Ok(());
    };
    let last = link::cursor(header, "last", "page")?;
    let page = u32::try_from(last)
        .map_err(|_| Error::Pagination(format!("last page {last} out of range")))?;

    engine.spawn_child(
        completion,
        Task::FetchCommitPage(CommitPageCursor {
            repo_id: target.repo_id,
            owner: target.owner.clone(),
            repo: target.repo.clone(),
            page,
            commit_count: 0,
        }),
    );
    Ok(())
}

async fn fetch_commit_page(
    engine: &Engine,
    cursor: &CommitPageCursor,
    completion: &mut Completion,
) -> Result<()> {
    let url = format!(
        "{}/repositories/{}/commits?page={}",
        api_base(engine),
        cursor.repo_id,
        cursor.page
    );
    let response = engine.inner.api.get(&url).await?;
    let commits = response.page::<CommitSummary>()?.unwrap_or_default();
    if commits.is_empty() {
        debug!(repo_id = cursor.repo_id, page = cursor.page, "empty commit page");
        return Ok(());
    }

    let mut found = 0u64;
    for sha in commits.into_iter().filter_map(|c| c.sha.filter(|s| !s.is_empty())) {
        engine.spawn_child(
            completion,
            Task::FetchCommit(CommitTarget {
                repo_id: cursor.repo_id,
                owner: cursor.owner.clone(),
                repo: cursor.repo.clone(),
                sha,
            }),
        );
        found += 1;
    }
    let commit_count = cursor.commit_count + found;

    if cursor.page > 1 && commit_count < engine.inner.config.max_commits {
        engine.spawn_child(
            completion,
            Task::FetchCommitPage(CommitPageCursor {
                page: cursor.page - 1,
                commit_count,
                ..cursor.clone()
            }),
        );
    } else {
        debug!(repo_id = cursor.repo_id, page = cursor.page, commit_count, "commit traversal finished");
    }
    Ok(())
}

async fn fetch_commit(engine: &Engine, target: &CommitTarget) -> Result<()> {
    let url = format!(
        "{}/repos/{}/{}/commits/{}",
        api_base(engine),
        target.owner,
        target.repo,
        target.sha
    );
    let response = engine.inner.api.get(&url).await?;
    let record = response.json::<CommitDetail>()?.into_record(target.repo_id)?;

    engine.inner.store.upsert_commit(&record).await?;
    debug!(repo_id = target.repo_id, sha = %record.sha, "commit stored");
    Ok(())
}
