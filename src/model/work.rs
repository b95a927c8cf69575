//! Work items and their durable (deferred) form.
//!
//! A work item is one unit of remote-API work. Its payload is the traversal
//! state a handler needs (names, ids, cursors and running counts against the
//! crawl budgets); its meta carries the correlation uuid that namespaces the
//! item's completion signals.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of orchestrated work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub task: Task,
    pub meta: Meta,
}

/// Correlation metadata. Minted once when the item is created and kept
/// across deferral, so a replayed item signals under its original uuid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Meta {
    pub uuid: Uuid,
}

impl WorkItem {
    /// Create a work item with a fresh correlation uuid.
    pub fn new(task: Task) -> Self {
        Self {
            task,
            meta: Meta {
                uuid: Uuid::new_v4(),
            },
        }
    }

    pub fn kind(&self) -> WorkKind {
        self.task.kind()
    }

    pub fn uuid(&self) -> Uuid {
        self.meta.uuid
    }

    /// Serialize to the JSON text stored in the deferred queue.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Kind-specific payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload")]
pub enum Task {
    FetchRepo(RepoRef),
    FetchRepoList(RepoListCursor),
    FetchLastCommitPage(RepoTarget),
    FetchCommitPage(CommitPageCursor),
    FetchCommit(CommitTarget),
}

impl Task {
    pub fn kind(&self) -> WorkKind {
        match self {
            Task::FetchRepo(_) => WorkKind::FetchRepo,
            Task::FetchRepoList(_) => WorkKind::FetchRepoList,
            Task::FetchLastCommitPage(_) => WorkKind::FetchLastCommitPage,
            Task::FetchCommitPage(_) => WorkKind::FetchCommitPage,
            Task::FetchCommit(_) => WorkKind::FetchCommit,
        }
    }
}

/// A repository addressed by owner and name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

/// Position in the global repository listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoListCursor {
    /// Listing cursor: repositories with an id greater than this.
    pub since: i64,
    /// Usable repositories discovered so far along this traversal.
    pub repos_count: u64,
}

/// A repository whose numeric id is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoTarget {
    pub repo_id: i64,
    pub owner: String,
    pub repo: String,
}

/// Position in a repository's commit listing. Traversal walks backward
/// from the last page toward page 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitPageCursor {
    pub repo_id: i64,
    pub owner: String,
    pub repo: String,
    pub page: u32,
    /// Commits discovered so far along this traversal.
    pub commit_count: u64,
}

/// One commit of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitTarget {
    pub repo_id: i64,
    pub owner: String,
    pub repo: String,
    pub sha: String,
}

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// Every kind of item the engine schedules, including the two
/// unparameterized lifecycle items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkKind {
    FetchRepo,
    FetchRepoList,
    FetchLastCommitPage,
    FetchCommitPage,
    FetchCommit,
    DeferredTask,
    DoCleanup,
    EndProcess,
}

impl WorkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkKind::FetchRepo => "FetchRepo",
            WorkKind::FetchRepoList => "FetchRepoList",
            WorkKind::FetchLastCommitPage => "FetchLastCommitPage",
            WorkKind::FetchCommitPage => "FetchCommitPage",
            WorkKind::FetchCommit => "FetchCommit",
            WorkKind::DeferredTask => "DeferredTask",
            WorkKind::DoCleanup => "DoCleanup",
            WorkKind::EndProcess => "EndProcess",
        }
    }
}

impl std::fmt::Display for WorkKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WorkKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "FetchRepo" => Ok(WorkKind::FetchRepo),
            "FetchRepoList" => Ok(WorkKind::FetchRepoList),
            "FetchLastCommitPage" => Ok(WorkKind::FetchLastCommitPage),
            "FetchCommitPage" => Ok(WorkKind::FetchCommitPage),
            "FetchCommit" => Ok(WorkKind::FetchCommit),
            "DeferredTask" => Ok(WorkKind::DeferredTask),
            "DoCleanup" => Ok(WorkKind::DoCleanup),
            "EndProcess" => Ok(WorkKind::EndProcess),
            other => Err(Error::Other(format!("unknown work kind: {other}"))),
        }
    }
}

// ---------------------------------------------------------------------------
// Deferred records
// ---------------------------------------------------------------------------

/// A work item waiting in the durable queue for a later attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeferredRecord {
    /// Queue-assigned id, used for claim-by-delete. Distinct from the
    /// item's correlation uuid.
    pub id: i64,
    pub kind: String,
    pub payload: String,
}

impl DeferredRecord {
    /// Parse the stored payload back into the original work item.
    pub fn decode(&self) -> Result<WorkItem> {
        WorkItem::from_json(&self.payload)
    }
}

/// A deferred record before the queue has assigned it an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDeferred {
    pub uuid: Uuid,
    pub kind: String,
    pub payload: String,
}

impl NewDeferred {
    pub fn from_item(item: &WorkItem) -> Result<Self> {
        Ok(Self {
            uuid: item.uuid(),
            kind: item.kind().to_string(),
            payload: item.to_json()?,
        })
    }
}
