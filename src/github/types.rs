//! Response payloads and their conversion into persisted records.
//!
//! Every field is optional: the API omits or nulls fields freely, and only
//! the natural keys (repository id, commit sha) are required to persist.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::model::record::{CommitRecord, RepoRecord};
use crate::model::work::RepoRef;

/// Paths that look like test code.
static TEST_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(^test|[^a-zA-Z]test|Test)").expect("valid test-path regex"));

/// Does this file path look like a test?
pub fn is_test_path(path: &str) -> bool {
    TEST_PATH.is_match(path)
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Account {
    pub login: Option<String>,
    pub id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Repositories
// ---------------------------------------------------------------------------

/// `GET /repos/{owner}/{repo}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Repository {
    pub id: Option<i64>,
    pub fork: Option<bool>,
    pub owner: Option<Account>,
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub language: Option<String>,
    pub forks_count: Option<i64>,
    pub stargazers_count: Option<i64>,
    pub watchers_count: Option<i64>,
    pub subscribers_count: Option<i64>,
    pub size: Option<i64>,
    pub has_issues: Option<bool>,
    pub has_wiki: Option<bool>,
    pub has_pages: Option<bool>,
    pub has_downloads: Option<bool>,
    pub pushed_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Repository {
    /// Validate and convert. Forks and id-less responses are rejected.
    pub fn into_record(self) -> Result<RepoRecord> {
        if self.fork == Some(true) {
            return Err(Error::Validation("forked repositories are not crawled".into()));
        }
        let id = self
            .id
            .ok_or_else(|| Error::Validation("repository response has no id".into()))?;
        let owner = self.owner.unwrap_or_default();

        Ok(RepoRecord {
            id,
            owner_login: owner.login,
            owner_id: owner.id,
            name: self.name,
            full_name: self.full_name,
            language: self.language,
            forks_count: self.forks_count,
            stargazers_count: self.stargazers_count,
            watchers_count: self.watchers_count,
            subscribers_count: self.subscribers_count,
            size: self.size,
            has_issues: self.has_issues,
            has_wiki: self.has_wiki,
            has_pages: self.has_pages,
            has_downloads: self.has_downloads,
            pushed_at: self.pushed_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// One entry of `GET /repositories?since=`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ListedRepo {
    pub name: Option<String>,
    pub fork: Option<bool>,
    pub owner: Option<Account>,
}

impl ListedRepo {
    /// The entry as a crawl target, unless it is a fork or lacks a name or owner.
    pub fn usable(self) -> Option<RepoRef> {
        if self.fork == Some(true) {
            return None;
        }
        let owner = self.owner?.login.filter(|l| !l.is_empty())?;
        let repo = self.name.filter(|n| !n.is_empty())?;
        Some(RepoRef { owner, repo })
    }
}

// ---------------------------------------------------------------------------
// Commits
// ---------------------------------------------------------------------------

/// One entry of a commit listing page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommitSummary {
    pub sha: Option<String>,
}

/// `GET /repos/{owner}/{repo}/commits/{sha}`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommitDetail {
    pub sha: Option<String>,
    pub commit: Option<GitCommit>,
    pub author: Option<Account>,
    pub committer: Option<Account>,
    pub stats: Option<CommitStats>,
    pub files: Option<Vec<CommitFile>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GitCommit {
    pub author: Option<Signature>,
    pub committer: Option<Signature>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Signature {
    pub name: Option<String>,
    pub email: Option<String>,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommitStats {
    pub additions: Option<i64>,
    pub deletions: Option<i64>,
    pub total: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CommitFile {
    pub filename: Option<String>,
    pub additions: Option<i64>,
    pub deletions: Option<i64>,
    pub changes: Option<i64>,
}

impl CommitDetail {
    /// Validate and convert. A commit without a sha cannot be keyed.
    pub fn into_record(self, repo_id: i64) -> Result<CommitRecord> {
        let sha = self
            .sha
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::Validation("commit response has no sha".into()))?;

        let git = self.commit.unwrap_or_default();
        let author = git.author.unwrap_or_default();
        let committer = git.committer.unwrap_or_default();
        let author_account = self.author.unwrap_or_default();
        let committer_account = self.committer.unwrap_or_default();
        let stats = self.stats;

        let test_files: Option<Vec<CommitFile>> = self.files.map(|files| {
            files
                .into_iter()
                .filter(|f| f.filename.as_deref().is_some_and(is_test_path))
                .collect()
        });
        let test_sum = |field: fn(&CommitFile) -> Option<i64>| {
            test_files
                .as_ref()
                .map(|files| files.iter().map(|f| field(f).unwrap_or(0)).sum())
        };

        Ok(CommitRecord {
            sha,
            repo_id,
            author_name: author.name,
            author_email: author.email,
            author_date: author.date,
            committer_name: committer.name,
            committer_email: committer.email,
            committer_date: committer.date,
            author_login: author_account.login,
            author_id: author_account.id,
            committer_login: committer_account.login,
            committer_id: committer_account.id,
            additions: stats.as_ref().map(|s| s.additions.unwrap_or(0)),
            deletions: stats.as_ref().map(|s| s.deletions.unwrap_or(0)),
            total: stats.as_ref().map(|s| s.total.unwrap_or(0)),
            test_additions: test_sum(|f| f.additions),
            test_deletions: test_sum(|f| f.deletions),
            test_changes: test_sum(|f| f.changes),
        })
    }
}
