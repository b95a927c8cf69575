//! Rows persisted by the crawl handlers. Both are upserted by natural key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A repository, keyed by its numeric id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRecord {
    pub id: i64,
    pub owner_login: Option<String>,
    pub owner_id: Option<i64>,
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

/// A commit, keyed by its hash.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub sha: String,
    pub repo_id: i64,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub author_date: Option<DateTime<Utc>>,
    pub committer_name: Option<String>,
    pub committer_email: Option<String>,
    pub committer_date: Option<DateTime<Utc>>,
    pub author_login: Option<String>,
    pub author_id: Option<i64>,
    pub committer_login: Option<String>,
    pub committer_id: Option<i64>,
    pub additions: Option<i64>,
    pub deletions: Option<i64>,
    pub total: Option<i64>,
    /// Line counts restricted to files that look like tests.
    pub test_additions: Option<i64>,
    pub test_deletions: Option<i64>,
    pub test_changes: Option<i64>,
}
