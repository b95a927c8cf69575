//! Repository and commit upserts.

use crate::error::Result;
use crate::model::record::{CommitRecord, RepoRecord};
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

impl super::Db {
    /// Insert a repository, or refresh every attribute if the id exists.
    pub async fn upsert_repo(&self, repo: &RepoRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO repos (id, owner_login, owner_id, name, full_name, language, forks_count, stargazers_count, watchers_count, subscribers_count, size, has_issues, has_wiki, has_pages, has_downloads, pushed_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
             ON CONFLICT (id) DO UPDATE SET
                owner_login = EXCLUDED.owner_login,
                owner_id = EXCLUDED.owner_id,
                name = EXCLUDED.name,
                full_name = EXCLUDED.full_name,
                language = EXCLUDED.language,
                forks_count = EXCLUDED.forks_count,
                stargazers_count = EXCLUDED.stargazers_count,
                watchers_count = EXCLUDED.watchers_count,
                subscribers_count = EXCLUDED.subscribers_count,
                size = EXCLUDED.size,
                has_issues = EXCLUDED.has_issues,
                has_wiki = EXCLUDED.has_wiki,
                has_pages = EXCLUDED.has_pages,
                has_downloads = EXCLUDED.has_downloads,
                pushed_at = EXCLUDED.pushed_at,
                created_at = EXCLUDED.created_at,
                updated_at = EXCLUDED.updated_at",
        )
        .bind(repo.id)
        .bind(&repo.owner_login)
        .bind(repo.owner_id)
        .bind(&repo.name)
        .bind(&repo.full_name)
        .bind(&repo.language)
        .bind(repo.forks_count)
        .bind(repo.stargazers_count)
        .bind(repo.watchers_count)
        .bind(repo.subscribers_count)
        .bind(repo.size)
        .bind(repo.has_issues)
        .bind(repo.has_wiki)
        .bind(repo.has_pages)
        .bind(repo.has_downloads)
        .bind(repo.pushed_at)
        .bind(repo.created_at)
        .bind(repo.updated_at)
        .execute(&self.pool)
        .await?;

        metrics::records_persisted().add(1, &[KeyValue::new("record", "repo")]);
        Ok(())
    }

    /// Insert a commit, or refresh every attribute if the sha exists.
    pub async fn upsert_commit(&self, commit: &CommitRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO commits (sha, repo_id, author_name, author_email, author_date, committer_name, committer_email, committer_date, author_login, author_id, committer_login, committer_id, additions, deletions, total, test_additions, test_deletions, test_changes)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
             ON CONFLICT (sha) DO UPDATE SET
                repo_id = EXCLUDED.repo_id,
                author_name = EXCLUDED.author_name,
                author_email = EXCLUDED.author_email,
                author_date = EXCLUDED.author_date,
                committer_name = EXCLUDED.committer_name,
                committer_email = EXCLUDED.committer_email,
                committer_date = EXCLUDED.committer_date,
                author_login = EXCLUDED.author_login,
                author_id = EXCLUDED.author_id,
                committer_login = EXCLUDED.committer_login,
                committer_id = EXCLUDED.committer_id,
                additions = EXCLUDED.additions,
                deletions = EXCLUDED.deletions,
                total = EXCLUDED.total,
                test_additions = EXCLUDED.test_additions,
                test_deletions = EXCLUDED.test_deletions,
                test_changes = EXCLUDED.test_changes",
        )
        .bind(&commit.sha)
        .bind(commit.repo_id)
        .bind(&commit.author_name)
        .bind(&commit.author_email)
        .bind(commit.author_date)
        .bind(&commit.committer_name)
        .bind(&commit.committer_email)
        .bind(commit.committer_date)
        .bind(&commit.author_login)
        .bind(commit.author_id)
        .bind(&commit.committer_login)
        .bind(commit.committer_id)
        .bind(commit.additions)
        .bind(commit.deletions)
        .bind(commit.total)
        .bind(commit.test_additions)
        .bind(commit.test_deletions)
        .bind(commit.test_changes)
        .execute(&self.pool)
        .await?;

        metrics::records_persisted().add(1, &[KeyValue::new("record", "commit")]);
        Ok(())
    }

    /// Fetch a repository by id.
    pub async fn get_repo(&self, id: i64) -> Result<Option<RepoRecord>> {
        let row: Option<RepoRow> = sqlx::query_as(
            "SELECT id, owner_login, owner_id, name, full_name, language, forks_count, stargazers_count, watchers_count, subscribers_count, size, has_issues, has_wiki, has_pages, has_downloads, pushed_at, created_at, updated_at
             FROM repos WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(RepoRow::into_record))
    }

    /// Count commits stored for a repository.
    pub async fn count_commits(&self, repo_id: i64) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM commits WHERE repo_id = $1")
            .bind(repo_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

/// Internal row type for sqlx::FromRow.
#[derive(sqlx::FromRow)]
struct RepoRow {
    id: i64,
    owner_login: Option<String>,
    owner_id: Option<i64>,
    name: Option<String>,
    full_name: Option<String>,
    language: Option<String>,
    forks_count: Option<i64>,
    stargazers_count: Option<i64>,
    watchers_count: Option<i64>,
    subscribers_count: Option<i64>,
    size: Option<i64>,
    has_issues: Option<bool>,
    has_wiki: Option<bool>,
    has_pages: Option<bool>,
    has_downloads: Option<bool>,
    pushed_at: Option<chrono::DateTime<chrono::Utc>>,
    created_at: Option<chrono::DateTime<chrono::Utc>>,
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl RepoRow {
    fn into_record(self) -> RepoRecord {
        RepoRecord {
            id: self.id,
            owner_login: self.owner_login,
            owner_id: self.owner_id,
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
        }
    }
}
