//! Link header parsing and response payload conversion.

use autocrawl::error::Error;
use autocrawl::github::ApiResponse;
use autocrawl::github::link::{cursor, query_param, target};
use autocrawl::github::types::{CommitDetail, ListedRepo, Repository, is_test_path};
use serde_json::json;

const LISTING_LINK: &str = "<https://api.github.com/repositories?since=369>; rel=\"next\", <https://api.github.com/repositories{?since}>; rel=\"first\"";
const COMMITS_LINK: &str = "<https://api.github.com/repositories/1300192/commits?page=2>; rel=\"next\", <https://api.github.com/repositories/1300192/commits?page=34>; rel=\"last\"";

// ---------------------------------------------------------------------------
// link header
// ---------------------------------------------------------------------------

#[test]
fn finds_target_by_relation() {
    assert_eq!(
        target(COMMITS_LINK, "last"),
        Some("https://api.github.com/repositories/1300192/commits?page=34")
    );
    assert_eq!(target(LISTING_LINK, "last"), None);
}

#[test]
fn extracts_cursors() {
    assert_eq!(cursor(LISTING_LINK, "next", "since").unwrap(), 369);
    assert_eq!(cursor(COMMITS_LINK, "last", "page").unwrap(), 34);
    assert_eq!(cursor(COMMITS_LINK, "next", "page").unwrap(), 2);
}

#[test]
fn missing_relation_or_parameter_is_a_pagination_error() {
    assert!(matches!(
        cursor(LISTING_LINK, "last", "page"),
        Err(Error::Pagination(_))
    ));
    assert!(matches!(
        cursor(LISTING_LINK, "next", "page"),
        Err(Error::Pagination(_))
    ));
    assert!(matches!(cursor("garbage", "next", "since"), Err(Error::Pagination(_))));
}

#[test]
fn query_param_ignores_non_numeric_values() {
    assert_eq!(query_param("https://x.test/a?page=abc", "page"), None);
    assert_eq!(query_param("https://x.test/a?per_page=10&page=7", "page"), Some(7));
}

#[test]
fn headers_are_case_insensitive() {
    let response = ApiResponse::new(json!([])).with_header("Link", LISTING_LINK);
    assert_eq!(response.header("link"), Some(LISTING_LINK));
    assert_eq!(response.header("LINK"), Some(LISTING_LINK));
    assert_eq!(response.header("etag"), None);
}

// ---------------------------------------------------------------------------
// payloads
// ---------------------------------------------------------------------------

#[test]
fn test_path_heuristic() {
    assert!(is_test_path("test/helper.rb"));
    assert!(is_test_path("src/test_utils.py"));
    assert!(is_test_path("lib/FooTest.java"));
    assert!(is_test_path("spec/my-test.js"));
    assert!(!is_test_path("src/latest.rs"));
    assert!(!is_test_path("src/contest/main.c"));
}

#[test]
fn repository_conversion_keeps_attributes() {
    let repo: Repository = serde_json::from_value(json!({
        "id": 1296269,
        "fork": false,
        "owner": { "login": "octocat", "id": 1 },
        "name": "Hello-World",
        "full_name": "octocat/Hello-World",
        "forks_count": 9,
        "has_wiki": true,
        "created_at": "2011-01-26T19:01:12Z",
        "unknown_field": "ignored"
    }))
    .unwrap();

    let record = repo.into_record().unwrap();
    assert_eq!(record.id, 1296269);
    assert_eq!(record.owner_id, Some(1));
    assert_eq!(record.full_name.as_deref(), Some("octocat/Hello-World"));
    assert_eq!(record.forks_count, Some(9));
    assert_eq!(record.has_wiki, Some(true));
    assert_eq!(record.language, None);
    assert!(record.created_at.is_some());
    assert!(record.pushed_at.is_none());
}

#[test]
fn repository_conversion_rejects_forks_and_missing_ids() {
    let fork: Repository = serde_json::from_value(json!({ "id": 1, "fork": true })).unwrap();
    assert!(matches!(fork.into_record(), Err(Error::Validation(_))));

    let anonymous: Repository = serde_json::from_value(json!({ "id": null })).unwrap();
    assert!(matches!(anonymous.into_record(), Err(Error::Validation(_))));
}

#[test]
fn listed_repo_usability() {
    let usable: ListedRepo =
        serde_json::from_value(json!({ "name": "a", "owner": { "login": "o" } })).unwrap();
    let target = usable.usable().unwrap();
    assert_eq!((target.owner.as_str(), target.repo.as_str()), ("o", "a"));

    let fork: ListedRepo =
        serde_json::from_value(json!({ "name": "a", "owner": { "login": "o" }, "fork": true }))
            .unwrap();
    assert!(fork.usable().is_none());

    let ownerless: ListedRepo = serde_json::from_value(json!({ "name": "a" })).unwrap();
    assert!(ownerless.usable().is_none());
}

#[test]
fn commit_conversion_sums_test_files() {
    let detail: CommitDetail = serde_json::from_value(json!({
        "sha": "6dcb09b5",
        "commit": {
            "author": { "name": "Monalisa", "email": "m@github.com", "date": "2011-04-14T16:00:49Z" }
        },
        "author": { "login": "octocat", "id": 1 },
        "stats": { "additions": 104, "deletions": 4, "total": 108 },
        "files": [
            { "filename": "file1.txt", "additions": 100, "deletions": 2, "changes": 102 },
            { "filename": "test/file1_test.txt", "additions": 3, "deletions": 1, "changes": 4 },
            { "filename": "src/ParserTest.java", "additions": 1, "deletions": 1, "changes": 2 }
        ]
    }))
    .unwrap();

    let record = detail.into_record(7).unwrap();
    assert_eq!(record.sha, "6dcb09b5");
    assert_eq!(record.repo_id, 7);
    assert_eq!(record.author_name.as_deref(), Some("Monalisa"));
    assert_eq!(record.committer_name, None);
    assert_eq!(record.author_id, Some(1));
    assert_eq!(record.additions, Some(104));
    assert_eq!(record.test_additions, Some(4));
    assert_eq!(record.test_deletions, Some(2));
    assert_eq!(record.test_changes, Some(6));
}

#[test]
fn commit_without_files_has_no_test_counts() {
    let detail: CommitDetail = serde_json::from_value(json!({ "sha": "abc" })).unwrap();
    let record = detail.into_record(7).unwrap();
    assert_eq!(record.additions, None);
    assert_eq!(record.test_changes, None);

    let missing: CommitDetail = serde_json::from_value(json!({ "sha": null })).unwrap();
    assert!(matches!(missing.into_record(7), Err(Error::Validation(_))));
}
