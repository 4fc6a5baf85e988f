//! Cross-record validation over a whole batch.

use artifact_core::{AlgorithmRegistry, ArtifactId};
use artifact_schema::{
    ArtifactSubmission, BatchValidationError, KnownSlugs, Mode, RawRecord, Submission,
    SubmissionValidator, ViolationKind,
};
use serde_json::{json, Value};

fn submission(slug: &str, aliases: &[&str]) -> Value {
    json!({
        "version": 1,
        "slug": slug,
        "title": "A title",
        "summary": "A summary.",
        "files": [{
            "name": "Scan",
            "filename": "scan.png",
            "source_url": format!("https://example.com/{slug}.png"),
            "hidden": false,
            "aliases": []
        }],
        "links": [],
        "people": [],
        "identities": [],
        "from_year": 1990,
        "decades": [1990],
        "aliases": aliases
    })
}

fn run(records: &[RawRecord]) -> Result<Vec<ArtifactSubmission>, BatchValidationError> {
    run_with(KnownSlugs::from_records(records), records)
}

fn run_with(
    known: KnownSlugs,
    records: &[RawRecord],
) -> Result<Vec<ArtifactSubmission>, BatchValidationError> {
    let registry = AlgorithmRegistry::builtin();
    SubmissionValidator::new(Mode::Validate, &known, &registry)
        .with_current_year(2024)
        .validate_batch(records)
}

#[test]
fn distinct_slugs_validate() {
    let records = vec![
        RawRecord::new("first-artifact-slug", submission("first-artifact-slug", &[])),
        RawRecord::new(
            "second-artifact-slug",
            submission("second-artifact-slug", &["old-second-slug"]),
        ),
    ];
    let submissions = run(&records).unwrap();
    assert_eq!(submissions.len(), 2);
    assert!(submissions
        .into_iter()
        .all(|s| matches!(s.classify(), Submission::Incomplete(_))));
}

#[test]
fn same_slug_in_two_records_fails_both() {
    // Two files claiming one slug: the second file's name no longer matches.
    let records = vec![
        RawRecord::new("shared-artifact-slug", submission("shared-artifact-slug", &[])),
        RawRecord::new("copied-artifact-slug", submission("shared-artifact-slug", &[])),
    ];
    let err = run(&records).unwrap_err();
    assert_eq!(err.total, 2);
    assert_eq!(err.failures.len(), 2);
    assert!(err.failures.iter().all(|f| f.has_duplicate_slug()));
}

#[test]
fn slug_colliding_with_another_alias_fails() {
    let records = vec![
        RawRecord::new("first-artifact-slug", submission("first-artifact-slug", &[])),
        RawRecord::new(
            "second-artifact-slug",
            submission("second-artifact-slug", &["first-artifact-slug"]),
        ),
    ];
    let err = run(&records).unwrap_err();
    let records_failed: Vec<_> = err.failures.iter().map(|f| f.record.as_str()).collect();
    assert_eq!(records_failed, vec!["first-artifact-slug", "second-artifact-slug"]);
    for failure in &err.failures {
        assert!(failure
            .violations
            .iter()
            .all(|v| v.kind == ViolationKind::DuplicateSlug));
    }
}

#[test]
fn every_failing_record_is_reported() {
    let mut broken = submission("broken-artifact-slug", &[]);
    broken["decades"] = json!([1980]);
    let mut also_broken = submission("another-broken-slug", &[]);
    also_broken["version"] = json!(2);

    let records = vec![
        RawRecord::new("broken-artifact-slug", broken),
        RawRecord::new("fine-artifact-slug", submission("fine-artifact-slug", &[])),
        RawRecord::new("another-broken-slug", also_broken),
    ];
    let err = run(&records).unwrap_err();
    assert_eq!(err.failures.len(), 2);
    assert_eq!(err.to_string(), "2 of 3 submission(s) failed validation");
}

#[test]
fn same_id_in_two_records_fails_both() {
    let mut first = submission("first-artifact-slug", &[]);
    first["id"] = json!("AAAAAAAAAAAA");
    let mut second = submission("second-artifact-slug", &[]);
    second["id"] = json!("AAAAAAAAAAAA");

    let records = vec![
        RawRecord::new("first-artifact-slug", first),
        RawRecord::new("second-artifact-slug", second),
    ];
    let err = run(&records).unwrap_err();
    assert_eq!(err.failures.len(), 2);
    for failure in &err.failures {
        assert!(failure.has_kind(ViolationKind::DuplicateId));
        assert_eq!(failure.violations[0].path, "id");
    }
}

#[test]
fn historical_id_already_declared_in_batch_fails() {
    let mut first = submission("first-artifact-slug", &[]);
    first["id"] = json!("XXXXXXXXXXXX");
    let records = vec![
        RawRecord::new("first-artifact-slug", first),
        RawRecord::new("second-artifact-slug", submission("second-artifact-slug", &[])),
    ];
    let known = KnownSlugs::from_records(&records).with_history([(
        "second-artifact-slug".to_string(),
        ArtifactId::new("XXXXXXXXXXXX").unwrap(),
    )]);

    let err = run_with(known, &records).unwrap_err();
    let failed: Vec<_> = err.failures.iter().map(|f| f.record.as_str()).collect();
    assert_eq!(failed, vec!["second-artifact-slug"]);
    assert!(err.failures[0].has_kind(ViolationKind::DuplicateId));
}
