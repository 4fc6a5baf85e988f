//! Submission files on disk.
//!
//! Every `<slug>.json` in the submissions directory is one record. The file
//! stem is the record key, which validation requires to equal the slug.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use artifact_schema::{ArtifactSubmission, RawRecord};
use serde_json::Value;

/// A record and the file it was read from.
#[derive(Debug, Clone)]
pub struct SubmissionFile {
    pub path: PathBuf,
    pub record: RawRecord,
}

/// Read every `*.json` file in `dir`, sorted by file name.
pub fn read_dir(dir: &Path) -> Result<Vec<SubmissionFile>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read submissions directory: {}", dir.display()))?;

    let mut paths = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("failed to read submissions directory: {}", dir.display()))?
            .path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let key = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .with_context(|| {
                format!("submission file name is not valid UTF-8: {}", path.display())
            })?
            .to_string();
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read submission: {}", path.display()))?;
        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("submission is not valid JSON: {}", path.display()))?;
        files.push(SubmissionFile {
            path,
            record: RawRecord::new(key, value),
        });
    }

    tracing::info!(dir = %dir.display(), count = files.len(), "Found submissions");
    Ok(files)
}

/// Render a submission as it is stored on disk: two-space indented JSON
/// with a trailing newline.
pub fn render(submission: &ArtifactSubmission) -> Result<String> {
    let mut text =
        serde_json::to_string_pretty(submission).context("failed to serialize submission")?;
    text.push('\n');
    Ok(text)
}

/// Whether `submission` differs in content from the record it was read
/// from. Keys the record leaves out that have defaults (`links`, `hidden`,
/// `aliases`, ...) compare equal to those defaults.
pub fn has_changed(original: &RawRecord, submission: &ArtifactSubmission) -> Result<bool> {
    let current = serde_json::to_value(submission).context("failed to serialize submission")?;
    Ok(current != normalized(original)?)
}

/// The record as it serializes once read into its typed form.
fn normalized(record: &RawRecord) -> Result<Value> {
    match serde_json::from_value::<ArtifactSubmission>(record.value.clone()) {
        Ok(typed) => serde_json::to_value(typed).context("failed to serialize submission"),
        // Not a submission at all; compare it as written.
        Err(_) => Ok(record.value.clone()),
    }
}

/// Write `submission` back to `file` if it differs from what was read.
/// Returns whether the file was written.
pub fn write_back(file: &SubmissionFile, submission: &ArtifactSubmission) -> Result<bool> {
    if !has_changed(&file.record, submission)? {
        return Ok(false);
    }
    std::fs::write(&file.path, render(submission)?)
        .with_context(|| format!("failed to write submission: {}", file.path.display()))?;
    tracing::debug!(path = %file.path.display(), "Updated submission");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use artifact_core::AlgorithmRegistry;
    use artifact_schema::{KnownSlugs, Mode, SubmissionValidator};
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "version": 1,
            "slug": "pride-march-photo",
            "title": "Pride march photo",
            "summary": "A photo from a pride march.",
            "files": [{
                "name": "Photo",
                "filename": "photo.jpg",
                "source_url": "https://example.com/photo.jpg",
                "hidden": false,
                "aliases": []
            }],
            "links": [],
            "people": [],
            "identities": [],
            "from_year": 1979,
            "decades": [1970],
            "aliases": []
        })
    }

    fn typed(record: &RawRecord) -> ArtifactSubmission {
        let known = KnownSlugs::from_records(std::slice::from_ref(record));
        let registry = AlgorithmRegistry::builtin();
        SubmissionValidator::new(Mode::Validate, &known, &registry)
            .with_current_year(2024)
            .validate(record)
            .unwrap()
    }

    #[test]
    fn reads_only_json_files_keyed_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pride-march-photo.json"), sample().to_string()).unwrap();
        std::fs::write(dir.path().join("README.md"), "not a submission").unwrap();

        let files = read_dir(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].record.key, "pride-march-photo");
    }

    #[test]
    fn invalid_json_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken-submission.json"), "{").unwrap();
        let err = read_dir(dir.path()).unwrap_err();
        assert!(format!("{err:#}").contains("broken-submission.json"));
    }

    #[test]
    fn unchanged_submission_is_not_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pride-march-photo.json");
        // Compact formatting on disk; only content matters.
        std::fs::write(&path, sample().to_string()).unwrap();

        let file = read_dir(dir.path()).unwrap().remove(0);
        let submission = typed(&file.record);
        assert!(!write_back(&file, &submission).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), sample().to_string());
    }

    #[test]
    fn changed_submission_is_pretty_printed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pride-march-photo.json");
        std::fs::write(&path, sample().to_string()).unwrap();

        let file = read_dir(dir.path()).unwrap().remove(0);
        let mut submission = typed(&file.record);
        submission.id = Some(artifact_core::ArtifactId::new("abcdefABCDEF").unwrap());
        assert!(write_back(&file, &submission).unwrap());

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\n  \"id\": \"abcdefABCDEF\""));
        assert!(text.ends_with("}\n"));
    }

    #[test]
    fn omitted_defaults_are_not_a_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pride-march-photo.json");
        let mut sparse = sample();
        sparse.as_object_mut().unwrap().remove("links");
        sparse.as_object_mut().unwrap().remove("aliases");
        sparse["files"][0].as_object_mut().unwrap().remove("hidden");
        std::fs::write(&path, sparse.to_string()).unwrap();

        let file = read_dir(dir.path()).unwrap().remove(0);
        let submission = typed(&file.record);
        assert!(!has_changed(&file.record, &submission).unwrap());
        assert!(!write_back(&file, &submission).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), sparse.to_string());
    }
}
