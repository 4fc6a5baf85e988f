//! # Submission Validation
//!
//! [`SubmissionValidator`] turns a [`RawRecord`] into a typed
//! [`ArtifactSubmission`], checking per-field rules and the cross-record
//! rules that need the batch-wide [`KnownSlugs`] snapshot.
//!
//! Validation walks the open JSON value directly so that it can keep going
//! after the first problem: every violated rule in a record is reported in
//! one [`SchemaValidationError`]. Only a record with no violations is
//! deserialized into the typed form.
//!
//! ## Modes
//!
//! In [`Mode::Validate`] a file's `multihash` and the record's `id` are
//! optional; completion fills them in. In [`Mode::Upload`] every file must
//! already carry a `multihash`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use artifact_core::{
    AlgorithmRegistry, ArtifactId, Digest, FileName, LanguageTag, MediaType, Slug,
};
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use url::Url;

use crate::decades::decades_spanned;
use crate::known::KnownSlugs;
use crate::raw::RawRecord;
use crate::submission::{ArtifactSubmission, SUBMISSION_VERSION};

const MAX_TITLE_LEN: usize = 100;
const MAX_SUMMARY_LEN: usize = 150;
const MAX_DESCRIPTION_LEN: usize = 1000;
const MAX_NAME_LEN: usize = 100;

const RECORD_FIELDS: &[&str] = &[
    "version",
    "id",
    "slug",
    "title",
    "summary",
    "description",
    "files",
    "links",
    "people",
    "identities",
    "from_year",
    "to_year",
    "decades",
    "aliases",
];

const FILE_FIELDS: &[&str] = &[
    "name",
    "filename",
    "media_type",
    "multihash",
    "source_url",
    "lang",
    "hidden",
    "aliases",
];

const LINK_FIELDS: &[&str] = &["name", "url"];

// ---------------------------------------------------------------------------
// Mode
// ---------------------------------------------------------------------------

/// Which phase of the pipeline the records are being validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Records may lack generated fields.
    Validate,
    /// Every file must carry a digest.
    Upload,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validate => f.write_str("validate"),
            Self::Upload => f.write_str("upload"),
        }
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "validate" => Ok(Self::Validate),
            "upload" => Ok(Self::Upload),
            other => Err(format!("unknown mode \"{other}\" (expected validate or upload)")),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Category of a violated rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViolationKind {
    /// A per-field format, presence, or range rule.
    Constraint,
    /// A slug or alias collides with another record or with history.
    DuplicateSlug,
    /// Two records in the batch would publish under the same artifact id.
    DuplicateId,
    /// Two files share a source URL but declare different digests.
    ContradictoryFiles,
    /// A digest is malformed or uses an unsupported algorithm.
    Digest,
}

/// One violated rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Location of the offending value, e.g. `files[1].filename`.
    pub path: String,
    /// Human-readable description of the problem.
    pub message: String,
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.path, self.message)
        }
    }
}

fn join_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(Violation::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Every rule a single record violates.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{record}: {} violation(s): {}", .violations.len(), join_violations(.violations))]
pub struct SchemaValidationError {
    /// Key of the offending record.
    pub record: String,
    pub violations: Vec<Violation>,
}

impl SchemaValidationError {
    /// Whether any violation is a slug collision.
    pub fn has_duplicate_slug(&self) -> bool {
        self.violations
            .iter()
            .any(|v| v.kind == ViolationKind::DuplicateSlug)
    }

    pub fn has_kind(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }
}

/// Failures across a whole batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} of {total} submission(s) failed validation", .failures.len())]
pub struct BatchValidationError {
    pub failures: Vec<SchemaValidationError>,
    /// Number of records in the batch.
    pub total: usize,
}

// ---------------------------------------------------------------------------
// Violation collector
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Violations(Vec<Violation>);

impl Violations {
    fn push(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.push_kind(path, message, ViolationKind::Constraint);
    }

    fn push_kind(
        &mut self,
        path: impl Into<String>,
        message: impl Into<String>,
        kind: ViolationKind,
    ) {
        self.0.push(Violation {
            path: path.into(),
            message: message.into(),
            kind,
        });
    }

    fn unknown_fields(&mut self, path: &str, object: &Map<String, Value>, allowed: &[&str]) {
        for key in object.keys() {
            if !allowed.contains(&key.as_str()) {
                self.push(join(path, key), "unknown field");
            }
        }
    }

    /// A required string field. Returns the trimmed value.
    fn text<'v>(
        &mut self,
        object: &'v Map<String, Value>,
        path: &str,
        field: &str,
        max_len: Option<usize>,
    ) -> Option<&'v str> {
        let path = join(path, field);
        match object.get(field) {
            None | Some(Value::Null) => {
                self.push(path, "is required");
                None
            }
            Some(value) => self.text_value(value, path, max_len),
        }
    }

    fn optional_text<'v>(
        &mut self,
        object: &'v Map<String, Value>,
        path: &str,
        field: &str,
        max_len: Option<usize>,
    ) -> Option<&'v str> {
        match object.get(field) {
            None | Some(Value::Null) => None,
            Some(value) => self.text_value(value, join(path, field), max_len),
        }
    }

    fn text_value<'v>(
        &mut self,
        value: &'v Value,
        path: String,
        max_len: Option<usize>,
    ) -> Option<&'v str> {
        let Some(s) = value.as_str() else {
            self.push(path, "must be a string");
            return None;
        };
        let trimmed = s.trim();
        if trimmed.is_empty() {
            self.push(path, "must not be empty");
            return None;
        }
        if let Some(max) = max_len {
            let len = trimmed.chars().count();
            if len > max {
                self.push(path, format!("must be at most {max} characters, found {len}"));
                return None;
            }
        }
        Some(trimmed)
    }

    fn integer(&mut self, value: Option<&Value>, path: String) -> Option<i32> {
        match value {
            None | Some(Value::Null) => None,
            Some(v) => match v.as_i64().and_then(|n| i32::try_from(n).ok()) {
                Some(n) => Some(n),
                None => {
                    self.push(path, "must be an integer");
                    None
                }
            },
        }
    }

    /// An optional array field. Returns an empty slice when absent.
    fn array<'v>(
        &mut self,
        object: &'v Map<String, Value>,
        path: &str,
        field: &str,
    ) -> &'v [Value] {
        match object.get(field) {
            None | Some(Value::Null) => &[],
            Some(Value::Array(items)) => items,
            Some(_) => {
                self.push(join(path, field), "must be an array");
                &[]
            }
        }
    }

    /// An array of unique strings.
    fn unique_strings<'v>(
        &mut self,
        object: &'v Map<String, Value>,
        path: &str,
        field: &str,
    ) -> Vec<(String, &'v str)> {
        let mut seen = BTreeSet::new();
        let mut out = Vec::new();
        for (i, item) in self.array(object, path, field).iter().enumerate() {
            let item_path = format!("{}[{i}]", join(path, field));
            let Some(s) = item.as_str() else {
                self.push(item_path, "must be a string");
                continue;
            };
            if !seen.insert(s) {
                self.push(item_path, format!("duplicate entry \"{s}\""));
                continue;
            }
            out.push((item_path, s));
        }
        out
    }
}

fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{path}.{field}")
    }
}

// ---------------------------------------------------------------------------
// SubmissionValidator
// ---------------------------------------------------------------------------

/// Validates raw records against the submission rules.
#[derive(Debug, Clone, Copy)]
pub struct SubmissionValidator<'a> {
    mode: Mode,
    current_year: i32,
    known: &'a KnownSlugs,
    registry: &'a AlgorithmRegistry,
}

/// What the file checks learned about one file, for cross-file rules.
struct FileFacts<'v> {
    path: String,
    names: Vec<&'v str>,
    source_url: Option<&'v str>,
    digest: Option<Digest>,
}

impl<'a> SubmissionValidator<'a> {
    /// A validator that checks years against the current UTC year.
    pub fn new(mode: Mode, known: &'a KnownSlugs, registry: &'a AlgorithmRegistry) -> Self {
        Self {
            mode,
            current_year: chrono::Utc::now().year(),
            known,
            registry,
        }
    }

    /// Override the year used as the upper bound for `from_year`/`to_year`.
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Validate one record, reporting every violated rule.
    pub fn validate(
        &self,
        record: &RawRecord,
    ) -> Result<ArtifactSubmission, SchemaValidationError> {
        let mut v = Violations::default();
        self.check_record(record, &mut v);

        if v.0.is_empty() {
            match serde_json::from_value::<ArtifactSubmission>(record.value.clone()) {
                Ok(submission) => return Ok(normalize(submission)),
                Err(e) => v.push("", format!("could not be read as a submission: {e}")),
            }
        }

        Err(SchemaValidationError {
            record: record.key.clone(),
            violations: v.0,
        })
    }

    /// Validate every record in the batch.
    ///
    /// All records are checked even after one fails, so the error lists
    /// every failing record at once.
    pub fn validate_batch(
        &self,
        records: &[RawRecord],
    ) -> Result<Vec<ArtifactSubmission>, BatchValidationError> {
        let mut submissions = Vec::with_capacity(records.len());
        let mut failures = Vec::new();

        for record in records {
            match self.validate(record) {
                Ok(submission) => submissions.push(submission),
                Err(e) => {
                    for violation in &e.violations {
                        tracing::warn!(record = %record.key, "{violation}");
                    }
                    failures.push(e);
                }
            }
        }

        if failures.is_empty() {
            tracing::info!(mode = %self.mode, count = submissions.len(), "Validated submissions");
            Ok(submissions)
        } else {
            Err(BatchValidationError {
                failures,
                total: records.len(),
            })
        }
    }

    fn check_record(&self, record: &RawRecord, v: &mut Violations) {
        let Some(object) = record.value.as_object() else {
            v.push("", "submission must be a JSON object");
            return;
        };
        v.unknown_fields("", object, RECORD_FIELDS);

        match v.integer(object.get("version"), "version".to_string()) {
            Some(n) if n == SUBMISSION_VERSION as i32 => {}
            Some(n) => v.push(
                "version",
                format!("unsupported version {n} (expected {SUBMISSION_VERSION})"),
            ),
            None if object.get("version").map_or(true, Value::is_null) => {
                v.push("version", "is required")
            }
            None => {}
        }

        let id = match object.get("id") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => match ArtifactId::new(s.as_str()) {
                Ok(id) => Some(id),
                Err(e) => {
                    v.push("id", e.to_string());
                    None
                }
            },
            Some(_) => {
                v.push("id", "must be a string");
                None
            }
        };

        v.text(object, "", "title", Some(MAX_TITLE_LEN));
        v.text(object, "", "summary", Some(MAX_SUMMARY_LEN));
        v.optional_text(object, "", "description", Some(MAX_DESCRIPTION_LEN));

        if let Some(id) = &id {
            for other in self.known.id_conflicts(&record.key, id.as_str()) {
                v.push_kind(
                    "id",
                    format!("id {id} is also declared by submission \"{other}\""),
                    ViolationKind::DuplicateId,
                );
            }
        }

        self.check_names(record, object, id.as_ref(), v);
        self.check_files(object, v);
        self.check_links(object, v);
        v.unique_strings(object, "", "people");
        v.unique_strings(object, "", "identities");
        self.check_years(object, v);
    }

    /// Slug, aliases, and their uniqueness across the batch and history.
    fn check_names(
        &self,
        record: &RawRecord,
        object: &Map<String, Value>,
        id: Option<&ArtifactId>,
        v: &mut Violations,
    ) {
        let mut names: Vec<(String, &str)> = Vec::new();

        match object.get("slug") {
            None | Some(Value::Null) => v.push("slug", "is required"),
            Some(Value::String(slug)) => {
                if let Err(e) = Slug::new(slug.as_str()) {
                    v.push("slug", e.to_string());
                }
                if slug != &record.key {
                    v.push(
                        "slug",
                        format!("slug \"{slug}\" does not match the file name \"{}\"", record.key),
                    );
                }
                names.push(("slug".to_string(), slug.as_str()));
            }
            Some(_) => v.push("slug", "must be a string"),
        }

        for (path, alias) in v.unique_strings(object, "", "aliases") {
            if let Err(e) = Slug::new(alias) {
                v.push(path.clone(), e.to_string());
            }
            if record.declared_slug() == Some(alias) {
                v.push_kind(
                    path.clone(),
                    "alias repeats the record's own slug",
                    ViolationKind::DuplicateSlug,
                );
                continue;
            }
            names.push((path, alias));
        }

        let mut historical: BTreeMap<&ArtifactId, &str> = BTreeMap::new();
        for (path, name) in &names {
            for other in self.known.conflicts(&record.key, name) {
                v.push_kind(
                    path.clone(),
                    format!("\"{name}\" is also claimed by submission \"{other}\""),
                    ViolationKind::DuplicateSlug,
                );
            }
            if let Some(published) = self.known.historical_id(name) {
                if id.is_some_and(|own| own != published) {
                    v.push_kind(
                        path.clone(),
                        format!("\"{name}\" already belongs to published artifact {published}"),
                        ViolationKind::DuplicateSlug,
                    );
                }
                if id.is_none() {
                    for other in self.known.id_conflicts(&record.key, published.as_str()) {
                        v.push_kind(
                            path.clone(),
                            format!(
                                "\"{name}\" belongs to published artifact {published}, \
                                 which submission \"{other}\" already declares"
                            ),
                            ViolationKind::DuplicateId,
                        );
                    }
                }
                historical.entry(published).or_insert(*name);
            }
        }
        if historical.len() > 1 {
            let owners: Vec<String> = historical
                .iter()
                .map(|(id, name)| format!("{name} → {id}"))
                .collect();
            v.push_kind(
                "aliases",
                format!("names belong to different published artifacts: {}", owners.join(", ")),
                ViolationKind::DuplicateSlug,
            );
        }
    }

    fn check_files(&self, object: &Map<String, Value>, v: &mut Violations) {
        let files = match object.get("files") {
            None | Some(Value::Null) => {
                v.push("files", "is required");
                return;
            }
            Some(Value::Array(files)) => files,
            Some(_) => {
                v.push("files", "must be an array");
                return;
            }
        };
        if files.is_empty() {
            v.push("files", "must contain at least one file");
        }

        let facts: Vec<FileFacts<'_>> = files
            .iter()
            .enumerate()
            .filter_map(|(i, file)| self.check_file(format!("files[{i}]"), file, v))
            .collect();

        // Filenames and file aliases share one namespace within a record.
        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for file in &facts {
            for name in &file.names {
                if let Some(owner) = owners.insert(*name, file.path.as_str()) {
                    if owner != file.path {
                        v.push(
                            file.path.clone(),
                            format!("filename or alias \"{name}\" is already used by {owner}"),
                        );
                    }
                }
            }
        }

        let mut by_url: BTreeMap<&str, (&str, &Digest)> = BTreeMap::new();
        for file in &facts {
            let (Some(url), Some(digest)) = (file.source_url, file.digest.as_ref()) else {
                continue;
            };
            match by_url.get(url) {
                Some((other, existing)) if *existing != digest => v.push_kind(
                    file.path.clone(),
                    format!(
                        "shares source_url {url} with {other} but declares a different multihash"
                    ),
                    ViolationKind::ContradictoryFiles,
                ),
                Some(_) => {}
                None => {
                    by_url.insert(url, (file.path.as_str(), digest));
                }
            }
        }
    }

    fn check_file<'v>(
        &self,
        path: String,
        file: &'v Value,
        v: &mut Violations,
    ) -> Option<FileFacts<'v>> {
        let Some(object) = file.as_object() else {
            v.push(path, "must be an object");
            return None;
        };
        v.unknown_fields(&path, object, FILE_FIELDS);
        v.text(object, &path, "name", Some(MAX_NAME_LEN));

        let mut names = Vec::new();
        match object.get("filename") {
            None | Some(Value::Null) => v.push(join(&path, "filename"), "is required"),
            Some(Value::String(name)) => match FileName::new(name.as_str()) {
                Ok(_) => names.push(name.as_str()),
                Err(e) => v.push(join(&path, "filename"), e.to_string()),
            },
            Some(_) => v.push(join(&path, "filename"), "must be a string"),
        }

        for (alias_path, alias) in v.unique_strings(object, &path, "aliases") {
            match FileName::new(alias) {
                Ok(_) if names.first() == Some(&alias) => {
                    v.push(alias_path, "alias repeats the file's own filename");
                }
                Ok(_) => names.push(alias),
                Err(e) => v.push(alias_path, e.to_string()),
            }
        }

        if let Some(media_type) = v.optional_text(object, &path, "media_type", None) {
            if let Err(e) = MediaType::new(media_type) {
                v.push(join(&path, "media_type"), e.to_string());
            }
        }

        if let Some(lang) = v.optional_text(object, &path, "lang", None) {
            if let Err(e) = LanguageTag::new(lang) {
                v.push(join(&path, "lang"), e.to_string());
            }
        }

        match object.get("hidden") {
            None | Some(Value::Bool(_)) => {}
            Some(_) => v.push(join(&path, "hidden"), "must be a boolean"),
        }

        let digest = self.check_digest(object, &path, v);

        let source_url = match v.text(object, &path, "source_url", None) {
            Some(raw) => match Url::parse(raw) {
                Ok(url) if matches!(url.scheme(), "http" | "https") => Some(raw),
                Ok(url) => {
                    v.push(
                        join(&path, "source_url"),
                        format!(
                            "scheme \"{}\" is not allowed (expected http or https)",
                            url.scheme()
                        ),
                    );
                    None
                }
                Err(e) => {
                    v.push(join(&path, "source_url"), format!("invalid URL: {e}"));
                    None
                }
            },
            None => None,
        };

        Some(FileFacts {
            path,
            names,
            source_url,
            digest,
        })
    }

    fn check_digest(
        &self,
        object: &Map<String, Value>,
        path: &str,
        v: &mut Violations,
    ) -> Option<Digest> {
        let field = join(path, "multihash");
        match object.get("multihash") {
            None | Some(Value::Null) => {
                if self.mode == Mode::Upload {
                    v.push_kind(
                        field,
                        "is required in upload mode; run validate first to fill it in",
                        ViolationKind::Digest,
                    );
                }
                None
            }
            Some(Value::String(text)) => match Digest::decode(text) {
                Ok(digest) => match self.registry.get(digest.code()) {
                    Ok(_) => Some(digest),
                    Err(e) => {
                        v.push_kind(field, e.to_string(), ViolationKind::Digest);
                        None
                    }
                },
                Err(e) => {
                    v.push_kind(field, e.to_string(), ViolationKind::Digest);
                    None
                }
            },
            Some(_) => {
                v.push_kind(field, "must be a hex string", ViolationKind::Digest);
                None
            }
        }
    }

    fn check_links(&self, object: &Map<String, Value>, v: &mut Violations) {
        let mut seen = BTreeSet::new();
        for (i, link) in v.array(object, "", "links").iter().enumerate() {
            let path = format!("links[{i}]");
            let Some(link) = link.as_object() else {
                v.push(path, "must be an object");
                continue;
            };
            v.unknown_fields(&path, link, LINK_FIELDS);
            v.text(link, &path, "name", Some(MAX_NAME_LEN));
            let Some(raw) = v.text(link, &path, "url", None) else {
                continue;
            };
            match Url::parse(raw) {
                Ok(url) if url.scheme() == "https" => {
                    if !seen.insert(url) {
                        v.push(join(&path, "url"), format!("duplicate link {raw}"));
                    }
                }
                Ok(_) => v.push(join(&path, "url"), "must be an https URL"),
                Err(e) => v.push(join(&path, "url"), format!("invalid URL: {e}")),
            }
        }
    }

    fn check_years(&self, object: &Map<String, Value>, v: &mut Violations) {
        let from_year = v.integer(object.get("from_year"), "from_year".to_string());
        if object.get("from_year").map_or(true, Value::is_null) {
            v.push("from_year", "is required");
        }
        let to_year = v.integer(object.get("to_year"), "to_year".to_string());

        for (field, year) in [("from_year", from_year), ("to_year", to_year)] {
            if let Some(year) = year {
                if year > self.current_year {
                    v.push(field, format!("{year} is in the future"));
                }
            }
        }

        if let (Some(from), Some(to)) = (from_year, to_year) {
            if to <= from {
                v.push("to_year", format!("{to} must be greater than from_year {from}"));
            }
        }

        let mut declared = Vec::new();
        let mut readable = true;
        for (i, item) in v.array(object, "", "decades").iter().enumerate() {
            match v.integer(Some(item), format!("decades[{i}]")) {
                Some(decade) => declared.push(decade),
                None => readable = false,
            }
        }

        if let (Some(from), true) = (from_year, readable) {
            let expected = decades_spanned(from, to_year);
            if !expected.is_empty() && declared != expected {
                v.push(
                    "decades",
                    format!("must be exactly {expected:?} for the given years, found {declared:?}"),
                );
            }
        }
    }
}

/// Trim free-text fields the same way their length was checked.
fn normalize(mut submission: ArtifactSubmission) -> ArtifactSubmission {
    fn trim(s: &mut String) {
        let trimmed = s.trim();
        if trimmed.len() != s.len() {
            *s = trimmed.to_string();
        }
    }

    trim(&mut submission.title);
    trim(&mut submission.summary);
    if let Some(description) = submission.description.as_mut() {
        trim(description);
    }
    for file in &mut submission.files {
        trim(&mut file.name);
    }
    for link in &mut submission.links {
        trim(&mut link.name);
    }
    submission
}
