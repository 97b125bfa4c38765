//! Implementation-plan generator.
//!
//! A request runs a read-only research pass over the source tree and is
//! rendered as Markdown with a fixed section order: Overview, Requirements,
//! Implementation Steps, Testing. Requests touching personal health data
//! get a compliance block under Requirements. Nothing here writes files.

pub mod research;

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

pub use research::{Finding, Findings, FsResearcher, Researcher};

use crate::errors::ServiceError;
use crate::services::traced;
use crate::validate;

/// How many paths per research category are cited in the document.
const CITED_PER_CATEGORY: usize = 5;
const STOPWORDS: &[&str] = &["with", "from", "into", "that", "this", "when", "should", "must", "their", "have", "will", "each"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanKind {
    Feature,
    Refactor,
}

impl FromStr for PlanKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "feature" => Ok(PlanKind::Feature),
            "refactor" => Ok(PlanKind::Refactor),
            _ => Err(ServiceError::Validation("kind must be one of feature, refactor".into())),
        }
    }
}

impl PlanKind {
    fn label(self) -> &'static str {
        match self {
            PlanKind::Feature => "Feature",
            PlanKind::Refactor => "Refactor",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRequest {
    pub title: String,
    pub kind: PlanKind,
    pub summary: String,
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub handles_phi: bool,
    /// Search terms; derived from the title and summary when empty.
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl PlanRequest {
    pub fn search_terms(&self) -> Vec<String> {
        let source: Vec<String> = if self.keywords.is_empty() {
            format!("{} {}", self.title, self.summary)
                .split(|c: char| !c.is_alphanumeric() && c != '_')
                .map(str::to_string)
                .collect()
        } else {
            self.keywords.clone()
        };
        let terms: BTreeSet<String> = source
            .iter()
            .map(|w| w.trim().to_lowercase())
            .filter(|w| w.len() >= 4 && !STOPWORDS.contains(&w.as_str()))
            .collect();
        terms.into_iter().collect()
    }
}

/// Options bag accepted from callers.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PlanOptions {
    pub title: Option<String>,
    pub kind: Option<String>,
    pub summary: Option<String>,
    pub requirements: Option<Vec<String>>,
    pub handles_phi: Option<bool>,
    pub keywords: Option<Vec<String>>,
}

impl PlanOptions {
    pub fn into_request(self) -> Result<PlanRequest, ServiceError> {
        validate::require(&[
            ("title", self.title.as_deref()),
            ("kind", self.kind.as_deref()),
            ("summary", self.summary.as_deref()),
        ])?;
        Ok(PlanRequest {
            kind: self.kind.as_deref().unwrap_or_default().parse()?,
            title: self.title.unwrap_or_default().trim().to_string(),
            summary: self.summary.unwrap_or_default().trim().to_string(),
            requirements: self
                .requirements
                .unwrap_or_default()
                .into_iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
            handles_phi: self.handles_phi.unwrap_or(false),
            keywords: self.keywords.unwrap_or_default(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PlanDocument {
    pub title: String,
    pub kind: PlanKind,
    pub overview: String,
    pub requirements: Vec<String>,
    pub compliance: Vec<String>,
    pub steps: Vec<String>,
    pub testing: Vec<String>,
    pub research: Findings,
}

fn compliance_items() -> Vec<String> {
    vec![
        "Data handling disclosure: state which personal health fields are collected, where they are stored and who can read them.".into(),
        "Tamper-evident action logging: record every create, read of sealed fields and status change in the hash-chained audit trail.".into(),
        "Regulatory obligations: confirm HIPAA minimum-necessary access and retention rules for the affected records.".into(),
        "Encryption at rest and in transit: seal PII fields before storage, open them only through the decryption service, and serve over TLS.".into(),
    ]
}

fn cite(findings: &[Finding]) -> String {
    findings
        .iter()
        .take(CITED_PER_CATEGORY)
        .map(|f| format!("`{}`", f.path))
        .collect::<Vec<_>>()
        .join(", ")
}

fn steps_for(request: &PlanRequest, found: &Findings) -> Vec<String> {
    let mut steps = Vec::new();
    if !found.analogous_implementations.is_empty() {
        steps.push(format!("Review analogous implementations: {}.", cite(&found.analogous_implementations)));
    }
    match request.kind {
        PlanKind::Feature => {
            steps.push("Declare entity fields with their constraints and add named model operations, including paginated reads.".into());
            steps.push("Add a service operation that validates its options bag before any data access and composes dependent steps in sequence.".into());
            steps.push("Expose a controller route that checks required fields, allow-lists input and delegates to exactly one service call.".into());
        }
        PlanKind::Refactor => {
            steps.push("Pin current behavior with tests before moving code.".into());
            if !found.code_patterns.is_empty() {
                steps.push(format!("Restructure the affected code in {}.", cite(&found.code_patterns)));
            }
            steps.push("Keep controller, service and model responsibilities separate while moving logic.".into());
        }
    }
    if request.handles_phi {
        steps.push("Route every PII field through the field protector on write and the decryption service on read.".into());
    }
    steps.push("Log every error path with the operation name and non-sensitive identifiers only.".into());
    steps
}

fn testing_for(request: &PlanRequest, found: &Findings) -> Vec<String> {
    let mut testing = vec![
        "Missing or blank required options fail with a missing-parameter error and record zero repository calls.".to_string(),
        "Oversized page requests are capped at 100 rows with the offset computed from the page number.".to_string(),
    ];
    if !found.test_fixtures.is_empty() {
        testing.push(format!("Extend existing fixtures in {}.", cite(&found.test_fixtures)));
    }
    if request.handles_phi {
        testing.push("Assert PII never appears in responses or log output and that sealed reads are audited.".into());
    }
    testing
}

/// Run research and assemble the document. Reads only.
pub fn generate(request: &PlanRequest, researcher: &dyn Researcher) -> PlanDocument {
    let found = researcher.research(&request.search_terms());
    PlanDocument {
        title: request.title.clone(),
        kind: request.kind,
        overview: request.summary.clone(),
        requirements: request.requirements.clone(),
        compliance: if request.handles_phi { compliance_items() } else { Vec::new() },
        steps: steps_for(request, &found),
        testing: testing_for(request, &found),
        research: found,
    }
}

impl PlanDocument {
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let _ = writeln!(md, "# {}: {}\n", self.kind.label(), self.title);

        let _ = writeln!(md, "## Overview\n\n{}\n", self.overview);
        let context = [
            ("Code patterns", &self.research.code_patterns),
            ("Analogous implementations", &self.research.analogous_implementations),
            ("Test fixtures", &self.research.test_fixtures),
            ("Architectural constraints", &self.research.architectural_constraints),
        ];
        if context.iter().any(|(_, f)| !f.is_empty()) {
            let _ = writeln!(md, "### Context\n");
            for (label, findings) in context.iter().filter(|(_, f)| !f.is_empty()) {
                let _ = writeln!(md, "- {label}: {}", cite(findings));
            }
            md.push('\n');
        }

        let _ = writeln!(md, "## Requirements\n");
        if self.requirements.is_empty() {
            let _ = writeln!(md, "- None stated beyond the overview.");
        }
        for r in &self.requirements {
            let _ = writeln!(md, "- {r}");
        }
        md.push('\n');
        if !self.compliance.is_empty() {
            let _ = writeln!(md, "### Compliance\n");
            for c in &self.compliance {
                let _ = writeln!(md, "- {c}");
            }
            md.push('\n');
        }

        let _ = writeln!(md, "## Implementation Steps\n");
        for (i, s) in self.steps.iter().enumerate() {
            let _ = writeln!(md, "{}. {s}", i + 1);
        }
        md.push('\n');

        let _ = writeln!(md, "## Testing\n");
        for t in &self.testing {
            let _ = writeln!(md, "- {t}");
        }
        md
    }
}

/// Plan generation over the configured source root.
pub struct PlanningService {
    root: PathBuf,
    max_files: usize,
}

impl PlanningService {
    pub fn new(root: impl Into<PathBuf>, max_files: usize) -> Self {
        Self { root: root.into(), max_files }
    }

    pub fn from_config(cfg: &configs::PlanningConfig) -> Self {
        Self::new(&cfg.source_root, cfg.max_scan_files)
    }

    #[instrument(skip_all)]
    pub async fn plan(&self, opts: PlanOptions) -> Result<PlanDocument, ServiceError> {
        traced("PlanningService::plan", async {
            let request = Arc::new(opts.into_request()?);
            let researcher = FsResearcher::new(self.root.clone(), self.max_files);
            let req = request.clone();
            let doc = tokio::task::spawn_blocking(move || generate(&req, &researcher))
                .await
                .map_err(|e| ServiceError::Internal(format!("plan research task failed: {e}")))?;
            info!(kind = ?request.kind, steps = doc.steps.len(), "plan_generated");
            Ok::<_, ServiceError>(doc)
        })
        .await
    }
}
