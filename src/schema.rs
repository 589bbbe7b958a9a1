//! Canonical record types shared by every pipeline stage.
//!
//! These types mirror the on-disk JSONL records so each stage stays
//! schema-driven: the normalizer produces them, the gate validates them, and
//! the store persists them with lifecycle fields attached.
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fingerprint segment delimiter: `<category>::<file>::<identifier>`.
pub const FINGERPRINT_DELIMITER: &str = "::";

/// Prefix for durable store identifiers (`DEBT-0001`).
pub const ID_PREFIX: &str = "DEBT-";

/// Tools accepted in `tool_confirmation` for top-severity findings.
pub const KNOWN_TOOLS: &[&str] = &[
    "grep",
    "ripgrep",
    "cargo-audit",
    "clippy",
    "eslint",
    "semgrep",
    "NONE",
];

/// Finding categories, matching the per-category batch directories on disk.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Security,
    Performance,
    CodeQuality,
    Documentation,
    Process,
    Refactoring,
    EngineeringProductivity,
}

impl Category {
    /// All categories in stable display order.
    pub const ALL: [Category; 7] = [
        Category::Security,
        Category::Performance,
        Category::CodeQuality,
        Category::Documentation,
        Category::Process,
        Category::Refactoring,
        Category::EngineeringProductivity,
    ];

    /// Return the stable string identifier used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Security => "security",
            Category::Performance => "performance",
            Category::CodeQuality => "code-quality",
            Category::Documentation => "documentation",
            Category::Process => "process",
            Category::Refactoring => "refactoring",
            Category::EngineeringProductivity => "engineering-productivity",
        }
    }

    /// Directory name for this category's batch files under `findings/`.
    pub fn dir_name(&self) -> &'static str {
        // Directory names match the wire form so batches are greppable by
        // category without a lookup table.
        self.as_str()
    }

    /// Parse the canonical wire form (exact match only; the normalizer owns
    /// alias handling).
    pub fn parse(token: &str) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.as_str() == token)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity bands, S0 most severe.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    S0,
    S1,
    S2,
    S3,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Severity::S0, Severity::S1, Severity::S2, Severity::S3];

    /// Return the stable string identifier used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::S0 => "S0",
            Severity::S1 => "S1",
            Severity::S2 => "S2",
            Severity::S3 => "S3",
        }
    }

    pub fn parse(token: &str) -> Option<Severity> {
        Severity::ALL
            .iter()
            .copied()
            .find(|s| s.as_str().eq_ignore_ascii_case(token.trim()))
    }

    /// S0/S1 findings require confirmed verification steps before intake.
    pub fn requires_verification(&self) -> bool {
        matches!(self, Severity::S0 | Severity::S1)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Effort bands, E0 least effort.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Effort {
    E0,
    E1,
    E2,
    E3,
}

impl Effort {
    pub const ALL: [Effort; 4] = [Effort::E0, Effort::E1, Effort::E2, Effort::E3];

    /// Return the stable string identifier used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            Effort::E0 => "E0",
            Effort::E1 => "E1",
            Effort::E2 => "E2",
            Effort::E3 => "E3",
        }
    }

    pub fn parse(token: &str) -> Option<Effort> {
        Effort::ALL
            .iter()
            .copied()
            .find(|e| e.as_str().eq_ignore_ascii_case(token.trim()))
    }
}

impl fmt::Display for Effort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a store item. Items are never deleted, only
/// transitioned, so resolved history stays auditable.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Open,
    Resolved,
    FalsePositive,
}

impl ItemStatus {
    /// Return the stable string identifier used in JSON artifacts.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Open => "OPEN",
            ItemStatus::Resolved => "RESOLVED",
            ItemStatus::FalsePositive => "FALSE_POSITIVE",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First verification pass: mechanical evidence collection.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct FirstPass {
    pub method: String,
    #[serde(default)]
    pub evidence_collected: Vec<String>,
}

/// Methods accepted for the first verification pass.
pub const FIRST_PASS_METHODS: &[&str] = &["grep", "tool_output", "file_read", "code_search"];

/// Second verification pass: human or contextual confirmation.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct SecondPass {
    pub method: String,
    #[serde(default)]
    pub confirmed: bool,
}

/// Methods accepted for the second verification pass.
pub const SECOND_PASS_METHODS: &[&str] =
    &["contextual_review", "exploitation_test", "manual_verification"];

/// Tool-backed confirmation reference.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ToolConfirmation {
    pub tool: String,
    pub reference: String,
}

/// Two-pass verification evidence required for S0/S1 findings.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct VerificationSteps {
    pub first_pass: FirstPass,
    pub second_pass: SecondPass,
    pub tool_confirmation: ToolConfirmation,
}

impl VerificationSteps {
    /// Structural defaults used when synthesizing or deep-merging legacy
    /// verification data; every required key exists but nothing is confirmed.
    pub fn structural_default() -> Self {
        VerificationSteps {
            first_pass: FirstPass {
                method: "grep".to_string(),
                evidence_collected: Vec::new(),
            },
            second_pass: SecondPass {
                method: "manual_verification".to_string(),
                confirmed: false,
            },
            tool_confirmation: ToolConfirmation {
                tool: "NONE".to_string(),
                reference: String::new(),
            },
        }
    }
}

/// One normalized audit observation, prior to store intake.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FindingRecord {
    pub category: Category,
    pub title: String,
    pub fingerprint: String,
    pub severity: Severity,
    pub effort: Effort,
    pub confidence: u8,
    pub files: Vec<String>,
    pub why_it_matters: String,
    pub suggested_fix: String,
    pub acceptance_tests: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evidence: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_steps: Option<VerificationSteps>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl FindingRecord {
    /// Primary file reference with any `:line` suffix stripped, or `None`
    /// when only the `unknown` sentinel is present.
    pub fn primary_file(&self) -> Option<&str> {
        let token = self.files.first()?;
        let path = token.split(':').next().unwrap_or(token);
        if path.is_empty() || path == "unknown" {
            None
        } else {
            Some(path)
        }
    }
}

/// A finding that has been ingested into the durable store.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StoreItem {
    pub id: String,
    pub status: ItemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(flatten)]
    pub record: FindingRecord,
}

impl StoreItem {
    /// Numeric suffix of the `DEBT-NNNN` identifier, if well-formed.
    pub fn id_number(&self) -> Option<u64> {
        self.id.strip_prefix(ID_PREFIX)?.parse().ok()
    }
}

/// Format a store identifier from its numeric sequence value.
pub fn format_id(number: u64) -> String {
    format!("{ID_PREFIX}{number:04}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_wire_form_round_trips() {
        for category in Category::ALL {
            let json = serde_json::to_string(&category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.as_str()));
            let back: Category = serde_json::from_str(&json).unwrap();
            assert_eq!(back, category);
        }
    }

    #[test]
    fn severity_parse_is_case_insensitive() {
        assert_eq!(Severity::parse("s0"), Some(Severity::S0));
        assert_eq!(Severity::parse(" S3 "), Some(Severity::S3));
        assert_eq!(Severity::parse("critical"), None);
    }

    #[test]
    fn only_top_severities_require_verification() {
        assert!(Severity::S0.requires_verification());
        assert!(Severity::S1.requires_verification());
        assert!(!Severity::S2.requires_verification());
        assert!(!Severity::S3.requires_verification());
    }

    #[test]
    fn status_uses_screaming_snake_wire_form() {
        let json = serde_json::to_string(&ItemStatus::FalsePositive).unwrap();
        assert_eq!(json, "\"FALSE_POSITIVE\"");
    }

    #[test]
    fn id_number_parses_padded_ids() {
        let item = StoreItem {
            id: format_id(37),
            status: ItemStatus::Open,
            created: None,
            resolved_at: None,
            resolved_by: None,
            record: test_record(),
        };
        assert_eq!(item.id, "DEBT-0037");
        assert_eq!(item.id_number(), Some(37));
    }

    #[test]
    fn primary_file_strips_line_and_skips_sentinel() {
        let mut record = test_record();
        record.files = vec!["src/app.ts:42".to_string()];
        assert_eq!(record.primary_file(), Some("src/app.ts"));
        record.files = vec!["unknown".to_string()];
        assert_eq!(record.primary_file(), None);
    }

    fn test_record() -> FindingRecord {
        FindingRecord {
            category: Category::Security,
            title: "test".to_string(),
            fingerprint: "security::app.ts::test".to_string(),
            severity: Severity::S2,
            effort: Effort::E2,
            confidence: 70,
            files: vec!["app.ts".to_string()],
            why_it_matters: "matters".to_string(),
            suggested_fix: "fix".to_string(),
            acceptance_tests: vec!["passes".to_string()],
            evidence: Vec::new(),
            verification_steps: None,
            notes: None,
        }
    }
}
