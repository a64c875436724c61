//! Response validator for transformer output
//!
//! Isolates code from a raw transformer reply, then scores it with
//! lightweight heuristics: per-language syntax checks, mapping coverage,
//! quality smells, a line-aligned change summary and a complexity tier.
//! None of this parses the target language.

use paymigrate_core::models::{EndpointType, Language};
use paymigrate_core::MappingDictionary;
use regex::Regex;
use serde::{Deserialize, Serialize};
use similar::{DiffTag, TextDiff};
use std::sync::Arc;

const DEFAULT_BASE_CONFIDENCE: f64 = 0.5;
const MAX_FUNCTIONS: usize = 10;
const REVIEW_CONFIDENCE_THRESHOLD: f64 = 0.7;
const REVIEW_QUALITY_THRESHOLD: u8 = 60;

lazy_static::lazy_static! {
    static ref CODE_FENCE: Regex =
        Regex::new(r"(?s)```[\w+#.\-]*[ \t]*\r?\n(.*?)```").expect("fence pattern must compile");
    static ref PREAMBLE_LINE: Regex = Regex::new(
        r"(?i)^\s*(?:here is|here's|below is|sure\b|certainly\b|okay\b|the (?:migrated|updated|converted|new) code)[^\n]*$"
    ).expect("preamble pattern must compile");
    static ref TRAILER_START: Regex = Regex::new(
        r"(?i)^\s*(?:\*\*|#+\s*)?(?:explanation|notes?|changes(?: made)?|summary|key changes)(?:\*\*)?\s*:?\s*(?:\*\*)?\s*$|^\s*(?:\*\*)?(?:explanation|notes?|changes(?: made)?)(?:\*\*)?\s*:"
    ).expect("trailer pattern must compile");
    static ref SIGN_OFF: Regex =
        Regex::new(r"(?i)^\s*(?:let me know|hope this helps|i hope|feel free)").expect("sign-off pattern must compile");
    static ref HARDCODED_CREDENTIAL: Regex = Regex::new(
        r#"(?i)\b(?:api[_-]?key|secret|password|passwd|token|ssl_pin|pin)\b['"]?\s*(?:=>|[:=])\s*['"][^'"\s]{4,}['"]"#
    ).expect("credential pattern must compile");
    static ref SQL_CONCATENATION: Regex = Regex::new(
        r#"(?i)['"`]\s*(?:select|insert|update|delete)\b[^'"`]*['"`]\s*(?:\+|\.)\s*[\w$]"#
    ).expect("sql pattern must compile");
    static ref DEBUG_PRINT: Regex = Regex::new(
        r"\bconsole\.(?:log|debug)\s*\(|^\s*print\s*\(|\bvar_dump\s*\(|\bprint_r\s*\(|\bSystem\.out\.print(?:ln)?\s*\(|\bConsole\.WriteLine\s*\(|\bfmt\.Print(?:ln|f)?\s*\(|^\s*puts\s|^\s*pp?\s"
    ).expect("debug pattern must compile");
    static ref FUNCTION_DEF: Regex = Regex::new(
        r"\bfunction\b|=>|\bdef\s+\w+|\bfunc\s+\w+|\bfn\s+\w+|\b(?:public|private|protected|internal)\s+(?:static\s+)?(?:async\s+)?[\w<>\[\],]+\s+\w+\s*\("
    ).expect("function pattern must compile");
    static ref CONDITIONAL: Regex =
        Regex::new(r"\b(?:if|elif|else if|elsif|switch|case|catch|except)\b|\?\s*[^:?]+\s*:").expect("conditional pattern must compile");
    static ref LOOP: Regex =
        Regex::new(r"\b(?:for|foreach|while|loop|each)\b|\.(?:forEach|map|each)\s*[({]").expect("loop pattern must compile");
    static ref LOOP_START: Regex =
        Regex::new(r"^\s*(?:for|foreach|while)\b|\.forEach\s*\(").expect("loop start pattern must compile");
    static ref URL: Regex = Regex::new(r#"https?://[^\s'"`)]+"#).expect("url pattern must compile");
    static ref PHP_BARE_ASSIGNMENT: Regex =
        Regex::new(r"^\s*([a-z_][A-Za-z0-9_]*)\s*=[^=>]").expect("php assignment pattern must compile");
    static ref PYTHON_BLOCK_OPENER: Regex = Regex::new(
        r"^\s*(?:def|class|if|elif|else|for|while|try|except|finally|with|async\s+def|async\s+for|async\s+with)\b.*:\s*(?:#.*)?$"
    ).expect("python block pattern must compile");
}

/// Severity of a syntax finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FindingSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxFinding {
    /// 1-based
    pub line: usize,
    /// 1-based
    pub column: usize,
    pub message: String,
    pub severity: FindingSeverity,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxReport {
    /// No error-severity finding
    pub valid: bool,
    pub findings: Vec<SyntaxFinding>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Security,
    Performance,
    Maintainability,
    Style,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
}

impl IssueSeverity {
    /// Points subtracted from the quality score
    pub fn penalty(&self) -> u32 {
        match self {
            IssueSeverity::High => 20,
            IssueSeverity::Medium => 10,
            IssueSeverity::Low => 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityIssue {
    pub category: IssueCategory,
    pub severity: IssueSeverity,
    pub message: String,
    #[serde(default)]
    pub line: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    /// 0 to 100
    pub score: u8,
    pub issues: Vec<QualityIssue>,
}

/// A source field and the destination it should become
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingPair {
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingCheck {
    pub applied: Vec<MappingPair>,
    pub missing: Vec<MappingPair>,
}

impl MappingCheck {
    /// Share of applied mappings; 1.0 when the original used no mapped field
    pub fn applied_ratio(&self) -> f64 {
        let total = self.applied.len() + self.missing.len();
        if total == 0 {
            1.0
        } else {
            self.applied.len() as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSubstitution {
    /// 1-based line in the migrated code
    pub line: usize,
    pub source: String,
    pub destination: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlSubstitution {
    pub line: usize,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub field_substitutions: Vec<FieldSubstitution>,
    pub url_substitutions: Vec<UrlSubstitution>,
    pub added_lines: Vec<String>,
    pub removed_lines: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityTier {
    Low,
    Medium,
    High,
}

impl ComplexityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComplexityTier::Low => "low",
            ComplexityTier::Medium => "medium",
            ComplexityTier::High => "high",
        }
    }

    fn from_score(score: f64) -> Self {
        if score < 15.0 {
            ComplexityTier::Low
        } else if score < 40.0 {
            ComplexityTier::Medium
        } else {
            ComplexityTier::High
        }
    }
}

/// What the validator concluded about one transformer reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    /// False when no code could be extracted
    pub success: bool,
    pub extracted_code: String,
    pub syntax: SyntaxReport,
    pub quality: QualityReport,
    pub mappings: MappingCheck,
    pub changes: ChangeSummary,
    /// Output-quality confidence in [0, 1]
    pub confidence: f64,
    pub complexity: ComplexityTier,
    pub review_required: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl ValidationOutcome {
    fn no_code() -> Self {
        Self {
            success: false,
            extracted_code: String::new(),
            syntax: SyntaxReport {
                valid: false,
                findings: vec![SyntaxFinding {
                    line: 1,
                    column: 1,
                    message: "no code found in transformer response".to_string(),
                    severity: FindingSeverity::Error,
                }],
            },
            quality: QualityReport {
                score: 0,
                issues: Vec::new(),
            },
            mappings: MappingCheck::default(),
            changes: ChangeSummary::default(),
            confidence: 0.0,
            complexity: ComplexityTier::Low,
            review_required: true,
            error: Some("no code found in transformer response".to_string()),
        }
    }
}

/// Everything the validator needs about one reply
#[derive(Debug, Clone, Copy)]
pub struct ValidationInput<'a> {
    pub raw_response: &'a str,
    pub original_code: &'a str,
    pub language: Language,
    /// Adds that endpoint's field rules to the common ones
    pub endpoint_type: Option<EndpointType>,
    pub transformer_confidence: Option<f64>,
}

/// Heuristic validator bound to a mapping dictionary
#[derive(Debug, Clone)]
pub struct ResponseValidator {
    dictionary: Arc<MappingDictionary>,
}

impl ResponseValidator {
    pub fn new(dictionary: Arc<MappingDictionary>) -> Self {
        Self { dictionary }
    }

    pub fn validate(&self, input: &ValidationInput<'_>) -> ValidationOutcome {
        let Some(code) = extract_code(input.raw_response) else {
            return ValidationOutcome::no_code();
        };

        let syntax = check_syntax(&code, input.language);
        let rules = self.rules_for(input.endpoint_type);
        let mappings = check_mappings(input.original_code, &code, &rules);
        let quality = assess_quality(&code);
        let changes = summarize_changes(input.original_code, &code, &rules);

        let base = input
            .transformer_confidence
            .filter(|c| c.is_finite())
            .unwrap_or(DEFAULT_BASE_CONFIDENCE)
            .clamp(0.0, 1.0);
        let syntax_factor = if syntax.valid { 1.0 } else { 0.5 };
        let mapping_factor = 0.5 + 0.5 * mappings.applied_ratio();
        let quality_factor = f64::from(quality.score) / 100.0;
        let confidence = (base * syntax_factor * mapping_factor * quality_factor).clamp(0.0, 1.0);

        let has_high_security = quality
            .issues
            .iter()
            .any(|i| i.category == IssueCategory::Security && i.severity == IssueSeverity::High);
        let review_required = !syntax.valid
            || has_high_security
            || confidence < REVIEW_CONFIDENCE_THRESHOLD
            || quality.score < REVIEW_QUALITY_THRESHOLD;

        ValidationOutcome {
            success: true,
            complexity: ComplexityTier::from_score(complexity_score(&code)),
            extracted_code: code,
            syntax,
            quality,
            mappings,
            changes,
            confidence,
            review_required,
            error: None,
        }
    }

    /// Common field rules, plus the endpoint's own rules when known
    fn rules_for(&self, endpoint_type: Option<EndpointType>) -> Vec<MappingPair> {
        let endpoint_rules = endpoint_type
            .and_then(|t| self.dictionary.mapping(t))
            .map(|m| m.field_mappings.iter())
            .into_iter()
            .flatten();

        let mut rules: Vec<MappingPair> = Vec::new();
        for (source, rule) in self.dictionary.common_fields.iter().chain(endpoint_rules) {
            if rules.iter().any(|r| &r.source == source) {
                continue;
            }
            rules.push(MappingPair {
                source: source.clone(),
                destination: rule.destination.clone(),
            });
        }
        rules
    }
}

/// Isolate code from a transformer reply.
///
/// Prefers the first fenced block; otherwise drops preamble lines and
/// sign-offs. Explanation headings only end the code when the reply opened
/// with a preamble and the heading follows a blank line, so keys such as
/// `notes:` and comments such as `# Notes` stay part of the code.
/// `None` when nothing is left.
pub fn extract_code(raw: &str) -> Option<String> {
    if let Some(captures) = CODE_FENCE.captures(raw) {
        let body = captures.get(1).map_or("", |m| m.as_str()).trim_end();
        return (!body.trim().is_empty()).then(|| body.to_string());
    }

    let mut lines: Vec<&str> = raw.lines().collect();
    let mut had_preamble = false;
    while let Some(first) = lines.first() {
        if PREAMBLE_LINE.is_match(first) {
            had_preamble = true;
        } else if !first.trim().is_empty() {
            break;
        }
        lines.remove(0);
    }

    let cut = lines.iter().enumerate().position(|(i, line)| {
        SIGN_OFF.is_match(line)
            || (had_preamble && i > 0 && lines[i - 1].trim().is_empty() && TRAILER_START.is_match(line))
    });
    if let Some(cut) = cut {
        lines.truncate(cut);
    }

    let code = lines.join("\n");
    let code = code.trim_end();
    (!code.trim().is_empty()).then(|| code.to_string())
}

fn check_syntax(code: &str, language: Language) -> SyntaxReport {
    let mut findings = check_brackets(code, language);

    match language {
        Language::Python => findings.extend(check_python_indentation(code)),
        Language::Php => {
            findings.extend(check_php_sigils(code));
            findings.extend(check_semicolons(code, language));
        }
        l if l.is_brace_language() => findings.extend(check_semicolons(code, language)),
        _ => {}
    }

    findings.sort_by_key(|f| (f.line, f.column));
    SyntaxReport {
        valid: !findings.iter().any(|f| f.severity == FindingSeverity::Error),
        findings,
    }
}

/// Bracket balance, skipping string literals and comments
fn check_brackets(code: &str, language: Language) -> Vec<SyntaxFinding> {
    let hash_comments = matches!(language, Language::Python | Language::Ruby | Language::Php);
    let mut findings = Vec::new();
    let mut stack: Vec<(char, usize, usize)> = Vec::new();
    let mut in_block_comment = false;

    for (line_index, line) in code.lines().enumerate() {
        let chars: Vec<char> = line.chars().collect();
        let mut quote: Option<char> = None;
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            if in_block_comment {
                if c == '*' && next == Some('/') {
                    in_block_comment = false;
                    i += 1;
                }
            } else if let Some(q) = quote {
                if c == '\\' {
                    i += 1;
                } else if c == q {
                    quote = None;
                }
            } else {
                match c {
                    '"' | '\'' | '`' => quote = Some(c),
                    '/' if next == Some('/') => break,
                    '/' if next == Some('*') => {
                        in_block_comment = true;
                        i += 1;
                    }
                    '#' if hash_comments => break,
                    '(' | '[' | '{' => stack.push((c, line_index + 1, i + 1)),
                    ')' | ']' | '}' => {
                        let expected = match c {
                            ')' => '(',
                            ']' => '[',
                            _ => '{',
                        };
                        match stack.pop() {
                            Some((open, _, _)) if open == expected => {}
                            Some((open, open_line, _)) => findings.push(SyntaxFinding {
                                line: line_index + 1,
                                column: i + 1,
                                message: format!("'{c}' does not close '{open}' opened on line {open_line}"),
                                severity: FindingSeverity::Error,
                            }),
                            None => findings.push(SyntaxFinding {
                                line: line_index + 1,
                                column: i + 1,
                                message: format!("unmatched '{c}'"),
                                severity: FindingSeverity::Error,
                            }),
                        }
                    }
                    _ => {}
                }
            }
            i += 1;
        }

        // Template literals and Python triple quotes span lines
        if quote.is_some_and(|q| q != '`') {
            findings.push(SyntaxFinding {
                line: line_index + 1,
                column: chars.len().max(1),
                message: "unterminated string literal".to_string(),
                severity: FindingSeverity::Warning,
            });
        }
    }

    findings.extend(stack.into_iter().map(|(open, line, column)| SyntaxFinding {
        line,
        column,
        message: format!("'{open}' is never closed"),
        severity: FindingSeverity::Error,
    }));
    findings
}

fn check_semicolons(code: &str, language: Language) -> Vec<SyntaxFinding> {
    const NO_SEMICOLON_KEYWORDS: &[&str] = &[
        "if", "else", "for", "foreach", "while", "switch", "case", "default", "try", "catch", "finally", "do",
        "class", "interface", "enum", "namespace", "struct", "function",
    ];
    const CONTINUATION_STARTS: &[&str] = &["{", ".", "?", ":", ")", "]", "+", "-", "*", "/", "&&", "||", "=>", "->"];

    let severity = if language.requires_semicolons() {
        FindingSeverity::Error
    } else {
        FindingSeverity::Warning
    };
    let lines: Vec<&str> = code.lines().collect();
    let mut findings = Vec::new();

    for (index, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty()
            || ["//", "/*", "*", "#", "@", "<?", "?>"].iter().any(|p| trimmed.starts_with(p))
        {
            continue;
        }
        let Some(last) = trimmed.chars().last() else {
            continue;
        };
        if ";{}([,:.+-*/=<>|&?!\\".contains(last) {
            continue;
        }
        let first_word = trimmed
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .next()
            .unwrap_or_default();
        if NO_SEMICOLON_KEYWORDS.contains(&first_word) {
            continue;
        }
        if last == ')'
            && ["public", "private", "protected", "internal", "static", "async"].contains(&first_word)
        {
            continue;
        }
        let next = lines[index + 1..]
            .iter()
            .map(|l| l.trim())
            .find(|l| !l.is_empty());
        if next.is_some_and(|n| CONTINUATION_STARTS.iter().any(|p| n.starts_with(p))) {
            continue;
        }

        findings.push(SyntaxFinding {
            line: index + 1,
            column: line.trim_end().chars().count(),
            message: "statement may be missing a semicolon".to_string(),
            severity,
        });
    }
    findings
}

fn check_python_indentation(code: &str) -> Vec<SyntaxFinding> {
    let mut findings = Vec::new();
    let lines: Vec<&str> = code.lines().collect();
    let mut seen_tabs = false;
    let mut seen_spaces = false;

    for (index, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let indent: String = line.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
        seen_tabs |= indent.contains('\t');
        seen_spaces |= indent.contains(' ');
        if (indent.contains('\t') && indent.contains(' ')) || (seen_tabs && seen_spaces && !indent.is_empty()) {
            findings.push(SyntaxFinding {
                line: index + 1,
                column: 1,
                message: "inconsistent use of tabs and spaces in indentation".to_string(),
                severity: FindingSeverity::Error,
            });
            // One report is enough
            seen_tabs = false;
            seen_spaces = false;
        }

        if PYTHON_BLOCK_OPENER.is_match(line) {
            let current = indent.chars().count();
            let next = lines[index + 1..].iter().enumerate().find(|(_, l)| !l.trim().is_empty());
            let indented = next.is_some_and(|(_, l)| l.chars().take_while(|c| c.is_whitespace()).count() > current);
            if !indented {
                findings.push(SyntaxFinding {
                    line: next.map_or(index + 1, |(offset, _)| index + offset + 2),
                    column: 1,
                    message: "expected an indented block".to_string(),
                    severity: FindingSeverity::Error,
                });
            }
        }
    }
    findings
}

fn check_php_sigils(code: &str) -> Vec<SyntaxFinding> {
    const NOT_VARIABLES: &[&str] = &["const", "define", "use", "namespace", "return", "global", "static", "var"];

    code.lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let captures = PHP_BARE_ASSIGNMENT.captures(line)?;
            let name = captures.get(1)?;
            if NOT_VARIABLES.contains(&name.as_str()) {
                return None;
            }
            Some(SyntaxFinding {
                line: index + 1,
                column: name.start() + 1,
                message: format!("variable '{}' is missing the '$' sigil", name.as_str()),
                severity: FindingSeverity::Error,
            })
        })
        .collect()
}

fn contains_word(text: &str, word: &str) -> bool {
    text.match_indices(word).any(|(start, _)| {
        let before = text[..start].chars().next_back();
        let after = text[start + word.len()..].chars().next();
        let is_word = |c: char| c.is_alphanumeric() || c == '_';
        !before.is_some_and(is_word) && !after.is_some_and(is_word)
    })
}

fn check_mappings(original: &str, migrated: &str, rules: &[MappingPair]) -> MappingCheck {
    let mut check = MappingCheck::default();
    for rule in rules.iter().filter(|r| contains_word(original, &r.source)) {
        if migrated.contains(&rule.destination) && !contains_word(migrated, &rule.source) {
            check.applied.push(rule.clone());
        } else {
            check.missing.push(rule.clone());
        }
    }
    check
}

fn assess_quality(code: &str) -> QualityReport {
    let mut issues = Vec::new();

    for (index, line) in code.lines().enumerate() {
        let line_number = Some(index + 1);
        if HARDCODED_CREDENTIAL.is_match(line) {
            issues.push(QualityIssue {
                category: IssueCategory::Security,
                severity: IssueSeverity::High,
                message: "hardcoded credential literal".to_string(),
                line: line_number,
            });
        }
        if SQL_CONCATENATION.is_match(line) {
            issues.push(QualityIssue {
                category: IssueCategory::Security,
                severity: IssueSeverity::High,
                message: "SQL statement built by string concatenation".to_string(),
                line: line_number,
            });
        }
        if DEBUG_PRINT.is_match(line) {
            issues.push(QualityIssue {
                category: IssueCategory::Maintainability,
                severity: IssueSeverity::Low,
                message: "leftover debug print".to_string(),
                line: line_number,
            });
        }
    }

    let functions = FUNCTION_DEF.find_iter(code).count();
    if functions > MAX_FUNCTIONS {
        issues.push(QualityIssue {
            category: IssueCategory::Maintainability,
            severity: IssueSeverity::Medium,
            message: format!("{functions} functions in one snippet"),
            line: None,
        });
    }

    if let Some(line) = await_in_loop(code) {
        issues.push(QualityIssue {
            category: IssueCategory::Performance,
            severity: IssueSeverity::Low,
            message: "await inside a loop serializes requests".to_string(),
            line: Some(line),
        });
    }

    let penalty: u32 = issues.iter().map(|i| i.severity.penalty()).sum();
    let score = 100u32.saturating_sub(penalty);
    QualityReport {
        score: u8::try_from(score).unwrap_or(100),
        issues,
    }
}

/// Line of the first `await` inside an indented loop body
fn await_in_loop(code: &str) -> Option<usize> {
    let lines: Vec<&str> = code.lines().collect();

    for (index, line) in lines.iter().enumerate() {
        if !LOOP_START.is_match(line) {
            continue;
        }
        if line.contains("await") && !line.trim_start().starts_with("for await") {
            return Some(index + 1);
        }
        let loop_indent = indent_width(line);
        for (offset, body) in lines[index + 1..].iter().enumerate() {
            if body.trim().is_empty() {
                continue;
            }
            if indent_width(body) <= loop_indent {
                break;
            }
            if body.contains("await ") {
                return Some(index + offset + 2);
            }
        }
    }
    None
}

fn indent_width(line: &str) -> usize {
    line.chars().take_while(|c| c.is_whitespace()).count()
}

fn summarize_changes(original: &str, migrated: &str, rules: &[MappingPair]) -> ChangeSummary {
    let diff = TextDiff::from_lines(original, migrated);
    let old_lines: Vec<&str> = original.lines().collect();
    let new_lines: Vec<&str> = migrated.lines().collect();
    let mut summary = ChangeSummary::default();

    for op in diff.ops() {
        let old_range = op.old_range();
        let new_range = op.new_range();
        match op.tag() {
            DiffTag::Equal => continue,
            DiffTag::Delete | DiffTag::Insert | DiffTag::Replace => {}
        }

        summary
            .removed_lines
            .extend(old_range.clone().filter_map(|i| old_lines.get(i)).map(|l| (*l).to_string()));
        summary
            .added_lines
            .extend(new_range.clone().filter_map(|i| new_lines.get(i)).map(|l| (*l).to_string()));

        if op.tag() != DiffTag::Replace {
            continue;
        }
        for (old_index, new_index) in old_range.zip(new_range) {
            let (Some(old), Some(new)) = (old_lines.get(old_index), new_lines.get(new_index)) else {
                continue;
            };
            let line = new_index + 1;

            for rule in rules {
                if contains_word(old, &rule.source) && new.contains(&rule.destination) {
                    summary.field_substitutions.push(FieldSubstitution {
                        line,
                        source: rule.source.clone(),
                        destination: rule.destination.clone(),
                    });
                }
            }

            let old_url = URL.find(old).map(|m| m.as_str());
            let new_url = URL.find(new).map(|m| m.as_str());
            if let (Some(from), Some(to)) = (old_url, new_url) {
                if from != to {
                    summary.url_substitutions.push(UrlSubstitution {
                        line,
                        from: from.to_string(),
                        to: to.to_string(),
                    });
                }
            }
        }
    }
    summary
}

/// Weighted size score: lines 0.2, functions 2, conditionals 1.5, loops 2
fn complexity_score(code: &str) -> f64 {
    let lines = code.lines().filter(|l| !l.trim().is_empty()).count();
    let functions = FUNCTION_DEF.find_iter(code).count();
    let conditionals = CONDITIONAL.find_iter(code).count();
    let loops = LOOP.find_iter(code).count();

    lines as f64 * 0.2 + functions as f64 * 2.0 + conditionals as f64 * 1.5 + loops as f64 * 2.0
}
