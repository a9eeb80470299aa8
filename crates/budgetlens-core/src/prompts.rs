//! Prompt library for the analyzers
//!
//! Prompts are loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/budgetlens/prompts/overrides/)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! This allows users to tune the wording sent to the model without rebuilding,
//! while automatically getting new default prompts on upgrade.
//!
//! A prompt file is YAML frontmatter (`id`, `version`, `task_type`) followed by
//! a `# System` and a `# User` section. The user section is a template:
//! `{{name}}` is replaced by a variable and `{{#if name}}...{{/if}}` is kept
//! only when `name` is set and non-empty.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use serde::Deserialize;

use crate::config::TaskType;
use crate::error::{Error, Result};

/// Embedded default prompts (compiled into binary)
mod defaults {
    pub const ANALYZE_RECEIPT: &str = include_str!("../../../prompts/analyze_receipt.md");
    pub const EXTRACT_STATEMENT: &str = include_str!("../../../prompts/extract_statement.md");
    pub const CLASSIFY_LINE_ITEMS: &str = include_str!("../../../prompts/classify_line_items.md");
}

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Receipt image → single expense
    AnalyzeReceipt,
    /// Statement PDF → `{description, amount}` lines
    ExtractStatement,
    /// Unmatched statement lines → subcategories
    ClassifyLineItems,
}

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnalyzeReceipt => "analyze_receipt",
            Self::ExtractStatement => "extract_statement",
            Self::ClassifyLineItems => "classify_line_items",
        }
    }

    pub fn all() -> &'static [PromptId] {
        &[
            Self::AnalyzeReceipt,
            Self::ExtractStatement,
            Self::ClassifyLineItems,
        ]
    }

    pub fn from_id(id: &str) -> Option<Self> {
        Self::all().iter().copied().find(|p| p.as_str() == id)
    }

    /// Variables the analyzer always supplies when rendering this prompt
    pub fn required_vars(&self) -> &'static [&'static str] {
        match self {
            Self::AnalyzeReceipt => &["taxonomy_json"],
            Self::ExtractStatement => &[],
            Self::ClassifyLineItems => &["items_json", "subcategories_json", "rules"],
        }
    }

    fn default_content(&self) -> &'static str {
        match self {
            Self::AnalyzeReceipt => defaults::ANALYZE_RECEIPT,
            Self::ExtractStatement => defaults::EXTRACT_STATEMENT,
            Self::ClassifyLineItems => defaults::CLASSIFY_LINE_ITEMS,
        }
    }

    fn file_name(&self) -> String {
        format!("{}.md", self.as_str())
    }
}

/// Where a loaded prompt came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    Embedded,
    Override(PathBuf),
}

/// A parsed prompt file
#[derive(Debug, Clone)]
pub struct Prompt {
    pub id: PromptId,
    pub version: u32,
    pub task_type: TaskType,
    /// `# System` section (may be empty)
    pub system: String,
    /// `# User` section template
    pub user: String,
    pub source: PromptSource,
}

impl Prompt {
    pub fn is_override(&self) -> bool {
        matches!(self.source, PromptSource::Override(_))
    }

    /// Render the user section
    ///
    /// Fails if a variable from [`PromptId::required_vars`] is missing, so a
    /// broken override is caught before anything is sent to the model.
    pub fn render(&self, vars: &HashMap<&str, &str>) -> Result<String> {
        if let Some(missing) = self
            .id
            .required_vars()
            .iter()
            .find(|v| !vars.contains_key(*v))
        {
            return Err(Error::InvalidData(format!(
                "Prompt {} needs variable '{}'",
                self.id.as_str(),
                missing
            )));
        }
        Ok(render_template(&self.user, vars))
    }

    /// Full text sent to single-message backends: system then user section
    pub fn render_full(&self, vars: &HashMap<&str, &str>) -> Result<String> {
        let user = self.render(vars)?;
        if self.system.is_empty() {
            Ok(user)
        } else {
            Ok(format!("{}\n\n{}", self.system, user))
        }
    }
}

/// Prompt library for loading and caching prompts
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Library using the default override directory
    pub fn new() -> Self {
        Self {
            override_dir: default_prompts_dir(),
            cache: HashMap::new(),
        }
    }

    pub fn with_override_dir(path: PathBuf) -> Self {
        Self {
            override_dir: Some(path),
            cache: HashMap::new(),
        }
    }

    /// Library that never looks at the filesystem
    pub fn embedded_only() -> Self {
        Self {
            override_dir: None,
            cache: HashMap::new(),
        }
    }

    /// Get a prompt by ID, loading it on first use
    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = self.load(id)?;
            self.cache.insert(id, prompt);
        }
        self.cache
            .get(&id)
            .ok_or_else(|| Error::InvalidData(format!("Prompt not loaded: {}", id.as_str())))
    }

    /// Load and render a prompt in one step
    pub fn render(&mut self, id: PromptId, vars: &HashMap<&str, &str>) -> Result<String> {
        self.get(id)?.render_full(vars)
    }

    fn load(&self, id: PromptId) -> Result<Prompt> {
        if let Some(path) = self.override_path(id).filter(|p| p.exists()) {
            let content = fs::read_to_string(&path).map_err(|e| {
                Error::InvalidData(format!("Failed to read prompt override: {}", e))
            })?;
            let prompt = parse_prompt(id, &content, PromptSource::Override(path.clone()))?;
            tracing::debug!(prompt = id.as_str(), path = %path.display(), "Using prompt override");
            return Ok(prompt);
        }
        parse_prompt(id, id.default_content(), PromptSource::Embedded)
    }

    /// List all prompts with their override status
    pub fn list(&mut self) -> Vec<PromptInfo> {
        PromptId::all()
            .iter()
            .map(|&id| {
                let override_path = self.override_path(id).filter(|p| p.exists());
                let loaded = self.get(id);
                PromptInfo {
                    id: id.as_str().to_string(),
                    version: loaded.as_ref().map(|p| p.version).unwrap_or(0),
                    task_type: id_task_type(id).as_str().to_string(),
                    error: loaded.err().map(|e| e.to_string()),
                    override_path,
                }
            })
            .collect()
    }

    /// Path an override for `id` would live at
    pub fn override_path(&self, id: PromptId) -> Option<PathBuf> {
        self.override_dir.as_ref().map(|d| d.join(id.file_name()))
    }

    pub fn has_override(&self, id: PromptId) -> bool {
        self.override_path(id).is_some_and(|p| p.exists())
    }

    pub fn override_dir(&self) -> Option<&PathBuf> {
        self.override_dir.as_ref()
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Information about a prompt for listing
#[derive(Debug, Clone)]
pub struct PromptInfo {
    pub id: String,
    /// Version from metadata (0 if the prompt failed to load)
    pub version: u32,
    pub task_type: String,
    /// Load error, e.g. a malformed override
    pub error: Option<String>,
    /// Path to override file (if one exists)
    pub override_path: Option<PathBuf>,
}

impl PromptInfo {
    pub fn has_override(&self) -> bool {
        self.override_path.is_some()
    }
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("budgetlens").join("prompts").join("overrides"))
}

fn id_task_type(id: PromptId) -> TaskType {
    match id {
        PromptId::AnalyzeReceipt => TaskType::ReceiptAnalysis,
        PromptId::ExtractStatement => TaskType::StatementExtraction,
        PromptId::ClassifyLineItems => TaskType::LineItemClassification,
    }
}

#[derive(Debug, Deserialize)]
struct Frontmatter {
    id: String,
    version: u32,
    task_type: String,
}

/// Parse a prompt file and check it belongs to `id`
fn parse_prompt(id: PromptId, content: &str, source: PromptSource) -> Result<Prompt> {
    let content = content.trim_start();
    let rest = content.strip_prefix("---").ok_or_else(|| {
        Error::InvalidData("Prompt must start with YAML frontmatter (---)".into())
    })?;
    let end = rest.find("\n---").ok_or_else(|| {
        Error::InvalidData("Prompt frontmatter not closed (missing second ---)".into())
    })?;

    let meta: Frontmatter = serde_yaml::from_str(&rest[..end])
        .map_err(|e| Error::InvalidData(format!("Invalid prompt frontmatter: {}", e)))?;
    if meta.id != id.as_str() {
        return Err(Error::InvalidData(format!(
            "Prompt file declares id '{}' but was loaded as '{}'",
            meta.id,
            id.as_str()
        )));
    }
    let task_type = TaskType::from_key(&meta.task_type).ok_or_else(|| {
        Error::InvalidData(format!("Unknown prompt task_type: {}", meta.task_type))
    })?;

    let body = &rest[end + 4..];
    let system = section(body, "# System").unwrap_or_default();
    // A file without headers is all user prompt
    let user = section(body, "# User").unwrap_or_else(|| body.trim().to_string());

    Ok(Prompt {
        id,
        version: meta.version,
        task_type,
        system,
        user,
        source,
    })
}

/// Text under a top-level `# Header`, up to the next top-level header
fn section(body: &str, header: &str) -> Option<String> {
    let mut lines = body.lines().skip_while(|l| l.trim_end() != header);
    lines.next()?;
    let text: Vec<&str> = lines.take_while(|l| !l.starts_with("# ")).collect();
    Some(text.join("\n").trim().to_string())
}

/// Single-pass template expansion
///
/// Substituted values are never rescanned, so JSON payloads containing
/// braces pass through untouched. Unknown `{{name}}` tokens are left as-is.
fn render_template(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let Some(close) = after.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let token = after[..close].trim();
        let tail = &after[close + 2..];

        if let Some(name) = token.strip_prefix("#if ") {
            let name = name.trim();
            let (block, remainder) = match tail.find("{{/if}}") {
                Some(end) => (&tail[..end], &tail[end + 7..]),
                None => (tail, ""),
            };
            if vars.get(name).is_some_and(|v| !v.is_empty()) {
                out.push_str(&render_template(block, vars));
            }
            rest = remainder;
        } else if let Some(value) = vars.get(token) {
            out.push_str(value);
            rest = tail;
        } else {
            out.push_str(&rest[open..open + 2 + close + 2]);
            rest = tail;
        }
    }

    out.push_str(rest);
    out
}
