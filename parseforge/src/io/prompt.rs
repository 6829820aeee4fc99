//! Prompt pack builder for deterministic generator input.
//!
//! Prompts are rendered from minijinja templates into marked sections, then
//! trimmed to a byte budget by dropping the least critical sections first.
//! The section order and drop order are fixed so the same inputs always
//! yield the same prompt.

use minijinja::{Environment, context};
use tracing::debug;

const PLANNER_TEMPLATE: &str = include_str!("prompts/planner.md");
const AUTHOR_TEMPLATE: &str = include_str!("prompts/author.md");
const REFLECTOR_TEMPLATE: &str = include_str!("prompts/reflector.md");

/// All inputs shared by the prompt templates for one attempt.
#[derive(Debug, Clone)]
pub struct PromptInputs {
    /// Task description produced by the planning stage.
    pub task: String,
    /// Expected schema summary (columns, types, row-count hint).
    pub schema: String,
    /// Bounded excerpt of the extracted sample text.
    pub source_excerpt: String,
    /// Bounded CSV sample of the expected table.
    pub expected_sample: String,
    /// Reflection feedback from the previous failed attempt, if any.
    pub feedback: Option<String>,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("planner", PLANNER_TEMPLATE)
            .expect("planner template should be valid");
        env.add_template("author", AUTHOR_TEMPLATE)
            .expect("author template should be valid");
        env.add_template("reflector", REFLECTOR_TEMPLATE)
            .expect("reflector template should be valid");
        Self { env }
    }

    fn render_planner(&self, input: &PromptInputs) -> Result<String, minijinja::Error> {
        let template = self.env.get_template("planner")?;
        template.render(context! {
            task => input.task.trim(),
            schema => input.schema.trim(),
            expected_sample => non_empty(&input.expected_sample),
            source_excerpt => non_empty(&input.source_excerpt),
        })
    }

    fn render_author(
        &self,
        input: &PromptInputs,
        plan: Option<&str>,
    ) -> Result<String, minijinja::Error> {
        let template = self.env.get_template("author")?;
        template.render(context! {
            task => input.task.trim(),
            schema => input.schema.trim(),
            plan => plan.map(str::trim).filter(|s| !s.is_empty()),
            expected_sample => non_empty(&input.expected_sample),
            source_excerpt => non_empty(&input.source_excerpt),
            feedback => input.feedback.as_deref().map(str::trim).filter(|s| !s.is_empty()),
        })
    }

    fn render_reflector(
        &self,
        input: &PromptInputs,
        diagnostic: &str,
        candidate: &str,
    ) -> Result<String, minijinja::Error> {
        let template = self.env.get_template("reflector")?;
        template.render(context! {
            task => input.task.trim(),
            diagnostic => diagnostic.trim(),
            candidate => non_empty(candidate),
        })
    }
}

fn non_empty(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

/// A parsed section from rendered template output.
#[derive(Debug, Clone)]
struct ParsedSection {
    /// Section identifier (e.g., "contract", "task").
    key: String,
    /// Whether this section is required (cannot be dropped).
    required: bool,
    /// Full section content including header.
    content: String,
}

/// Parse sections from rendered template output using HTML comment markers.
///
/// Markers follow format: `<!-- section:KEY required|droppable -->`
fn parse_sections(rendered: &str) -> Vec<ParsedSection> {
    use std::sync::LazyLock;
    static SECTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"<!--\s*section:(\w+)\s+(required|droppable)\s*-->").unwrap()
    });

    let mut sections = Vec::new();
    let matches: Vec<_> = SECTION_RE.captures_iter(rendered).collect();

    for (i, caps) in matches.iter().enumerate() {
        let key = caps.get(1).unwrap().as_str().to_string();
        let required = caps.get(2).unwrap().as_str() == "required";
        let start = caps.get(0).unwrap().end();
        let end = matches
            .get(i + 1)
            .map(|m| m.get(0).unwrap().start())
            .unwrap_or(rendered.len());

        let content = rendered[start..end].trim().to_string();
        if !content.is_empty() || required {
            sections.push(ParsedSection {
                key,
                required,
                content,
            });
        }
    }

    sections
}

/// Apply budget to parsed sections, dropping droppable sections as needed.
///
/// Drop order: source -> expected -> candidate -> plan -> feedback
fn apply_budget_to_sections(sections: &mut Vec<ParsedSection>, budget: usize) {
    let total_len =
        |secs: &[ParsedSection]| -> usize { secs.iter().map(|s| s.content.len()).sum() };

    if total_len(sections) <= budget {
        return;
    }

    let drop_order = ["source", "expected", "candidate", "plan", "feedback"];
    for key in drop_order {
        if total_len(sections) <= budget {
            break;
        }
        if let Some(idx) = sections.iter().position(|s| s.key == key && !s.required) {
            let dropped_len = sections[idx].content.len();
            debug!(
                section = key,
                bytes_dropped = dropped_len,
                "dropped section for budget"
            );
            sections.remove(idx);
        }
    }

    // If still over budget, truncate the last section.
    if total_len(sections) > budget && !sections.is_empty() {
        let other_len: usize = sections
            .iter()
            .take(sections.len() - 1)
            .map(|s| s.content.len())
            .sum();
        let allowed = budget.saturating_sub(other_len);
        let last = sections.last_mut().unwrap();
        if last.content.len() > allowed {
            let cut = floor_char_boundary(&last.content, allowed.saturating_sub(12));
            last.content.truncate(cut);
            last.content.push_str("\n[truncated]");
            debug!(section = last.key, "truncated section for budget");
        }
    }
}

/// Render sections back to a single string.
fn render_sections(sections: &[ParsedSection]) -> String {
    sections
        .iter()
        .map(|s| s.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds a prompt pack within a byte budget, dropping less critical sections first.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    budget_bytes: usize,
}

impl PromptBuilder {
    /// Create a builder with the given byte budget.
    pub fn new(budget_bytes: usize) -> Self {
        Self { budget_bytes }
    }

    /// Build the strategy-synthesis prompt.
    pub fn build_planner(&self, input: &PromptInputs) -> PromptPack {
        let rendered = PromptEngine::new()
            .render_planner(input)
            .expect("planner template rendering should not fail");
        self.pack(&rendered)
    }

    /// Build the code-synthesis prompt.
    pub fn build_author(&self, input: &PromptInputs, plan: Option<&str>) -> PromptPack {
        let rendered = PromptEngine::new()
            .render_author(input, plan)
            .expect("author template rendering should not fail");
        self.pack(&rendered)
    }

    /// Build the reflection prompt for a failed attempt.
    pub fn build_reflector(
        &self,
        input: &PromptInputs,
        diagnostic: &str,
        candidate: &str,
    ) -> PromptPack {
        let rendered = PromptEngine::new()
            .render_reflector(input, diagnostic, candidate)
            .expect("reflector template rendering should not fail");
        self.pack(&rendered)
    }

    fn pack(&self, rendered: &str) -> PromptPack {
        let mut sections = parse_sections(rendered);
        apply_budget_to_sections(&mut sections, self.budget_bytes);
        PromptPack {
            content: render_sections(&sections),
        }
    }
}

/// A rendered prompt ready to send to the generator.
#[derive(Debug, Clone)]
pub struct PromptPack {
    content: String,
}

impl PromptPack {
    /// Get the rendered prompt content.
    pub fn render(&self) -> String {
        self.content.clone()
    }
}

/// Truncate `text` to at most `max_bytes`, respecting char boundaries.
pub fn excerpt(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let cut = floor_char_boundary(text, max_bytes);
    format!("{}\n[truncated]", &text[..cut])
}

pub(crate) fn floor_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
