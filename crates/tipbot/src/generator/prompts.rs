//! Prompt template management.

use handlebars::Handlebars;
use serde::Serialize;

use super::GenerationError;

const TIP_TEMPLATE_NAME: &str = "tip";

/// Manages Handlebars prompt templates.
pub struct PromptManager {
    handlebars: Handlebars<'static>,
}

/// Values available to the tip template.
#[derive(Debug, Serialize)]
pub struct TipPromptData<'a> {
    pub topic: &'a str,
    pub max_length: usize,
    pub style: &'a str,
}

impl PromptManager {
    /// Create a prompt manager with the embedded tip template.
    pub fn new() -> Result<Self, GenerationError> {
        Self::with_template(TIP_TEMPLATE)
    }

    /// Create a prompt manager with a custom tip template.
    pub fn with_template(template: &str) -> Result<Self, GenerationError> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        // Prompts are plain text, not HTML.
        handlebars.register_escape_fn(handlebars::no_escape);
        handlebars
            .register_template_string(TIP_TEMPLATE_NAME, template)
            .map_err(|e| GenerationError::Permanent(format!("invalid prompt template: {e}")))?;

        Ok(Self { handlebars })
    }

    /// Render the tip prompt.
    pub fn render_tip(&self, data: &TipPromptData<'_>) -> Result<String, GenerationError> {
        self.handlebars
            .render(TIP_TEMPLATE_NAME, data)
            .map_err(|e| GenerationError::Permanent(format!("failed to render prompt: {e}")))
    }
}

/// System prompt sent with every tip request.
pub const SYSTEM_PROMPT: &str = "You write short, accurate programming tips for a developer \
audience on X. Reply with the tip text only: no preamble, no quotes, no hashtags.";

/// Tip generation prompt template.
const TIP_TEMPLATE: &str = r"Generate a {{style}} tip about {{topic}}.

Requirements:
- One practical, specific piece of advice a working developer can apply today
- Plain text, at most {{max_length}} characters
- No hashtags, no emoji, no links
- Do not start with a label such as 'Tip:' or 'Tweet:'
";
