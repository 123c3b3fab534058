//! Assistant persona prompts
//!
//! The service ships with a built-in travel-planner persona. A deployment can
//! replace it with a persona file:
//!
//! ```toml
//! [persona]
//! name = "Budget Backpacker"
//! description = "Hostels, night trains and street food"
//!
//! [system_prompt]
//! content = """
//! You are a travel planner for travellers on a tight budget...
//! """
//! ```

use std::path::Path;

use serde::Deserialize;

/// A persona loaded from a TOML file
#[derive(Debug, Clone, Deserialize)]
pub struct PromptTemplate {
    pub persona: PersonaInfo,
    pub system_prompt: SystemPrompt,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonaInfo {
    pub name: String,

    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemPrompt {
    pub content: String,
}

impl PromptTemplate {
    pub fn from_file(path: &Path) -> Result<Self, PromptError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PromptError::Io(format!("{}: {}", path.display(), e)))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, PromptError> {
        let template: PromptTemplate =
            toml::from_str(content).map_err(|e| PromptError::Parse(e.to_string()))?;
        if template.system_prompt.content.trim().is_empty() {
            return Err(PromptError::Empty(template.persona.name));
        }
        Ok(template)
    }
}

/// Errors from persona loading
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Persona '{0}' has an empty system prompt")]
    Empty(String),
}

/// Built-in prompts that don't require files
pub mod builtin {
    /// Travel planner persona sent as the system instruction of every model call
    pub const TRAVEL_PLANNER: &str = r#"You are an expert travel planning AI assistant with deep knowledge of:
- Destination recommendations based on preferences
- Budget optimization and travel cost management
- Itinerary planning and activity suggestions
- Flight and accommodation recommendations
- Travel tips, safety, and cultural etiquette
- Weather patterns and best seasons to visit
- Visa requirements and travel documentation
- Local transportation options
- Restaurant and dining recommendations
- Off-the-beaten-path attractions

**RESPONSE FORMAT GUIDELINES:**
Always format your responses using markdown for clarity and visual appeal:

1. **Use Headers** for main sections (# for titles, ## for subsections)
2. **Use Bullet Points** for lists and options
3. **Use Bold** for important information and highlights
4. **Use Tables** for comparisons, budgets, and schedules
5. **Use Code Blocks** for itineraries, contact info, or structured data
6. **Use Lists** (numbered for steps, bullet points for options)
7. **Use Blockquotes** for tips and warnings
8. **Use Horizontal Rules** to separate major sections

**CONTENT GUIDELINES:**
When helping users plan trips:
1. Ask clarifying questions about preferences, budget, dates, and interests
2. Provide specific, actionable, detailed recommendations
3. Consider budget constraints and suggest cost-saving tips
4. Create detailed day-by-day itineraries with times and costs when requested
5. Include real-time information context (use your knowledge)
6. Suggest backup plans and alternatives
7. Include practical tips about local customs and language

**TONE:**
Be conversational, friendly, enthusiastic, and genuinely helpful. Remember context from earlier in the conversation. Use emojis sparingly but strategically (🌍 ✈️ 🏨 🍽️ 💰 📍 ⏰) to enhance readability."#;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_template() {
        let toml_content = r#"
[persona]
name = "Budget Backpacker"
description = "Cheap and cheerful"

[system_prompt]
content = "You plan trips for travellers on a shoestring."
"#;

        let template = PromptTemplate::parse(toml_content).unwrap();
        assert_eq!(template.persona.name, "Budget Backpacker");
        assert_eq!(
            template.system_prompt.content,
            "You plan trips for travellers on a shoestring."
        );
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let toml_content = r#"
[persona]
name = "Blank"

[system_prompt]
content = "   "
"#;

        let err = PromptTemplate::parse(toml_content).unwrap_err();
        assert!(matches!(err, PromptError::Empty(name) if name == "Blank"));
    }

    #[test]
    fn test_builtin_mentions_itineraries() {
        assert!(builtin::TRAVEL_PLANNER.contains("itineraries"));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slow-travel.toml");
        std::fs::write(
            &path,
            "[persona]\nname = \"Slow Travel\"\n\n[system_prompt]\ncontent = \"Suggest overland routes.\"\n",
        )
        .unwrap();

        let template = PromptTemplate::from_file(&path).unwrap();
        assert_eq!(template.persona.name, "Slow Travel");
        assert_eq!(template.system_prompt.content, "Suggest overland routes.");

        let err = PromptTemplate::from_file(&dir.path().join("gone.toml")).unwrap_err();
        assert!(matches!(err, PromptError::Io(ref msg) if msg.contains("gone.toml")));
    }
}
