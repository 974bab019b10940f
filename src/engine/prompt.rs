// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Bounded tutor prompt construction

/// Default tutor persona preamble.
pub const TUTOR_PERSONA: &str = "\
You are Katalis, a patient and encouraging AI tutor for secondary and high school students \
preparing for the GCE Pure Mathematics with Mechanics examinations.

Guide students towards understanding rather than handing out answers. Ask guiding questions \
first, break hard steps into smaller ones, and point out common misconceptions before the \
student runs into them. When a student explicitly asks for the full solution, give it, then \
walk through every step that leads to it.

Keep explanations clear and academically sound. Celebrate progress. Ground every answer in the \
reference material you are given and say so plainly when a question falls outside it.";

/// Builds the prompt sent to the engine: persona, recent history, new turn.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    persona: String,
    history_turns: usize,
}

impl PromptBuilder {
    pub fn new(history_turns: usize) -> Self {
        Self {
            persona: TUTOR_PERSONA.to_string(),
            history_turns,
        }
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = persona.into();
        self
    }

    /// Only the last `history_turns` history lines are included.
    pub fn build(&self, prompt: &str, history: &[String]) -> String {
        let mut out = String::with_capacity(self.persona.len() + prompt.len() + 256);
        out.push_str(&self.persona);
        out.push_str("\n\n");

        let skip = history.len().saturating_sub(self.history_turns);
        let recent = &history[skip..];
        if !recent.is_empty() {
            out.push_str("Previous conversation:\n");
            for line in recent {
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }

        out.push_str("Student: ");
        out.push_str(prompt);
        out.push_str("\nKatalis:");
        out
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_without_history() {
        let prompt = PromptBuilder::default().build("What is 2+2?", &[]);
        assert!(prompt.starts_with("You are Katalis"));
        assert!(!prompt.contains("Previous conversation"));
        assert!(prompt.ends_with("Student: What is 2+2?\nKatalis:"));
    }

    #[test]
    fn test_history_is_bounded() {
        let history: Vec<String> = (0..15).map(|i| format!("turn {i}")).collect();
        let prompt = PromptBuilder::new(10).build("next", &history);
        assert!(!prompt.contains("turn 4\n"));
        assert!(prompt.contains("turn 5\n"));
        assert!(prompt.contains("turn 14\n"));
        assert!(prompt.contains("Previous conversation:\n"));
    }

    #[test]
    fn test_custom_persona() {
        let prompt = PromptBuilder::new(2).with_persona("SYS").build("q", &[]);
        assert_eq!(prompt, "SYS\n\nStudent: q\nKatalis:");
    }
}
