//! Fixed prompts for the strategic wrappers on [`LlmService`](crate::LlmService).

pub const STRATEGIC_TEMPERATURE: f32 = 0.3;
pub const DECISION_TEMPERATURE: f32 = 0.5;

pub const STRATEGIC_SYSTEM_PROMPT: &str = "\
You are the strategic coordinator of an agent swarm. \
Weigh the situation against the swarm's goal, name the risks you see, \
and answer with a concrete recommendation. Be concise and specific.";

pub const DECISION_SYSTEM_PROMPT: &str = "\
You choose between the options offered to an autonomous agent. \
Pick exactly one option, state it first, then justify it in at most three sentences.";

pub fn strategic_prompt(context: &str, question: &str) -> String {
    format!("## Context\n{}\n\n## Question\n{}", context.trim(), question.trim())
}

pub fn decision_prompt(situation: &str, options: &[String]) -> String {
    let mut prompt = format!("## Situation\n{}\n\n## Options\n", situation.trim());
    for (i, option) in options.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", i + 1, option));
    }
    prompt
}
