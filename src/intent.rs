//! Intent schema types and system prompt rendering.
//!
//! Each bot declares a list of recognizable intents; the system prompt is
//! regenerated from that schema on every request, never cached.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct IntentDetail {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Intent {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub details: Vec<IntentDetail>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IntentSchema {
    #[serde(default)]
    pub intents: Vec<Intent>,
}

/// Renders the per-bot instruction block: enumerated intents with nested
/// details, the bot introduction, and the fixed response policy.
pub fn create_system_prompt(intents: &[Intent], bot_intro: &str) -> String {
    let mut prompt = String::from("I have the following intentions predefined:\n");

    for intent in intents {
        prompt.push_str(&format!("- \"{}\": {}\n", intent.name, intent.description));
        for detail in &intent.details {
            prompt.push_str(&format!("  - \"{}\": {}\n", detail.name, detail.description));
        }
    }

    prompt.push_str(&format!(
        r#"

Here is your introduction: **{bot_intro}**

First, based on the conversation history and the user's latest input, return a JSON that identifies the correct intention and details by their description.

IMPORTANT: You must:
1. Identify the intention with utmost accuracy and avoid any assumptions.
2. Only select the intention if it fully matches the input and context. If there is uncertainty, return "" as the intention.
3. Extract the required details for the identified intention. If any detail is not present or unclear, mark it as "".
4. Ensure that you do not guess or infer information that is not explicitly provided.
5. Ensure that when identifying the intentions and their details, you must take the description into account instead of just the name.
6. If any details of the intent are not determined, generate a follow-up question to ask for clarification and return it as 'response'. Otherwise, return the intention JSON and fill in all details.
7. Return either the "response" or the "intention".
8. When you are answering the question, do not use markdown format such as ** or ##. Try to use new line to separate different points.

If an intention is detected and all details are clear, return the response in this format:
{{
    "intention": {{
        "name": "xxx",
        "details": {{ ... }}
    }}
}}

If no intention is detected or an intention is detected but the detail is not clear, answer the question or generate a follow-up question using the bot's introduction and personality, and return:
{{
    "response": "xxx"
}}
"#
    ));

    prompt
}
