//! Prompt templates for query expansion and relevance scoring.

/// Format instructions appended to the expansion prompt.
pub const LIST_FORMAT_INSTRUCTIONS: &str = "Your response should be a list of comma separated values, \
eg: `foo, bar, baz` or `foo,bar,baz`";

/// Format instructions appended to the scoring prompt.
pub const RANKING_FORMAT_INSTRUCTIONS: &str = r#"Return only a JSON object with exactly these keys:
{"relevance_score": <integer from 1 to 10>, "justification": "<one sentence>"}"#;

/// System message shared by both prompts.
pub const SYSTEM_PROMPT: &str = "You are an expert research assistant in computer science.";

/// Build the user message asking for related search terms.
pub fn expansion_prompt(query: &str) -> String {
    format!(
        "A user has provided the following query: \"{query}\".\n\
         Your task is to generate a list of 5-7 related technical keywords, alternative phrasings, \
         or underlying concepts that would be useful for searching academic databases like arXiv.\n\n\
         For example, if the query is \"inference time timbre-transfer\", you might suggest:\n\
         \"real-time voice conversion\", \"audio style transfer\", \"SDEdit for audio generation\", \
         \"GAN inversion audio\", \"voice cloning\".\n\n\
         {LIST_FORMAT_INSTRUCTIONS}"
    )
}

/// Build the user message asking for a relevance judgement of one paper.
pub fn ranking_prompt(query: &str, title: &str, abstract_text: &str) -> String {
    format!(
        "A user is searching for papers related to: \"{query}\".\n\n\
         Please evaluate the following academic paper based on its title and abstract. \
         Your task is to determine how relevant it is to the user's query.\n\n\
         Title: {title}\n\
         Abstract: {abstract_text}\n\n\
         Provide a relevance score from 1 (not relevant at all) to 10 (highly relevant).\n\
         Also, provide a brief, one-sentence justification for your score.\n\n\
         {RANKING_FORMAT_INSTRUCTIONS}"
    )
}
