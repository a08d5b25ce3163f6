//! Prompt builders for each protocol step.

use crate::debate::state::ChallengeEntry;

/// Proposal prompt. Rounds after the first seed from the previous revision.
pub fn proposal_prompt(question: &str, previous_revision: Option<&str>) -> String {
    match previous_revision {
        None => format!(
            "Answer the following question as completely and precisely as you can.\n\n\
             Question: {question}"
        ),
        Some(revision) => format!(
            "Improve your previous answer to the question below. Keep what holds up, \
             fix what does not.\n\n\
             Question: {question}\n\n\
             Previous answer:\n{revision}"
        ),
    }
}

/// Forced-disagreement challenge prompt.
pub fn challenge_prompt(question: &str, proposal: &str) -> String {
    format!(
        "You are reviewing another model's answer. Your job is to find what is wrong \
         with it. Identify concrete flaws, missing considerations, and unsupported \
         claims. Do not praise the answer and do not restate it; attack it.\n\n\
         Question: {question}\n\n\
         Answer under review:\n{proposal}"
    )
}

/// Revision prompt enumerating genuine challenges.
pub fn revision_prompt(question: &str, proposal: &str, challenges: &[&ChallengeEntry]) -> String {
    let mut objections = String::new();
    for (i, entry) in challenges.iter().enumerate() {
        objections.push_str(&format!(
            "{}. (from {}) {}\n",
            i + 1,
            entry.challenger,
            entry.text
        ));
    }
    format!(
        "Your answer received the objections below. Address each one explicitly, \
         then produce a revised answer.\n\n\
         Question: {question}\n\n\
         Your answer:\n{proposal}\n\n\
         Objections:\n{objections}"
    )
}

/// Decomposition prompt requesting a JSON subtask plan.
pub fn decompose_prompt(question: &str, max_subtasks: usize) -> String {
    format!(
        "Break the question below into 2 to {max_subtasks} independently solvable \
         subtasks. Reply with ONLY a JSON array, each element an object with keys \
         \"id\" (short unique string), \"description\" (the subtask question), and \
         \"depends_on\" (array of ids of subtasks whose results this one needs; may \
         be empty). The dependency graph must be acyclic.\n\n\
         Question: {question}"
    )
}

/// Synthesis prompt merging completed subtask decisions.
pub fn synthesis_prompt(question: &str, results: &[(String, String)]) -> String {
    let mut parts = String::new();
    for (id, decision) in results {
        parts.push_str(&format!("--- subtask {id} ---\n{decision}\n\n"));
    }
    format!(
        "The question below was split into subtasks; each subtask's vetted result \
         follows. Merge them into one coherent final answer to the original question.\n\n\
         Question: {question}\n\n\
         {parts}"
    )
}

/// Majority-judge prompt: pick one respondent's answer.
pub fn majority_judge_prompt(question: &str, answers: &[(String, String)]) -> String {
    let mut listing = String::new();
    for (i, (model, answer)) in answers.iter().enumerate() {
        listing.push_str(&format!("--- answer {i} (from {model}) ---\n{answer}\n\n"));
    }
    format!(
        "Several models answered the question below independently. Pick the single \
         best answer. Reply with ONLY a JSON object: {{\"winner\": <answer index>, \
         \"confidence\": <agreement score between 0 and 1>}}.\n\n\
         Question: {question}\n\n\
         {listing}"
    )
}

/// Weighted-judge prompt: synthesize a merged answer.
pub fn weighted_judge_prompt(question: &str, answers: &[(String, String, f64)]) -> String {
    let mut listing = String::new();
    for (model, answer, weight) in answers {
        listing.push_str(&format!(
            "--- answer from {model} (weight {weight:.1}) ---\n{answer}\n\n"
        ));
    }
    format!(
        "Several models answered the question below independently; each answer \
         carries a capability weight. Synthesize one final answer, giving more \
         credence to higher-weight answers where they conflict. Reply with ONLY a \
         JSON object: {{\"answer\": <the synthesized answer>, \"confidence\": \
         <agreement score between 0 and 1>}}.\n\n\
         Question: {question}\n\n\
         {listing}"
    )
}
