//! Prompt templates sent to the generation API.
//!
//! Assembly is plain string templating over document *names*; no document
//! content is retrieved or ranked.

use crate::models::Document;

pub const PERSONA: &str = "You are InnovGenius, a smart AI study assistant.";

/// System message for the JSON generators
pub const JSON_SYSTEM_MESSAGE: &str =
    "You generate study material. Always respond with a bare JSON array in the requested format.";

/// Context block for quiz and flashcard prompts
pub fn document_context_for_topic(documents: &[Document], topic: &str) -> String {
    if documents.is_empty() {
        return format!(
            "No documents uploaded yet. Generate questions about \"{}\" based on general knowledge.",
            topic
        );
    }

    let doc_list = documents
        .iter()
        .map(|doc| format!("- {} ({} chunks)", doc.name, doc.chunks))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "The student has uploaded these study documents:\n{}\n\nGenerate content specifically about: \"{}\"",
        doc_list, topic
    )
}

pub fn chat_prompt(document_names: &[String], message: &str) -> String {
    let doc_context = if document_names.is_empty() {
        String::new()
    } else {
        format!(
            "The student has uploaded these documents: {}. ",
            document_names.join(", ")
        )
    };

    format!(
        "{} {}Help students understand their course materials clearly and concisely. Student question: {}",
        PERSONA, doc_context, message
    )
}

pub fn quiz_prompt(topic: &str, num_questions: u32, context: &str) -> String {
    format!(
        r#"You are a quiz generator for a study assistant app. Generate exactly {num_questions} multiple-choice questions about "{topic}".

{context}

Return a JSON array ONLY, with no markdown, no extra text and no code fences. Use this exact format:
[
  {{
    "question": "Question text here?",
    "options": ["Option A", "Option B", "Option C", "Option D"],
    "correct": 0,
    "explanation": "Brief explanation of why this answer is correct."
  }}
]

Rules:
- "correct" is the 0-based index of the correct answer (0, 1, 2, or 3)
- Make all 4 options plausible but only one clearly correct
- Keep questions clear and educational
- Vary difficulty: some easy, some medium, some hard"#
    )
}

pub fn flashcard_prompt(topic: &str, count: u32, context: &str) -> String {
    format!(
        r#"You are a flashcard generator for a study assistant app. Create {count} flashcards about "{topic}".

{context}

Return a JSON array ONLY, with no markdown, no extra text and no code fences. Use this exact format:
[
  {{
    "front": "Question or concept name",
    "back": "Clear, concise explanation in 2-3 sentences."
  }}
]

Rules:
- Front: a question, key term, or concept
- Back: a clear, concise answer or explanation
- Cover the most important concepts
- Keep backs short and easy to remember"#
    )
}

pub fn highlight_prompt(document_names: &[String], selected_text: &str, question: &str) -> String {
    let doc_context = if document_names.is_empty() {
        String::new()
    } else {
        format!(" The student has these documents: {}.", document_names.join(", "))
    };

    format!(
        "{PERSONA}{doc_context}\n\nThe student highlighted this text:\n\"{selected_text}\"\n\nTheir question about it: \"{question}\"\n\nAnswer clearly and concisely in 2-4 sentences. Be educational and helpful."
    )
}
