//! Prompts for the constrained reasoner.
//!
//! The system message is fixed per build: behavioral preamble, output
//! schema, UNKNOWN instruction. The user message carries the run's
//! evidence block and the deterministic concept hints.

use std::fmt::Write as _;

use antigravity_core::{
    AnalysisRequest, CandidateOverlap, ConceptCategory, ConceptSet, EvidenceRegistry,
    EvidenceSource,
};

use crate::providers::ChatMessage;
use crate::reasoner::schema::REASONER_OUTPUT_SCHEMA_JSON;

/// Concept hints listed in the prompt.
pub const MAX_CONCEPT_HINTS: usize = 15;

/// Behavioral preamble. The reasoner compares; it does not judge.
pub const REASONER_PREAMBLE: &str = r#"
You are an evidence-locked comparison engine.

You compare a submitted work against the evidence listed in the EVIDENCE block.
You do not decide patentability, novelty or legal validity.
You do not use knowledge from outside the EVIDENCE block.

## Evidence Rules
1. Every prior-art match and every novel aspect MUST cite at least one evidence id
   from the EVIDENCE block, copied exactly (e.g. EVD-20250101120000-RETRIEVED).
2. Never invent an evidence id. Claims citing unknown ids are discarded.
3. Never invent prior art, authors, patent numbers, dates or quotations.
4. similarity_score and certainty are numbers between 0.0 and 1.0.
5. If the evidence does not support a statement, leave it out and add what is
   missing to "unknowns".
"#;

/// Instruction to answer UNKNOWN instead of guessing.
pub const UNKNOWN_INSTRUCTION: &str = r#"
## When You Cannot Tell
If you cannot determine "summary" or "certainty" from the evidence, set it to the
exact string "UNKNOWN". Do not guess. An honest UNKNOWN is a valid answer; a
fabricated answer is a failure.
"#;

/// Output format reminder appended after the schema.
pub const OUTPUT_INSTRUCTION: &str = r#"
## Output
Return ONLY one JSON object matching the schema above.
No markdown, no code fences, no commentary before or after the object.
"#;

/// The system message shared by every run.
pub fn system_prompt() -> String {
    format!(
        "{}{}\n## Output Schema\n{}\n{}",
        REASONER_PREAMBLE.trim_start(),
        UNKNOWN_INSTRUCTION,
        REASONER_OUTPUT_SCHEMA_JSON.trim(),
        OUTPUT_INSTRUCTION
    )
}

/// The full evidence block with identifiers.
pub fn evidence_block(registry: &EvidenceRegistry) -> String {
    let mut block = String::from("EVIDENCE (cite ONLY these ids):\n");
    for item in registry.items().iter().filter(|i| i.is_usable()) {
        let _ = write!(
            block,
            "\n[{}] ({})\n{}\n",
            item.id(),
            item.source(),
            item.text().trim()
        );
    }
    block
}

/// Deterministic pre-analysis for the model to anchor on.
pub fn concept_hints(concepts: &ConceptSet, overlaps: &[CandidateOverlap]) -> String {
    let mut hints = String::from("CONCEPT HINTS (deterministic, for orientation only):\n");

    if concepts.is_empty() {
        hints.push_str("- no candidate terms found\n");
    }
    for (term, concept) in concepts.top(MAX_CONCEPT_HINTS) {
        let _ = writeln!(
            hints,
            "- {} [{}] weight {:.3}{}",
            term,
            category_label(concept.category),
            concept.weight,
            if concept.is_known { ", in evidence" } else { "" }
        );
    }

    let absent: Vec<&str> = concepts
        .terms_in(ConceptCategory::Differentiating)
        .into_iter()
        .filter(|term| concepts.get(term).is_some_and(|c| !c.is_known))
        .collect();
    if !absent.is_empty() {
        let _ = writeln!(
            hints,
            "\nDIFFERENTIATING TERMS ABSENT FROM OTHER EVIDENCE:\n- {}",
            absent.join(", ")
        );
    }

    if !overlaps.is_empty() {
        hints.push_str("\nLEXICAL OVERLAPS:\n");
        for overlap in overlaps {
            let terms: Vec<&str> = overlap.shared_terms.iter().map(String::as_str).collect();
            let _ = writeln!(
                hints,
                "- {}: {} ({:.3} of concept terms)",
                overlap.evidence_id,
                terms.join(", "),
                overlap.overlap_ratio
            );
        }
    }

    hints
}

fn category_label(category: ConceptCategory) -> &'static str {
    match category {
        ConceptCategory::Differentiating => "differentiating",
        ConceptCategory::CommonDomain => "common_domain",
        ConceptCategory::Methodological => "methodological",
    }
}

/// Build the messages for one reasoning call.
pub fn build_messages(
    request: &AnalysisRequest,
    concepts: &ConceptSet,
    overlaps: &[CandidateOverlap],
    registry: &EvidenceRegistry,
) -> Vec<ChatMessage> {
    let project = request.project_type();
    let submitted_id = registry
        .items()
        .iter()
        .find(|i| i.source() == EvidenceSource::UserInput)
        .map(|i| i.id().to_string())
        .unwrap_or_else(|| "the user_input item".to_string());

    let mut task = format!(
        "TASK: Compare the submitted {} ({}) against the {} in the EVIDENCE block.\n",
        project.work_label(),
        submitted_id,
        project.prior_art_label()
    );
    if let Some(title) = request.title() {
        let _ = writeln!(task, "Title: {}", title);
    }
    task.push_str(
        "Report overlaps as prior_art_matches and differentiation as novel_aspects.\n\n",
    );

    let user = format!(
        "{}{}\n{}",
        task,
        evidence_block(registry),
        concept_hints(concepts, overlaps)
    );

    vec![ChatMessage::system(system_prompt()), ChatMessage::user(user)]
}

/// Follow-up asking the model to fix a reply that failed to parse.
pub fn repair_message(error: &str) -> ChatMessage {
    ChatMessage::user(format!(
        "Your previous response was rejected: {}\n\
         Return ONLY a corrected JSON object that matches the output schema. \
         Use \"UNKNOWN\" for summary or certainty if the evidence does not support a value.",
        error
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use antigravity_core::{DeterministicAnalyzer, InputValidator, RawAnalysisRequest};
    use chrono::{TimeZone, Utc};
    use crate::providers::Role;

    fn fixture() -> (AnalysisRequest, EvidenceRegistry) {
        let raw = RawAnalysisRequest::new(
            "A Graphene Anode for fast charging of LIDAR drones.",
            Some("Graphene Anode"),
            "patent",
        );
        let request = InputValidator::default().validate(&raw).unwrap();
        let mut registry =
            EvidenceRegistry::starting_at(Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap());
        registry
            .register(EvidenceSource::UserInput, request.text())
            .unwrap();
        registry
            .register(EvidenceSource::Retrieved, "Prior work on a Graphene Anode.")
            .unwrap();
        registry.register(EvidenceSource::External, "   ").unwrap();
        (request, registry)
    }

    #[test]
    fn test_system_prompt_carries_contract() {
        let prompt = system_prompt();
        assert!(prompt.contains("Never invent an evidence id"));
        assert!(prompt.contains("\"UNKNOWN\""));
        assert!(prompt.contains("\"prior_art_matches\""));
        assert!(prompt.contains("Return ONLY one JSON object"));
    }

    #[test]
    fn test_evidence_block_lists_usable_ids() {
        let (_, registry) = fixture();
        let block = evidence_block(&registry);
        assert!(block.contains("[EVD-20250101120000-INPUT] (user_input)"));
        assert!(block.contains("[EVD-20250101120000-RETRIEVED] (retrieved)"));
        assert!(!block.contains("EXTERNAL"));
    }

    #[test]
    fn test_messages_include_hints_and_overlaps() {
        let (request, registry) = fixture();
        let analyzer = DeterministicAnalyzer::default();
        let mut concepts = analyzer.analyze_request(&request).unwrap();
        let overlaps = analyzer.candidate_overlaps(&concepts, &registry);
        concepts.mark_known(&overlaps);

        let messages = build_messages(&request, &concepts, &overlaps, &registry);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        let user = &messages[1].content;
        assert!(user.contains("submitted patent claim (EVD-20250101120000-INPUT)"));
        assert!(user.contains("Title: Graphene Anode"));
        assert!(user.contains("graphene anode [differentiating] weight 1.000, in evidence"));
        assert!(user.contains("LEXICAL OVERLAPS"));

        let absent = user
            .split("DIFFERENTIATING TERMS ABSENT FROM OTHER EVIDENCE:\n")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .unwrap();
        assert_eq!(absent, "- LIDAR");
    }

    #[test]
    fn test_repair_message_quotes_error() {
        let msg = repair_message("response is not valid JSON");
        assert_eq!(msg.role, Role::User);
        assert!(msg.content.contains("response is not valid JSON"));
    }
}
