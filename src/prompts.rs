//! The resolver prompt and the closed clinical vocabulary.
//!
//! Centralising the prompt here keeps the instruction set in one place and
//! lets unit tests inspect it without calling a model. The builder is a pure
//! function: same document text in, byte-identical prompt out.

/// The fixed clinical vocabulary, uppercase, in the order shown to clinicians.
pub const CONDITIONS: [&str; 14] = [
    "MEMORY",
    "FOCUS",
    "ANXIETY",
    "DEPRESSION",
    "SLEEP",
    "HEAD INJURY",
    "PEAK PERFORMANCE",
    "OCD",
    "CHRONIC PAIN",
    "SPECTRUM",
    "HEADACHE",
    "STROKE",
    "CHRONIC FATIGUE",
    "ADDICTIONS",
];

/// Smallest protocol index a brain map can name.
pub const MIN_INDEX: i64 = 1;

/// Largest protocol index a brain map can name.
pub const MAX_INDEX: i64 = 24;

/// Heading of the report section holding the protocol table.
pub const SECTION_HEADING: &str = "PBM PROTOCOL RECOMMENDATIONS";

/// Title of the table inside [`SECTION_HEADING`].
pub const TABLE_TITLE: &str = "Protocol Selection Table";

/// Column whose first number is the protocol index.
pub const INDEX_COLUMN: &str = "Protocol #";

const INSTRUCTIONS: &str = r#"You are reading the text of a neurofeedback brain-map report. Your only task is to extract two values from one table.

Follow these rules precisely:

1. LOCATE THE TABLE
   - Find the section whose heading is exactly "{section}"
   - Inside that section, find the table titled exactly "{table}"
   - Ignore every other section and table in the document

2. EXTRACT THE INDEX
   - Read the column labelled exactly "{column}"
   - Take ONLY the first number that appears in that column
   - Do NOT use page numbers, dates, scores, percentages, or any number outside that column
   - The index MUST be an integer from {min} to {max} inclusive
   - Numbers outside {min}–{max} found anywhere in the document must be disregarded

3. EXTRACT THE CONDITION
   - The condition is the clinical category named in the same row
   - It MUST be exactly one of the following, written in uppercase:
{vocabulary}
   - Map synonyms to the closest term in this list; never invent a new term

4. OUTPUT FORMAT
   - Respond with strict JSON containing exactly two keys: "condition" (string) and "index" (integer)
   - Example: {"condition": "DEPRESSION", "index": 4}
   - Do NOT wrap the JSON in ``` fences
   - Do NOT add commentary, explanations, or any other keys"#;

/// Build the model prompt for a document's extracted text.
pub fn build_resolver_prompt(document_text: &str) -> String {
    let vocabulary = CONDITIONS
        .iter()
        .map(|c| format!("     - {c}"))
        .collect::<Vec<_>>()
        .join("\n");

    let instructions = INSTRUCTIONS
        .replace("{section}", SECTION_HEADING)
        .replace("{table}", TABLE_TITLE)
        .replace("{column}", INDEX_COLUMN)
        .replace("{min}", &MIN_INDEX.to_string())
        .replace("{max}", &MAX_INDEX.to_string())
        .replace("{vocabulary}", &vocabulary);

    format!(
        "{instructions}\n\nDOCUMENT TEXT:\n\"\"\"\n{}\n\"\"\"",
        document_text.trim()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_every_condition() {
        let p = build_resolver_prompt("irrelevant");
        for c in CONDITIONS {
            assert!(p.contains(&format!("- {c}\n")), "missing {c}");
        }
    }

    #[test]
    fn prompt_names_section_table_and_column() {
        let p = build_resolver_prompt("");
        assert!(p.contains("\"PBM PROTOCOL RECOMMENDATIONS\""));
        assert!(p.contains("\"Protocol Selection Table\""));
        assert!(p.contains("\"Protocol #\""));
        assert!(p.contains("first number"));
        assert!(p.contains("page numbers, dates"));
    }

    #[test]
    fn prompt_states_range_and_json_contract() {
        let p = build_resolver_prompt("");
        assert!(p.contains("from 1 to 24 inclusive"));
        assert!(p.contains("exactly two keys: \"condition\""));
        assert!(p.contains("\"index\" (integer)"));
        assert!(p.contains("Do NOT wrap the JSON"));
    }

    #[test]
    fn placeholders_are_all_substituted() {
        let p = build_resolver_prompt("");
        for placeholder in ["{section}", "{table}", "{column}", "{min}", "{max}", "{vocabulary}"] {
            assert!(!p.contains(placeholder), "unreplaced {placeholder}");
        }
    }

    #[test]
    fn document_text_is_embedded_verbatim() {
        let text = "PBM PROTOCOL RECOMMENDATIONS\nProtocol # 7 — SLEEP";
        let p = build_resolver_prompt(&format!("  {text}\n\n"));
        assert!(p.ends_with(&format!("\"\"\"\n{text}\n\"\"\"")));
    }

    #[test]
    fn builder_is_deterministic() {
        assert_eq!(build_resolver_prompt("abc"), build_resolver_prompt("abc"));
    }

    #[test]
    fn vocabulary_is_uppercase_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for c in CONDITIONS {
            assert_eq!(c, c.to_uppercase());
            assert!(seen.insert(c), "duplicate {c}");
        }
    }
}
