//! Prompt templates

/// Multi-document summary request, sent as the query of a synthesis
pub const SUMMARY_PROMPT: &str = "You are a skilled researcher and summarization expert. Your task is to summarize the academic articles based on their abstracts into one cohesive description. Each article may come from a different field or focus on different aspects (theory, experiments, reviews, etc.), so ensure your summary reflects the key points accurately for each one.
Form a cohesive paragraph that explains what the abstracts are generally about. Ensure you encapsulate the following topics from each of the abstracts:
1. Discipline or Topic: Identify the general areas of exploration for each abstract, if many overlap just include the overlapping topic once
2. Objective or Focus: Describe the main question, objective, or hypothesis the articles.
3. Methodology or Approach: Mention the type of study (e.g., experiment, survey, case study, literature review) and any notable techniques used.
Be concise but thorough, extracting only the most important information from the abstracts. Do not list each article one at a time but rather refer to the general idea of all articles. Keep your summary to a maximum of 75 words.";

/// Ask for `n` alternative search queries, one per line
pub fn query_generation(query: &str, n: usize) -> String {
    format!(
        "You are a helpful assistant that generates multiple search queries based on a single input query. Generate {n} search queries, one on each line, related to the following input query:\nQuery: {query}\nQueries:\n"
    )
}

/// Compact question answering over stuffed context
pub fn context_qa(context: &str, query: &str) -> String {
    format!(
        "Context information is below.\n---------------------\n{context}\n---------------------\nGiven the context information and not prior knowledge, answer the query.\nQuery: {query}\nAnswer: "
    )
}

/// Translate plain-language search terms into database search notation
pub fn translate_terms(terms: &[(String, String)]) -> String {
    let mut prompt = String::from(
        "Translate the following plain language terms into scientific notation. \
         Use appropriate scientific notations such as:\n\
         - '/' after an index term to indicate that all subheadings were selected.\n\
         - '*' before an index term to indicate the term was focused (major term).\n\
         - 'exp' before an index term to indicate the term was exploded.\n\
         - '.tw.' for title/abstract search, '.mp.' for free text search, '.pt.' for publication type.\n\
         - '$' for truncation, '?' for wildcards, and 'adj' for adjacency.\n\n\
         For example, if 'Adult over 25 years' is given, return 'age>=25/class=Adult.tw.'.\n\n\
         Translate the following keys into scientific notation and match them with their corresponding plain language values:\n\n",
    );

    for (key, value) in terms {
        prompt.push_str(&format!("Key: {}\nValue: {}\n", key, value));
    }

    prompt.push_str(
        "\nReturn the output exclusively in JSON format (no other text), where each key is the original plain language term \
         and the corresponding value is the translated scientific notation. Ensure the JSON structure is as follows:\n\
         {\n  \"<original term>\": \"scientific notation here\"\n}",
    );
    prompt
}

/// One-sentence-per-field PICO rewrite from extracted terms and the abstract
pub fn pico_enhancement(terms: &str, abstract_text: &str) -> String {
    format!(
        "For the given PICO Extraction (Patient, Intervention, Outcome) look at the source abstract and give me a short sentence that accurately represents PICO for the document.\n\
         You should return a dictionary with {{'pico_i': 'Generated Sentence Related to Intervention', 'pico_p': 'Generated Sentence Related to study Participant', 'pico_o': 'Generated Sentence Related to study Outputs', 'pico_c': 'Generated Sentence Related to Comparison'}}.\n\
         The PICO terms are: {terms}\n\
         The full abstract is: {abstract_text}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_generation_prompt() {
        let prompt = query_generation("aspirin and stroke", 3);
        assert!(prompt.contains("Generate 3 search queries"));
        assert!(prompt.ends_with("Query: aspirin and stroke\nQueries:\n"));
    }

    #[test]
    fn test_context_prompt_layout() {
        let prompt = context_qa("ctx", "q");
        assert!(prompt.starts_with("Context information is below.\n---------------------\nctx\n"));
        assert!(prompt.ends_with("Query: q\nAnswer: "));
    }

    #[test]
    fn test_translate_prompt_lists_terms() {
        let prompt = translate_terms(&[("P (Population)".into(), "Adults over 25 years".into())]);
        assert!(prompt.contains("Key: P (Population)\nValue: Adults over 25 years\n"));
        assert!(prompt.contains("'adj' for adjacency"));
    }

    #[test]
    fn test_summary_prompt_word_limit() {
        assert!(SUMMARY_PROMPT.contains("maximum of 75 words"));
    }
}
