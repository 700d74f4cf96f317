use crate::RetrievedChunk;

pub const DEFAULT_TEMPLATE: &str = "\
You are a helpful AI assistant. You have been provided with a document to assist with. \
Answer the user's questions based on the provided context, but also use your general knowledge.
Do not add the tag `<|im_start|>thought` or `<|im_end|>`.
Chat History:
{history}

Provided Context:
{context}

Question:
{question}

Your Answer:
";

const PLACEHOLDERS: [&str; 3] = ["{history}", "{context}", "{question}"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            template: DEFAULT_TEMPLATE.to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Single pass: braces inside the substituted values are left alone.
    pub fn render(&self, history: &str, context: &str, question: &str) -> String {
        let mut rendered = String::with_capacity(
            self.template.len() + history.len() + context.len() + question.len(),
        );
        let mut rest = self.template.as_str();

        while let Some((position, placeholder)) = next_placeholder(rest) {
            rendered.push_str(&rest[..position]);
            rendered.push_str(match placeholder {
                "{history}" => history,
                "{context}" => context,
                _ => question,
            });
            rest = &rest[position + placeholder.len()..];
        }

        rendered.push_str(rest);
        rendered
    }
}

fn next_placeholder(text: &str) -> Option<(usize, &'static str)> {
    PLACEHOLDERS
        .iter()
        .filter_map(|placeholder| text.find(placeholder).map(|position| (position, *placeholder)))
        .min_by_key(|(position, _)| *position)
}

pub fn format_context(chunks: &[RetrievedChunk]) -> String {
    chunks
        .iter()
        .map(|chunk| chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
