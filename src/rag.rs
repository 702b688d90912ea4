use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::sync::Arc;

use crate::embeddings::Embedder;
use crate::index::VectorIndex;
use crate::llm::ChatModel;

/// How many chunks ground each answer.
pub const TOP_K: u64 = 3;

/// Answer to one question, with the ids of the chunks it was grounded in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub question: String,
    pub answer: String,
    pub sources: Vec<String>,
}

/// RAG (Retrieval-Augmented Generation) engine
pub struct RagEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    chat: Arc<dyn ChatModel>,
}

impl RagEngine {
    /// Create a new RAG engine. The same embedder must have produced the
    /// vectors already in the index; a mismatched embedding space degrades
    /// relevance silently.
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        chat: Arc<dyn ChatModel>,
    ) -> Self {
        RagEngine {
            embedder,
            index,
            chat,
        }
    }

    /// Answer a question from the indexed chunks.
    pub async fn ask(&self, question: &str) -> Result<QueryResult> {
        // Get embedding for the question
        let question_embedding = self.embedder.embed(question).await?;

        // Retrieve relevant chunks
        let chunks = self
            .index
            .search(question_embedding.values, TOP_K)
            .await?;

        // Create context from chunks
        let context = chunks
            .iter()
            .map(|chunk| chunk.content.clone())
            .collect::<Vec<String>>()
            .join("\n\n");

        // Generate answer
        let prompt = format!("Context: {}\n\nQuestion: {}", context, question);
        let answer = self.chat.complete(&prompt).await?;

        Ok(QueryResult {
            question: question.to_string(),
            answer,
            sources: chunks.into_iter().map(|chunk| chunk.id).collect(),
        })
    }

    /// Run the interactive query loop
    pub async fn run_query_loop(&self) -> Result<()> {
        info!("Ready to answer questions. Type 'exit' to quit.");

        let stdin = io::stdin();
        let mut stdout = io::stdout();
        let mut buffer = String::new();

        loop {
            print!("\nYour question: ");
            stdout.flush()?;

            buffer.clear();
            stdin.read_line(&mut buffer)?;

            let question = buffer.trim();

            if question.is_empty() {
                continue;
            }
            if question.to_lowercase() == "exit" {
                info!("Goodbye!");
                break;
            }

            let result = self.ask(question).await?;

            if result.sources.is_empty() {
                info!("No relevant information found in the index.");
                continue;
            }

            println!("\n{}", result.answer);
            println!("\nSources:");
            for source in &result.sources {
                println!("- {}", source);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::{Embedding, EmbeddingError};
    use crate::index::{IndexError, RetrievedChunk};
    use crate::llm::LlmError;
    use async_trait::async_trait;

    struct StaticEmbedder;

    #[async_trait]
    impl Embedder for StaticEmbedder {
        async fn embed(&self, _text: &str) -> Result<Embedding, EmbeddingError> {
            Ok(Embedding {
                values: vec![0.1, 0.2],
            })
        }
    }

    struct StaticIndex;

    #[async_trait]
    impl VectorIndex for StaticIndex {
        async fn upload(&self, _document: crate::index::IndexedDocument) -> Result<(), IndexError> {
            Ok(())
        }

        async fn search(
            &self,
            _vector: Vec<f32>,
            limit: u64,
        ) -> Result<Vec<RetrievedChunk>, IndexError> {
            assert_eq!(limit, TOP_K);
            Ok(vec![
                RetrievedChunk {
                    id: "chunk-1".to_string(),
                    content: "First passage.".to_string(),
                    score: 0.9,
                },
                RetrievedChunk {
                    id: "chunk-2".to_string(),
                    content: "Second passage.".to_string(),
                    score: 0.8,
                },
            ])
        }
    }

    struct EchoChat;

    #[async_trait]
    impl ChatModel for EchoChat {
        async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
            Ok(prompt.to_string())
        }
    }

    fn engine() -> RagEngine {
        RagEngine::new(
            Arc::new(StaticEmbedder),
            Arc::new(StaticIndex),
            Arc::new(EchoChat),
        )
    }

    #[tokio::test]
    async fn answers_carry_the_retrieved_sources() {
        let result = engine().ask("what is in the docs?").await.unwrap();

        assert_eq!(result.question, "what is in the docs?");
        assert_eq!(result.sources, vec!["chunk-1", "chunk-2"]);
    }

    #[tokio::test]
    async fn prompt_includes_context_and_question() {
        let result = engine().ask("why?").await.unwrap();

        // EchoChat returns the prompt verbatim.
        assert!(result.answer.starts_with("Context: First passage.\n\nSecond passage."));
        assert!(result.answer.ends_with("Question: why?"));
    }
}
