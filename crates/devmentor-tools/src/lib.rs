//! The three mentoring utilities personas can call while answering, plus
//! their JSON-RPC server and client.

use anyhow::{Result, anyhow};
use devmentor_core::ToolDefinition;
use serde_json::{Value, json};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

mod client;
mod server;

pub use client::ToolServerClient;
pub use server::{METHOD_CALL, METHOD_INITIALIZE, METHOD_LIST, ToolServerHandler, tool_server_service};

pub const TOOL_SERVER_NAME: &str = "DevMentorMCP";

const SNIPPET_RULE_WIDTH: usize = 70;
const QUIZ_DIFFICULTIES: [&str; 3] = ["Junior", "Mid", "Senior"];

const DOC_TABLE: [(&str, &str); 4] = [
    (
        "python async",
        "Python async/await enables asynchronous programming with coroutines. \
         An event loop schedules coroutines and switches between them at each await point...",
    ),
    (
        "solid principles",
        "SOLID is an acronym for five design principles: Single Responsibility, Open/Closed, \
         Liskov Substitution, Interface Segregation, Dependency Inversion...",
    ),
    (
        "big o notation",
        "Big O describes the time/space complexity of algorithms. O(1) constant, O(n) linear, \
         O(n²) quadratic, O(log n) logarithmic...",
    ),
    (
        "transformer architecture",
        "Transformers use the attention mechanism to process sequences in parallel; \
         they are the basis of BERT, GPT and most modern language models...",
    ),
];

/// Builds a fill-in-the-blanks multiple choice quiz template.
///
/// Difficulties other than `Junior`, `Mid` and `Senior` are reported as `Medium`.
pub fn generate_quiz_json(topic: &str, difficulty: &str, num_questions: u32) -> String {
    let difficulty = if QUIZ_DIFFICULTIES.contains(&difficulty) {
        difficulty
    } else {
        "Medium"
    };
    let questions = (1..=num_questions)
        .map(|id| {
            json!({
                "id": id,
                "question": format!("[Question {id}: write a relevant question about {topic}]"),
                "options": {
                    "A": "[Option A]",
                    "B": "[Option B]",
                    "C": "[Option C]",
                    "D": "[Option D]"
                },
                "correct_option": "[Correct letter: A, B, C or D]",
                "explanation": "[Explain why it is correct and why the others are wrong]"
            })
        })
        .collect::<Vec<_>>();
    let skeleton = json!({
        "meta": {
            "topic": topic,
            "difficulty": difficulty,
            "total_questions": num_questions,
            "format": "Multiple Choice"
        },
        "instructions": format!(
            "Fill in the questions below about '{topic}' at '{difficulty}' level."
        ),
        "questions": questions
    });
    serde_json::to_string_pretty(&skeleton).unwrap_or_else(|err| format!("❌ Error: {err}"))
}

/// Reads lines `start_line..=end_line` (1-based) of a UTF-8 text file.
///
/// Never fails: problems come back as a `❌ Error:` string the model can read.
pub fn read_file_snippet(file_path: &str, start_line: i64, end_line: i64) -> String {
    let path = Path::new(file_path);
    if !path.exists() {
        return format!("❌ Error: File '{file_path}' not found.");
    }
    if !path.is_file() {
        return format!("❌ Error: '{file_path}' is not a file.");
    }

    let content = match fs::read(path) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(content) => content,
            Err(_) => return format!("❌ Error: Could not decode '{file_path}' as UTF-8."),
        },
        Err(err) if err.kind() == ErrorKind::PermissionDenied => {
            return format!("❌ Error: Permission denied reading '{file_path}'.");
        }
        Err(err) => return format!("❌ Error: Unexpected failure reading file: {err}"),
    };

    let lines = content.split_inclusive('\n').collect::<Vec<_>>();
    let total = lines.len() as i64;
    let start = start_line.max(1);
    let end = end_line.min(total);
    if start > total {
        return format!("❌ Error: start_line ({start}) exceeds total lines ({total}).");
    }

    let selected = if end >= start {
        lines[(start - 1) as usize..end as usize].concat()
    } else {
        String::new()
    };
    format!(
        "📄 File: {file_path} (lines {start}-{end} of {total})\n{}\n{selected}",
        "=".repeat(SNIPPET_RULE_WIDTH)
    )
}

/// Keyword lookup against a small built-in table; the first matching key wins.
pub fn search_docs(query: &str) -> String {
    let lowered = query.to_lowercase();
    if let Some((_, summary)) = DOC_TABLE.iter().find(|(key, _)| lowered.contains(key)) {
        return format!(
            "📚 Results for '{query}':\n\n{summary}\n\n[Simulated result - no live search backend configured]"
        );
    }
    format!(
        "📚 Results for '{query}':\n\n\
         No specific result found.\n\
         Suggestions:\n\
         - Try different keywords\n\
         - Check the official documentation (docs.python.org, ML papers, etc.)\n\
         - Use Stack Overflow, GitHub Discussions or academic papers\n\n\
         [Simulated result - no live search backend configured]"
    )
}

/// Name-based dispatch over the built-in tools with argument defaulting.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolHost;

impl ToolHost {
    pub fn new() -> Self {
        Self
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        vec![
            ToolDefinition::function(
                "generate_quiz_json",
                "Generate a structured JSON template for a multiple choice technical quiz.",
                json!({
                    "type": "object",
                    "properties": {
                        "topic": {"type": "string", "description": "Quiz subject, e.g. 'Big O'"},
                        "difficulty": {
                            "type": "string",
                            "enum": ["Junior", "Mid", "Senior"],
                            "description": "Level; anything else is reported as Medium"
                        },
                        "num_questions": {"type": "integer", "minimum": 0, "default": 3}
                    },
                    "required": ["topic"]
                }),
            ),
            ToolDefinition::function(
                "read_file_snippet",
                "Read a bounded range of lines from a local text file for review.",
                json!({
                    "type": "object",
                    "properties": {
                        "file_path": {"type": "string", "description": "Relative or absolute path"},
                        "start_line": {"type": "integer", "default": 1},
                        "end_line": {"type": "integer", "default": 50}
                    },
                    "required": ["file_path"]
                }),
            ),
            ToolDefinition::function(
                "search_docs",
                "Look up a technical concept in the documentation index.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Term or phrase to look up"}
                    },
                    "required": ["query"]
                }),
            ),
        ]
    }

    pub fn names(&self) -> Vec<String> {
        self.definitions()
            .into_iter()
            .map(|def| def.function.name)
            .collect()
    }

    pub fn call(&self, name: &str, args: &Value) -> Result<String> {
        match name {
            "generate_quiz_json" => {
                let topic = required_str(args, "topic")?;
                let difficulty = args
                    .get("difficulty")
                    .and_then(Value::as_str)
                    .unwrap_or("Medium");
                let num_questions = args
                    .get("num_questions")
                    .and_then(Value::as_u64)
                    .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
                    .unwrap_or(3);
                Ok(generate_quiz_json(topic, difficulty, num_questions))
            }
            "read_file_snippet" => {
                let file_path = required_str(args, "file_path")?;
                let start = args.get("start_line").and_then(Value::as_i64).unwrap_or(1);
                let end = args.get("end_line").and_then(Value::as_i64).unwrap_or(50);
                Ok(read_file_snippet(file_path, start, end))
            }
            "search_docs" => Ok(search_docs(required_str(args, "query")?)),
            other => Err(anyhow!("unknown tool: {other}")),
        }
    }
}

fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing required argument '{key}'"))
}
