use devmentor_core::{ConversationTurn, Role};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Personas,
    Persona(Option<String>),
    Clear,
    History,
    Diagnose,
    Exit,
    Unknown { name: String, args: Vec<String> },
}

impl SlashCommand {
    /// Parses `/name args...`; bare `exit` and `quit` also leave the chat.
    pub fn parse(input: &str) -> Option<Self> {
        let line = input.trim();
        if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
            return Some(Self::Exit);
        }
        let rest = line.strip_prefix('/')?;
        let mut parts = rest.split_whitespace();
        let name = parts.next()?.to_ascii_lowercase();
        let args = parts.map(ToString::to_string).collect::<Vec<_>>();

        let cmd = match name.as_str() {
            "help" | "?" => Self::Help,
            "personas" | "mentors" => Self::Personas,
            "persona" | "mentor" => Self::Persona(args.first().cloned()),
            "clear" => Self::Clear,
            "history" => Self::History,
            "diagnose" | "status" => Self::Diagnose,
            "exit" | "quit" => Self::Exit,
            other => Self::Unknown {
                name: other.to_string(),
                args,
            },
        };
        Some(cmd)
    }
}

pub const HELP_TEXT: &str = "\
Commands:
  /personas         list the mentors
  /persona KEY      switch the active mentor
  /clear            forget the conversation
  /history          show the conversation so far
  /diagnose         check every listener
  /exit             leave (also: exit, quit)";

/// The chat front-end's state: who we talk to and what was said.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    persona: String,
    turns: Vec<ConversationTurn>,
}

impl ChatSession {
    pub fn new(persona: impl Into<String>) -> Self {
        Self {
            persona: persona.into(),
            turns: Vec::new(),
        }
    }

    pub fn persona(&self) -> &str {
        &self.persona
    }

    /// Switching mentors keeps the conversation log.
    pub fn set_persona(&mut self, persona: impl Into<String>) {
        self.persona = persona.into();
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::assistant(content));
    }

    /// Drops the last turn if it is an unanswered user message.
    pub fn retract_pending_user(&mut self) -> Option<ConversationTurn> {
        if self.turns.last().is_some_and(|turn| turn.role == Role::User) {
            return self.turns.pop();
        }
        None
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }
}

pub fn render_history(turns: &[ConversationTurn]) -> String {
    if turns.is_empty() {
        return "(no messages yet)".to_string();
    }
    turns
        .iter()
        .map(|turn| {
            let who = match turn.role {
                Role::User => "you",
                Role::Assistant => "mentor",
            };
            format!("[{who}] {}", turn.content)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChatStatus {
    pub persona: String,
    pub port: u16,
    pub turns: usize,
    pub via_coordinator: bool,
}

pub fn render_statusline(status: &ChatStatus) -> String {
    format!(
        "mentor={} port={} turns={} route={}",
        status.persona,
        status.port,
        status.turns,
        if status.via_coordinator {
            "coordinator"
        } else {
            "direct"
        },
    )
}
