use docent_core::{ChatView, ConversationState, Role};

/// Turns successive view snapshots into the text not yet written to the terminal.
#[derive(Debug, Default)]
pub struct TokenPrinter {
    /// Bytes of the in-flight response already printed.
    printed: usize,
    /// Messages already accounted for.
    seen: usize,
    waiting: bool,
}

impl TokenPrinter {
    /// Skip messages that were already in the history before the question.
    pub fn starting_after(seen: usize) -> Self {
        Self {
            seen,
            ..Self::default()
        }
    }

    /// True on the snapshot where a question starts waiting for its first token.
    pub fn starts_waiting(&mut self, view: &ChatView) -> bool {
        let waiting = view.is_waiting();
        let started = waiting && !self.waiting;
        self.waiting = waiting;
        started
    }

    /// Part of an answer is on screen without its closing newline.
    pub fn mid_line(&self) -> bool {
        self.printed > 0
    }

    pub fn render(&mut self, view: &ChatView) -> String {
        let mut out = String::new();

        for message in view.messages.iter().skip(self.seen) {
            if message.role == Role::Assistant {
                out.push_str(message.content.get(self.printed..).unwrap_or_default());
                out.push('\n');
                self.printed = 0;
            }
        }
        self.seen = self.seen.max(view.messages.len());

        if matches!(view.state, ConversationState::Streaming(_)) {
            out.push_str(view.streaming_text.get(self.printed..).unwrap_or_default());
            self.printed = view.streaming_text.len();
        }
        out
    }
}
