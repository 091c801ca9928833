use donna_types::{ChatResponse, Turn};

/// Wraps enriched turns into the response payload, order untouched.
pub fn assemble(turns: Vec<Turn>) -> ChatResponse {
    ChatResponse { messages: turns }
}
