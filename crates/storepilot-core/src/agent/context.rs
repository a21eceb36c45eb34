//! Context injection for the agent loop.
//!
//! Every agent visit refreshes the system message at the head of the
//! transcript with the current store inventory. A focus hint naming the
//! store the user last mentioned is added to the model input only.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ai::types::Message;
use crate::tenant::{StoreRecord, TenantDirectory};

pub const SYSTEM_PROMPT: &str = "You are the StorePilot store architect. You manage stores through the tools bound to this conversation.

### Safe Execution Protocol
1. **READ FIRST**: List or get a resource to verify its state before modifying it.
2. **EXECUTE**: Run the specific tool required.
3. **VERIFY**: Check the state again to confirm success.

### Rules
- Execute requests immediately without asking for confirmation.
- Never mention internal infrastructure details to end users.
- Use Markdown for lists and emphasis.
- If several stores exist and the user has not named one, ask which store they mean.";

const FOCUS_PREFIX: &str = "Current focus:";

static STORE_NAMED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bstore\s+([a-z0-9-]+)\b").unwrap());
static IN_STORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bin\s+([a-z0-9-]+)\s+store\b").unwrap());
static MARKUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\\*`_]").unwrap());

/// Inventory paragraph appended to the system prompt. Empty when nothing is known.
pub fn stores_context(stores: &[StoreRecord]) -> String {
    let names: Vec<&str> = stores
        .iter()
        .map(StoreRecord::label)
        .filter(|label| !label.is_empty())
        .collect();
    match names.as_slice() {
        [] => String::new(),
        [only] => format!(
            "\n\nCURRENT SYSTEM STATE: The following stores are available: {only}. \
             Automatically use store '{only}' for all operations unless the user explicitly names a different one."
        ),
        _ => format!(
            "\n\nCURRENT SYSTEM STATE: The following stores are available: {}. \
             You must identify which store the user is referring to. If it is ambiguous, ask for clarification from the available list.",
            names.join(", ")
        ),
    }
}

/// System prompt plus the live inventory
pub async fn system_context(directory: &dyn TenantDirectory) -> String {
    let inventory = match directory.list_stores().await {
        Some(stores) => stores_context(&stores),
        None => {
            tracing::warn!("Store directory unavailable, continuing without inventory context");
            String::new()
        }
    };
    format!("{SYSTEM_PROMPT}{inventory}")
}

/// Replace a leading system message with `context`, or insert one
pub fn inject_context(messages: &mut Vec<Message>, context: String) {
    match messages.first_mut() {
        Some(first) if first.is_system() => *first = Message::system(context),
        _ => messages.insert(0, Message::system(context)),
    }
}

/// Store the user is talking about, from the latest human message only
pub fn infer_focus(messages: &[Message]) -> Option<String> {
    let last_human = messages.iter().rev().find(|m| m.is_human())?;
    let text = MARKUP.replace_all(&last_human.content().to_lowercase(), "").into_owned();
    STORE_NAMED
        .captures(&text)
        .or_else(|| IN_STORE.captures(&text))
        .map(|caps| caps[1].to_string())
}

pub fn focus_hint(store: &str) -> String {
    format!("{FOCUS_PREFIX} Store '{store}'. Please ensure all tool calls use this store name.")
}

/// Messages sent to the model: the transcript with the focus hint placed
/// right after the context message. Stale hints are dropped.
pub fn model_input(messages: &[Message], focus: Option<&str>) -> Vec<Message> {
    let is_hint = |m: &Message| m.is_system() && m.content().starts_with(FOCUS_PREFIX);
    let mut input: Vec<Message> = messages.iter().filter(|m| !is_hint(m)).cloned().collect();
    if let Some(store) = focus {
        let at = usize::from(input.first().is_some_and(Message::is_system));
        input.insert(at, Message::system(focus_hint(store)));
    }
    input
}
