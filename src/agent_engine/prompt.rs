/// Builds the model requests of the loop from embedded prompt templates.
///
/// A grounding request carries at most two images: the previous screenshot
/// (when there is one) and the current one.
use crate::agent_engine::state::StepState;
use crate::llm::types::{ChatMessage, ContentPart};
use crate::perception::types::EncodedImage;

const COMPUTER_USE: &str = include_str!("../../prompts/computer_use.md");
const RESULT_CHECK: &str = include_str!("../../prompts/result_check.md");
const CODE_INTEGRATION: &str = include_str!("../../prompts/code_integration.md");

/// Placed between step snippets in the integration request.
pub const SNIPPET_SEPARATOR: &str = "\n\n# ===== SNIPPET SEPARATOR =====\n\n";

pub fn computer_use_prompt(instruction: &str, language: &str) -> String {
    COMPUTER_USE
        .replace("{language}", language)
        .replace("{instruction}", instruction)
}

/// Assistant turn text for one history entry.
pub fn render_turn(thought: &str, action_text: &str) -> String {
    format!("Thought: {thought}\nAction: {action_text}")
}

/// Instruction, optional previous image, last turns oldest first, current image.
pub fn grounding_messages(state: &StepState, current: &EncodedImage) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::user_text(computer_use_prompt(
        &state.instruction,
        &state.language,
    ))];

    if let Some(prev) = state.previous_image() {
        messages.push(ChatMessage::user(vec![
            ContentPart::text("Previous image:"),
            ContentPart::image(prev),
        ]));
    }

    for turn in state.history() {
        messages.push(ChatMessage::assistant(render_turn(&turn.thought, &turn.action_text)));
    }

    messages.push(ChatMessage::user(vec![
        ContentPart::text("Current image:"),
        ContentPart::image(current),
    ]));
    messages
}

pub fn verification_messages(
    task_description: &str,
    expected: &EncodedImage,
    current: &EncodedImage,
) -> Vec<ChatMessage> {
    vec![
        ChatMessage::user_text(RESULT_CHECK.replace("{task_description}", task_description)),
        ChatMessage::user(vec![
            ContentPart::text("Expected end view:"),
            ContentPart::image(expected),
        ]),
        ChatMessage::user(vec![
            ContentPart::text("Current view:"),
            ContentPart::image(current),
        ]),
    ]
}

pub fn integration_messages(snippets: &[String]) -> Vec<ChatMessage> {
    let joined = snippets.join(SNIPPET_SEPARATOR);
    vec![ChatMessage::user_text(
        CODE_INTEGRATION.replace("{code_snippets}", &joined),
    )]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::types::SurfaceSize;

    fn img(tag: u8) -> EncodedImage {
        EncodedImage {
            bytes: vec![tag],
            size: SurfaceSize::new(1, 1),
        }
    }

    #[test]
    fn first_iteration_has_instruction_and_current_image_only() {
        let state = StepState::new("Click the search button", "English");
        let msgs = grounding_messages(&state, &img(1));

        assert_eq!(msgs.len(), 2);
        let intro = msgs[0].text();
        assert!(intro.contains("## User Instruction\nClick the search button"));
        assert!(intro.contains("Use English in the `Thought` part."));
        assert_eq!(msgs[1].text(), "Current image:");
        assert_eq!(msgs[1].image_count(), 1);
    }

    #[test]
    fn at_most_two_images_and_two_turns() {
        let mut state = StepState::new("fill form", "English");
        for i in 0..4u8 {
            state.add_step(img(i), format!("thought {i}"), format!("click(point='<point>{i} {i}</point>')"));
        }
        let msgs = grounding_messages(&state, &img(9));

        let images: usize = msgs.iter().map(ChatMessage::image_count).sum();
        assert_eq!(images, 2);
        assert_eq!(msgs.len(), 5);
        assert_eq!(msgs[1].text(), "Previous image:");
        assert_eq!(msgs[2].role, "assistant");
        assert_eq!(msgs[2].text(), "Thought: thought 2\nAction: click(point='<point>2 2</point>')");
        assert_eq!(msgs[3].text(), "Thought: thought 3\nAction: click(point='<point>3 3</point>')");
        assert_eq!(msgs[4].text(), "Current image:");
    }

    #[test]
    fn integration_joins_snippets() {
        let msgs = integration_messages(&["a = 1".into(), "b = 2".into()]);
        assert!(msgs[0].text().contains("a = 1\n\n# ===== SNIPPET SEPARATOR =====\n\nb = 2"));
    }
}
