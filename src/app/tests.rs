use super::*;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::ops::{Deref, DerefMut};
use tempfile::NamedTempFile;

use crate::transcript::{Message, TurnState};

/// An app whose submissions replay an empty file, removed when the test ends.
struct TestApp {
    app: App,
    _replay: NamedTempFile,
}

impl Deref for TestApp {
    type Target = App;

    fn deref(&self) -> &App {
        &self.app
    }
}

impl DerefMut for TestApp {
    fn deref_mut(&mut self) -> &mut App {
        &mut self.app
    }
}

fn test_app() -> TestApp {
    let replay = NamedTempFile::new().expect("empty replay file");
    let config = Config {
        greeting: false,
        ..Config::default()
    };
    let app = App::new(
        &config,
        Transport::Replay {
            path: replay.path().to_path_buf(),
            delay: Duration::ZERO,
        },
    );
    TestApp {
        app,
        _replay: replay,
    }
}

fn app_with_entries(n: usize) -> TestApp {
    let mut app = test_app();
    for i in 0..n {
        app.push_system(format!("entry {i}"));
    }
    app
}

fn feed(app: &mut App, msg: RelayMessage) {
    app.tx.send(WorkerEvent::Relay(msg)).expect("send relay message");
    assert!(app.poll_worker());
}

fn chunk(text: &str) -> RelayMessage {
    RelayMessage::BotMessageChunk {
        text: text.to_string(),
    }
}

fn key(code: KeyCode) -> KeyEvent {
    KeyEvent::new(code, KeyModifiers::NONE)
}

fn ctrl(c: char) -> KeyEvent {
    KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
}

fn type_line(app: &mut App, text: &str) {
    for c in text.chars() {
        app.handle_key(key(KeyCode::Char(c)));
    }
}

fn run_command(app: &mut App, line: &str) {
    app.input = line.to_string();
    app.cursor = app.input.len();
    app.submit_current_line();
}

fn transcript(app: &App) -> Vec<String> {
    flatten_lines_to_plain(&app.render_transcript_lines(120))
}

fn transcript_text(app: &App) -> String {
    transcript(app).join("\n")
}

fn finished_reply(app: &mut App, body: &str) {
    feed(app, RelayMessage::BotMessageStart);
    feed(app, chunk(body));
    feed(app, RelayMessage::BotMessageEnd);
}

#[test]
fn pageup_disables_autoscroll_and_moves_up() {
    let mut app = app_with_entries(60);
    let before = app.scroll;
    app.handle_key(key(KeyCode::PageUp));

    assert!(!app.autoscroll);
    assert_eq!(app.scroll, before.saturating_sub(5));
}

#[test]
fn pagedown_near_bottom_reenables_autoscroll() {
    let mut app = app_with_entries(60);
    let max = app.scroll_max();
    app.autoscroll = false;
    app.scroll = max.saturating_sub(1);

    app.handle_key(key(KeyCode::PageDown));

    assert_eq!(app.scroll, max);
    assert!(app.autoscroll);
}

#[test]
fn new_entries_do_not_force_scroll_when_autoscroll_off() {
    let mut app = app_with_entries(60);
    app.autoscroll = false;
    app.scroll = 3;
    app.push_system("extra");

    assert_eq!(app.scroll, 3);
}

#[test]
fn streamed_chunks_follow_bottom_when_autoscroll_on() {
    let mut app = app_with_entries(60);
    feed(&mut app, RelayMessage::BotMessageStart);
    feed(&mut app, chunk("line\n".repeat(30).as_str()));

    let max = app.scroll_max();
    assert!(max > 0);
    assert_eq!(app.scroll, max);
}

#[test]
fn streaming_text_is_literal_and_final_text_is_formatted() {
    let mut app = test_app();
    feed(&mut app, RelayMessage::BotMessageStart);
    feed(&mut app, chunk("#### Reasoner Agent: use **bold** here"));
    assert!(transcript_text(&app).contains("use **bold** here"));

    feed(&mut app, RelayMessage::BotMessageEnd);
    let text = transcript_text(&app);
    assert!(text.contains("use bold here"));
    assert!(!text.contains("**"));

    let lines = app.render_transcript_lines(120);
    let bold = lines
        .iter()
        .flat_map(|line| line.spans.iter())
        .find(|span| span.content.as_ref() == "bold")
        .expect("bold span");
    assert!(bold.style.add_modifier.contains(Modifier::BOLD));
}

#[test]
fn rendering_the_same_state_twice_is_identical() {
    let mut app = test_app();
    finished_reply(
        &mut app,
        "intro\n#### Planner Agent:\n1. step\n```rust\nfn main() {}\n```\n#### Reviewer Agent: ok",
    );
    assert_eq!(transcript(&app), transcript(&app));
}

#[test]
fn agent_sections_render_headers_in_order() {
    let mut app = test_app();
    finished_reply(
        &mut app,
        "#### Reasoner Agent: why\n#### Generation Agent: code\n#### Reviewer Agent: fine",
    );
    let lines = transcript(&app);
    let pos = |needle: &str| {
        lines
            .iter()
            .position(|l| l.contains(needle))
            .unwrap_or_else(|| panic!("missing {needle}: {lines:?}"))
    };
    assert!(lines[pos("Reasoner Agent")].contains("▾"));
    assert!(pos("Reasoner Agent") < pos("Generation Agent"));
    assert!(pos("Generation Agent") < pos("Reviewer Agent"));
    assert_eq!(lines.iter().filter(|l| l.starts_with("bot │")).count(), 1);
}

#[test]
fn keyboard_focus_folds_a_section_and_it_stays_folded_while_streaming() {
    let mut app = test_app();
    feed(&mut app, RelayMessage::BotMessageStart);
    feed(&mut app, chunk("#### Planner Agent: first step"));

    app.handle_key(ctrl('t'));
    assert_eq!(app.focus, Some(AgentId::Planner));
    app.handle_key(ctrl('o'));

    feed(&mut app, chunk("\nsecond step"));
    let text = transcript_text(&app);
    assert!(text.contains("▸"));
    assert!(text.contains("Planner Agent"));
    assert!(!text.contains("second step"));

    feed(&mut app, RelayMessage::BotMessageEnd);
    assert!(!transcript_text(&app).contains("first step"));

    app.handle_key(ctrl('o'));
    assert!(transcript_text(&app).contains("second step"));
}

#[test]
fn focus_cycles_through_sections_and_resets_on_new_reply() {
    let mut app = test_app();
    finished_reply(&mut app, "#### Reasoner Agent: a #### Planner Agent: b");
    app.handle_key(ctrl('t'));
    app.handle_key(ctrl('t'));
    assert_eq!(app.focus, Some(AgentId::Planner));
    app.handle_key(ctrl('t'));
    assert_eq!(app.focus, Some(AgentId::Reasoner));

    feed(&mut app, RelayMessage::BotMessageStart);
    assert_eq!(app.focus, None);
}

#[test]
fn fold_commands_target_the_latest_reply() {
    let mut app = test_app();
    finished_reply(&mut app, "#### Reasoner Agent: alpha #### Reviewer Agent: omega");

    run_command(&mut app, "/collapse all");
    let text = transcript_text(&app);
    assert!(!text.contains("alpha"));
    assert!(!text.contains("omega"));

    run_command(&mut app, "/expand reviewer");
    let text = transcript_text(&app);
    assert!(!text.contains("alpha"));
    assert!(text.contains("omega"));

    run_command(&mut app, "/toggle reasoner");
    assert!(transcript_text(&app).contains("alpha"));
}

#[test]
fn unknown_agent_in_fold_command_is_reported() {
    let mut app = test_app();
    finished_reply(&mut app, "#### Reasoner Agent: alpha");
    run_command(&mut app, "/collapse validator");
    assert!(transcript_text(&app).contains("unknown agent 'validator'"));
    assert!(transcript_text(&app).contains("alpha"));
}

#[test]
fn input_is_blocked_while_busy_and_reenabled_by_error() {
    let mut app = test_app();
    type_line(&mut app, "explain this");
    app.handle_key(key(KeyCode::Enter));
    assert!(app.is_busy());
    assert!(app.input.is_empty());
    assert!(matches!(
        app.conversation.messages().last(),
        Some(Message::User(text)) if text == "explain this"
    ));

    type_line(&mut app, "more");
    assert!(app.input.is_empty());

    feed(&mut app, RelayMessage::BotMessageStart);
    feed(&mut app, chunk("partial"));
    feed(
        &mut app,
        RelayMessage::Error {
            text: "error communicating with local agent".to_string(),
        },
    );
    assert!(!app.is_busy());
    assert_eq!(app.conversation.turn(), TurnState::Idle);
    assert!(app.conversation.notice().is_some());
    assert!(transcript_text(&app).contains("(reply interrupted)"));

    type_line(&mut app, "retry");
    assert_eq!(app.input, "retry");
}

#[test]
fn esc_dismisses_the_error_notice() {
    let mut app = test_app();
    feed(
        &mut app,
        RelayMessage::Error {
            text: "backend down".to_string(),
        },
    );
    assert!(app.conversation.notice().is_some());
    app.handle_key(key(KeyCode::Esc));
    assert!(app.conversation.notice().is_none());
}

#[test]
fn greeting_arrives_as_a_complete_formatted_reply() {
    let mut app = test_app();
    feed(
        &mut app,
        RelayMessage::BotMessage {
            text: crate::relay::GREETING.to_string(),
        },
    );
    let text = transcript_text(&app);
    assert!(text.contains("Hello!"));
    assert!(!text.contains("**Hello!**"));
    assert!(!app.is_busy());
}

#[test]
fn copy_command_emits_osc52_for_the_numbered_block() {
    let mut app = test_app();
    finished_reply(
        &mut app,
        "```sh\nls\n```\n#### Generation Agent:\n```rust\nfn main() {}\n```",
    );
    assert!(transcript_text(&app).contains("[copy 2]"));

    run_command(&mut app, "/copy 2");
    let seq = app.pending_clipboard.clone().expect("clipboard sequence");
    assert_eq!(seq, commands::osc52_sequence("fn main() {}"));
    assert!(seq.starts_with("\u{1b}]52;c;"));
    assert!(seq.ends_with('\u{7}'));

    run_command(&mut app, "/copy 9");
    assert!(transcript_text(&app).contains("no code block 9"));
}

#[test]
fn collapsed_sections_keep_copy_numbering() {
    let mut app = test_app();
    finished_reply(
        &mut app,
        "#### Reasoner Agent:\n```\na\n```\n#### Generation Agent:\n```\nb\n```",
    );
    run_command(&mut app, "/collapse reasoner");
    let text = transcript_text(&app);
    assert!(!text.contains("[copy 1]"));
    assert!(text.contains("[copy 2]"));
}

#[test]
fn context_command_attaches_a_local_file() {
    let mut app = test_app();
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("helper.rs");
    std::fs::write(&path, "fn helper() {}").expect("write context file");

    run_command(&mut app, &format!("/context {}", path.display()));
    assert_eq!(app.conversation.context_file(), Some("helper.rs"));
    assert_eq!(app.context_code, "fn helper() {}");

    run_command(&mut app, "/context clear");
    assert_eq!(app.conversation.context_file(), None);
    assert!(app.context_code.is_empty());
}

#[test]
fn missing_context_file_without_backend_is_reported() {
    let mut app = test_app();
    run_command(&mut app, "/context definitely-not-here.txt");
    assert!(transcript_text(&app).contains("cannot read definitely-not-here.txt"));
    assert_eq!(app.conversation.context_file(), None);
}

#[test]
fn fetched_context_event_updates_the_chip() {
    let mut app = test_app();
    app.tx
        .send(WorkerEvent::ContextLoaded {
            name: "utils.py".to_string(),
            result: Ok("def f(): pass".to_string()),
        })
        .expect("send");
    assert!(app.poll_worker());
    assert_eq!(app.conversation.context_file(), Some("utils.py"));
    assert_eq!(app.context_code, "def f(): pass");
}

#[test]
fn clear_is_refused_mid_stream() {
    let mut app = test_app();
    feed(&mut app, RelayMessage::BotMessageStart);
    feed(&mut app, chunk("streaming"));
    run_command(&mut app, "/clear");
    assert!(transcript_text(&app).contains("cannot clear while a reply is streaming"));

    feed(&mut app, RelayMessage::BotMessageEnd);
    run_command(&mut app, "/clear");
    assert!(app.conversation.messages().is_empty());
}

#[test]
fn slash_hints_filter_by_prefix() {
    let mut app = test_app();
    type_line(&mut app, "/th");
    assert_eq!(
        app.slash_hints(),
        vec!["/theme graphite", "/theme fjord", "/theme ember"]
    );
    app.handle_key(key(KeyCode::Tab));
    app.handle_key(key(KeyCode::Enter));
    assert_eq!(app.input, "/theme fjord");
    app.handle_key(key(KeyCode::Enter));
    assert_eq!(app.theme, ThemePreset::Fjord);
}

#[test]
fn unknown_commands_are_reported() {
    let mut app = test_app();
    run_command(&mut app, "/frobnicate");
    assert!(transcript_text(&app).contains("unknown command: /frobnicate"));
}

#[test]
fn health_result_updates_backend_status() {
    let mut app = test_app();
    app.tx
        .send(WorkerEvent::Health(Ok(crate::relay::BackendStatus::Initializing)))
        .expect("send");
    assert!(app.poll_worker());
    assert!(app.backend_status.contains("initializing"));

    app.tx
        .send(WorkerEvent::Health(Err("connection refused".to_string())))
        .expect("send");
    assert!(app.poll_worker());
    assert_eq!(app.backend_status, "backend unreachable");
}

#[test]
fn chunks_are_sanitized_before_reaching_the_transcript() {
    let mut app = test_app();
    feed(&mut app, RelayMessage::BotMessageStart);
    feed(&mut app, chunk("\u{1b}[31mred\u{1b}[0m\r\nnext"));
    let text = transcript_text(&app);
    assert!(text.contains("red"));
    assert!(!text.contains('\u{1b}'));
    assert!(!text.contains('\r'));
}

#[test]
fn sanitize_strips_osc_and_keeps_tabs() {
    assert_eq!(
        sanitize_runtime_text("a\u{1b}]0;title\u{7}b\tc\u{1b}]8;;x\u{1b}\\d"),
        "ab\tcd"
    );
    assert_eq!(sanitize_runtime_text("x\u{8}y\r\n"), "xy\n");
}

#[test]
fn editing_keys_move_by_characters() {
    let mut app = test_app();
    type_line(&mut app, "héllo wörld");
    app.handle_key(key(KeyCode::Left));
    app.handle_key(key(KeyCode::Backspace));
    assert_eq!(app.input, "héllo wörd");
    app.handle_key(ctrl('w'));
    assert_eq!(app.input, "héllo d");
    app.handle_key(key(KeyCode::Home));
    app.handle_key(key(KeyCode::Delete));
    assert_eq!(app.input, "éllo d");
}

#[test]
fn history_recalls_previous_submissions() {
    let mut app = test_app();
    run_command(&mut app, "/help");
    run_command(&mut app, "/theme ember");
    app.handle_key(key(KeyCode::Up));
    assert_eq!(app.input, "/theme ember");
    app.handle_key(ctrl('p'));
    assert_eq!(app.input, "/help");
    app.handle_key(ctrl('n'));
    assert_eq!(app.input, "/theme ember");
}

#[test]
fn escape_sequence_split_across_chunks_is_removed() {
    let mut app = test_app();
    feed(&mut app, RelayMessage::BotMessageStart);
    feed(&mut app, chunk("plain \u{1b}[3"));
    feed(&mut app, chunk("1mred\u{1b}]0;ti"));
    feed(&mut app, chunk("tle\u{7} done"));
    let text = transcript_text(&app);
    assert!(text.contains("plain red done"));
    assert!(!text.contains("1mred"));
}

#[test]
fn open_escape_does_not_leak_into_the_next_reply() {
    let mut app = test_app();
    feed(&mut app, RelayMessage::BotMessageStart);
    feed(&mut app, chunk("cut \u{1b}["));
    feed(&mut app, RelayMessage::BotMessageEnd);
    finished_reply(&mut app, "Xfresh");
    assert!(transcript_text(&app).contains("Xfresh"));
}

#[test]
fn copy_labels_only_mark_the_reply_copy_reads() {
    let mut app = test_app();
    finished_reply(&mut app, "```sh\nold_code\n```");
    finished_reply(&mut app, "```sh\nnew_code\n```");
    let text = transcript_text(&app);
    assert_eq!(text.matches("[copy 1]").count(), 1);

    let lines = transcript(&app);
    let label = lines.iter().position(|l| l.contains("[copy 1]")).expect("label");
    let old = lines.iter().position(|l| l.contains("old_code")).expect("old code");
    assert!(label > old);

    run_command(&mut app, "/copy 1");
    assert_eq!(app.pending_clipboard, Some(commands::osc52_sequence("new_code")));
}

#[test]
fn a_failing_block_falls_back_to_plain_text_alone() {
    let mut app = test_app();
    finished_reply(
        &mut app,
        &format!(
            "#### Reasoner Agent: **kept** bold\n```\na\n```\n#### Reviewer Agent: {} **raw**\n```\nb\n```\n#### Planner Agent: ```\nc\n```",
            render::FORMAT_FAILURE_TRIGGER
        ),
    );
    let text = transcript_text(&app);
    assert!(text.contains("kept bold"));
    assert!(text.contains("**raw**"));
    assert!(text.contains("Reviewer Agent"));
    assert!(text.contains("[copy 1]"));
    assert!(!text.contains("[copy 2]"));
    assert!(text.contains("[copy 3]"));
}

#[test]
fn finished_markdown_renders_links_and_nested_emphasis() {
    let mut app = test_app();
    finished_reply(&mut app, "read [the docs](https://docs.rs) and __this *very* bit__");
    let text = transcript_text(&app);
    assert!(text.contains("read the docs (https://docs.rs) and this very bit"));
    assert!(!text.contains("__"));

    let lines = app.render_transcript_lines(120);
    let very = lines
        .iter()
        .flat_map(|line| line.spans.iter())
        .find(|span| span.content.as_ref() == "very")
        .expect("nested span");
    assert!(very.style.add_modifier.contains(Modifier::BOLD));
}

#[test]
fn complete_message_during_a_stream_keeps_compose_locked() {
    let mut app = test_app();
    type_line(&mut app, "q");
    app.handle_key(key(KeyCode::Enter));
    feed(&mut app, RelayMessage::BotMessageStart);
    feed(&mut app, chunk("#### Planner Agent: step"));
    feed(
        &mut app,
        RelayMessage::BotMessage {
            text: "note".to_string(),
        },
    );
    type_line(&mut app, "again");
    assert!(app.input.is_empty());
    assert!(app.is_busy());

    app.handle_key(ctrl('t'));
    assert_eq!(app.focus, Some(AgentId::Planner));
}
