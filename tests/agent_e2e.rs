//! End-to-end agent scenarios over scripted chat, synthesizer, and
//! player doubles: tool-calling turns, voice switching, timeouts with
//! preserved memory, barge-in, and the end-of-conversation sentinel.

use std::sync::Arc;
use std::time::Duration;

use brio::config::Config;
use brio::llm::Role;
use brio::reasoning::TurnOutcome;
use brio::session::{SessionState, Supervisor};
use brio::test_utils::{MockPlayer, MockSynth, ScriptedChat, text_round, tool_round};

fn test_config(dir: &std::path::Path) -> Config {
    let mut config = Config::default();
    config.chat.api_key = "test-key".into();
    config.session.persist_dir = dir.to_path_buf();
    config.session.reasoning_timeout_s = 2;
    config.session.tts_wait_timeout_s = 2;
    config
}

async fn start(
    dir: &std::path::Path,
    chat: Arc<ScriptedChat>,
) -> (Supervisor, Arc<MockSynth>, Arc<MockPlayer>) {
    let synth = Arc::new(MockSynth::new());
    let player = Arc::new(MockPlayer::new());
    let supervisor = Supervisor::start(test_config(dir), chat, synth.clone(), player.clone())
        .await
        .expect("supervisor starts");
    (supervisor, synth, player)
}

#[tokio::test]
async fn time_question_runs_two_rounds_and_speaks() {
    let dir = tempfile::tempdir().unwrap();
    let chat = Arc::new(ScriptedChat::new(vec![
        tool_round("call_t", "clock", "{}"),
        text_round(&["It is 14:30:25 right now."]),
    ]));
    let (mut supervisor, synth, _player) = start(dir.path(), chat.clone()).await;

    let summary = supervisor.run_turn("What time is it now?").await;

    assert_eq!(summary.outcome, TurnOutcome::Completed);
    assert_eq!(summary.tool_call_count, 1);
    assert_eq!(chat.round_count(), 2);
    assert!(summary.assistant_text.contains("14:30:25"));
    assert!(!synth.calls().is_empty());
    assert!(supervisor.stats().audio_played >= 1);
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn calculator_turn_keeps_voice_unchanged() {
    let dir = tempfile::tempdir().unwrap();
    let chat = Arc::new(ScriptedChat::new(vec![
        tool_round("call_c", "calculator", r#"{"expression":"sqrt(2)"}"#),
        text_round(&["保留三位小数是 1.414。"]),
    ]));
    let (mut supervisor, synth, _player) = start(dir.path(), chat.clone()).await;
    let voice_before = supervisor.voice().voice_id();

    let summary = supervisor.run_turn("计算 sqrt(2) 保留 3 位小数").await;

    assert_eq!(summary.outcome, TurnOutcome::Completed);
    assert_eq!(summary.tool_call_count, 1);
    assert!(summary.assistant_text.contains("1.414"));
    // The tool really ran: its result went back to the model.
    let requests = chat.requests();
    let tool_result = &requests[1]
        .iter()
        .find(|m| m.role == Role::Tool)
        .expect("tool result in second request")
        .content;
    assert!(tool_result.starts_with("1.414"));
    assert_eq!(supervisor.voice().voice_id(), voice_before);
    for (_, voice_id) in synth.calls() {
        assert_eq!(voice_id, voice_before);
    }
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn language_switch_updates_voice_before_next_segment() {
    let dir = tempfile::tempdir().unwrap();
    let chat = Arc::new(ScriptedChat::new(vec![
        tool_round(
            "call_v",
            "detectLanguageAndSelectVoice",
            r#"{"language":"english","reason":"user requested English"}"#,
        ),
        text_round(&["Happy to continue in English."]),
    ]));
    let (mut supervisor, synth, _player) = start(dir.path(), chat).await;
    supervisor.voice().set(brio::tools::Voice {
        language: "chinese".into(),
        voice_id: "zh-CN-XiaoxiaoNeural".into(),
    });

    let summary = supervisor.run_turn("Hello, please switch to English").await;

    assert_eq!(summary.outcome, TurnOutcome::Completed);
    assert_eq!(supervisor.voice().voice_id(), "en-US-AriaNeural");
    // Every synthesized segment after the switch used the new voice.
    let calls = synth.calls();
    assert!(!calls.is_empty());
    for (_, voice_id) in calls {
        assert_eq!(voice_id, "en-US-AriaNeural");
    }
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn slow_model_times_out_but_memory_survives() {
    let dir = tempfile::tempdir().unwrap();
    let chat = Arc::new(
        ScriptedChat::new(vec![
            text_round(&[
                "从前有一座山。",
                "山里有一座庙。",
                "庙里有一个老和尚。",
                "他正在讲故事。",
                "故事讲的是从前有一座山。",
            ]),
            text_round(&["你刚才请我讲一个很长的故事。"]),
        ])
        .with_event_delay(Duration::from_millis(700)),
    );
    let (mut supervisor, _synth, _player) = start(dir.path(), chat.clone()).await;

    let first = supervisor.run_turn("给我讲一个很长的故事").await;
    assert_eq!(first.outcome, TurnOutcome::TimedOut);
    assert_eq!(supervisor.state(), SessionState::Started);
    assert!(!first.assistant_text.is_empty());

    let second = supervisor.run_turn("我刚才问了什么?").await;
    assert_eq!(second.outcome, TurnOutcome::Completed);
    assert!(second.assistant_text.contains("故事"));

    // The follow-up request really carried the interrupted story prefix.
    let follow_up = chat.requests().pop().unwrap();
    let story_prefix = follow_up
        .iter()
        .find(|m| m.role == Role::Assistant && m.content.contains("从前有一座山"));
    assert!(story_prefix.is_some(), "story prefix missing from history");
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn barge_in_discards_audio_and_restarts_sequences() {
    let dir = tempfile::tempdir().unwrap();
    let chat = Arc::new(ScriptedChat::new(vec![
        text_round(&[
            "Sentence one here. ",
            "Sentence two here. ",
            "Sentence three here. ",
            "Sentence four here. ",
        ]),
        text_round(&["Fresh turn reply."]),
    ]));
    let (mut supervisor, synth, player) = start(dir.path(), chat).await;
    player.set_blocking(true);
    let interrupt = supervisor.interrupt_handle();

    // Barge in while the first chunk is still playing.
    let raiser = tokio::spawn({
        let interrupt = interrupt.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            interrupt.raise();
        }
    });
    let first = supervisor.run_turn("talk to me").await;
    raiser.await.unwrap();

    // Whichever phase the interrupt landed in, the pipeline must be
    // empty almost immediately afterwards.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stats = supervisor.stats();
    assert_eq!(stats.text_q_depth, 0);
    assert_eq!(stats.audio_q_depth, 0);
    let played_after_interrupt = stats.audio_played;

    // No further audio from the cancelled turn.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(supervisor.stats().audio_played, played_after_interrupt);
    assert!(matches!(
        first.outcome,
        TurnOutcome::Cancelled | TurnOutcome::Completed | TurnOutcome::TimedOut
    ));

    // The next turn starts clean and plays from sequence zero.
    player.set_blocking(false);
    let calls_before = synth.calls().len();
    let second = supervisor.run_turn("test").await;
    assert_eq!(second.outcome, TurnOutcome::Completed);
    assert!(synth.calls().len() > calls_before);
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn sentinel_is_never_spoken_and_ends_the_session() {
    let dir = tempfile::tempdir().unwrap();
    let chat = Arc::new(ScriptedChat::new(vec![text_round(&[
        "Alright, talk to you later. ",
        "(END_CONVERSATION)",
    ])]));
    let (mut supervisor, synth, _player) = start(dir.path(), chat).await;

    let summary = supervisor.run_turn("goodbye").await;

    assert_eq!(summary.outcome, TurnOutcome::Completed);
    assert!(summary.session_ended);
    assert_eq!(supervisor.state(), SessionState::Ended);
    for (text, _) in synth.calls() {
        assert!(
            !text.to_uppercase().contains("CONVERSATION"),
            "sentinel was spoken: {text:?}"
        );
    }
    supervisor.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_synthesis_never_blocks_later_audio() {
    let dir = tempfile::tempdir().unwrap();
    let chat = Arc::new(ScriptedChat::new(vec![text_round(&[
        "Good opening line. ",
        "doomed middle line. ",
        "Good closing line.",
    ])]));
    let synth = Arc::new(MockSynth::new().with_failure("doomed middle line."));
    let player = Arc::new(MockPlayer::new());
    let mut supervisor = Supervisor::start(
        test_config(dir.path()),
        chat,
        synth.clone(),
        player.clone(),
    )
    .await
    .unwrap();

    let summary = supervisor.run_turn("speak three lines").await;

    assert_eq!(summary.outcome, TurnOutcome::Completed);
    let stats = supervisor.stats();
    assert_eq!(stats.audio_failed, 1);
    assert_eq!(stats.audio_played, 2);
    assert_eq!(player.played().len(), 2);
    supervisor.shutdown().await.unwrap();
}
