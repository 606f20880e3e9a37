//! End-to-end tests of the suggestion lifecycle with scripted collaborators.
//!
//! All tests run on a paused clock: debounce and display timers elapse as
//! soon as the runtime has nothing else to do.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use common::*;
use promptcoach::session::SchedulerState;
use promptcoach::{ChipStatus, Error, FeatureFlags, MemoryBackend, ProgressStore, TechniqueId};
use std::sync::Arc;
use std::time::Duration;

fn id(s: &str) -> TechniqueId {
    TechniqueId::new(s)
}

#[tokio::test(start_paused = true)]
async fn test_chip_surfaces_after_debounce() {
    let analyzer = ScriptedAnalyzer::new();
    analyzer.push(Ok(surface(Some(EXAMPLES))));
    let mut session = session(Arc::clone(&analyzer));

    assert!(session.handle_input(COVER_LETTER));
    assert_eq!(session.scheduler_state(), SchedulerState::Pending);
    assert_eq!(analyzer.calls(), 0);

    session.run_until_idle().await;

    let chip = session.view().chip.expect("chip surfaced");
    assert_eq!(chip.technique_id, Some(id(EXAMPLES)));
    assert_eq!(chip.status, ChipStatus::Active);
    assert_eq!(chip.suggestion_examples.len(), 2);
    assert_eq!(session.scheduler_state(), SchedulerState::Idle);

    let request = analyzer.last_request();
    assert_eq!(request.partial_prompt, COVER_LETTER);
    assert!(request.active_chip.is_none());
    assert!(!request.manual_mode);
}

#[tokio::test(start_paused = true)]
async fn test_satisfied_chip_records_progress_and_retires() {
    let analyzer = ScriptedAnalyzer::new();
    let progress = Arc::new(ProgressStore::in_memory());
    let mut session = session_with(settings(), Arc::clone(&analyzer), None, Arc::clone(&progress));

    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;

    analyzer.push(Ok(satisfied(EXAMPLES)));
    session.handle_input(COVER_LETTER_WITH_EXAMPLE);
    step_until(&mut session, |s| {
        s.view()
            .chip
            .is_some_and(|c| c.status == ChipStatus::Satisfied)
    })
    .await;

    let request = analyzer.last_request();
    assert_eq!(
        request.active_chip.and_then(|c| c.technique_id),
        Some(id(EXAMPLES))
    );
    assert_eq!(progress.get(&id(EXAMPLES)).unwrap().satisfaction_count, 1);
    assert!(session.chips().suppression().is_suppressed(&id(EXAMPLES)));

    session.run_until_idle().await;
    assert!(session.view().chip.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_dismiss_suppresses_without_progress() {
    let analyzer = ScriptedAnalyzer::new();
    let progress = Arc::new(ProgressStore::in_memory());
    let mut session = session_with(settings(), Arc::clone(&analyzer), None, Arc::clone(&progress));

    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;

    assert!(session.dismiss_chip());
    assert!(session.view().chip.is_none());
    assert!(session.chips().suppression().is_suppressed(&id(EXAMPLES)));
    assert!(progress.get(&id(EXAMPLES)).is_none());
    assert!(!session.dismiss_chip());
}

#[tokio::test(start_paused = true)]
async fn test_clearing_prompt_drops_chip_without_side_effects() {
    let analyzer = ScriptedAnalyzer::new();
    let progress = Arc::new(ProgressStore::in_memory());
    let mut session = session_with(settings(), Arc::clone(&analyzer), None, Arc::clone(&progress));

    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;
    assert_eq!(chip_technique(&session).as_deref(), Some(EXAMPLES));

    session.handle_input("");
    session.run_until_idle().await;
    assert!(session.view().chip.is_none());
    assert!(session.view().prompt.is_empty());
    assert!(session.chips().suppression().is_empty());
    assert_eq!(progress.snapshot().len(), 0);
    assert_eq!(analyzer.calls(), 1);

    // The same technique may surface again once the prompt is rewritten.
    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;
    assert_eq!(chip_technique(&session).as_deref(), Some(EXAMPLES));

    session.clear();
    assert!(session.view().chip.is_none());
    assert!(session.view().prompt.is_empty());
    assert!(session.chips().suppression().is_empty());
    assert_eq!(progress.snapshot().len(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_manual_help_surfaces_custom_suggestion() {
    let analyzer = ScriptedAnalyzer::new();
    analyzer.push(Ok(surface(None)));
    let mut session = session(Arc::clone(&analyzer));

    session.handle_input("Plan a three day trip to Lisbon in spring");
    session.request_help().unwrap();
    session.run_until_idle().await;

    let chip = session.view().chip.expect("custom chip");
    assert!(chip.technique_id.is_none());
    assert!(chip.title.is_none());
    assert!(!chip.suggestion_text.is_empty());

    assert_eq!(analyzer.calls(), 1);
    let request = analyzer.last_request();
    assert!(request.manual_mode);
    assert!(request.active_chip.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_manual_help_turns_unknown_technique_into_custom() {
    let analyzer = ScriptedAnalyzer::new();
    analyzer.push(Ok(surface(Some("made-up/technique"))));
    let mut session = session(Arc::clone(&analyzer));

    session.handle_input(COVER_LETTER);
    session.request_help().unwrap();
    session.run_until_idle().await;

    let chip = session.view().chip.expect("custom chip");
    assert!(chip.technique_id.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_learned_after_threshold_across_sessions() {
    let backend = Arc::new(MemoryBackend::new());
    let progress = Arc::new(ProgressStore::open(backend.clone()));
    let analyzer = ScriptedAnalyzer::new();

    for round in 1..=3_u32 {
        let mut session = session_with(settings(), Arc::clone(&analyzer), None, Arc::clone(&progress));
        analyzer.push(Ok(surface(Some(EXAMPLES))));
        session.handle_input(COVER_LETTER);
        session.run_until_idle().await;
        assert_eq!(chip_technique(&session).as_deref(), Some(EXAMPLES));

        analyzer.push(Ok(satisfied(EXAMPLES)));
        session.handle_input(COVER_LETTER_WITH_EXAMPLE);
        session.run_until_idle().await;

        let record = progress.get(&id(EXAMPLES)).unwrap();
        assert_eq!(record.satisfaction_count, round);
        assert_eq!(record.learned, round == 3);
        assert!(session.submit().is_some());
    }

    // Learned techniques are no longer surfaced automatically.
    let mut session = session_with(settings(), Arc::clone(&analyzer), None, Arc::clone(&progress));
    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;
    assert!(session.view().chip.is_none());
    assert_eq!(analyzer.last_request().learned_technique_ids, vec![id(EXAMPLES)]);

    // A manual request still can, and a fourth satisfaction keeps it learned.
    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.request_help().unwrap();
    session.run_until_idle().await;
    assert_eq!(chip_technique(&session).as_deref(), Some(EXAMPLES));

    analyzer.push(Ok(satisfied(EXAMPLES)));
    session.handle_input(COVER_LETTER_WITH_EXAMPLE);
    session.run_until_idle().await;

    let record = progress.get(&id(EXAMPLES)).unwrap();
    assert_eq!(record.satisfaction_count, 4);
    assert!(record.learned);
    let stored = backend.stored();
    assert_eq!(stored.get(&id(EXAMPLES)).unwrap().satisfaction_count, 4);
}

#[tokio::test(start_paused = true)]
async fn test_keystrokes_within_debounce_collapse_to_one_call() {
    let analyzer = ScriptedAnalyzer::new();
    let mut session = session(Arc::clone(&analyzer));

    let mut typed = String::new();
    for c in COVER_LETTER.chars() {
        typed.push(c);
        session.handle_input(&typed);
        tokio::time::sleep(Duration::from_millis(120)).await;
    }
    session.run_until_idle().await;

    assert_eq!(analyzer.calls(), 1);
    assert_eq!(analyzer.last_request().partial_prompt, COVER_LETTER);
}

#[tokio::test(start_paused = true)]
async fn test_short_prompts_are_never_analyzed() {
    let analyzer = ScriptedAnalyzer::new();
    let mut session = session(Arc::clone(&analyzer));

    session.handle_input("Write a poem");
    assert_eq!(session.scheduler_state(), SchedulerState::Idle);
    session.run_until_idle().await;
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(analyzer.calls(), 0);
    assert!(matches!(session.request_help(), Err(Error::InvalidInput(_))));
    assert_eq!(analyzer.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_prompt_is_not_reanalyzed() {
    let analyzer = ScriptedAnalyzer::new();
    let mut session = session(Arc::clone(&analyzer));

    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;
    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;
    assert_eq!(analyzer.calls(), 1);

    // Clearing forgets the last analyzed text.
    session.handle_input("");
    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;
    assert_eq!(analyzer.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_newer_analysis_supersedes_running_one() {
    let analyzer = ScriptedAnalyzer::with_delay(Duration::from_secs(2));
    let mut session = session(Arc::clone(&analyzer));

    session.handle_input(COVER_LETTER);
    step_until(&mut session, |s| s.view().is_analyzing).await;

    // The first call is cancelled before it takes an answer from the script.
    analyzer.push(Ok(surface(Some(ROLE))));
    session.handle_input(COVER_LETTER_WITH_EXAMPLE);
    session.run_until_idle().await;

    assert_eq!(analyzer.calls(), 2);
    assert_eq!(chip_technique(&session).as_deref(), Some(ROLE));
}

#[tokio::test(start_paused = true)]
async fn test_result_for_dismissed_chip_is_dropped() {
    let analyzer = ScriptedAnalyzer::with_delay(Duration::from_secs(2));
    let progress = Arc::new(ProgressStore::in_memory());
    let mut session = session_with(settings(), Arc::clone(&analyzer), None, Arc::clone(&progress));

    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;

    analyzer.push(Ok(satisfied(EXAMPLES)));
    session.handle_input(COVER_LETTER_WITH_EXAMPLE);
    step_until(&mut session, |s| s.view().is_analyzing).await;
    session.dismiss_chip();
    session.run_until_idle().await;

    assert!(session.view().chip.is_none());
    assert!(progress.get(&id(EXAMPLES)).is_none());
}

#[tokio::test(start_paused = true)]
async fn test_maintained_keeps_the_same_chip() {
    let analyzer = ScriptedAnalyzer::new();
    let mut session = session(Arc::clone(&analyzer));

    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;
    let serial = session.view().chip.unwrap().serial;

    analyzer.push(Ok(maintained(EXAMPLES)));
    session.handle_input(COVER_LETTER_WITH_EXAMPLE);
    session.run_until_idle().await;

    let chip = session.view().chip.unwrap();
    assert_eq!(chip.serial, serial);
    assert_eq!(chip.status, ChipStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn test_failures_and_timeouts_change_nothing() {
    let analyzer = ScriptedAnalyzer::new();
    let mut session = session(Arc::clone(&analyzer));

    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;

    analyzer.push(Err(Error::OperationFailed {
        operation: "analyze".to_string(),
        cause: "503".to_string(),
    }));
    session.handle_input(COVER_LETTER_WITH_EXAMPLE);
    session.run_until_idle().await;
    assert_eq!(chip_technique(&session).as_deref(), Some(EXAMPLES));

    let slow = ScriptedAnalyzer::with_delay(Duration::from_secs(20));
    slow.push(Ok(surface(Some(ROLE))));
    let mut slow_session = common::session(Arc::clone(&slow));
    slow_session.handle_input(COVER_LETTER);
    slow_session.run_until_idle().await;
    assert_eq!(slow.calls(), 1);
    assert!(slow_session.view().chip.is_none());
    assert_eq!(slow_session.scheduler_state(), SchedulerState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_show_me_streams_and_reverts() {
    let analyzer = ScriptedAnalyzer::new();
    let rewriter = ScriptedRewriter::new(vec![" For example,", " [paste a letter you liked]."]);
    let progress = Arc::new(ProgressStore::in_memory());
    let mut session = session_with(
        settings(),
        Arc::clone(&analyzer),
        Some(Arc::clone(&rewriter)),
        Arc::clone(&progress),
    );

    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;
    assert!(session.view().can_show_me);

    session.show_me().unwrap();
    let view = session.view();
    assert!(view.is_streaming);
    assert!(!view.can_show_me);
    assert_eq!(view.chip.unwrap().status, ChipStatus::Satisfied);
    assert!(!session.handle_input("typing during the stream"));
    assert_eq!(progress.get(&id(EXAMPLES)).unwrap().satisfaction_count, 1);

    session.run_until_idle().await;

    let expected = format!("{COVER_LETTER} For example, [paste a letter you liked].");
    assert_eq!(session.prompt(), expected);
    assert!(session.view().can_revert);
    assert!(session.view().chip.is_none());
    assert_eq!(rewriter.requests()[0].technique_id, Some(id(EXAMPLES)));
    assert_eq!(analyzer.calls(), 1);

    assert!(session.revert());
    assert_eq!(session.prompt(), COVER_LETTER);
    assert!(!session.view().can_revert);
    session.run_until_idle().await;
    assert_eq!(analyzer.calls(), 1);
    assert_eq!(progress.get(&id(EXAMPLES)).unwrap().satisfaction_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_demonstration_restores_prompt_and_keeps_credit() {
    let analyzer = ScriptedAnalyzer::new();
    let rewriter = ScriptedRewriter::failing(vec![" For example"]);
    let progress = Arc::new(ProgressStore::in_memory());
    let mut session = session_with(
        settings(),
        Arc::clone(&analyzer),
        Some(rewriter),
        Arc::clone(&progress),
    );

    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;

    session.show_me().unwrap();
    session.run_until_idle().await;

    assert_eq!(session.prompt(), COVER_LETTER);
    assert!(!session.view().can_revert);
    assert!(!session.view().is_streaming);
    assert_eq!(progress.get(&id(EXAMPLES)).unwrap().satisfaction_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_show_me_during_analysis_credits_once() {
    let analyzer = ScriptedAnalyzer::with_delay(Duration::from_secs(2));
    let rewriter = ScriptedRewriter::new(vec![" Example: [paste]."]);
    let progress = Arc::new(ProgressStore::in_memory());
    let mut session = session_with(
        settings(),
        Arc::clone(&analyzer),
        Some(rewriter),
        Arc::clone(&progress),
    );

    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;

    analyzer.push(Ok(satisfied(EXAMPLES)));
    session.handle_input(COVER_LETTER_WITH_EXAMPLE);
    step_until(&mut session, |s| s.view().is_analyzing).await;

    session.show_me().unwrap();
    session.run_until_idle().await;

    assert_eq!(progress.get(&id(EXAMPLES)).unwrap().satisfaction_count, 1);
}

#[tokio::test(start_paused = true)]
async fn test_show_me_requires_an_active_chip() {
    let analyzer = ScriptedAnalyzer::new();
    let rewriter = ScriptedRewriter::new(vec!["x"]);
    let mut session = session_with(
        settings(),
        analyzer,
        Some(rewriter),
        Arc::new(ProgressStore::in_memory()),
    );

    session.handle_input(COVER_LETTER);
    assert!(matches!(session.show_me(), Err(Error::InvalidInput(_))));
}

#[tokio::test(start_paused = true)]
async fn test_submit_resets_chip_and_suppression() {
    let analyzer = ScriptedAnalyzer::new();
    let mut session = session(Arc::clone(&analyzer));

    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;
    session.dismiss_chip();

    analyzer.push(Ok(surface(Some(ROLE))));
    session.handle_input(COVER_LETTER_WITH_EXAMPLE);
    session.run_until_idle().await;
    assert_eq!(chip_technique(&session).as_deref(), Some(ROLE));

    let submitted = session.submit().unwrap();
    assert_eq!(submitted, COVER_LETTER_WITH_EXAMPLE);
    assert!(session.view().chip.is_none());
    assert!(session.chips().suppression().is_empty());
    assert!(session.prompt().is_empty());
    assert!(session.submit().is_none());

    // The next editing session sees the dismissed technique again.
    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;
    assert_eq!(chip_technique(&session).as_deref(), Some(EXAMPLES));
    assert!(analyzer.last_request().suppressed_technique_ids.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_submit_during_stream_sends_original_prompt() {
    let analyzer = ScriptedAnalyzer::new();
    let rewriter = ScriptedRewriter::slow(vec![" one", " two"], Duration::from_secs(1));
    let mut session = session_with(
        settings(),
        Arc::clone(&analyzer),
        Some(rewriter),
        Arc::new(ProgressStore::in_memory()),
    );

    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;

    session.show_me().unwrap();
    assert_eq!(session.submit().as_deref(), Some(COVER_LETTER));
    assert!(!session.view().is_streaming);
    session.run_until_idle().await;
    assert!(session.prompt().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dismissed_technique_is_not_resurfaced_automatically() {
    let analyzer = ScriptedAnalyzer::new();
    let mut session = session(Arc::clone(&analyzer));

    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;
    session.dismiss_chip();

    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.handle_input(COVER_LETTER_WITH_EXAMPLE);
    session.run_until_idle().await;
    assert!(session.view().chip.is_none());
    assert_eq!(
        analyzer.last_request().suppressed_technique_ids,
        vec![id(EXAMPLES)]
    );

    // Asking for help explicitly lifts the suppression.
    analyzer.push(Ok(surface(Some(EXAMPLES))));
    session.request_help().unwrap();
    session.run_until_idle().await;
    assert_eq!(chip_technique(&session).as_deref(), Some(EXAMPLES));
    assert!(!session.chips().suppression().is_suppressed(&id(EXAMPLES)));
}

#[tokio::test(start_paused = true)]
async fn test_auto_suggestions_disabled_only_answers_manual_requests() {
    let analyzer = ScriptedAnalyzer::new();
    let settings = settings().with_features(FeatureFlags {
        auto_suggestions: false,
        show_me: true,
    });
    let mut session = session_with(
        settings,
        Arc::clone(&analyzer),
        None,
        Arc::new(ProgressStore::in_memory()),
    );

    session.handle_input(COVER_LETTER);
    session.run_until_idle().await;
    assert_eq!(analyzer.calls(), 0);

    analyzer.push(Ok(surface(Some(ROLE))));
    session.request_help().unwrap();
    session.run_until_idle().await;
    assert_eq!(analyzer.calls(), 1);
    assert_eq!(chip_technique(&session).as_deref(), Some(ROLE));
    assert!(!session.view().can_show_me);
}
