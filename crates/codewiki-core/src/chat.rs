//! Chat automation: ask one question, wait for the streamed answer to settle.
//!
//! The sequencer walks a fixed state machine:
//!
//! ```text
//! Idle → PageOpened → QuestionSubmitted → Polling → Stable
//!                                                  ↘ TimedOut
//! ```
//!
//! Completion is decided by [`Debounce`], a pure function of
//! `(now, sample)` pairs, so the policy is testable without a browser or a
//! real clock. The sequencer itself only talks to a [`ChatSurface`]; the
//! browser-backed implementation lives in [`crate::browser::InteractivePage`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::{Config, Error, Result};

/// Answers shorter than this never count as final; they are usually
/// "thinking" placeholders.
pub const MIN_ANSWER_CHARS: usize = 50;

/// Widget chrome that leaks into `innerText`.
const UI_ARTIFACTS: &[&str] = &[
    "content_copy",
    "refresh",
    "thumb_up",
    "thumb_down",
    "arrow_menu_open",
];
const DISCLAIMER: &str = "Gemini can make mistakes, so double-check it.";

/// The chat widget as seen by the sequencer.
#[async_trait(?Send)]
pub trait ChatSurface {
    /// Wait up to `timeout` for the input control. `false` if it never shows.
    async fn wait_for_input(&mut self, timeout: Duration) -> Result<bool>;

    /// Type `question` and submit it.
    async fn submit_question(&mut self, question: &str) -> Result<()>;

    /// Current visible answer text, or `None` if nothing is rendered yet.
    async fn sample_answer(&mut self) -> Result<Option<String>>;
}

/// Sequencer states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChatState {
    /// Nothing has happened yet.
    Idle,
    /// Page is open; waiting for the input control.
    PageOpened,
    /// Question typed and submitted.
    QuestionSubmitted,
    /// Sampling the answer.
    Polling,
    /// Answer stopped changing.
    Stable,
    /// Budget ran out.
    TimedOut,
}

/// Pacing for one chat exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatTiming {
    /// Budget for the input control to appear.
    pub input_wait: Duration,
    /// Pause after submission before the first sample.
    pub initial_delay: Duration,
    /// Gap between samples.
    pub poll_interval: Duration,
    /// Minimum time an answer must stay identical.
    pub stable_interval: Duration,
    /// Total budget from submission to a final answer.
    pub response_wait: Duration,
}

impl ChatTiming {
    /// Timings from `config`.
    pub const fn from_config(config: &Config) -> Self {
        Self {
            input_wait: config.element_wait_timeout(),
            initial_delay: Duration::from_secs(config.chat.initial_delay_secs),
            poll_interval: Duration::from_secs(config.chat.poll_interval_secs),
            stable_interval: Duration::from_secs(config.chat.stable_interval_secs),
            response_wait: config.response_wait_timeout(),
        }
    }
}

/// Outcome of one observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Keep polling.
    Pending,
    /// The answer is final.
    Stable(String),
    /// Budget exhausted; carries the last text seen, if any.
    TimedOut(Option<String>),
}

/// Stability detector for a streamed answer.
///
/// A sample is final when it equals the previous consecutive sample, the
/// first of the identical run was seen at least `stable_interval` earlier,
/// and at least `initial_delay` has passed since submission.
#[derive(Debug)]
pub struct Debounce {
    timing: ChatTiming,
    started: Instant,
    run: Option<(String, Instant)>,
    last_seen: Option<String>,
    samples: u32,
}

impl Debounce {
    /// Detector for a question submitted at `started`.
    pub const fn new(timing: ChatTiming, started: Instant) -> Self {
        Self {
            timing,
            started,
            run: None,
            last_seen: None,
            samples: 0,
        }
    }

    /// Number of samples observed.
    pub const fn samples(&self) -> u32 {
        self.samples
    }

    /// Feed one sample taken at `now`.
    pub fn observe(&mut self, now: Instant, sample: Option<&str>) -> Verdict {
        self.samples += 1;
        let elapsed = now.saturating_duration_since(self.started);

        match sample.filter(|s| !s.trim().is_empty()) {
            None => self.run = None,
            Some(text) => {
                self.last_seen = Some(text.to_string());
                match &self.run {
                    Some((prev, since)) if prev == text => {
                        let held = now.saturating_duration_since(*since);
                        if held >= self.timing.stable_interval
                            && elapsed >= self.timing.initial_delay
                            && text.chars().count() >= MIN_ANSWER_CHARS
                        {
                            return Verdict::Stable(text.to_string());
                        }
                    },
                    _ => self.run = Some((text.to_string(), now)),
                }
            },
        }

        if elapsed >= self.timing.response_wait {
            return Verdict::TimedOut(self.last_seen.take());
        }
        Verdict::Pending
    }
}

/// Final chat result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatAnswer {
    /// Cleaned answer text.
    pub text: String,
    /// `true` when the budget ran out before the text settled.
    pub partial: bool,
    /// Samples taken.
    pub samples: u32,
}

/// Drives one question through the chat widget.
#[derive(Debug)]
pub struct ChatSequencer {
    timing: ChatTiming,
    state: ChatState,
}

impl ChatSequencer {
    /// Sequencer in the `Idle` state.
    pub const fn new(timing: ChatTiming) -> Self {
        Self {
            timing,
            state: ChatState::Idle,
        }
    }

    /// Current state.
    pub const fn state(&self) -> ChatState {
        self.state
    }

    fn enter(&mut self, next: ChatState) {
        debug!(from = ?self.state, to = ?next, "chat state");
        self.state = next;
    }

    /// Ask `question` and wait for a settled answer.
    ///
    /// Fails with [`Error::Timeout`] if the input never appears or no text is
    /// ever observed. Text that keeps changing until the budget runs out is
    /// returned with `partial = true`.
    pub async fn ask<S>(&mut self, surface: &mut S, question: &str) -> Result<ChatAnswer>
    where
        S: ChatSurface + ?Sized,
    {
        self.enter(ChatState::PageOpened);
        if !surface.wait_for_input(self.timing.input_wait).await? {
            self.enter(ChatState::TimedOut);
            return Err(Error::Timeout(format!(
                "chat input did not appear within {}s",
                self.timing.input_wait.as_secs()
            )));
        }

        surface.submit_question(question).await?;
        self.enter(ChatState::QuestionSubmitted);
        let started = Instant::now();

        tokio::time::sleep(self.timing.initial_delay).await;
        self.enter(ChatState::Polling);

        let mut debounce = Debounce::new(self.timing, started);
        loop {
            let sample = surface.sample_answer().await?.map(|raw| clean_answer(&raw));
            match debounce.observe(Instant::now(), sample.as_deref()) {
                Verdict::Pending => tokio::time::sleep(self.timing.poll_interval).await,
                Verdict::Stable(text) => {
                    self.enter(ChatState::Stable);
                    info!(samples = debounce.samples(), chars = text.len(), "chat answer settled");
                    return Ok(ChatAnswer {
                        text,
                        partial: false,
                        samples: debounce.samples(),
                    });
                },
                Verdict::TimedOut(Some(text)) => {
                    self.enter(ChatState::TimedOut);
                    info!(samples = debounce.samples(), "chat answer still changing at deadline");
                    return Ok(ChatAnswer {
                        text,
                        partial: true,
                        samples: debounce.samples(),
                    });
                },
                Verdict::TimedOut(None) => {
                    self.enter(ChatState::TimedOut);
                    return Err(Error::Timeout(format!(
                        "no answer text appeared within {}s",
                        self.timing.response_wait.as_secs()
                    )));
                },
            }
        }
    }
}

/// Strip widget chrome from sampled answer text.
pub fn clean_answer(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut blank_run = 0;
    for line in raw.replace(DISCLAIMER, "").lines() {
        let line = line.trim_end();
        if UI_ARTIFACTS.contains(&line.trim()) {
            continue;
        }
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn timing() -> ChatTiming {
        ChatTiming {
            input_wait: Duration::from_secs(20),
            initial_delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(2),
            stable_interval: Duration::from_secs(2),
            response_wait: Duration::from_secs(45),
        }
    }

    fn answer(n: usize) -> String {
        format!("{} {}", "The repository implements a small HTTP server.", "x".repeat(n))
    }

    struct ScriptedSurface {
        input_ready: bool,
        samples: VecDeque<Option<String>>,
        repeat_last: Option<String>,
        submitted: Vec<String>,
        sampled: u32,
    }

    impl ScriptedSurface {
        fn new(samples: Vec<Option<String>>) -> Self {
            let repeat_last = samples.last().cloned().flatten();
            Self {
                input_ready: true,
                samples: samples.into(),
                repeat_last,
                submitted: Vec::new(),
                sampled: 0,
            }
        }
    }

    #[async_trait(?Send)]
    impl ChatSurface for ScriptedSurface {
        async fn wait_for_input(&mut self, timeout: Duration) -> Result<bool> {
            if !self.input_ready {
                tokio::time::sleep(timeout).await;
            }
            Ok(self.input_ready)
        }

        async fn submit_question(&mut self, question: &str) -> Result<()> {
            self.submitted.push(question.to_string());
            Ok(())
        }

        async fn sample_answer(&mut self) -> Result<Option<String>> {
            self.sampled += 1;
            Ok(self
                .samples
                .pop_front()
                .unwrap_or_else(|| self.repeat_last.clone()))
        }
    }

    #[test]
    fn test_debounce_requires_identical_consecutive_samples() {
        let t0 = Instant::now();
        let mut d = Debounce::new(timing(), t0);
        let at = |s| t0 + Duration::from_secs(s);

        assert_eq!(d.observe(at(5), Some(&answer(1))), Verdict::Pending);
        assert_eq!(d.observe(at(7), Some(&answer(2))), Verdict::Pending);
        assert_eq!(d.observe(at(9), Some(&answer(3))), Verdict::Pending);
        assert_eq!(d.observe(at(11), Some(&answer(3))), Verdict::Stable(answer(3)));
    }

    #[test]
    fn test_debounce_waits_for_stable_interval() {
        let t0 = Instant::now();
        let mut d = Debounce::new(
            ChatTiming {
                stable_interval: Duration::from_secs(3),
                ..timing()
            },
            t0,
        );
        let at = |s| t0 + Duration::from_secs(s);

        assert_eq!(d.observe(at(5), Some(&answer(3))), Verdict::Pending);
        // Identical, but only 2s apart.
        assert_eq!(d.observe(at(7), Some(&answer(3))), Verdict::Pending);
        assert_eq!(d.observe(at(9), Some(&answer(3))), Verdict::Stable(answer(3)));
    }

    #[test]
    fn test_debounce_ignores_short_placeholders() {
        let t0 = Instant::now();
        let mut d = Debounce::new(timing(), t0);
        let at = |s| t0 + Duration::from_secs(s);

        assert_eq!(d.observe(at(5), Some("Thinking...")), Verdict::Pending);
        assert_eq!(d.observe(at(7), Some("Thinking...")), Verdict::Pending);
        assert_eq!(d.observe(at(9), Some("Thinking...")), Verdict::Pending);
    }

    #[test]
    fn test_debounce_gap_breaks_the_run() {
        let t0 = Instant::now();
        let mut d = Debounce::new(timing(), t0);
        let at = |s| t0 + Duration::from_secs(s);

        assert_eq!(d.observe(at(5), Some(&answer(3))), Verdict::Pending);
        assert_eq!(d.observe(at(7), None), Verdict::Pending);
        assert_eq!(d.observe(at(9), Some(&answer(3))), Verdict::Pending);
        assert_eq!(d.observe(at(11), Some(&answer(3))), Verdict::Stable(answer(3)));
    }

    #[test]
    fn test_debounce_times_out_with_last_text() {
        let t0 = Instant::now();
        let mut d = Debounce::new(timing(), t0);
        let at = |s| t0 + Duration::from_secs(s);

        assert_eq!(d.observe(at(43), Some(&answer(1))), Verdict::Pending);
        assert_eq!(d.observe(at(45), Some(&answer(2))), Verdict::TimedOut(Some(answer(2))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_stops_at_first_stable_pair() {
        // Stream stops changing after sample 3.
        let mut surface = ScriptedSurface::new(vec![
            Some(answer(1)),
            Some(answer(2)),
            Some(answer(3)),
            Some(answer(3)),
            Some(answer(3)),
        ]);
        let mut seq = ChatSequencer::new(timing());

        let out = seq.ask(&mut surface, "What does it do?").await.unwrap();

        assert_eq!(out.text, answer(3));
        assert!(!out.partial);
        assert_eq!(surface.sampled, 4);
        assert_eq!(out.samples, 4);
        assert_eq!(seq.state(), ChatState::Stable);
        assert_eq!(surface.submitted, vec!["What does it do?".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_input_times_out() {
        let mut surface = ScriptedSurface::new(vec![]);
        surface.input_ready = false;
        let mut seq = ChatSequencer::new(timing());

        let err = seq.ask(&mut surface, "q").await.unwrap_err();

        assert!(matches!(err, Error::Timeout(_)));
        assert_eq!(seq.state(), ChatState::TimedOut);
        assert!(surface.submitted.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_text_ever_is_timeout() {
        let mut surface = ScriptedSurface::new(vec![None]);
        let mut seq = ChatSequencer::new(timing());

        let err = seq.ask(&mut surface, "q").await.unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ever_changing_text_is_partial() {
        let samples = (0..40).map(|i| Some(answer(i))).collect();
        let mut surface = ScriptedSurface::new(samples);
        let mut seq = ChatSequencer::new(timing());

        let out = seq.ask(&mut surface, "q").await.unwrap();
        assert!(out.partial);
        assert_eq!(seq.state(), ChatState::TimedOut);
    }

    #[test]
    fn test_clean_answer_strips_widget_chrome() {
        let raw = "Answer line one\ncontent_copy\nrefresh\n\n\n\nSecond paragraph\nthumb_up\nthumb_down\n\
                   Gemini can make mistakes, so double-check it.";
        assert_eq!(clean_answer(raw), "Answer line one\n\nSecond paragraph");
    }
}
