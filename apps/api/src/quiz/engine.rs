//! Adaptive questionnaire engine for a single classification stage.
//!
//! Labels compete round by round: every active label contributes its next
//! question to a round, answers accumulate per label, and when a round is
//! exhausted the highest score wins. Ties open a reduced tie-break round over
//! the tied labels only. The provisional winner then gets one confirmation
//! question; a rejection hands the decision to the `Ranker`.
//!
//! The engine is synchronous and owned by exactly one caller. All randomness
//! (exhausted-tie draws and the placeholder ranker) comes from the `StdRng`
//! supplied at construction.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::quiz::answer::{self, Answer};
use crate::quiz::catalog::QuestionPool;
use crate::quiz::ranking::{self, Ranker};

/// A question together with the label it scores for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    pub question: String,
    pub label: String,
}

/// Result of submitting an answer.
#[derive(Debug, Clone, PartialEq)]
pub enum StageEvent {
    /// The round continues with this question.
    NextQuestion(Prompt),
    /// The round ended in a tie and a tie-break round has opened.
    TieBreak {
        tied_labels: Vec<String>,
        next_question: Prompt,
    },
    /// A single winner emerged; this question confirms it.
    Confirmation(Prompt),
    /// The stage terminated. `None` only when the stage had no labels.
    Complete { prediction: Option<String> },
    /// The stage had already terminated; the answer was ignored.
    AlreadyComplete { prediction: Option<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Asking,
    TieBreak,
    Confirming,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Asking,
    TieBreak,
    Confirming { winner: usize },
    Complete { prediction: Option<usize> },
}

/// Per-label cursor and answer ledger.
#[derive(Debug, Clone)]
struct LabelTrack {
    label: String,
    questions: Vec<String>,
    cursor: usize,
    ledger: Vec<Answer>,
}

impl LabelTrack {
    fn new((label, questions): (String, Vec<String>)) -> Self {
        Self {
            label,
            questions,
            cursor: 0,
            ledger: Vec::new(),
        }
    }

    fn draw(&mut self) -> Option<String> {
        let question = self.questions.get(self.cursor)?.clone();
        self.cursor += 1;
        Some(question)
    }

    fn score(&self) -> u32 {
        answer::score(&self.ledger)
    }
}

#[derive(Debug, Clone)]
struct Slot {
    track: usize,
    prompt: Prompt,
}

pub struct QuizEngine {
    tracks: Vec<LabelTrack>,
    max_rounds: usize,
    round: Vec<Slot>,
    index: usize,
    phase: Phase,
    ranker: Arc<dyn Ranker>,
    rng: StdRng,
}

impl QuizEngine {
    /// Builds the engine and opens the first round.
    ///
    /// With no labels the stage is complete immediately with no prediction.
    /// If every label's pool is empty the round is resolved on the spot.
    pub fn new(pool: QuestionPool, ranker: Arc<dyn Ranker>, rng: StdRng) -> Self {
        let tracks: Vec<LabelTrack> = pool.into_entries().into_iter().map(LabelTrack::new).collect();
        let max_rounds = tracks.iter().map(|t| t.questions.len()).max().unwrap_or(0);

        let mut engine = Self {
            tracks,
            max_rounds,
            round: Vec::new(),
            index: 0,
            phase: Phase::Asking,
            ranker,
            rng,
        };
        engine.open_first_round();
        engine
    }

    fn open_first_round(&mut self) {
        if self.tracks.is_empty() {
            debug!("Quiz stage built with no labels");
            self.finish(None);
            return;
        }

        let slots: Vec<Slot> = (0..self.tracks.len())
            .filter_map(|i| self.draw_slot(i))
            .collect();
        self.start_round(slots);

        if self.round.is_empty() {
            debug!("No label has questions; resolving stage immediately");
            self.complete_round();
        }
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    /// The open question, or `None` once the round is exhausted or the stage
    /// is complete.
    pub fn current_question(&self) -> Option<&Prompt> {
        self.round.get(self.index).map(|slot| &slot.prompt)
    }

    pub fn state(&self) -> EngineState {
        match self.phase {
            Phase::Asking => EngineState::Asking,
            Phase::TieBreak => EngineState::TieBreak,
            Phase::Confirming { .. } => EngineState::Confirming,
            Phase::Complete { .. } => EngineState::Complete,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self.phase, Phase::Complete { .. })
    }

    /// Final label, once the stage is complete.
    pub fn prediction(&self) -> Option<&str> {
        match self.phase {
            Phase::Complete { prediction } => prediction.map(|i| self.tracks[i].label.as_str()),
            _ => None,
        }
    }

    /// Longest pool across all labels.
    #[cfg(test)]
    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Number of questions in the open round.
    pub fn round_len(&self) -> usize {
        self.round.len()
    }

    /// Position of the current question within the open round.
    pub fn round_index(&self) -> usize {
        self.index
    }

    #[cfg(test)]
    pub fn cursor(&self, label: &str) -> Option<usize> {
        self.track(label).map(|t| t.cursor)
    }

    #[cfg(test)]
    pub fn ledger(&self, label: &str) -> Option<&[Answer]> {
        self.track(label).map(|t| t.ledger.as_slice())
    }

    #[cfg(test)]
    pub fn score(&self, label: &str) -> Option<u32> {
        self.track(label).map(LabelTrack::score)
    }

    #[cfg(test)]
    fn track(&self, label: &str) -> Option<&LabelTrack> {
        self.tracks.iter().find(|t| t.label == label)
    }

    // ── Transitions ──────────────────────────────────────────────────────────

    /// Records an answer for the current question and advances the stage.
    ///
    /// Text other than yes / not sure / no counts as "no". Answering a
    /// completed stage is a no-op.
    pub fn answer(&mut self, raw_answer: &str) -> StageEvent {
        let answer = Answer::parse_lenient(raw_answer);

        match self.phase {
            Phase::Complete { .. } => return self.already_complete(),
            Phase::Confirming { winner } => return self.process_confirmation(answer, winner),
            Phase::Asking | Phase::TieBreak => {}
        }

        let Some(track) = self.round.get(self.index).map(|slot| slot.track) else {
            return self.already_complete();
        };
        self.tracks[track].ledger.push(answer);
        self.index += 1;

        if let Some(next) = self.current_question().cloned() {
            return StageEvent::NextQuestion(next);
        }
        self.complete_round()
    }

    fn complete_round(&mut self) -> StageEvent {
        let tied = self.tied_tracks();
        if let &[winner] = tied.as_slice() {
            return self.final_confirmation(winner);
        }

        let round = self.tracks.iter().map(|t| t.cursor).max().unwrap_or(0);
        if round < self.max_rounds {
            let mut slots = Vec::new();
            for &i in &tied {
                match self.draw_slot(i) {
                    Some(slot) => slots.push(slot),
                    // exhausted: keep its ledger in step with the others
                    None => self.tracks[i].ledger.push(Answer::No),
                }
            }

            if !slots.is_empty() {
                let tied_labels: Vec<String> =
                    tied.iter().map(|&i| self.tracks[i].label.clone()).collect();
                let next_question = slots[0].prompt.clone();
                info!(
                    "Tie between {:?} at round {round}; asking {} tie-break questions",
                    tied_labels,
                    slots.len()
                );
                self.start_round(slots);
                self.phase = Phase::TieBreak;
                return StageEvent::TieBreak {
                    tied_labels,
                    next_question,
                };
            }
            debug!("Every tied label is exhausted");
        }

        let Some(&winner) = tied.choose(&mut self.rng) else {
            return self.finish(None);
        };
        info!(
            "Tie unresolved after all questions; drew '{}'",
            self.tracks[winner].label
        );
        self.final_confirmation(winner)
    }

    /// Asks one more question of the winner if it has one left.
    fn final_confirmation(&mut self, winner: usize) -> StageEvent {
        match self.draw_slot(winner) {
            Some(slot) => {
                let prompt = slot.prompt.clone();
                self.start_round(vec![slot]);
                self.phase = Phase::Confirming { winner };
                StageEvent::Confirmation(prompt)
            }
            None => self.finish(Some(winner)),
        }
    }

    /// Accepting (yes / not sure) keeps the winner; rejecting re-ranks every
    /// label and takes the best one other than the winner, falling back to
    /// the winner when the ranking offers no alternative.
    fn process_confirmation(&mut self, answer: Answer, winner: usize) -> StageEvent {
        self.tracks[winner].ledger.push(answer);
        self.index += 1;

        if !answer.is_rejection() {
            return self.finish(Some(winner));
        }

        let label_count = self.tracks.len();
        let input = ranking::build_input(
            self.tracks.iter().map(|t| t.ledger.as_slice()),
            label_count * self.max_rounds,
        );
        let scores = self.ranker.rank(&input, label_count, &mut self.rng);

        match ranking::best_alternative(&scores, label_count, winner) {
            Some(alternative) => {
                info!(
                    "Confirmation of '{}' rejected; {} ranker chose '{}'",
                    self.tracks[winner].label,
                    self.ranker.name(),
                    self.tracks[alternative].label
                );
                self.finish(Some(alternative))
            }
            None => {
                warn!(
                    "Confirmation of '{}' rejected but {} ranker gave no alternative; keeping it",
                    self.tracks[winner].label,
                    self.ranker.name()
                );
                self.finish(Some(winner))
            }
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────────────

    /// Indices of every label sharing the top score, in label order.
    fn tied_tracks(&self) -> Vec<usize> {
        let scores: Vec<u32> = self.tracks.iter().map(LabelTrack::score).collect();
        let Some(&top) = scores.iter().max() else {
            return Vec::new();
        };
        scores
            .iter()
            .enumerate()
            .filter(|&(_, &s)| s == top)
            .map(|(i, _)| i)
            .collect()
    }

    fn draw_slot(&mut self, track: usize) -> Option<Slot> {
        let entry = &mut self.tracks[track];
        let question = entry.draw()?;
        Some(Slot {
            track,
            prompt: Prompt {
                question,
                label: entry.label.clone(),
            },
        })
    }

    fn start_round(&mut self, slots: Vec<Slot>) {
        self.round = slots;
        self.index = 0;
    }

    fn finish(&mut self, prediction: Option<usize>) -> StageEvent {
        self.round.clear();
        self.index = 0;
        self.phase = Phase::Complete { prediction };
        let prediction = prediction.map(|i| self.tracks[i].label.clone());
        debug!("Stage complete: {:?}", prediction);
        StageEvent::Complete { prediction }
    }

    fn already_complete(&self) -> StageEvent {
        StageEvent::AlreadyComplete {
            prediction: self.prediction().map(str::to_owned),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{RngCore, SeedableRng};

    /// Returns the same scores regardless of input.
    struct FixedRanker(Vec<f64>);

    impl Ranker for FixedRanker {
        fn rank(&self, _input: &[u32], _label_count: usize, _rng: &mut dyn RngCore) -> Vec<f64> {
            self.0.clone()
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    fn pool(entries: &[(&str, &[&str])]) -> QuestionPool {
        entries
            .iter()
            .map(|(label, qs)| (*label, qs.iter().copied()))
            .collect()
    }

    fn engine(entries: &[(&str, &[&str])]) -> QuizEngine {
        engine_with(entries, FixedRanker(vec![]), 1)
    }

    fn engine_with(entries: &[(&str, &[&str])], ranker: impl Ranker + 'static, seed: u64) -> QuizEngine {
        QuizEngine::new(pool(entries), Arc::new(ranker), StdRng::seed_from_u64(seed))
    }

    fn question(engine: &QuizEngine) -> &str {
        engine.current_question().unwrap().question.as_str()
    }

    fn prompt(question: &str, label: &str) -> Prompt {
        Prompt {
            question: question.to_string(),
            label: label.to_string(),
        }
    }

    fn complete(label: &str) -> StageEvent {
        StageEvent::Complete {
            prediction: Some(label.to_string()),
        }
    }

    #[test]
    fn test_first_round_has_one_question_per_label() {
        let e = engine(&[("A", &["a1", "a2"]), ("B", &["b1"]), ("C", &["c1", "c2", "c3"])]);
        assert_eq!(e.round_len(), 3);
        assert_eq!(e.round_index(), 0);
        assert_eq!(e.max_rounds(), 3);
        assert_eq!(e.current_question(), Some(&prompt("a1", "A")));
        for label in ["A", "B", "C"] {
            assert_eq!(e.cursor(label), Some(1));
            assert_eq!(e.ledger(label), Some(&[][..]));
        }
        assert_eq!(e.state(), EngineState::Asking);
    }

    #[test]
    fn test_empty_pool_label_is_skipped() {
        let mut e = engine(&[("A", &[]), ("B", &["b1", "b2"])]);
        assert_eq!(e.round_len(), 1);
        assert_eq!(question(&e), "b1");
        assert_eq!(e.cursor("A"), Some(0));

        // B scores 2, A scores 0: B wins and is confirmed with b2
        assert_eq!(e.answer("yes"), StageEvent::Confirmation(prompt("b2", "B")));
    }

    #[test]
    fn test_two_label_scenario_confirms_winner() {
        let mut e = engine(&[("A", &["a1", "a2"]), ("B", &["b1", "b2"])]);
        assert_eq!(question(&e), "a1");
        assert_eq!(e.answer("yes"), StageEvent::NextQuestion(prompt("b1", "B")));
        assert_eq!(e.answer("no"), StageEvent::Confirmation(prompt("a2", "A")));
        assert_eq!(e.score("A"), Some(2));
        assert_eq!(e.score("B"), Some(0));
        assert_eq!(e.state(), EngineState::Confirming);
        assert_eq!(question(&e), "a2");

        assert_eq!(e.answer("yes"), complete("A"));
        assert!(e.is_complete());
        assert_eq!(e.prediction(), Some("A"));
        assert!(e.current_question().is_none());
    }

    #[test]
    fn test_single_yes_wins_without_tie_break() {
        let mut e = engine(&[
            ("A", &["a1", "a2"]),
            ("B", &["b1", "b2"]),
            ("C", &["c1", "c2"]),
        ]);
        e.answer("no");
        e.answer("Yes");
        let event = e.answer("no");
        assert_eq!(event, StageEvent::Confirmation(prompt("b2", "B")));
    }

    #[test]
    fn test_symmetric_answers_request_tie_break() {
        let mut e = engine(&[("A", &["a1", "a2", "a3"]), ("B", &["b1", "b2", "b3"])]);
        e.answer("yes");
        let event = e.answer("yes");
        assert_eq!(
            event,
            StageEvent::TieBreak {
                tied_labels: vec!["A".to_string(), "B".to_string()],
                next_question: prompt("a2", "A"),
            }
        );
        assert_eq!(e.state(), EngineState::TieBreak);
        assert_eq!(e.round_len(), 2);

        // a2=yes, b2=no breaks the tie; A is confirmed with a3
        assert_eq!(e.answer("yes"), StageEvent::NextQuestion(prompt("b2", "B")));
        assert_eq!(e.answer("no"), StageEvent::Confirmation(prompt("a3", "A")));
        assert_eq!(e.answer("not sure"), complete("A"));
    }

    #[test]
    fn test_tie_break_is_scoped_to_tied_labels() {
        let mut e = engine(&[
            ("A", &["a1", "a2"]),
            ("B", &["b1", "b2"]),
            ("C", &["c1", "c2"]),
        ]);
        e.answer("yes");
        e.answer("no");
        let event = e.answer("yes");
        match event {
            StageEvent::TieBreak {
                tied_labels,
                next_question,
            } => {
                assert_eq!(tied_labels, vec!["A", "C"]);
                assert_eq!(next_question, prompt("a2", "A"));
            }
            other => panic!("expected tie-break, got {other:?}"),
        }
        assert_eq!(e.round_len(), 2);
        assert_eq!(e.cursor("B"), Some(1));
    }

    #[test]
    fn test_exhausted_tied_label_gets_synthetic_no() {
        let mut e = engine(&[("A", &["a1"]), ("B", &["b1", "b2"])]);
        e.answer("yes");
        let event = e.answer("yes");
        assert_eq!(
            event,
            StageEvent::TieBreak {
                tied_labels: vec!["A".to_string(), "B".to_string()],
                next_question: prompt("b2", "B"),
            }
        );
        assert_eq!(e.ledger("A"), Some(&[Answer::Yes, Answer::No][..]));
        assert_eq!(e.round_len(), 1);

        // B pulls ahead; it has no confirmation question left
        assert_eq!(e.answer("yes"), complete("B"));
    }

    #[test]
    fn test_exhausted_tie_terminates_with_a_tied_label() {
        for seed in 0..20 {
            let mut e = engine_with(&[("A", &["a1"]), ("B", &["b1"])], FixedRanker(vec![]), seed);
            e.answer("yes");
            match e.answer("yes") {
                StageEvent::Complete {
                    prediction: Some(label),
                } => assert!(label == "A" || label == "B"),
                other => panic!("expected completion, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_tie_with_only_exhausted_tied_labels_does_not_stall() {
        let mut e = engine(&[("A", &["a1"]), ("B", &["b1"]), ("C", &["c1", "c2", "c3"])]);
        e.answer("yes");
        e.answer("yes");
        let event = e.answer("no");
        match event {
            StageEvent::Complete {
                prediction: Some(label),
            } => assert!(label == "A" || label == "B"),
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(e.ledger("A").unwrap().len(), 2);
        assert_eq!(e.ledger("B").unwrap().len(), 2);
    }

    #[test]
    fn test_repeated_ties_end_in_a_draw() {
        let mut e = engine(&[("A", &["a1", "a2"]), ("B", &["b1", "b2"])]);
        e.answer("no");
        e.answer("no");
        // tie-break round a2, b2
        e.answer("no");
        match e.answer("no") {
            StageEvent::Complete {
                prediction: Some(label),
            } => assert!(label == "A" || label == "B"),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[test]
    fn test_confirmation_rejection_picks_best_alternative() {
        let mut e = engine_with(
            &[("A", &["a1", "a2"]), ("B", &["b1", "b2"]), ("C", &["c1", "c2"])],
            FixedRanker(vec![0.9, 0.2, 0.6]),
            1,
        );
        e.answer("yes");
        e.answer("no");
        assert_eq!(e.answer("no"), StageEvent::Confirmation(prompt("a2", "A")));
        assert_eq!(e.answer("no"), complete("C"));
        assert_eq!(e.ledger("A"), Some(&[Answer::Yes, Answer::No][..]));
    }

    #[test]
    fn test_confirmation_rejection_with_single_label_keeps_it() {
        let mut e = engine_with(&[("A", &["a1", "a2"])], FixedRanker(vec![0.4]), 1);
        assert_eq!(e.answer("yes"), StageEvent::Confirmation(prompt("a2", "A")));
        assert_eq!(e.answer("no"), complete("A"));
    }

    #[test]
    fn test_confirmation_rejection_with_flat_ranking_keeps_winner() {
        let mut e = engine_with(
            &[("A", &["a1", "a2"]), ("B", &["b1", "b2"])],
            FixedRanker(vec![0.5, 0.5]),
            1,
        );
        e.answer("no");
        e.answer("yes");
        assert_eq!(e.answer("nope"), complete("B"));
    }

    #[test]
    fn test_ranker_receives_fixed_width_input() {
        struct WidthCheck;
        impl Ranker for WidthCheck {
            fn rank(&self, input: &[u32], label_count: usize, _rng: &mut dyn RngCore) -> Vec<f64> {
                assert_eq!(label_count, 2);
                assert_eq!(input, &[2, 0, 0, 0, 0, 0]);
                vec![0.1, 0.9]
            }
            fn name(&self) -> &'static str {
                "width-check"
            }
        }

        let mut e = engine_with(&[("A", &["a1", "a2", "a3"]), ("B", &["b1"])], WidthCheck, 1);
        e.answer("yes");
        e.answer("no");
        assert_eq!(e.answer("no"), complete("B"));
    }

    #[test]
    fn test_answer_after_completion_is_a_no_op() {
        let mut e = engine(&[("A", &["a1"]), ("B", &["b1"])]);
        e.answer("yes");
        assert_eq!(e.answer("no"), complete("A"));
        assert_eq!(
            e.answer("yes"),
            StageEvent::AlreadyComplete {
                prediction: Some("A".to_string())
            }
        );
        assert_eq!(e.ledger("A"), Some(&[Answer::Yes][..]));
    }

    #[test]
    fn test_no_labels_completes_without_prediction() {
        let mut e = engine(&[]);
        assert!(e.is_complete());
        assert_eq!(e.prediction(), None);
        assert_eq!(e.max_rounds(), 0);
        assert_eq!(
            e.answer("yes"),
            StageEvent::AlreadyComplete { prediction: None }
        );
    }

    #[test]
    fn test_all_empty_pools_complete_with_some_label() {
        let e = engine(&[("A", &[]), ("B", &[])]);
        assert!(e.is_complete());
        let prediction = e.prediction().unwrap();
        assert!(prediction == "A" || prediction == "B");
    }

    #[test]
    fn test_same_seed_and_answers_reproduce_prediction() {
        let run = |seed: u64| {
            let mut e = QuizEngine::new(
                pool(&[("A", &["a1", "a2"]), ("B", &["b1", "b2"]), ("C", &["c1"])]),
                Arc::new(ranking::NoiseRanker),
                StdRng::seed_from_u64(seed),
            );
            let mut last = e.answer("yes");
            while !e.is_complete() {
                last = e.answer("no");
            }
            last
        };
        for seed in [3, 11, 99] {
            assert_eq!(run(seed), run(seed));
        }
    }

    #[test]
    fn test_cursor_never_exceeds_pool_length() {
        let mut e = engine(&[("A", &["a1"]), ("B", &["b1", "b2", "b3"])]);
        while !e.is_complete() {
            e.answer("yes");
        }
        assert!(e.cursor("A").unwrap() <= 1);
        assert!(e.cursor("B").unwrap() <= 3);
    }
}
